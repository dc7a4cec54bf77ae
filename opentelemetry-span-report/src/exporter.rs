use core::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use opentelemetry::{otel_debug, otel_info, trace::SpanKind};
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use opentelemetry_proto::tonic::trace::v1::{span::SpanKind as ProtoSpanKind, ResourceSpans};
use opentelemetry_sdk::error::{OTelSdkError, OTelSdkResult};
use opentelemetry_sdk::trace::{SpanData, SpanExporter};
use opentelemetry_sdk::Resource;

use crate::classify::SpanCategories;
use crate::config::{
    SpanReportConfig, SpanReportConfigBuilder, OTEL_SPAN_REPORT_INTERVAL_DEFAULT,
};
use crate::error::ReportResult;
use crate::key::GroupKey;
use crate::scheduler::RotationScheduler;
use crate::sink::{FileSink, ReportSink};
use crate::stats::StatsRegistry;

/// An exporter that counts spans instead of forwarding them.
///
/// Spans are grouped by the `service.name` and `deployment.environment.name`
/// of their resource and counted as total, HTTP server and SQL traffic in
/// hourly, daily and monthly windows. A background [`RotationScheduler`]
/// periodically appends one line per group to the configured
/// [`ReportSink`] and resets the windows that ended.
///
/// The exporter can be installed in an SDK tracer pipeline, where it counts
/// [`SpanData`] under the resource of the provider, or fed OTLP payloads
/// directly through [`SpanReportExporter::consume_traces`].
pub struct SpanReportExporter {
    registry: Arc<StatsRegistry>,
    scheduler: RotationScheduler,
    resource_key: GroupKey,
    verbose: bool,
}

impl fmt::Debug for SpanReportExporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpanReportExporter")
            .field("registry", &self.registry)
            .field("scheduler", &self.scheduler)
            .field("resource_key", &self.resource_key)
            .field("verbose", &self.verbose)
            .finish()
    }
}

impl Default for SpanReportExporter {
    fn default() -> Self {
        SpanReportExporterBuilder::default().build()
    }
}

impl SpanReportExporter {
    /// Create a builder to configure this exporter.
    pub fn builder() -> SpanReportExporterBuilder {
        SpanReportExporterBuilder::default()
    }

    /// The live counters, shared with the rotation scheduler.
    ///
    /// Hand this to a [`crate::Monitor`] to watch the counts as they grow.
    pub fn registry(&self) -> Arc<StatsRegistry> {
        Arc::clone(&self.registry)
    }

    /// Counts every span of an OTLP trace export request.
    pub fn consume_traces(&self, request: &ExportTraceServiceRequest) {
        self.consume_resource_spans(&request.resource_spans);
    }

    /// Counts every span of a list of resource spans.
    ///
    /// Each resource resolves to one group; all of its spans, across every
    /// instrumentation scope, are counted toward that group. A resource with
    /// no spans still creates its group.
    pub fn consume_resource_spans(&self, resource_spans: &[ResourceSpans]) {
        for resource_span in resource_spans {
            let key = resource_span
                .resource
                .as_ref()
                .map(|resource| GroupKey::from_resource(resource.attributes.as_slice()))
                .unwrap_or_default();
            let block = self.registry.get_or_create(&key);

            let mut span_count: usize = 0;
            for scope_span in &resource_span.scope_spans {
                for span in &scope_span.spans {
                    let categories = SpanCategories::classify(
                        span.kind() == ProtoSpanKind::Server,
                        span.attributes.as_slice(),
                    );
                    block.increment_all(categories, 1);
                    span_count += 1;
                }
            }

            if self.verbose {
                otel_info!(
                    name: "SpanReportExporter.BatchProcessed",
                    service = key.service(),
                    environment = key.environment(),
                    span_count = span_count
                );
            }
        }
    }

    /// Rotates immediately, writing the current counts to the sink.
    pub fn force_rotate(&self) -> ReportResult<()> {
        self.scheduler.force_rotate()
    }

    /// Stops the rotation schedule after a final rotation.
    ///
    /// Spans handed to the exporter afterwards are rejected by
    /// [`SpanExporter::export`] and no longer reported.
    pub fn shutdown(&self) -> ReportResult<()> {
        otel_debug!(name: "SpanReportExporter.Shutdown");
        self.scheduler.shutdown()
    }
}

impl SpanExporter for SpanReportExporter {
    async fn export(&self, batch: Vec<SpanData>) -> OTelSdkResult {
        if self.scheduler.is_shutdown() {
            return Err(OTelSdkError::AlreadyShutdown);
        }

        let block = self.registry.get_or_create(&self.resource_key);
        for span in &batch {
            let categories = SpanCategories::classify(
                matches!(span.span_kind, SpanKind::Server),
                span.attributes.as_slice(),
            );
            block.increment_all(categories, 1);
        }

        if self.verbose {
            otel_info!(
                name: "SpanReportExporter.BatchProcessed",
                service = self.resource_key.service(),
                environment = self.resource_key.environment(),
                span_count = batch.len()
            );
        }
        Ok(())
    }

    fn shutdown_with_timeout(&mut self, _timeout: Duration) -> OTelSdkResult {
        SpanReportExporter::shutdown(self).map_err(Into::into)
    }

    fn set_resource(&mut self, resource: &Resource) {
        self.resource_key = GroupKey::from_resource(resource);
    }
}

/// Configuration for the span report exporter.
#[derive(Default)]
pub struct SpanReportExporterBuilder {
    config: Option<SpanReportConfig>,
    path: Option<PathBuf>,
    report_interval: Option<Duration>,
    verbose: Option<bool>,
    sink: Option<Arc<dyn ReportSink>>,
}

impl fmt::Debug for SpanReportExporterBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpanReportExporterBuilder")
            .field("config", &self.config)
            .field("path", &self.path)
            .field("report_interval", &self.report_interval)
            .field("verbose", &self.verbose)
            .field("sink", &self.sink)
            .finish()
    }
}

impl SpanReportExporterBuilder {
    /// Start from an explicit configuration instead of the environment.
    pub fn with_config(mut self, config: SpanReportConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Write the report to the file at `path`.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Set the rotation cadence. Zero selects the one hour default.
    pub fn with_report_interval(mut self, report_interval: Duration) -> Self {
        self.report_interval = Some(report_interval);
        self
    }

    /// Log one event per resource group of every ingested batch.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = Some(verbose);
        self
    }

    /// Write report lines to `sink` instead of a file.
    ///
    /// Takes precedence over the configured path.
    pub fn with_sink<S: ReportSink + 'static>(mut self, sink: S) -> Self {
        self.sink = Some(Arc::new(sink));
        self
    }

    /// Layers the builder overrides on top of the explicit or environment
    /// configuration.
    fn resolve_config(&mut self) -> SpanReportConfig {
        let mut config = self
            .config
            .take()
            .unwrap_or_else(|| SpanReportConfigBuilder::default().build());
        if let Some(path) = self.path.take() {
            config.path = path;
        }
        if let Some(verbose) = self.verbose {
            config.verbose = verbose;
        }
        if let Some(report_interval) = self.report_interval {
            config.report_interval = if report_interval.is_zero() {
                OTEL_SPAN_REPORT_INTERVAL_DEFAULT
            } else {
                report_interval
            };
        }
        config
    }

    /// Create a span report exporter and start its rotation schedule.
    pub fn build(mut self) -> SpanReportExporter {
        let config = self.resolve_config();

        let sink: Arc<dyn ReportSink> = match self.sink {
            Some(sink) => sink,
            None => Arc::new(FileSink::new(config.path.clone())),
        };
        let registry = Arc::new(StatsRegistry::new());
        let scheduler =
            RotationScheduler::start(Arc::clone(&registry), sink, config.report_interval);

        otel_debug!(
            name: "SpanReportExporter.Built",
            path = format!("{}", config.path.display()),
            report_interval_ms = config.report_interval.as_millis() as u64,
            verbose = config.verbose
        );

        SpanReportExporter {
            registry,
            scheduler,
            resource_key: GroupKey::default(),
            verbose: config.verbose,
        }
    }
}
