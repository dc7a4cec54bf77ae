//! Count spans per service and environment instead of exporting them.
//!
//! The [`SpanReportExporter`] classifies every span it receives as total,
//! HTTP server and SQL traffic, and keeps hourly, daily and monthly counts for
//! each `(service.name, deployment.environment.name)` pair. A background
//! [`RotationScheduler`] appends one line per pair to a report file at the top
//! of every hour and resets the windows that ended:
//!
//! ```text
//! [2025-12-18 09:59:59] env:prod, service:checkout | Hourly(Total:1200, HTTP:800, SQL:350) | Daily(Total:9600, HTTP:6400, SQL:2800) | Monthly(Total:151200, HTTP:100800, SQL:44100)
//! ```
//!
//! A [`Monitor`] can render the live counts as a table in a terminal.
//!
//! # Examples
//!
//! ```no_run
//! use opentelemetry::trace::{Tracer, TracerProvider as _};
//! use opentelemetry::KeyValue;
//! use opentelemetry_sdk::trace::SdkTracerProvider;
//! use opentelemetry_sdk::Resource;
//! use opentelemetry_span_report::SpanReportExporter;
//!
//! let exporter = SpanReportExporter::builder()
//!     .with_path("./span_report.txt")
//!     .build();
//!
//! let provider = SdkTracerProvider::builder()
//!     .with_resource(
//!         Resource::builder()
//!             .with_service_name("checkout")
//!             .with_attribute(KeyValue::new("deployment.environment.name", "prod"))
//!             .build(),
//!     )
//!     .with_simple_exporter(exporter)
//!     .build();
//!
//! provider.tracer("example").in_span("GET /cart", |_cx| {});
//!
//! // Writes a final report line before returning.
//! provider.shutdown().unwrap();
//! ```
//!
//! # Configuration
//!
//! Unless overridden through [`SpanReportExporterBuilder`], the exporter reads:
//!
//! * `OTEL_SPAN_REPORT_PATH`: report file, default `./span_report.txt`.
//! * `OTEL_SPAN_REPORT_INTERVAL`: rotation cadence such as `1h` or `30s`,
//!   default `1h`. Intervals shorter than an hour are meant for testing.
//! * `OTEL_SPAN_REPORT_VERBOSE`: `true` to log every ingested batch.
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod attributes;
mod classify;
mod config;
mod error;
mod exporter;
mod humanize;
mod key;
mod monitor;
mod report;
mod scheduler;
mod sink;
mod stats;

pub use classify::SpanCategories;
pub use config::{SpanReportConfig, SpanReportConfigBuilder};
pub use error::{ReportResult, SpanReportError};
pub use exporter::{SpanReportExporter, SpanReportExporterBuilder};
pub use humanize::humanize;
pub use key::{GroupKey, UNKNOWN};
pub use monitor::{render_table, Monitor};
pub use report::{
    ReportGenerator, ResetPlan, Snapshot, SnapshotRow, DISPLAY_TIMESTAMP_FORMAT,
};
pub use scheduler::RotationScheduler;
pub use sink::{FileSink, InMemoryReportSink, ReportSink};
pub use stats::{Category, CounterBlock, StatsRegistry, Window, WindowCounts};
