use opentelemetry::trace::{SpanKind, Tracer, TracerProvider as _};
use opentelemetry::KeyValue;
use opentelemetry_sdk::trace::SdkTracerProvider;
use opentelemetry_sdk::Resource;
use opentelemetry_semantic_conventions::attribute::{
    DB_QUERY_TEXT, DEPLOYMENT_ENVIRONMENT_NAME, HTTP_ROUTE,
};
use opentelemetry_span_report::{Monitor, SpanReportExporter};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

use std::error::Error;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::channel;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn init_diagnostics() {
    // The monitor owns stdout; diagnostics go to stderr.
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr).with_filter(filter))
        .init();
}

fn init_tracer_provider(exporter: SpanReportExporter) -> SdkTracerProvider {
    SdkTracerProvider::builder()
        .with_resource(
            Resource::builder()
                .with_service_name("span-report-demo")
                .with_attribute(KeyValue::new(DEPLOYMENT_ENVIRONMENT_NAME, "local"))
                .build(),
        )
        .with_batch_exporter(exporter)
        .build()
}

fn generate_traffic(provider: SdkTracerProvider, running: Arc<AtomicBool>) {
    let tracer = provider.tracer("span-report-demo");
    let mut i: u64 = 0;
    while running.load(Ordering::Relaxed) {
        match i % 4 {
            0 | 1 => {
                tracer
                    .span_builder("GET /orders/{id}")
                    .with_kind(SpanKind::Server)
                    .with_attributes([KeyValue::new(HTTP_ROUTE, "/orders/{id}")])
                    .start(&tracer);
            }
            2 => {
                tracer
                    .span_builder("SELECT orders")
                    .with_kind(SpanKind::Client)
                    .with_attributes([KeyValue::new(
                        DB_QUERY_TEXT,
                        "SELECT * FROM orders WHERE id = ?",
                    )])
                    .start(&tracer);
            }
            _ => {
                tracer.in_span("render", |_cx| {});
            }
        }
        i += 1;
        thread::sleep(Duration::from_millis(20));
    }
}

fn main() -> Result<(), Box<dyn Error + Send + Sync + 'static>> {
    init_diagnostics();

    // Path, interval and verbosity come from the OTEL_SPAN_REPORT_* variables.
    let exporter = SpanReportExporter::default();
    let registry = exporter.registry();
    let provider = init_tracer_provider(exporter);

    let running = Arc::new(AtomicBool::new(true));
    let generator = {
        let provider = provider.clone();
        let running = Arc::clone(&running);
        thread::spawn(move || generate_traffic(provider, running))
    };

    let monitor = Arc::new(Monitor::start(registry, io::stdout(), Duration::from_secs(1)));
    {
        let monitor = Arc::clone(&monitor);
        thread::spawn(move || {
            if monitor.stop_on_quit(io::stdin().lock()).is_ok() {
                eprintln!("Monitor closed, still counting spans. Press Ctrl-C to exit.");
            }
        });
    }

    let (tx, rx) = channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })?;
    rx.recv()?;

    running.store(false, Ordering::Relaxed);
    let _ = generator.join();
    monitor.stop()?;

    // Flushes pending spans and writes a final report line.
    provider.shutdown()?;
    Ok(())
}
