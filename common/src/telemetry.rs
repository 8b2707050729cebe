//! Provides helper functions for initializing logging and trace publication.
use anyhow::Result;
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{runtime, trace, Resource};
use tracing_subscriber::{filter::LevelFilter, prelude::*, EnvFilter, Registry};

/// Name reported to the trace collector.
const SERVICE_NAME: &str = "kube-burner";

/// Shape of the log lines written to stdout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human readable single line logs.
    #[default]
    Compact,
    /// One JSON object per line.
    Json,
}

/// Initialize logging and, when an endpoint is given, OTLP trace export.
///
/// Log verbosity is controlled with `RUST_LOG` and defaults to INFO.
pub fn init(format: LogFormat, otlp_endpoint: Option<String>) -> Result<()> {
    let telemetry = match otlp_endpoint {
        Some(endpoint) => {
            let tracer = opentelemetry_otlp::new_pipeline()
                .tracing()
                .with_exporter(
                    opentelemetry_otlp::new_exporter()
                        .tonic()
                        .with_endpoint(endpoint),
                )
                .with_trace_config(trace::config().with_resource(Resource::new(vec![
                    KeyValue::new("service.name", SERVICE_NAME),
                ])))
                .install_batch(runtime::Tokio)?;
            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        None => None,
    };

    // Default to INFO if no env is specified
    let log_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env()?;

    let compact = (format == LogFormat::Compact)
        .then(|| tracing_subscriber::fmt::layer().with_ansi(true).compact());
    let json = (format == LogFormat::Json).then(|| tracing_subscriber::fmt::layer().json());

    let collector = Registry::default()
        .with(telemetry)
        .with(compact)
        .with(json)
        .with(log_filter);

    tracing::subscriber::set_global_default(collector)?;

    Ok(())
}

/// Flush any pending spans to the collector.
pub fn shutdown() {
    opentelemetry::global::shutdown_tracer_provider();
}
