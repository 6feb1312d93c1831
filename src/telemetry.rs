//! Telemetry and structured logging for the conversion services.

use crate::processor::{JobOutcome, JobReport};
use opentelemetry::trace::{Span, Tracer};
use opentelemetry::{global, KeyValue};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const TRACER_NAME: &str = "pdfconv-worker";

/// Jobs slower than this are flagged.
const SLOW_JOB_THRESHOLD_MS: u64 = 5000;

/// Log line format selected by `LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

/// Installs the global tracing subscriber. `RUST_LOG` overrides the default
/// `info` filter.
pub fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());

    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }
}

/// Records telemetry for a finished conversion job.
///
/// Emits a structured log line and an OpenTelemetry span carrying the file
/// id, outcome, duration and, for failures, the recorded error.
pub fn record_job_telemetry(report: &JobReport) {
    let tracer = global::tracer(TRACER_NAME);
    let mut span = tracer.start("pdf_conversion_job");

    let status = match report.outcome {
        JobOutcome::Succeeded { .. } => "SUCCESS",
        JobOutcome::Failed { .. } => "FAILED",
    };

    span.set_attribute(KeyValue::new("file_id", report.file_id.clone()));
    span.set_attribute(KeyValue::new("status", status));
    span.set_attribute(KeyValue::new("duration_ms", report.duration_ms as i64));
    span.set_attribute(KeyValue::new("status_recorded", report.status_recorded));

    info!(
        file_id = %report.file_id,
        status = status,
        duration_ms = report.duration_ms,
        status_recorded = report.status_recorded,
        "PDF conversion job finished"
    );

    if report.duration_ms > SLOW_JOB_THRESHOLD_MS {
        warn!(
            file_id = %report.file_id,
            duration_ms = report.duration_ms,
            "PDF conversion exceeded performance threshold (5000ms)"
        );
    }

    match &report.outcome {
        JobOutcome::Succeeded { converted_filename } => {
            span.set_attribute(KeyValue::new("converted_filename", converted_filename.clone()));
        }
        JobOutcome::Failed { error_message } => {
            span.set_attribute(KeyValue::new("error", error_message.clone()));
            warn!(
                file_id = %report.file_id,
                error = %error_message,
                "PDF conversion job failed"
            );
        }
    }

    span.end();
}

/// Records a worker heartbeat for monitoring worker health.
pub fn record_worker_heartbeat(worker_id: usize, queue_length: usize) {
    let tracer = global::tracer(TRACER_NAME);
    let mut span = tracer.start("worker_heartbeat");

    span.set_attribute(KeyValue::new("worker_id", worker_id as i64));
    span.set_attribute(KeyValue::new("queue_length", queue_length as i64));
    span.end();

    info!(worker_id = worker_id, queue_length = queue_length, "Worker heartbeat");
}

/// Initializes OpenTelemetry with an OTLP exporter.
///
/// Must run inside a Tokio runtime; spans are exported in batches.
pub fn init_telemetry(endpoint: &str, service_name: &str) -> Result<(), Box<dyn std::error::Error>> {
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::trace::Config;

    let tracer = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint),
        )
        .with_trace_config(Config::default().with_resource(
            opentelemetry_sdk::Resource::new(vec![
                KeyValue::new("service.name", service_name.to_string()),
                KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
            ]),
        ))
        .install_batch(opentelemetry_sdk::runtime::Tokio)?;

    if let Some(provider) = tracer.provider() {
        global::set_tracer_provider(provider);
    }

    info!("Telemetry initialized: endpoint={}", endpoint);
    Ok(())
}

/// Flushes pending spans before exit.
pub fn shutdown_telemetry() {
    global::shutdown_tracer_provider();
}
