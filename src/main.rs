//! PDF Conversion Worker Service
//!
//! This worker consumes object-created notifications from a Redis queue and
//! converts each referenced upload to PDF, tracking progress in the status
//! store.
//!
//! ## Architecture
//!
//! - **Queue**: Redis list (`pdfconv:events`) of S3-style event notifications
//! - **Status**: Redis hashes (`{STATUS_NAMESPACE}:record:{file_id}`)
//! - **Storage**: S3 input `input/...`, output `output/{file_id}.pdf`
//! - **Converters**: image → PDF in-process, documents via unoconv
//! - **Telemetry**: OpenTelemetry OTLP export
//!
//! ## Configuration
//!
//! Environment variables (optionally from `.env`):
//! - `REDIS_URL`: Redis connection string (default: redis://127.0.0.1/)
//! - `WORKER_CONCURRENCY`: Number of concurrent workers (default: 4)
//! - `DOCUMENT_CONVERTER_PATH`, `DOCUMENT_CONVERTER_TIMEOUT_SECS`
//! - `JOB_TIMEOUT_SECS`: per-job deadline, 0 disables (default: 300)
//! - `AWS_REGION`, `S3_ENDPOINT_URL`
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP collector endpoint
//! - `RUST_LOG`: Log level (default: info), `LOG_FORMAT`: text or json

use anyhow::{Context, Result};
use pdfconv_worker::config::WorkerConfig;
use pdfconv_worker::converter::{DocumentToPdfConverter, ImageToPdfConverter};
use pdfconv_worker::processor::JobProcessor;
use pdfconv_worker::queue::EventQueue;
use pdfconv_worker::router::FormatRouter;
use pdfconv_worker::status_store::RedisStatusStore;
use pdfconv_worker::storage::S3Storage;
use pdfconv_worker::telemetry;
use pdfconv_worker::worker::run_consumer;
use redis::Client;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env();

    telemetry::init_tracing(config.common.log_format);

    if let Some(endpoint) = &config.common.otel_endpoint {
        if let Err(e) = telemetry::init_telemetry(endpoint, &config.common.otel_service_name) {
            warn!("Failed to initialize telemetry: {}", e);
        }
    }

    info!("Starting PDF conversion worker service");
    info!(
        "Configuration: redis_url={}, concurrency={}, converter={}, converter_timeout_secs={}",
        config.common.redis_url,
        config.concurrency,
        config.converter_path.display(),
        config.converter_timeout.as_secs()
    );

    // Status writes get their own connection; every consumer below opens
    // another one for its blocking pops.
    let client = Client::open(config.common.redis_url.as_str())
        .context("Failed to create Redis client")?;
    let status_conn = redis::aio::ConnectionManager::new(client.clone())
        .await
        .context("Failed to connect to Redis")?;

    info!("Connected to Redis");

    let storage = S3Storage::new(
        &config.common.aws_region,
        config.common.s3_endpoint_url.as_deref(),
    )
    .await;
    let status_store = RedisStatusStore::new(status_conn, config.common.status_namespace.clone());
    let router = FormatRouter::new(
        Arc::new(ImageToPdfConverter::new()),
        Arc::new(DocumentToPdfConverter::new(
            config.converter_path.clone(),
            config.converter_timeout,
        )),
    );
    let processor = Arc::new(
        JobProcessor::new(Arc::new(status_store), Arc::new(storage), router)
            .with_job_timeout(config.job_timeout),
    );

    // Create shared resources
    let semaphore = Arc::new(Semaphore::new(config.concurrency));
    let shutdown = CancellationToken::new();

    // Spawn worker tasks
    let mut handles = vec![];
    for worker_id in 0..config.concurrency {
        let queue = EventQueue::connect(&client, config.common.event_queue_key.clone())
            .await
            .with_context(|| format!("Worker {} failed to connect to the queue", worker_id))?;

        handles.push(tokio::spawn(run_consumer(
            worker_id,
            queue,
            semaphore.clone(),
            processor.clone(),
            shutdown.clone(),
        )));
    }

    // Wait for shutdown signal
    info!("Worker service ready, press Ctrl+C to shutdown");
    signal::ctrl_c().await.context("Failed to listen for Ctrl+C")?;

    info!("Received shutdown signal, waiting for workers to finish...");
    shutdown.cancel();

    for handle in handles {
        let _ = handle.await;
    }

    // Wait for in-flight batches by reclaiming every permit.
    let _ = semaphore.acquire_many(config.concurrency as u32).await;

    telemetry::shutdown_telemetry();
    info!("Worker service shutdown complete");
    Ok(())
}
