//! PDF Conversion API Service
//!
//! Accepts uploads, records them as PENDING, stores them in S3 and publishes
//! an object-created notification for the worker. Also serves status
//! lookups and aggregate statistics.
//!
//! ## Configuration
//!
//! Environment variables (optionally from `.env`):
//! - `API_BIND_ADDR`: listen address (default: 0.0.0.0:8000)
//! - `S3_BUCKET`: bucket for uploads and output (default: file-conversion-bucket)
//! - `REDIS_URL`, `STATUS_NAMESPACE`, `EVENT_QUEUE_KEY`
//! - `MAX_UPLOAD_BYTES`, `PUBLISH_UPLOAD_EVENTS`
//! - `RUST_LOG`, `LOG_FORMAT`, `OTEL_EXPORTER_OTLP_ENDPOINT`

use anyhow::{Context, Result};
use pdfconv_worker::api::{self, ApiState};
use pdfconv_worker::config::ApiConfig;
use pdfconv_worker::queue::{EventPublisher, EventQueue};
use pdfconv_worker::status_store::RedisStatusStore;
use pdfconv_worker::storage::S3Storage;
use pdfconv_worker::telemetry;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = ApiConfig::from_env();

    telemetry::init_tracing(config.common.log_format);

    if let Some(endpoint) = &config.common.otel_endpoint {
        if let Err(e) = telemetry::init_telemetry(endpoint, &config.common.otel_service_name) {
            warn!("Failed to initialize telemetry: {}", e);
        }
    }

    info!("Starting PDF conversion API service");

    let client = redis::Client::open(config.common.redis_url.as_str())
        .context("Failed to create Redis client")?;
    let conn = redis::aio::ConnectionManager::new(client)
        .await
        .context("Failed to connect to Redis")?;

    info!("Connected to Redis");

    let storage = S3Storage::new(
        &config.common.aws_region,
        config.common.s3_endpoint_url.as_deref(),
    )
    .await;

    let events: Option<Arc<dyn EventPublisher>> = if config.publish_events {
        Some(Arc::new(EventQueue::new(
            conn.clone(),
            config.common.event_queue_key.clone(),
        )))
    } else {
        None
    };

    let state = ApiState {
        status_store: Arc::new(RedisStatusStore::new(
            conn,
            config.common.status_namespace.clone(),
        )),
        storage: Arc::new(storage),
        bucket: config.bucket.clone(),
        events,
    };

    let app = api::router(state, config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    info!("API listening on http://{}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received shutdown signal");
        })
        .await
        .context("API server failed")?;

    telemetry::shutdown_telemetry();
    Ok(())
}
