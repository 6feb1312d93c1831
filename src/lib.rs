//! pdfconv worker library
//!
//! Core of an asynchronous convert-to-PDF service: uploaded images and
//! documents are tracked by a durable status record that moves
//! PENDING → PROCESSING → SUCCESS/FAILED while a worker converts them.
//!
//! ## Module Overview
//!
//! - `job`: status records, status transitions and conversion jobs
//! - `status_store`: Redis and in-memory status record stores
//! - `storage`: S3 and in-memory object storage
//! - `router`: extension to strategy routing
//! - `converter`: image and document PDF conversion strategies
//! - `processor`: per-job state machine and batch handling
//! - `events`, `queue`: object-created notifications and their Redis queue
//! - `worker`: consumer loop from the queue into the processor
//! - `api`: upload/status/stats HTTP endpoints
//! - `stats`: aggregate status counts
//! - `config`, `telemetry`: environment configuration, logging, OpenTelemetry
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use pdfconv_worker::{
//!     converter::{DocumentToPdfConverter, ImageToPdfConverter},
//!     events::EventNotification,
//!     processor::JobProcessor,
//!     router::FormatRouter,
//!     status_store::{InMemoryStatusStore, StatusStore},
//!     storage::InMemoryStorage,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = Arc::new(InMemoryStatusStore::new());
//!     let storage = Arc::new(InMemoryStorage::new());
//!     let router = FormatRouter::new(
//!         Arc::new(ImageToPdfConverter::new()),
//!         Arc::new(DocumentToPdfConverter::default()),
//!     );
//!     let processor = JobProcessor::new(store.clone(), storage.clone(), router);
//!
//!     store.create("photo", "photo.png").await.unwrap();
//!     storage.put("bucket", "input/photo.png", std::fs::read("photo.png").unwrap()).await;
//!
//!     processor
//!         .process_batch(&EventNotification::single("bucket", "input/photo.png"))
//!         .await;
//! }
//! ```

pub mod api;
pub mod config;
pub mod converter;
pub mod error;
pub mod events;
pub mod job;
pub mod processor;
pub mod queue;
pub mod router;
pub mod stats;
pub mod status_store;
pub mod storage;
pub mod telemetry;
pub mod worker;
