//! Job processing: one object-created record from event to terminal status.
//!
//! A job moves RECEIVED → PROCESSING → {SUCCEEDED, FAILED}:
//!
//! 1. Write PROCESSING. If this write fails the job is abandoned without
//!    converting and the status-store error is returned.
//! 2. Route by extension, download, convert, upload `output/{file_id}.pdf`.
//! 3. Write SUCCESS or FAILED (with the original error text). A failure of
//!    this final write is logged and reported, never turned into a second
//!    job failure: the output may exist while the record stays PROCESSING.

use crate::error::{ConversionError, StatusStoreError};
use crate::events::EventNotification;
use crate::job::{ConversionJob, StatusUpdate};
use crate::router::FormatRouter;
use crate::status_store::StatusStore;
use crate::storage::ObjectStorage;
use crate::telemetry;
use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, Instrument};
use uuid::Uuid;

/// How a job that got past the PROCESSING write ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded { converted_filename: String },
    Failed { error_message: String },
}

/// Result of one processed job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub file_id: String,
    pub outcome: JobOutcome,
    /// False when the terminal status write failed; the record is stale.
    pub status_recorded: bool,
    pub duration_ms: u64,
}

impl JobReport {
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, JobOutcome::Succeeded { .. })
    }
}

/// Per-record result of a batch.
#[derive(Debug)]
pub enum RecordResult {
    Processed(JobReport),
    /// The PROCESSING write failed; nothing was converted.
    Aborted {
        file_id: String,
        error: StatusStoreError,
    },
    /// The object key named no file.
    Malformed { key: String },
}

/// Orchestrates conversion jobs against injected collaborators.
#[derive(Clone)]
pub struct JobProcessor {
    status_store: Arc<dyn StatusStore>,
    storage: Arc<dyn ObjectStorage>,
    router: FormatRouter,
    job_timeout: Option<Duration>,
}

impl JobProcessor {
    pub fn new(
        status_store: Arc<dyn StatusStore>,
        storage: Arc<dyn ObjectStorage>,
        router: FormatRouter,
    ) -> Self {
        Self {
            status_store,
            storage,
            router,
            job_timeout: None,
        }
    }

    /// Bounds routing, download, conversion and upload; an elapsed deadline
    /// ends the job as FAILED.
    pub fn with_job_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.job_timeout = timeout;
        self
    }

    /// Processes every record of a notification independently.
    ///
    /// Results are returned in record order.
    pub async fn process_batch(&self, event: &EventNotification) -> Vec<RecordResult> {
        let batch_id = Uuid::new_v4();
        info!(%batch_id, records = event.records.len(), "Processing event batch");

        let jobs = event.records.iter().map(|record| async move {
            let Some(job) = ConversionJob::from_object(record.bucket(), record.key()) else {
                error!(
                    bucket = %record.bucket(),
                    key = %record.key(),
                    "Could not derive a file id from object key; skipping record"
                );
                return RecordResult::Malformed {
                    key: record.key().to_string(),
                };
            };

            match self.process(&job).await {
                Ok(report) => RecordResult::Processed(report),
                Err(error) => RecordResult::Aborted {
                    file_id: job.file_id,
                    error,
                },
            }
        });

        join_all(jobs)
            .instrument(tracing::info_span!("batch", %batch_id))
            .await
    }

    /// Runs one job to a terminal status.
    ///
    /// Returns `Err` only when the initial PROCESSING write fails.
    pub async fn process(&self, job: &ConversionJob) -> Result<JobReport, StatusStoreError> {
        let started = Instant::now();
        info!(
            file_id = %job.file_id,
            bucket = %job.bucket,
            key = %job.object_key,
            "Processing conversion job"
        );

        if let Err(e) = self
            .status_store
            .update_status(&job.file_id, StatusUpdate::Processing)
            .await
        {
            error!(file_id = %job.file_id, error = %e, "Failed to mark job as processing; aborting");
            return Err(e);
        }

        let result = match self.job_timeout {
            Some(limit) => match tokio::time::timeout(limit, self.convert(job)).await {
                Ok(result) => result,
                Err(_) => Err(ConversionError::DeadlineExceeded {
                    secs: limit.as_secs(),
                }),
            },
            None => self.convert(job).await,
        };

        let (outcome, update) = match result {
            Ok(converted_filename) => (
                JobOutcome::Succeeded {
                    converted_filename: converted_filename.clone(),
                },
                StatusUpdate::Succeeded { converted_filename },
            ),
            Err(e) => {
                error!(file_id = %job.file_id, error = %e, "Conversion job failed");
                let update = StatusUpdate::failed(e.to_string());
                let error_message = update.error_message().unwrap_or_default().to_string();
                (JobOutcome::Failed { error_message }, update)
            }
        };

        let status_recorded = match self.status_store.update_status(&job.file_id, update).await {
            Ok(()) => true,
            Err(e) => {
                error!(
                    file_id = %job.file_id,
                    error = %e,
                    "Failed to record terminal status; record left stale"
                );
                false
            }
        };

        let report = JobReport {
            file_id: job.file_id.clone(),
            outcome,
            status_recorded,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        telemetry::record_job_telemetry(&report);
        Ok(report)
    }

    /// Steps 3-4: route, download, convert, upload. Returns the output key.
    async fn convert(&self, job: &ConversionJob) -> Result<String, ConversionError> {
        let strategy = self.router.select(job.extension.as_deref())?;
        let extension = job.extension.as_deref().unwrap_or_default();

        let input = self.storage.download(&job.bucket, &job.object_key).await?;
        info!(
            file_id = %job.file_id,
            strategy = strategy.name(),
            size_bytes = input.len(),
            "Converting to PDF"
        );

        let pdf = strategy.convert(input, extension).await?;

        let output_key = job.output_key();
        self.storage
            .upload(&job.bucket, &output_key, pdf, "application/pdf")
            .await?;
        Ok(output_key)
    }
}
