//! Consumer loop feeding event batches into the job processor.

use crate::processor::{JobProcessor, RecordResult};
use crate::queue::EventSource;
use crate::telemetry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Pause after a failed dequeue before trying again.
const DEQUEUE_BACKOFF: Duration = Duration::from_secs(5);

/// Heartbeat is recorded once per this many batches.
const HEARTBEAT_EVERY: u64 = 10;

/// Pulls batches from `source` until `shutdown` is cancelled.
///
/// Shutdown is only observed between dequeues: a pop already sent to the
/// queue is always awaited, and whatever it returns is processed. Each batch
/// runs on its own task holding one `semaphore` permit, so callers wait for
/// in-flight batches by reclaiming every permit.
pub async fn run_consumer<S: EventSource>(
    worker_id: usize,
    mut source: S,
    semaphore: Arc<Semaphore>,
    processor: Arc<JobProcessor>,
    shutdown: CancellationToken,
) {
    info!("Worker {} started", worker_id);
    let mut batches: u64 = 0;

    while !shutdown.is_cancelled() {
        let event = match source.next_batch().await {
            Ok(Some(event)) => event,
            Ok(None) => continue,
            Err(e) => {
                error!("Worker {} failed to dequeue event: {:#}", worker_id, e);
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(DEQUEUE_BACKOFF) => {}
                }
                continue;
            }
        };

        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                error!("Worker {} lost its semaphore; dropping batch", worker_id);
                break;
            }
        };

        let processor = processor.clone();
        tokio::spawn(async move {
            let results = processor.process_batch(&event).await;
            for result in results {
                match result {
                    RecordResult::Processed(_) => {}
                    RecordResult::Aborted { file_id, error } => {
                        warn!(file_id = %file_id, error = %error, "Job aborted before conversion");
                    }
                    RecordResult::Malformed { key } => {
                        warn!(key = %key, "Skipped malformed event record");
                    }
                }
            }
            drop(permit);
        });

        batches += 1;
        if batches % HEARTBEAT_EVERY == 0 {
            if let Ok(queue_len) = source.queue_length().await {
                telemetry::record_worker_heartbeat(worker_id, queue_len);
            }
        }
    }

    info!("Worker {} stopped", worker_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::ConversionStrategy;
    use crate::error::ConversionError;
    use crate::events::EventNotification;
    use crate::job::ConversionStatus;
    use crate::router::FormatRouter;
    use crate::status_store::{InMemoryStatusStore, StatusStore};
    use crate::storage::InMemoryStorage;
    use async_trait::async_trait;
    use std::collections::VecDeque;

    const BUCKET: &str = "test-bucket";
    const PERMITS: usize = 2;

    struct EchoPdf;

    #[async_trait]
    impl ConversionStrategy for EchoPdf {
        fn name(&self) -> &'static str {
            "echo"
        }

        async fn convert(&self, input: Vec<u8>, _extension: &str) -> Result<Vec<u8>, ConversionError> {
            Ok(input)
        }
    }

    /// Hands out queued batches. Optionally cancels `shutdown` while a pop
    /// is in flight, as a Ctrl+C arriving mid-BLPOP would.
    struct ScriptedSource {
        batches: VecDeque<anyhow::Result<Option<EventNotification>>>,
        cancel_during_pop: Option<CancellationToken>,
    }

    #[async_trait]
    impl EventSource for ScriptedSource {
        async fn next_batch(&mut self) -> anyhow::Result<Option<EventNotification>> {
            if let Some(token) = self.cancel_during_pop.take() {
                token.cancel();
                tokio::task::yield_now().await;
            }
            self.batches.pop_front().unwrap_or(Ok(None))
        }

        async fn queue_length(&mut self) -> anyhow::Result<usize> {
            Ok(self.batches.len())
        }
    }

    struct Fixture {
        store: Arc<InMemoryStatusStore>,
        semaphore: Arc<Semaphore>,
        processor: Arc<JobProcessor>,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStatusStore::new());
        let storage = Arc::new(InMemoryStorage::new());
        store.create("photo", "photo.png").await.unwrap();
        storage.put(BUCKET, "input/photo.png", b"png".to_vec()).await;

        let router = FormatRouter::new(Arc::new(EchoPdf), Arc::new(EchoPdf));
        Fixture {
            store: store.clone(),
            semaphore: Arc::new(Semaphore::new(PERMITS)),
            processor: Arc::new(JobProcessor::new(store, storage, router)),
        }
    }

    async fn run(fx: &Fixture, source: ScriptedSource, shutdown: CancellationToken) {
        tokio::time::timeout(
            Duration::from_secs(2),
            run_consumer(0, source, fx.semaphore.clone(), fx.processor.clone(), shutdown),
        )
        .await
        .expect("consumer should stop after shutdown");

        // Wait for spawned batches.
        let _permits = fx.semaphore.acquire_many(PERMITS as u32).await.unwrap();
    }

    #[tokio::test]
    async fn test_batch_popped_during_shutdown_is_processed() {
        let fx = fixture().await;
        let shutdown = CancellationToken::new();
        let source = ScriptedSource {
            batches: VecDeque::from([Ok(Some(EventNotification::single(
                BUCKET,
                "input/photo.png",
            )))]),
            cancel_during_pop: Some(shutdown.clone()),
        };

        run(&fx, source, shutdown).await;

        let record = fx.store.get("photo").await.unwrap();
        assert_eq!(record.status, ConversionStatus::Success);
        assert_eq!(record.converted_filename.as_deref(), Some("output/photo.pdf"));
    }

    #[tokio::test]
    async fn test_no_pop_after_shutdown() {
        let fx = fixture().await;
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let source = ScriptedSource {
            batches: VecDeque::from([Ok(Some(EventNotification::single(
                BUCKET,
                "input/photo.png",
            )))]),
            cancel_during_pop: None,
        };

        run(&fx, source, shutdown).await;

        assert_eq!(fx.store.get("photo").await.unwrap().status, ConversionStatus::Pending);
    }

    #[tokio::test]
    async fn test_dequeue_backoff_ends_on_shutdown() {
        let fx = fixture().await;
        let shutdown = CancellationToken::new();
        let source = ScriptedSource {
            batches: VecDeque::from([Err(anyhow::anyhow!("connection reset"))]),
            cancel_during_pop: Some(shutdown.clone()),
        };

        // Finishes well inside the 5 s backoff.
        run(&fx, source, shutdown).await;

        assert_eq!(fx.store.get("photo").await.unwrap().status, ConversionStatus::Pending);
    }
}
