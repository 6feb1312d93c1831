//! Redis-based event queue feeding the conversion worker.

use crate::events::EventNotification;
use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use tracing::{debug, error, info};

/// Default Redis list holding pending event notifications.
pub const DEFAULT_QUEUE_KEY: &str = "pdfconv:events";

/// Seconds BLPOP waits before reporting an empty queue.
const DEQUEUE_TIMEOUT_SECS: f64 = 5.0;

/// Anything that can deliver an object-created notification to the worker.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &EventNotification) -> Result<()>;
}

/// Where a consumer loop pulls notifications from.
#[async_trait]
pub trait EventSource: Send {
    /// Waits a bounded time for the next notification. `Ok(None)` means
    /// nothing usable arrived.
    async fn next_batch(&mut self) -> Result<Option<EventNotification>>;

    /// Notifications still waiting to be consumed.
    async fn queue_length(&mut self) -> Result<usize>;
}

/// Redis list of JSON-encoded [`EventNotification`]s.
///
/// Producers RPUSH, consumers BLPOP, so delivery is FIFO per list.
#[derive(Clone)]
pub struct EventQueue {
    /// Redis connection manager for async operations.
    pub conn: ConnectionManager,
    key: String,
}

impl EventQueue {
    /// Creates a new queue with the given Redis connection and list key.
    ///
    /// A consumer's BLPOP holds its connection for up to 5 seconds; use
    /// [`EventQueue::connect`] for consumers.
    pub fn new(conn: ConnectionManager, key: impl Into<String>) -> Self {
        Self {
            conn,
            key: key.into(),
        }
    }

    /// Opens a queue on its own connection, not shared with any other
    /// command traffic.
    pub async fn connect(client: &Client, key: impl Into<String>) -> Result<Self> {
        let conn = ConnectionManager::new(client.clone())
            .await
            .context("Failed to open queue connection")?;
        Ok(Self::new(conn, key))
    }
}

#[async_trait]
impl EventSource for EventQueue {
    /// Dequeues the next notification (blocking with timeout).
    ///
    /// Returns `Ok(None)` when no notification arrives within 5 seconds or
    /// when the popped payload is not a valid notification (it is logged
    /// and dropped).
    async fn next_batch(&mut self) -> Result<Option<EventNotification>> {
        let result: Option<(String, String)> = self
            .conn
            .blpop(&self.key, DEQUEUE_TIMEOUT_SECS)
            .await
            .context("Failed to pop event from queue")?;

        let Some((_key, payload)) = result else {
            return Ok(None);
        };

        match serde_json::from_str::<EventNotification>(&payload) {
            Ok(event) => {
                debug!(records = event.records.len(), "Dequeued event notification");
                Ok(Some(event))
            }
            Err(e) => {
                error!(error = %e, payload = %payload, "Discarding malformed event notification");
                Ok(None)
            }
        }
    }

    async fn queue_length(&mut self) -> Result<usize> {
        let len: usize = self
            .conn
            .llen(&self.key)
            .await
            .context("Failed to get queue length")?;
        Ok(len)
    }
}

#[async_trait]
impl EventPublisher for EventQueue {
    async fn publish(&self, event: &EventNotification) -> Result<()> {
        let payload = serde_json::to_string(event).context("Failed to serialize event")?;

        let mut conn = self.conn.clone();
        conn.rpush::<_, _, ()>(&self.key, &payload)
            .await
            .context("Failed to push event to queue")?;

        info!(records = event.records.len(), queue = %self.key, "Published event notification");
        Ok(())
    }
}
