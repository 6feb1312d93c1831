//! Durable conversion status records.
//!
//! [`StatusStore`] is the seam the job processor and the API depend on.
//! [`RedisStatusStore`] keeps one Redis hash per record plus an index set of
//! file ids; [`InMemoryStatusStore`] backs tests and local runs.

use crate::error::StatusStoreError;
use crate::job::{ConversionRecord, ConversionStatus, StatusUpdate};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Creates a PENDING record unless the key already exists, and indexes it.
const CREATE_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
  return 0
end
redis.call('HSET', KEYS[1],
  'file_id', ARGV[1],
  'original_filename', ARGV[2],
  'status', ARGV[3],
  'created_at', ARGV[4],
  'updated_at', ARGV[4])
redis.call('SADD', KEYS[2], ARGV[1])
return 1
"#;

/// Conditionally applies a status write.
///
/// ARGV: new status, now, converted_filename ('' clears), error_message
/// ('' clears), then the statuses the record may currently hold.
/// Returns {1, ''} on success, {0, ''} if missing, {-1, current} if the
/// transition is not permitted.
const UPDATE_SCRIPT: &str = r#"
local current = redis.call('HGET', KEYS[1], 'status')
if not current then
  return {0, ''}
end
local allowed = false
for i = 5, #ARGV do
  if ARGV[i] == current then
    allowed = true
  end
end
if not allowed then
  return {-1, current}
end
local updated_at = ARGV[2]
local previous = redis.call('HGET', KEYS[1], 'updated_at')
if previous and previous > updated_at then
  updated_at = previous
end
redis.call('HSET', KEYS[1], 'status', ARGV[1], 'updated_at', updated_at)
if ARGV[3] == '' then
  redis.call('HDEL', KEYS[1], 'converted_filename')
else
  redis.call('HSET', KEYS[1], 'converted_filename', ARGV[3])
end
if ARGV[4] == '' then
  redis.call('HDEL', KEYS[1], 'error_message')
else
  redis.call('HSET', KEYS[1], 'error_message', ARGV[4])
end
return {1, ''}
"#;

/// Typed access to conversion status records.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Inserts a PENDING record. Fails with `AlreadyExists` if `file_id` is
    /// taken.
    async fn create(
        &self,
        file_id: &str,
        original_filename: &str,
    ) -> Result<ConversionRecord, StatusStoreError>;

    /// Applies a status write. Fails with `NotFound` if no record exists and
    /// `InvalidTransition` if the current status does not allow it.
    async fn update_status(
        &self,
        file_id: &str,
        update: StatusUpdate,
    ) -> Result<(), StatusStoreError>;

    async fn get(&self, file_id: &str) -> Result<ConversionRecord, StatusStoreError>;

    /// Every record, in no particular order.
    async fn list(&self) -> Result<Vec<ConversionRecord>, StatusStoreError>;
}

/// Redis-backed status store.
#[derive(Clone)]
pub struct RedisStatusStore {
    conn: ConnectionManager,
    namespace: String,
}

impl RedisStatusStore {
    pub fn new(conn: ConnectionManager, namespace: impl Into<String>) -> Self {
        Self {
            conn,
            namespace: namespace.into(),
        }
    }

    fn record_key(&self, file_id: &str) -> String {
        format!("{}:record:{}", self.namespace, file_id)
    }

    fn index_key(&self) -> String {
        format!("{}:index", self.namespace)
    }

    fn parse_record(
        file_id: &str,
        mut fields: HashMap<String, String>,
    ) -> Result<ConversionRecord, StatusStoreError> {
        let mut take = |name: &str| {
            fields.remove(name).ok_or_else(|| {
                StatusStoreError::Backend(format!(
                    "record {} is missing field '{}'",
                    file_id, name
                ))
            })
        };

        let status = take("status")?
            .parse::<ConversionStatus>()
            .map_err(StatusStoreError::Backend)?;
        let original_filename = take("original_filename")?;
        let created_at = parse_timestamp(file_id, &take("created_at")?)?;
        let updated_at = parse_timestamp(file_id, &take("updated_at")?)?;

        Ok(ConversionRecord {
            file_id: file_id.to_string(),
            original_filename,
            status,
            created_at,
            updated_at,
            converted_filename: fields.remove("converted_filename"),
            error_message: fields.remove("error_message"),
        })
    }
}

/// Fixed-width UTC timestamps so stored values compare lexicographically.
fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(file_id: &str, raw: &str) -> Result<DateTime<Utc>, StatusStoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| {
            StatusStoreError::Backend(format!(
                "record {} has invalid timestamp '{}': {}",
                file_id, raw, e
            ))
        })
}

#[async_trait]
impl StatusStore for RedisStatusStore {
    async fn create(
        &self,
        file_id: &str,
        original_filename: &str,
    ) -> Result<ConversionRecord, StatusStoreError> {
        let mut conn = self.conn.clone();
        let record = ConversionRecord::new(file_id.to_string(), original_filename.to_string());

        let created: i64 = redis::Script::new(CREATE_SCRIPT)
            .key(self.record_key(file_id))
            .key(self.index_key())
            .arg(file_id)
            .arg(original_filename)
            .arg(ConversionStatus::Pending.as_str())
            .arg(format_timestamp(record.created_at))
            .invoke_async(&mut conn)
            .await?;

        if created == 0 {
            return Err(StatusStoreError::AlreadyExists(file_id.to_string()));
        }

        debug!(file_id = %file_id, "Created status record");
        Ok(record)
    }

    async fn update_status(
        &self,
        file_id: &str,
        update: StatusUpdate,
    ) -> Result<(), StatusStoreError> {
        let mut conn = self.conn.clone();
        let next = update.status();

        let script = redis::Script::new(UPDATE_SCRIPT);
        let mut invocation = script.key(self.record_key(file_id));
        invocation
            .arg(next.as_str())
            .arg(format_timestamp(Utc::now()))
            .arg(update.converted_filename().unwrap_or(""))
            .arg(update.error_message().unwrap_or(""));
        for allowed in next.allowed_predecessors() {
            invocation.arg(allowed.as_str());
        }

        let (code, current): (i64, String) = invocation.invoke_async(&mut conn).await?;

        match code {
            1 => {
                debug!(file_id = %file_id, status = %next, "Updated status record");
                Ok(())
            }
            0 => Err(StatusStoreError::NotFound(file_id.to_string())),
            _ => {
                let from = current
                    .parse::<ConversionStatus>()
                    .map_err(StatusStoreError::Backend)?;
                Err(StatusStoreError::InvalidTransition {
                    file_id: file_id.to_string(),
                    from,
                    to: next,
                })
            }
        }
    }

    async fn get(&self, file_id: &str) -> Result<ConversionRecord, StatusStoreError> {
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = conn.hgetall(self.record_key(file_id)).await?;

        if fields.is_empty() {
            return Err(StatusStoreError::NotFound(file_id.to_string()));
        }
        Self::parse_record(file_id, fields)
    }

    async fn list(&self) -> Result<Vec<ConversionRecord>, StatusStoreError> {
        let mut conn = self.conn.clone();
        let file_ids: Vec<String> = conn.smembers(self.index_key()).await?;

        let mut records = Vec::with_capacity(file_ids.len());
        for file_id in file_ids {
            match self.get(&file_id).await {
                Ok(record) => records.push(record),
                // Indexed but expired or removed out of band.
                Err(StatusStoreError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(records)
    }
}

/// Status store held in process memory.
#[derive(Default)]
pub struct InMemoryStatusStore {
    records: RwLock<HashMap<String, ConversionRecord>>,
}

impl InMemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a record verbatim.
    pub async fn insert(&self, record: ConversionRecord) {
        self.records
            .write()
            .await
            .insert(record.file_id.clone(), record);
    }
}

#[async_trait]
impl StatusStore for InMemoryStatusStore {
    async fn create(
        &self,
        file_id: &str,
        original_filename: &str,
    ) -> Result<ConversionRecord, StatusStoreError> {
        let mut records = self.records.write().await;
        if records.contains_key(file_id) {
            return Err(StatusStoreError::AlreadyExists(file_id.to_string()));
        }

        let record = ConversionRecord::new(file_id.to_string(), original_filename.to_string());
        records.insert(file_id.to_string(), record.clone());
        Ok(record)
    }

    async fn update_status(
        &self,
        file_id: &str,
        update: StatusUpdate,
    ) -> Result<(), StatusStoreError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(file_id)
            .ok_or_else(|| StatusStoreError::NotFound(file_id.to_string()))?;

        record
            .apply(&update, Utc::now())
            .map_err(|(from, to)| StatusStoreError::InvalidTransition {
                file_id: file_id.to_string(),
                from,
                to,
            })
    }

    async fn get(&self, file_id: &str) -> Result<ConversionRecord, StatusStoreError> {
        self.records
            .read()
            .await
            .get(file_id)
            .cloned()
            .ok_or_else(|| StatusStoreError::NotFound(file_id.to_string()))
    }

    async fn list(&self) -> Result<Vec<ConversionRecord>, StatusStoreError> {
        Ok(self.records.read().await.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_create_then_get() {
        let store = InMemoryStatusStore::new();
        let created = store.create("photo", "photo.png").await.unwrap();
        assert_eq!(created.status, ConversionStatus::Pending);
        assert_eq!(created.created_at, created.updated_at);

        let fetched = store.get("photo").await.unwrap();
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn test_create_twice_already_exists() {
        let store = InMemoryStatusStore::new();
        store.create("photo", "photo.png").await.unwrap();

        let err = store.create("photo", "photo.png").await.unwrap_err();
        assert!(matches!(err, StatusStoreError::AlreadyExists(id) if id == "photo"));
    }

    #[tokio::test]
    async fn test_update_missing_record_not_found() {
        let store = InMemoryStatusStore::new();
        let err = store
            .update_status("ghost", StatusUpdate::Processing)
            .await
            .unwrap_err();
        assert!(matches!(err, StatusStoreError::NotFound(_)));
        assert!(matches!(
            store.get("ghost").await,
            Err(StatusStoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_refreshes_timestamp_and_fields() {
        let store = InMemoryStatusStore::new();
        let created = store.create("doc", "doc.docx").await.unwrap();

        store
            .update_status("doc", StatusUpdate::Processing)
            .await
            .unwrap();
        store
            .update_status("doc", StatusUpdate::failed("converter exited with status 1"))
            .await
            .unwrap();

        let record = store.get("doc").await.unwrap();
        assert_eq!(record.status, ConversionStatus::Failed);
        assert_eq!(
            record.error_message.as_deref(),
            Some("converter exited with status 1")
        );
        assert!(record.updated_at >= created.updated_at);
        assert_eq!(record.created_at, created.created_at);
    }

    #[tokio::test]
    async fn test_update_rejects_duplicate_processing() {
        let store = InMemoryStatusStore::new();
        store.create("doc", "doc.docx").await.unwrap();
        store
            .update_status("doc", StatusUpdate::Processing)
            .await
            .unwrap();

        let err = store
            .update_status("doc", StatusUpdate::Processing)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StatusStoreError::InvalidTransition {
                from: ConversionStatus::Processing,
                to: ConversionStatus::Processing,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_record_from_hash() {
        let fields: HashMap<String, String> = [
            ("file_id", "20250101120000_test"),
            ("original_filename", "test.txt"),
            ("status", "SUCCESS"),
            ("created_at", "2025-01-01T12:00:00.000000Z"),
            ("updated_at", "2025-01-01T12:01:00.000000Z"),
            ("converted_filename", "output/20250101120000_test.pdf"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let record = RedisStatusStore::parse_record("20250101120000_test", fields).unwrap();
        assert_eq!(record.status, ConversionStatus::Success);
        assert_eq!(
            record.converted_filename.as_deref(),
            Some("output/20250101120000_test.pdf")
        );
        assert_eq!(record.error_message, None);
    }

    #[test]
    fn test_parse_record_rejects_unknown_status() {
        let fields: HashMap<String, String> = [
            ("original_filename", "test.txt"),
            ("status", "DONE"),
            ("created_at", "2025-01-01T12:00:00.000000Z"),
            ("updated_at", "2025-01-01T12:00:00.000000Z"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        assert!(matches!(
            RedisStatusStore::parse_record("x", fields),
            Err(StatusStoreError::Backend(_))
        ));
    }

    #[test]
    fn test_timestamps_sort_lexicographically() {
        let earlier = format_timestamp(
            DateTime::parse_from_rfc3339("2025-01-01T09:59:59Z")
                .unwrap()
                .with_timezone(&Utc),
        );
        let later = format_timestamp(
            DateTime::parse_from_rfc3339("2025-01-01T10:00:00.5Z")
                .unwrap()
                .with_timezone(&Utc),
        );
        assert!(earlier < later);
    }

    // Note: These tests require a running Redis instance.
    // Run with: docker run -d -p 6379:6379 redis:7-alpine

    #[tokio::test]
    #[ignore]
    async fn test_redis_status_lifecycle() {
        let client = redis::Client::open("redis://127.0.0.1/").unwrap();
        let conn = ConnectionManager::new(client).await.unwrap();
        let namespace = format!("pdfconv-test-{}", uuid::Uuid::new_v4());
        let store = RedisStatusStore::new(conn, namespace);

        store.create("photo", "photo.png").await.unwrap();
        assert!(matches!(
            store.create("photo", "photo.png").await,
            Err(StatusStoreError::AlreadyExists(_))
        ));

        store
            .update_status("photo", StatusUpdate::Processing)
            .await
            .unwrap();
        store
            .update_status(
                "photo",
                StatusUpdate::Succeeded {
                    converted_filename: "output/photo.pdf".to_string(),
                },
            )
            .await
            .unwrap();

        let record = store.get("photo").await.unwrap();
        assert_eq!(record.status, ConversionStatus::Success);
        assert_eq!(record.converted_filename.as_deref(), Some("output/photo.pdf"));

        assert!(matches!(
            store.update_status("photo", StatusUpdate::Processing).await,
            Err(StatusStoreError::InvalidTransition { .. })
        ));
        assert!(matches!(
            store.update_status("ghost", StatusUpdate::Processing).await,
            Err(StatusStoreError::NotFound(_))
        ));
        assert_eq!(store.list().await.unwrap().len(), 1);
    }
}
