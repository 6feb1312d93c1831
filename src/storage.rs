//! Object storage for uploaded input and converted output.

use crate::error::StorageError;
use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{error, info};

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn download(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError>;

    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError>;
}

/// S3 (or S3-compatible) object storage.
#[derive(Clone)]
pub struct S3Storage {
    client: Client,
}

impl S3Storage {
    /// Builds a client from the ambient AWS configuration.
    ///
    /// `endpoint_url` points at an S3-compatible service (MinIO, LocalStack)
    /// and switches to path-style addressing.
    pub async fn new(region: &str, endpoint_url: Option<&str>) -> Self {
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = endpoint_url {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        info!(region = %region, endpoint = ?endpoint_url, "S3 client configured");
        Self {
            client: Client::from_conf(builder.build()),
        }
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn download(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        let download_error = |reason: String| StorageError::Download {
            bucket: bucket.to_string(),
            key: key.to_string(),
            reason,
        };

        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| download_error(aws_sdk_s3::error::DisplayErrorContext(e).to_string()))?;

        let data = output
            .body
            .collect()
            .await
            .map_err(|e| download_error(e.to_string()))?
            .into_bytes();

        info!(bucket = %bucket, key = %key, size_bytes = data.len(), "Downloaded object");
        Ok(data.to_vec())
    }

    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let size = data.len();
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| {
                let reason = aws_sdk_s3::error::DisplayErrorContext(e).to_string();
                error!(bucket = %bucket, key = %key, error = %reason, "S3 upload failed");
                StorageError::Upload {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    reason,
                }
            })?;

        info!(bucket = %bucket, key = %key, size_bytes = size, "Uploaded object");
        Ok(())
    }
}

/// Object storage held in process memory, keyed by `(bucket, key)`.
#[derive(Default)]
pub struct InMemoryStorage {
    objects: RwLock<HashMap<(String, String), StoredObject>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub content_type: String,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, bucket: &str, key: &str, data: Vec<u8>) {
        self.objects.write().await.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                data,
                content_type: "application/octet-stream".to_string(),
            },
        );
    }

    pub async fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.objects
            .read()
            .await
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }
}

#[async_trait]
impl ObjectStorage for InMemoryStorage {
    async fn download(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        self.object(bucket, key)
            .await
            .map(|object| object.data)
            .ok_or_else(|| StorageError::Download {
                bucket: bucket.to_string(),
                key: key.to_string(),
                reason: "NoSuchKey".to_string(),
            })
    }

    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        self.objects.write().await.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                data,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }
}
