//! Error types for the conversion pipeline.
//!
//! Three families, matching the three collaborators a job touches:
//!
//! * [`ConversionError`]: anything on the conversion path (routing, decoding,
//!   the external converter, object storage). The job processor turns these
//!   into a FAILED status record; they never escape a single job.
//! * [`StorageError`]: object download/upload failures.
//! * [`StatusStoreError`]: status record create/update/read failures.

use crate::job::ConversionStatus;
use thiserror::Error;

/// Failures on the conversion path of a single job.
#[derive(Debug, Error)]
pub enum ConversionError {
    /// Extension missing or outside the supported set.
    #[error("Unsupported file type: {extension}")]
    UnsupportedFormat { extension: String },

    /// The image bytes could not be decoded or laid out as a PDF page.
    #[error("Failed to decode image: {0}")]
    Decode(String),

    /// The external document converter exited nonzero, timed out, or
    /// produced no output.
    #[error("Document converter failed: {0}")]
    ExternalTool(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The per-job deadline elapsed before conversion finished.
    #[error("Conversion exceeded deadline of {secs}s")]
    DeadlineExceeded { secs: u64 },
}

impl ConversionError {
    pub fn unsupported(extension: Option<&str>) -> Self {
        let extension = match extension {
            Some(ext) if !ext.is_empty() => format!(".{}", ext),
            _ => "(none)".to_string(),
        };
        ConversionError::UnsupportedFormat { extension }
    }
}

/// Object storage failures.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to download s3://{bucket}/{key}: {reason}")]
    Download {
        bucket: String,
        key: String,
        reason: String,
    },

    #[error("Failed to upload s3://{bucket}/{key}: {reason}")]
    Upload {
        bucket: String,
        key: String,
        reason: String,
    },
}

/// Status record failures.
#[derive(Debug, Error)]
pub enum StatusStoreError {
    #[error("Status record not found: {0}")]
    NotFound(String),

    #[error("Status record already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid status transition for {file_id}: {from} -> {to}")]
    InvalidTransition {
        file_id: String,
        from: ConversionStatus,
        to: ConversionStatus,
    },

    #[error("Status store backend error: {0}")]
    Backend(String),
}

impl From<redis::RedisError> for StatusStoreError {
    fn from(err: redis::RedisError) -> Self {
        StatusStoreError::Backend(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_names_extension() {
        let err = ConversionError::unsupported(Some("gif"));
        assert_eq!(err.to_string(), "Unsupported file type: .gif");

        let err = ConversionError::unsupported(None);
        assert_eq!(err.to_string(), "Unsupported file type: (none)");
    }

    #[test]
    fn test_storage_error_is_transparent() {
        let err: ConversionError = StorageError::Download {
            bucket: "b".to_string(),
            key: "input/a.png".to_string(),
            reason: "NoSuchKey".to_string(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Failed to download s3://b/input/a.png: NoSuchKey"
        );
    }
}
