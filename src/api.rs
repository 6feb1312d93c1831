//! HTTP API: upload entry point, status lookup and statistics.

use crate::error::StatusStoreError;
use crate::events::EventNotification;
use crate::job::{ConversionJob, ConversionRecord, StatusUpdate, INPUT_PREFIX};
use crate::queue::EventPublisher;
use crate::router::FormatKind;
use crate::stats::ConversionStats;
use crate::status_store::StatusStore;
use crate::storage::ObjectStorage;
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Name of the multipart field carrying the uploaded file.
const FILE_FIELD: &str = "file";

#[derive(Clone)]
pub struct ApiState {
    pub status_store: Arc<dyn StatusStore>,
    pub storage: Arc<dyn ObjectStorage>,
    pub bucket: String,
    /// Publishes object-created notifications after upload, when set.
    pub events: Option<Arc<dyn EventPublisher>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub file_id: String,
    pub status: String,
}

/// JSON error body `{"detail": ...}` with a status code.
#[derive(Debug)]
pub struct ApiError(pub StatusCode, pub String);

impl ApiError {
    fn bad_request(detail: impl Into<String>) -> Self {
        ApiError(StatusCode::BAD_REQUEST, detail.into())
    }

    fn internal(detail: impl Into<String>) -> Self {
        ApiError(StatusCode::INTERNAL_SERVER_ERROR, detail.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let ApiError(status, detail) = self;
        (status, Json(serde_json::json!({ "detail": detail }))).into_response()
    }
}

pub fn router(state: ApiState, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/upload/", post(upload_file))
        .route("/status/{file_id}", get(get_file_status))
        .route("/stats/", get(get_file_statistics))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Names derived for one upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    pub file_id: String,
    pub object_key: String,
    pub extension: String,
}

/// Text after the last dot, lower-cased; the whole name when there is none.
pub fn upload_extension(filename: &str) -> String {
    filename
        .rsplit('.')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}

/// Keeps `[A-Za-z0-9._-]`, replaces everything else, and drops any client
/// supplied directory part.
fn sanitize_filename(filename: &str) -> String {
    let base = filename
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or_default();
    base.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Object is stored as `input/{timestamp}_{filename}`; the file id is that
/// object name without extension, exactly what the processor derives.
pub fn upload_target(filename: &str, now: DateTime<Utc>) -> Option<UploadTarget> {
    let object_name = format!("{}_{}", now.format("%Y%m%d%H%M%S"), sanitize_filename(filename));
    let object_key = format!("{}/{}", INPUT_PREFIX, object_name);
    let job = ConversionJob::from_object("", object_key.as_str())?;

    Some(UploadTarget {
        file_id: job.file_id,
        extension: job.extension.unwrap_or_default(),
        object_key,
    })
}

async fn upload_file(
    State(state): State<ApiState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let filename = field
            .file_name()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ApiError::bad_request("Uploaded file has no file name"))?
            .to_string();

        let ext = upload_extension(&filename);
        if FormatKind::from_extension(&ext).is_none() {
            return Err(ApiError::bad_request(format!(
                "File type '{}' not supported.",
                ext
            )));
        }

        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("Failed to read upload: {}", e)))?;

        return store_upload(&state, &filename, data.to_vec()).await.map(Json);
    }

    Err(ApiError::bad_request("No file field found in multipart request"))
}

async fn store_upload(
    state: &ApiState,
    filename: &str,
    data: Vec<u8>,
) -> Result<UploadResponse, ApiError> {
    let target = upload_target(filename, Utc::now())
        .ok_or_else(|| ApiError::bad_request(format!("Invalid file name '{}'", filename)))?;

    state
        .status_store
        .create(&target.file_id, filename)
        .await
        .map_err(|e| match e {
            StatusStoreError::AlreadyExists(_) => ApiError(StatusCode::CONFLICT, e.to_string()),
            other => ApiError::internal(other.to_string()),
        })?;

    let content_type = FormatKind::content_type(&target.extension);
    if let Err(e) = state
        .storage
        .upload(&state.bucket, &target.object_key, data, content_type)
        .await
    {
        error!(file_id = %target.file_id, error = %e, "Failed to store upload");
        if let Err(status_err) = state
            .status_store
            .update_status(&target.file_id, StatusUpdate::failed(e.to_string()))
            .await
        {
            error!(file_id = %target.file_id, error = %status_err, "Failed to mark upload as failed");
        }
        return Err(ApiError::internal(e.to_string()));
    }

    if let Some(events) = &state.events {
        let event = EventNotification::single(state.bucket.as_str(), target.object_key.as_str());
        if let Err(e) = events.publish(&event).await {
            warn!(file_id = %target.file_id, error = %e, "Failed to publish upload event");
        }
    }

    info!(file_id = %target.file_id, key = %target.object_key, "Upload accepted");
    Ok(UploadResponse {
        file_id: target.file_id,
        status: "uploaded".to_string(),
    })
}

async fn get_file_status(
    State(state): State<ApiState>,
    Path(file_id): Path<String>,
) -> Result<Json<ConversionRecord>, ApiError> {
    match state.status_store.get(&file_id).await {
        Ok(record) => Ok(Json(record)),
        Err(StatusStoreError::NotFound(_)) => {
            Err(ApiError(StatusCode::NOT_FOUND, "File not found".to_string()))
        }
        Err(e) => Err(ApiError::internal(e.to_string())),
    }
}

async fn get_file_statistics(
    State(state): State<ApiState>,
) -> Result<Json<ConversionStats>, ApiError> {
    let records = state
        .status_store
        .list()
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    Ok(Json(ConversionStats::from_records(&records, Utc::now())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_upload_extension() {
        assert_eq!(upload_extension("photo.PNG"), "png");
        assert_eq!(upload_extension("archive.tar.gz"), "gz");
        assert_eq!(upload_extension("README"), "readme");
    }

    #[test]
    fn test_upload_target_matches_processor_derivation() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        let target = upload_target("test.txt", now).unwrap();

        assert_eq!(target.object_key, "input/20250101120000_test.txt");
        assert_eq!(target.file_id, "20250101120000_test");
        assert_eq!(target.extension, "txt");

        let job = ConversionJob::from_object("bucket", target.object_key.as_str()).unwrap();
        assert_eq!(job.file_id, target.file_id);
    }

    #[test]
    fn test_upload_target_sanitizes_names() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        let target = upload_target("C:\\Users\\me\\my report (1).DOCX", now).unwrap();

        assert_eq!(target.object_key, "input/20250101120000_my_report__1_.DOCX");
        assert_eq!(target.file_id, "20250101120000_my_report__1_");
        assert_eq!(target.extension, "docx");
    }
}
