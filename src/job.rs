//! Conversion records, status transitions and per-event conversion jobs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Object key prefix for converted output.
pub const OUTPUT_PREFIX: &str = "output";

/// Object key prefix for uploaded input.
pub const INPUT_PREFIX: &str = "input";

/// Durable status record for one uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionRecord {
    pub file_id: String,
    pub original_filename: String,
    pub status: ConversionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub converted_filename: Option<String>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConversionStatus {
    Pending,
    Processing,
    Success,
    Failed,
}

impl ConversionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversionStatus::Pending => "PENDING",
            ConversionStatus::Processing => "PROCESSING",
            ConversionStatus::Success => "SUCCESS",
            ConversionStatus::Failed => "FAILED",
        }
    }

    /// Statuses a record may hold immediately before moving to `self`.
    ///
    /// FAILED may be re-entered as PROCESSING when an event is redelivered;
    /// SUCCESS is never left.
    pub fn allowed_predecessors(&self) -> &'static [ConversionStatus] {
        match self {
            ConversionStatus::Pending => &[],
            ConversionStatus::Processing => {
                &[ConversionStatus::Pending, ConversionStatus::Failed]
            }
            ConversionStatus::Success => &[ConversionStatus::Processing],
            ConversionStatus::Failed => {
                &[ConversionStatus::Pending, ConversionStatus::Processing]
            }
        }
    }

    pub fn can_transition_to(&self, next: ConversionStatus) -> bool {
        next.allowed_predecessors().contains(self)
    }
}

impl fmt::Display for ConversionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConversionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(ConversionStatus::Pending),
            "PROCESSING" => Ok(ConversionStatus::Processing),
            "SUCCESS" => Ok(ConversionStatus::Success),
            "FAILED" => Ok(ConversionStatus::Failed),
            other => Err(format!("unknown conversion status '{}'", other)),
        }
    }
}

/// Failure text of a FAILED write. Never empty: the only constructor
/// replaces a blank message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureMessage(String);

impl FailureMessage {
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.trim().is_empty() {
            FailureMessage("Conversion failed without an error message".to_string())
        } else {
            FailureMessage(message)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A status write. Each variant carries exactly the fields its status
/// requires, so a SUCCESS without output or a FAILED without a message
/// cannot be expressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    Processing,
    Succeeded { converted_filename: String },
    Failed { error_message: FailureMessage },
}

impl StatusUpdate {
    /// Builds a FAILED update.
    pub fn failed(error_message: impl Into<String>) -> Self {
        StatusUpdate::Failed {
            error_message: FailureMessage::new(error_message),
        }
    }

    pub fn status(&self) -> ConversionStatus {
        match self {
            StatusUpdate::Processing => ConversionStatus::Processing,
            StatusUpdate::Succeeded { .. } => ConversionStatus::Success,
            StatusUpdate::Failed { .. } => ConversionStatus::Failed,
        }
    }

    pub fn converted_filename(&self) -> Option<&str> {
        match self {
            StatusUpdate::Succeeded { converted_filename } => Some(converted_filename),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            StatusUpdate::Failed { error_message } => Some(error_message.as_str()),
            _ => None,
        }
    }
}

impl ConversionRecord {
    pub fn new(file_id: String, original_filename: String) -> Self {
        let now = Utc::now();
        Self {
            file_id,
            original_filename,
            status: ConversionStatus::Pending,
            created_at: now,
            updated_at: now,
            converted_filename: None,
            error_message: None,
        }
    }

    /// Applies a status write in place. `updated_at` never moves backwards.
    ///
    /// Returns the rejected `(from, to)` pair when the transition is not
    /// permitted; the record is left untouched in that case.
    pub fn apply(
        &mut self,
        update: &StatusUpdate,
        now: DateTime<Utc>,
    ) -> Result<(), (ConversionStatus, ConversionStatus)> {
        let next = update.status();
        if !self.status.can_transition_to(next) {
            return Err((self.status, next));
        }

        self.status = next;
        self.updated_at = now.max(self.updated_at);
        self.converted_filename = update.converted_filename().map(str::to_string);
        self.error_message = update.error_message().map(str::to_string);
        Ok(())
    }
}

/// One object-created notification turned into a unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionJob {
    pub bucket: String,
    pub object_key: String,
    pub file_id: String,
    pub extension: Option<String>,
}

impl ConversionJob {
    /// Derives the job from a stored object's location.
    ///
    /// `file_id` is the key's file name without directory prefix and without
    /// its last extension; the extension is lower-cased. Returns `None` when
    /// the key names no file.
    pub fn from_object(bucket: impl Into<String>, object_key: impl Into<String>) -> Option<Self> {
        let object_key = object_key.into();
        let path = Path::new(&object_key);

        let file_id = path.file_stem()?.to_str()?.to_string();
        if file_id.is_empty() || object_key.ends_with('/') {
            return None;
        }
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());

        Some(Self {
            bucket: bucket.into(),
            object_key,
            file_id,
            extension,
        })
    }

    /// Deterministic location of the converted PDF.
    pub fn output_key(&self) -> String {
        output_key(&self.file_id)
    }
}

pub fn output_key(file_id: &str) -> String {
    format!("{}/{}.pdf", OUTPUT_PREFIX, file_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_job_from_object_key() {
        let job = ConversionJob::from_object("bucket", "input/photo.PNG").unwrap();
        assert_eq!(job.file_id, "photo");
        assert_eq!(job.extension.as_deref(), Some("png"));
        assert_eq!(job.output_key(), "output/photo.pdf");
    }

    #[test]
    fn test_job_keeps_inner_dots() {
        let job = ConversionJob::from_object("bucket", "input/20250101120000_report.v2.docx").unwrap();
        assert_eq!(job.file_id, "20250101120000_report.v2");
        assert_eq!(job.extension.as_deref(), Some("docx"));
    }

    #[test]
    fn test_job_without_extension() {
        let job = ConversionJob::from_object("bucket", "input/README").unwrap();
        assert_eq!(job.file_id, "README");
        assert_eq!(job.extension, None);
    }

    #[test]
    fn test_job_rejects_directory_keys() {
        assert!(ConversionJob::from_object("bucket", "input/").is_none());
        assert!(ConversionJob::from_object("bucket", "").is_none());
    }

    #[test]
    fn test_status_serializes_upper_case() {
        let json = serde_json::to_string(&ConversionStatus::Processing).unwrap();
        assert_eq!(json, "\"PROCESSING\"");
        assert_eq!("FAILED".parse::<ConversionStatus>(), Ok(ConversionStatus::Failed));
        assert!("done".parse::<ConversionStatus>().is_err());
    }

    #[test]
    fn test_transitions_only_move_forward() {
        use ConversionStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Success));
        assert!(Processing.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Processing));

        assert!(!Success.can_transition_to(Processing));
        assert!(!Success.can_transition_to(Failed));
        assert!(!Processing.can_transition_to(Processing));
        assert!(!Pending.can_transition_to(Success));
        assert!(!Processing.can_transition_to(Pending));
    }

    #[test]
    fn test_apply_keeps_message_and_output_exclusive() {
        let mut record = ConversionRecord::new("photo".to_string(), "photo.png".to_string());
        let now = Utc::now();

        record.apply(&StatusUpdate::Processing, now).unwrap();
        record.apply(&StatusUpdate::failed("boom"), now).unwrap();
        assert_eq!(record.status, ConversionStatus::Failed);
        assert_eq!(record.error_message.as_deref(), Some("boom"));
        assert!(record.converted_filename.is_none());

        record.apply(&StatusUpdate::Processing, now).unwrap();
        assert!(record.error_message.is_none());

        record
            .apply(
                &StatusUpdate::Succeeded {
                    converted_filename: "output/photo.pdf".to_string(),
                },
                now,
            )
            .unwrap();
        assert_eq!(record.converted_filename.as_deref(), Some("output/photo.pdf"));
        assert!(record.error_message.is_none());
    }

    #[test]
    fn test_apply_rejects_leaving_success() {
        let mut record = ConversionRecord::new("a".to_string(), "a.txt".to_string());
        let now = Utc::now();
        record.apply(&StatusUpdate::Processing, now).unwrap();
        record
            .apply(
                &StatusUpdate::Succeeded {
                    converted_filename: "output/a.pdf".to_string(),
                },
                now,
            )
            .unwrap();

        let err = record.apply(&StatusUpdate::Processing, now).unwrap_err();
        assert_eq!(err, (ConversionStatus::Success, ConversionStatus::Processing));
        assert_eq!(record.status, ConversionStatus::Success);
    }

    #[test]
    fn test_updated_at_never_moves_backwards() {
        let mut record = ConversionRecord::new("a".to_string(), "a.txt".to_string());
        let before = record.updated_at;
        record
            .apply(&StatusUpdate::Processing, before - Duration::seconds(30))
            .unwrap();
        assert_eq!(record.updated_at, before);
    }

    #[test]
    fn test_failed_never_empty() {
        let update = StatusUpdate::failed("   ");
        assert!(!update.error_message().unwrap().trim().is_empty());
    }

    #[test]
    fn test_failed_record_always_carries_message() {
        let mut record = ConversionRecord::new("a".to_string(), "a.txt".to_string());
        let update = StatusUpdate::Failed {
            error_message: FailureMessage::new(""),
        };
        record.apply(&update, Utc::now()).unwrap();

        assert_eq!(record.status, ConversionStatus::Failed);
        assert_eq!(
            record.error_message.as_deref(),
            Some("Conversion failed without an error message")
        );
        assert_eq!(FailureMessage::new("boom").as_str(), "boom");
    }
}
