//! Read-side aggregate counts over all status records.

use crate::job::{ConversionRecord, ConversionStatus};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConversionStats {
    pub total_files: usize,
    pub successful_conversions: usize,
    pub failed_conversions: usize,
    pub pending_conversions: usize,
    /// Records created within the 24 hours before `now`.
    pub last_24_hours: usize,
}

impl ConversionStats {
    pub fn from_records(records: &[ConversionRecord], now: DateTime<Utc>) -> Self {
        let window_start = now - Duration::hours(24);

        records.iter().fold(Self::default(), |mut stats, record| {
            stats.total_files += 1;
            match record.status {
                ConversionStatus::Success => stats.successful_conversions += 1,
                ConversionStatus::Failed => stats.failed_conversions += 1,
                ConversionStatus::Pending => stats.pending_conversions += 1,
                ConversionStatus::Processing => {}
            }
            if record.created_at > window_start {
                stats.last_24_hours += 1;
            }
            stats
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(id: &str, status: ConversionStatus, created_at: DateTime<Utc>) -> ConversionRecord {
        ConversionRecord {
            file_id: id.to_string(),
            original_filename: format!("{}.txt", id),
            status,
            created_at,
            updated_at: created_at,
            converted_filename: None,
            error_message: None,
        }
    }

    #[test]
    fn test_counts_by_status() {
        let now = Utc::now();
        let records = vec![
            record("1", ConversionStatus::Success, now - Duration::days(3)),
            record("2", ConversionStatus::Failed, now - Duration::hours(30)),
            record("3", ConversionStatus::Pending, now - Duration::hours(2)),
            record("4", ConversionStatus::Success, now - Duration::minutes(5)),
        ];

        let stats = ConversionStats::from_records(&records, now);
        assert_eq!(
            stats,
            ConversionStats {
                total_files: 4,
                successful_conversions: 2,
                failed_conversions: 1,
                pending_conversions: 1,
                last_24_hours: 2,
            }
        );
    }

    #[test]
    fn test_processing_counts_only_in_total() {
        let now = Utc::now();
        let stats = ConversionStats::from_records(
            &[record("1", ConversionStatus::Processing, now)],
            now,
        );
        assert_eq!(stats.total_files, 1);
        assert_eq!(stats.pending_conversions, 0);
        assert_eq!(stats.last_24_hours, 1);
    }

    #[test]
    fn test_empty() {
        assert_eq!(
            ConversionStats::from_records(&[], Utc::now()),
            ConversionStats::default()
        );
    }
}
