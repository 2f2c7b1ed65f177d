//! JSON output structures for the bucketsync CLI

use bucketsync_types::{DeletionWarning, SyncDirection, SyncReport, SyncStats, TransferFailure};
use serde::{Deserialize, Serialize};

/// Complete JSON output for a sync operation
#[derive(Debug, Serialize, Deserialize)]
pub struct SyncResultJson {
    /// Operation metadata
    pub metadata: OperationMetadata,
    /// Sync statistics, absent when the sync did not finish
    pub stats: Option<SyncStatsJson>,
    /// Deletions that did not go through
    pub deletion_warnings: Vec<DeletionWarning>,
    /// Objects that failed to transfer
    pub failures: Vec<TransferFailure>,
    /// Overall result
    pub result: OperationResult,
}

/// Operation metadata
#[derive(Debug, Serialize, Deserialize)]
pub struct OperationMetadata {
    /// bucketsync version
    pub version: String,
    /// `upload` or `download`
    pub operation: String,
    /// Timestamp when the output was produced
    pub timestamp: String,
    /// Bucket name
    pub bucket: String,
    /// Key prefix
    pub prefix: String,
    /// Local directory
    pub local_path: String,
    /// Whether side effects were suppressed
    pub dry_run: bool,
}

impl OperationMetadata {
    /// Metadata stamped with the current time
    pub fn new(
        direction: SyncDirection,
        bucket: &str,
        prefix: &str,
        local_path: &str,
        dry_run: bool,
    ) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            operation: direction.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
            local_path: local_path.to_string(),
            dry_run,
        }
    }
}

/// Sync statistics in JSON format
#[derive(Debug, Serialize, Deserialize)]
pub struct SyncStatsJson {
    /// Number of files transferred
    pub files_transferred: u64,
    /// Total bytes transferred
    pub bytes_transferred: u64,
    /// Number of files skipped as identical
    pub files_skipped: u64,
    /// Number of destination objects deleted
    pub files_deleted: u64,
    /// Number of failed transfers
    pub files_failed: u64,
    /// Number of deletions that failed
    pub deletion_warnings: u64,
    /// Duration in milliseconds
    pub duration_ms: u64,
    /// Transfer rate in bytes per second
    pub transfer_rate_bps: f64,
}

impl From<&SyncStats> for SyncStatsJson {
    fn from(stats: &SyncStats) -> Self {
        Self {
            files_transferred: stats.files_transferred,
            bytes_transferred: stats.bytes_transferred,
            files_skipped: stats.files_skipped,
            files_deleted: stats.files_deleted,
            files_failed: stats.files_failed,
            deletion_warnings: stats.deletion_warnings,
            duration_ms: stats.duration.as_millis() as u64,
            transfer_rate_bps: stats.transfer_rate(),
        }
    }
}

/// Operation result
#[derive(Debug, Serialize, Deserialize)]
pub struct OperationResult {
    /// `success`, `incomplete` or `error`
    pub status: String,
    /// Error message if the sync did not succeed
    pub error_message: Option<String>,
}

impl SyncResultJson {
    /// Output for a sync whose transfers all succeeded
    pub fn success(metadata: OperationMetadata, report: &SyncReport) -> Self {
        Self {
            metadata,
            stats: Some(SyncStatsJson::from(&report.stats)),
            deletion_warnings: report.deletion_warnings.clone(),
            failures: Vec::new(),
            result: OperationResult {
                status: "success".to_string(),
                error_message: None,
            },
        }
    }

    /// Output for a sync where some transfers failed
    pub fn incomplete(metadata: OperationMetadata, failures: &[TransferFailure]) -> Self {
        Self {
            metadata,
            stats: None,
            deletion_warnings: Vec::new(),
            failures: failures.to_vec(),
            result: OperationResult {
                status: "incomplete".to_string(),
                error_message: Some(format!("{} object(s) failed", failures.len())),
            },
        }
    }

    /// Output for a sync that aborted
    pub fn error(metadata: OperationMetadata, message: String) -> Self {
        Self {
            metadata,
            stats: None,
            deletion_warnings: Vec::new(),
            failures: Vec::new(),
            result: OperationResult {
                status: "error".to_string(),
                error_message: Some(message),
            },
        }
    }

    /// Serialize as pretty-printed JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn metadata() -> OperationMetadata {
        OperationMetadata::new(SyncDirection::Upload, "bucket", "www", "./public", false)
    }

    #[test]
    fn test_success_output() {
        let report = SyncReport {
            direction: SyncDirection::Upload,
            dry_run: false,
            stats: SyncStats {
                files_transferred: 2,
                bytes_transferred: 2048,
                duration: Duration::from_secs(2),
                ..SyncStats::default()
            },
            deletion_warnings: vec![DeletionWarning {
                key: "www/old.txt".to_string(),
                cause: "AccessDenied".to_string(),
            }],
        };

        let output = SyncResultJson::success(metadata(), &report);
        let json: serde_json::Value = serde_json::from_str(&output.to_json().unwrap()).unwrap();

        assert_eq!(json["metadata"]["operation"], "upload");
        assert_eq!(json["stats"]["files_transferred"], 2);
        assert_eq!(json["stats"]["transfer_rate_bps"], 1024.0);
        assert_eq!(json["deletion_warnings"][0]["key"], "www/old.txt");
        assert_eq!(json["result"]["status"], "success");
    }

    #[test]
    fn test_incomplete_output_lists_failures() {
        let failures = vec![TransferFailure::new("www/b.txt", "timeout")];

        let output = SyncResultJson::incomplete(metadata(), &failures);

        assert_eq!(output.result.status, "incomplete");
        assert_eq!(output.failures[0].destination, "www/b.txt");
        assert!(output.stats.is_none());
    }
}
