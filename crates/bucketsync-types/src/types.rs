//! Core data types for bucketsync
//!
//! This module provides the records that describe each side of a sync, the
//! plan that reconciles them, and the statistics produced by executing it.

use crate::error::TransferFailure;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Mapping from slash-normalized relative key to the record on one side.
///
/// Ordered so that plans built from it are deterministic.
pub type FileMap = BTreeMap<String, FileRecord>;

/// One file on one side of a sync (local or remote).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FileRecord {
    /// Path relative to the sync root, always `/`-separated
    pub relative_key: String,
    /// Size in bytes
    pub size: u64,
    /// Content identity tag. Remote records carry the provider tag; local
    /// records are `None` until a fingerprint has been computed.
    pub identity_tag: Option<String>,
    /// Filesystem path used for I/O, present only for local records
    pub absolute_location: Option<PathBuf>,
}

impl FileRecord {
    /// Create a local record whose fingerprint has not been computed yet
    pub fn local(relative_key: impl Into<String>, size: u64, location: impl Into<PathBuf>) -> Self {
        Self {
            relative_key: relative_key.into(),
            size,
            identity_tag: None,
            absolute_location: Some(location.into()),
        }
    }

    /// Create a remote record carrying the provider-reported identity tag
    pub fn remote(relative_key: impl Into<String>, size: u64, identity_tag: impl Into<String>) -> Self {
        Self {
            relative_key: relative_key.into(),
            size,
            identity_tag: Some(identity_tag.into()),
            absolute_location: None,
        }
    }

    /// Attach a precomputed identity tag
    pub fn with_identity_tag(mut self, tag: impl Into<String>) -> Self {
        self.identity_tag = Some(tag.into());
        self
    }

    /// Whether this record lives on the local filesystem
    pub fn is_local(&self) -> bool {
        self.absolute_location.is_some()
    }
}

/// Content fingerprint of a local payload.
///
/// `Unknown` is produced when the payload cannot be read; it never matches
/// any remote identity tag, which forces a re-transfer instead of a skip.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Fingerprint {
    /// Quoted hex digest, with a `-<parts>` suffix for multipart payloads
    Known(String),
    /// The payload could not be read
    Unknown,
}

impl Fingerprint {
    /// Compare against a remote identity tag
    pub fn matches(&self, identity_tag: &str) -> bool {
        match self {
            Self::Known(tag) => tag == identity_tag,
            Self::Unknown => false,
        }
    }

    /// The tag value, if known
    pub fn as_tag(&self) -> Option<&str> {
        match self {
            Self::Known(tag) => Some(tag),
            Self::Unknown => None,
        }
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(tag) => f.write_str(tag),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

/// Direction of a sync pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SyncDirection {
    /// Local tree is the source, bucket prefix is the destination
    Upload,
    /// Bucket prefix is the source, local tree is the destination
    Download,
}

impl SyncDirection {
    /// Whether the source side of this direction is the local tree
    pub fn source_is_local(self) -> bool {
        matches!(self, Self::Upload)
    }
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upload => f.write_str("upload"),
            Self::Download => f.write_str("download"),
        }
    }
}

/// A source record scheduled for transfer
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TransferItem {
    /// Record on the source side
    pub source: FileRecord,
    /// Relative key on the destination side
    pub destination_key: String,
}

/// Reconciliation result for one sync direction.
///
/// `to_transfer` and `to_delete` are disjoint, and every record in
/// `to_delete` was absent from the source mapping when the plan was built.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SyncPlan {
    /// Direction the plan was built for
    pub direction: SyncDirection,
    /// Source records to transfer, ordered by key
    pub to_transfer: Vec<TransferItem>,
    /// Destination records with no source counterpart
    pub to_delete: Vec<FileRecord>,
    /// Keys whose source and destination content are identical
    pub skipped: Vec<String>,
}

impl SyncPlan {
    /// Create an empty plan
    pub fn new(direction: SyncDirection) -> Self {
        Self {
            direction,
            to_transfer: Vec::new(),
            to_delete: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// Number of source records identical to their destination
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    /// Total work units, known before execution starts
    pub fn total_work(&self) -> u64 {
        (self.to_transfer.len() + self.skipped.len()) as u64
    }

    /// Bytes that will be moved by the transfer phase
    pub fn bytes_to_transfer(&self) -> u64 {
        self.to_transfer.iter().map(|item| item.source.size).sum()
    }

    /// Whether the plan has neither transfers nor deletions
    pub fn is_empty(&self) -> bool {
        self.to_transfer.is_empty() && self.to_delete.is_empty()
    }
}

/// Result of transferring one object
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// The object reached its destination
    Transferred {
        /// Destination identifier
        destination: String,
        /// Bytes written
        bytes: u64,
    },
    /// The object failed; the batch continues
    Failed(TransferFailure),
}

impl TransferOutcome {
    /// Whether the object was transferred
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Transferred { .. })
    }
}

/// A best-effort deletion that did not go through.
///
/// Logged and reported, never escalated into a batch failure.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeletionWarning {
    /// Destination identifier that could not be deleted
    pub key: String,
    /// Underlying cause
    pub cause: String,
}

impl fmt::Display for DeletionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "can't delete {}: {}", self.key, self.cause)
    }
}

/// Sync statistics
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SyncStats {
    /// Number of files transferred
    pub files_transferred: u64,
    /// Total bytes transferred
    pub bytes_transferred: u64,
    /// Number of files skipped as identical
    pub files_skipped: u64,
    /// Number of destination objects deleted
    pub files_deleted: u64,
    /// Number of transfers that failed
    pub files_failed: u64,
    /// Number of deletions that failed
    pub deletion_warnings: u64,
    /// Total duration of the operation
    pub duration: Duration,
}

impl SyncStats {
    /// Create a new empty statistics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Calculate the overall transfer rate in bytes per second
    pub fn transfer_rate(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.bytes_transferred as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Merge statistics from another instance
    pub fn merge(&mut self, other: &SyncStats) {
        self.files_transferred += other.files_transferred;
        self.bytes_transferred += other.bytes_transferred;
        self.files_skipped += other.files_skipped;
        self.files_deleted += other.files_deleted;
        self.files_failed += other.files_failed;
        self.deletion_warnings += other.deletion_warnings;
        self.duration += other.duration;
    }
}

/// Terminal value of a sync whose transfers all succeeded
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SyncReport {
    /// Direction of the sync
    pub direction: SyncDirection,
    /// Whether side effects were suppressed
    pub dry_run: bool,
    /// Aggregated statistics
    pub stats: SyncStats,
    /// Deletions that did not go through
    pub deletion_warnings: Vec<DeletionWarning>,
}

/// An object as reported by the remote listing capability
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RemoteObject {
    /// Full object key
    pub key: String,
    /// Size in bytes
    pub size: u64,
    /// Provider-supplied identity tag (ETag)
    pub identity_tag: String,
}

/// One request against the paginated listing capability
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRequest {
    /// Key prefix to list under
    pub prefix: String,
    /// Group keys below the first delimiter into common prefixes
    pub delimiter: Option<String>,
    /// Upper bound on entries per page
    pub max_keys: u32,
    /// Token from the previous page, `None` for the first page
    pub continuation: Option<String>,
}

impl ListRequest {
    /// Default page size bound
    pub const DEFAULT_MAX_KEYS: u32 = 1000;

    /// Create a recursive listing request
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            delimiter: None,
            max_keys: Self::DEFAULT_MAX_KEYS,
            continuation: None,
        }
    }

    /// Switch to non-recursive, folder-like listing
    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = Some(delimiter.into());
        self
    }

    /// Continue from a previous page
    pub fn with_continuation(mut self, token: Option<String>) -> Self {
        self.continuation = token;
        self
    }
}

/// One page of a remote listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Objects on this page
    pub objects: Vec<RemoteObject>,
    /// Folder-like prefixes, populated only in delimiter mode
    pub common_prefixes: Vec<String>,
    /// Token for the next page; `None` once the listing is complete
    pub continuation: Option<String>,
}

/// Streamed object payload
pub type ObjectBody = Box<dyn tokio::io::AsyncRead + Send + Unpin>;

/// A single object upload request
pub struct PutObject {
    /// Destination key
    pub key: String,
    /// Payload stream
    pub body: ObjectBody,
    /// Exact payload length in bytes
    pub content_length: u64,
    /// MIME type stored with the object
    pub content_type: String,
    /// Canned access-control value, if any
    pub acl: Option<String>,
}

impl fmt::Debug for PutObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PutObject")
            .field("key", &self.key)
            .field("content_length", &self.content_length)
            .field("content_type", &self.content_type)
            .field("acl", &self.acl)
            .finish_non_exhaustive()
    }
}

/// Per-key result of a batched deletion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteOutcome {
    /// Key that was submitted for deletion
    pub key: String,
    /// Failure reason, `None` when the key was deleted
    pub error: Option<String>,
}

impl DeleteOutcome {
    /// A successful deletion
    pub fn deleted(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            error: None,
        }
    }

    /// A failed deletion
    pub fn failed(key: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            error: Some(error.into()),
        }
    }
}
