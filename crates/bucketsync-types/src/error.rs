//! Error types and handling for bucketsync
//!
//! The taxonomy separates failures that make a sync plan untrustworthy (local
//! traversal, remote listing) from per-object failures that are collected and
//! surfaced once at the end of a transfer batch.

use std::fmt;
use std::path::PathBuf;

/// Error severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ErrorSeverity {
    /// Low severity - operation can continue
    Low,
    /// Medium severity - operation should be retried
    Medium,
    /// High severity - operation should be aborted
    High,
    /// Critical severity - entire process should be terminated
    Critical,
}

/// A single object that could not be transferred.
///
/// `destination` is the identifier the object was being written to: a bucket
/// key for uploads, a local path for downloads.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TransferFailure {
    /// Destination identifier of the failed object
    pub destination: String,
    /// Underlying cause, rendered as text
    pub cause: String,
}

impl TransferFailure {
    /// Create a new transfer failure
    pub fn new(destination: impl Into<String>, cause: impl fmt::Display) -> Self {
        Self {
            destination: destination.into(),
            cause: cause.to_string(),
        }
    }
}

impl fmt::Display for TransferFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.destination, self.cause)
    }
}

/// Main error type for bucketsync operations
#[derive(thiserror::Error, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Error {
    /// Local traversal or local file open failed
    #[error("Filesystem error at '{path}': {message}")]
    Filesystem {
        /// Path that could not be read
        path: PathBuf,
        /// Error message from the filesystem
        message: String,
    },

    /// A remote listing page could not be fetched
    #[error("Listing error for prefix '{prefix}': {message}")]
    Listing {
        /// Prefix being listed
        prefix: String,
        /// Error message from the listing capability
        message: String,
    },

    /// A single object failed to transfer
    #[error("Transfer failed for {0}")]
    Transfer(TransferFailure),

    /// One or more objects in a batch failed to transfer
    #[error("{} object(s) failed to transfer:{}", .failures.len(), format_failures(.failures))]
    BatchIncomplete {
        /// Every per-object failure recorded during the batch
        failures: Vec<TransferFailure>,
    },

    /// The storage capability rejected a request
    #[error("Storage error: {message}")]
    Storage {
        /// Error message from the storage backend
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message describing the configuration issue
        message: String,
    },

    /// Operation cancelled
    #[error("Operation cancelled")]
    Cancelled,

    /// I/O operation failed
    #[error("I/O error: {message}")]
    Io {
        /// Error message from the I/O operation
        message: String,
    },

    /// Generic error with custom message
    #[error("{message}")]
    Other {
        /// Custom error message
        message: String,
    },
}

fn format_failures(failures: &[TransferFailure]) -> String {
    failures.iter().map(|f| format!("\n  {}", f)).collect()
}

/// Error kind for categorizing errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Local filesystem errors
    Filesystem,
    /// Remote listing errors
    Listing,
    /// Single-object transfer errors
    Transfer,
    /// Aggregated transfer errors
    BatchIncomplete,
    /// Storage backend errors
    Storage,
    /// Configuration errors
    Config,
    /// Cancellation
    Cancelled,
    /// Other I/O errors
    Io,
    /// Other errors
    Other,
}

impl Error {
    /// Get the error kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Filesystem { .. } => ErrorKind::Filesystem,
            Self::Listing { .. } => ErrorKind::Listing,
            Self::Transfer(_) => ErrorKind::Transfer,
            Self::BatchIncomplete { .. } => ErrorKind::BatchIncomplete,
            Self::Storage { .. } => ErrorKind::Storage,
            Self::Config { .. } => ErrorKind::Config,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Io { .. } => ErrorKind::Io,
            Self::Other { .. } => ErrorKind::Other,
        }
    }

    /// Get the error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Filesystem { .. } | Self::Listing { .. } => ErrorSeverity::High,
            Self::Config { .. } => ErrorSeverity::High,
            Self::Transfer(_) => ErrorSeverity::Medium,
            Self::BatchIncomplete { .. } => ErrorSeverity::Medium,
            Self::Storage { .. } => ErrorSeverity::Medium,
            Self::Cancelled => ErrorSeverity::Low,
            Self::Io { .. } => ErrorSeverity::Medium,
            Self::Other { .. } => ErrorSeverity::Medium,
        }
    }

    /// Whether this error aborts a sync before any transfer begins
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Filesystem { .. } | Self::Listing { .. } | Self::Config { .. }
        )
    }

    /// Check if retrying the failed work could succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Transfer(_) | Self::BatchIncomplete { .. } | Self::Storage { .. } => true,
            Self::Io { message } => {
                message.contains("Interrupted")
                    || message.contains("WouldBlock")
                    || message.contains("TimedOut")
            }
            Self::Filesystem { .. } | Self::Listing { .. } | Self::Config { .. } => false,
            Self::Cancelled => false,
            Self::Other { .. } => true,
        }
    }

    /// Destination identifiers of every failed object, for targeted retries
    pub fn failed_keys(&self) -> Vec<&str> {
        match self {
            Self::Transfer(failure) => vec![failure.destination.as_str()],
            Self::BatchIncomplete { failures } => {
                failures.iter().map(|f| f.destination.as_str()).collect()
            }
            _ => Vec::new(),
        }
    }

    /// Create a new filesystem error
    pub fn filesystem<P: Into<PathBuf>, S: fmt::Display>(path: P, message: S) -> Self {
        Self::Filesystem {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Create a new listing error
    pub fn listing<P: Into<String>, S: fmt::Display>(prefix: P, message: S) -> Self {
        Self::Listing {
            prefix: prefix.into(),
            message: message.to_string(),
        }
    }

    /// Create a new storage error
    pub fn storage<S: Into<String>>(message: S) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn other<S: Into<String>>(message: S) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Io {
            message: error.to_string(),
        }
    }
}
