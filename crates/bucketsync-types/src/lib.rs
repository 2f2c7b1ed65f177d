//! Core type system and error handling for bucketsync
//!
//! This crate provides the foundational types, error handling, and shared data structures
//! used throughout the bucketsync workspace. It includes:
//!
//! - **Error handling**: Fatal and per-object failure kinds with severity levels
//! - **Core types**: File records, sync plans, listing pages and statistics
//! - **Traits**: Async storage capabilities the sync engine is written against
//! - **Configuration**: Validated chunk size and concurrency newtypes
//!
//! # Features
//!
//! - `serde` (default): Enable serialization support
//!
//! # Examples
//!
//! ```rust
//! use bucketsync_types::{FileRecord, FileMap, Result, SyncStats};
//!
//! fn example_operation() -> Result<SyncStats> {
//!     let mut files = FileMap::new();
//!     files.insert("x.txt".to_string(), FileRecord::local("x.txt", 3, "/tmp/site/x.txt"));
//!
//!     let mut stats = SyncStats::new();
//!     stats.files_transferred = files.len() as u64;
//!     stats.bytes_transferred = 3;
//!     Ok(stats)
//! }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod result;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use config::{ChunkSize, Concurrency};
pub use error::{Error, ErrorKind, ErrorSeverity, TransferFailure};
pub use result::Result;
pub use traits::*;
pub use types::*;
