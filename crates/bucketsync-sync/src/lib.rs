//! Differential synchronization between a local tree and an object-storage prefix
//!
//! This crate mirrors a directory into a bucket prefix (or the reverse) while
//! transferring as little as possible:
//!
//! - **Snapshots**: the local tree is walked and the remote prefix is listed concurrently
//! - **Planning**: keys are classified as transfer, skip or delete; content is
//!   only fingerprinted when sizes agree
//! - **ETag fingerprints**: local files are hashed the way S3 computes ETags,
//!   including multipart uploads
//! - **Bounded execution**: transfers run with a configurable degree of
//!   parallelism, and one failed key never aborts the others
//! - **Progress Tracking**: real-time events for front ends
//!
//! # Examples
//!
//! ```rust
//! use bucketsync_sync::{MemoryObjectStore, SyncEngine, SyncOptions, SyncRequest};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(MemoryObjectStore::new("my-bucket"));
//! let engine = SyncEngine::new(store);
//! let request = SyncRequest::upload("public", "www").with_options(SyncOptions::additive());
//! let report = engine.sync(request).await?;
//! println!(
//!     "Transferred {} files, {} bytes",
//!     report.stats.files_transferred, report.stats.bytes_transferred
//! );
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod engine;
pub mod executor;
pub mod fingerprint;
pub mod keys;
pub mod listing;
pub mod memory;
pub mod planner;
pub mod progress;
pub mod scanner;

pub use engine::{SyncEngine, SyncOptions, SyncRequest};
pub use executor::{content_type_for, ExecutorOptions, SyncTarget, TransferExecutor};
pub use fingerprint::ContentFingerprint;
pub use listing::RemoteListingReader;
pub use memory::{MemoryObjectStore, StoredObject};
pub use planner::{PlanOptions, SyncPlanner};
pub use progress::{ProgressEvent, ProgressReporter, SyncPhase, SyncProgress};
pub use scanner::LocalTreeScanner;
