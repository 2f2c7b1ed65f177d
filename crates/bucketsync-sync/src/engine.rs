//! Main synchronization engine

use crate::{
    executor::{ExecutorOptions, SyncTarget, TransferExecutor},
    fingerprint::ContentFingerprint,
    listing::RemoteListingReader,
    planner::{PlanOptions, SyncPlanner},
    progress::{ProgressEvent, ProgressReporter, SyncPhase, SyncProgress},
    scanner::LocalTreeScanner,
};
use bucketsync_config::Config;
use bucketsync_types::{
    ChunkSize, Concurrency, Error, FileMap, ObjectStore, Result, SyncDirection, SyncReport,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Synchronization request
#[derive(Debug, Clone)]
pub struct SyncRequest {
    /// Which side is the source
    pub direction: SyncDirection,
    /// Local directory
    pub local_root: PathBuf,
    /// Key prefix in the bucket
    pub prefix: String,
    /// Sync options
    pub options: SyncOptions,
    /// Request ID for tracking
    pub request_id: uuid::Uuid,
}

impl SyncRequest {
    /// Mirror `local_root` into `prefix`
    pub fn upload(local_root: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self::new(SyncDirection::Upload, local_root.into(), prefix.into())
    }

    /// Mirror `prefix` into `local_root`
    pub fn download(prefix: impl Into<String>, local_root: impl Into<PathBuf>) -> Self {
        Self::new(SyncDirection::Download, local_root.into(), prefix.into())
    }

    fn new(direction: SyncDirection, local_root: PathBuf, prefix: String) -> Self {
        Self {
            direction,
            local_root,
            prefix,
            options: SyncOptions::default(),
            request_id: uuid::Uuid::new_v4(),
        }
    }

    /// Set sync options
    pub fn with_options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }
}

/// Synchronization options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Dry run (plan and report without side effects)
    pub dry_run: bool,
    /// Delete destination objects that don't exist at the source
    pub delete_extra: bool,
    /// Objects transferred at the same time
    pub concurrency: Concurrency,
    /// Fingerprint chunk size
    pub chunk_size: ChunkSize,
    /// Only consider objects directly under the prefix
    pub delimiter: bool,
    /// Canned ACL applied to uploads
    pub acl: Option<String>,
}

impl SyncOptions {
    /// Options taken from a loaded configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            dry_run: config.sync.dry_run,
            delete_extra: config.sync.delete_extra,
            concurrency: config.sync.concurrency,
            chunk_size: config.sync.chunk_size,
            delimiter: config.sync.delimiter,
            acl: config.storage.acl.clone(),
        }
    }

    /// Create options for additive sync (never delete)
    pub fn additive() -> Self {
        Self {
            delete_extra: false,
            ..Self::default()
        }
    }
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            delete_extra: true,
            concurrency: Concurrency::default(),
            chunk_size: ChunkSize::default(),
            delimiter: false,
            acl: None,
        }
    }
}

/// Main synchronization engine
pub struct SyncEngine {
    store: Arc<dyn ObjectStore>,
    progress: ProgressReporter,
    cancel: CancellationToken,
}

impl SyncEngine {
    /// Create a sync engine over `store`
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            progress: ProgressReporter::new(uuid::Uuid::new_v4()),
            cancel: CancellationToken::new(),
        }
    }

    /// Use `cancel` to abort a running sync
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that aborts a running sync when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Take the progress event receiver (can only be called once)
    pub fn take_event_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<ProgressEvent>> {
        self.progress.take_event_receiver()
    }

    /// Progress of the current (or last) sync
    pub async fn progress(&self) -> SyncProgress {
        self.progress.get_progress().await
    }

    /// Perform synchronization
    pub async fn sync(&self, request: SyncRequest) -> Result<SyncReport> {
        info!(
            request_id = %request.request_id,
            direction = %request.direction,
            local = %request.local_root.display(),
            bucket = %self.store.bucket(),
            prefix = %request.prefix,
            dry_run = request.options.dry_run,
            "Starting sync"
        );

        self.progress.begin(request.request_id).await;
        match self.run(&request).await {
            Ok(report) => {
                self.progress.completed().await;
                Ok(report)
            }
            Err(e) => {
                self.progress.failed(e.to_string()).await;
                Err(e)
            }
        }
    }

    async fn run(&self, request: &SyncRequest) -> Result<SyncReport> {
        let options = &request.options;
        let direction = request.direction;

        // Phase 1: Initialize
        self.progress.set_phase(SyncPhase::Initializing).await;
        Self::validate_local_root(direction, &request.local_root)?;

        // Phase 2: Snapshot both sides before anything is written
        self.progress.set_phase(SyncPhase::Scanning).await;
        let scan = async {
            if direction == SyncDirection::Download && !request.local_root.exists() {
                Ok(FileMap::new())
            } else {
                LocalTreeScanner::new()
                    .with_cancellation(self.cancel.clone())
                    .scan_async(request.local_root.clone())
                    .await
            }
        };
        let listing = RemoteListingReader::new()
            .delimited(options.delimiter)
            .with_cancellation(self.cancel.clone());
        let (mut local, remote) = tokio::try_join!(
            scan,
            listing.list(self.store.as_ref(), &request.prefix)
        )?;

        if options.delimiter {
            local.retain(|key, _| !key.contains('/'));
        }

        // Phase 3: Plan
        self.progress.set_phase(SyncPhase::Planning).await;
        let planner = SyncPlanner::new(
            ContentFingerprint::new(options.chunk_size),
            PlanOptions {
                delete_extra: options.delete_extra,
            },
        )
        .with_cancellation(self.cancel.clone());
        let (source, destination) = match direction {
            SyncDirection::Upload => (&local, &remote),
            SyncDirection::Download => (&remote, &local),
        };
        let plan = planner.plan(direction, source, destination).await?;

        // Phase 4: Execute
        let executor = TransferExecutor::new(
            self.store.as_ref(),
            SyncTarget::new(&request.local_root, request.prefix.as_str()),
            ExecutorOptions {
                dry_run: options.dry_run,
                concurrency: options.concurrency,
                acl: options.acl.clone(),
            },
        )
        .with_cancellation(self.cancel.clone())
        .with_progress(self.progress.clone());

        executor.execute(plan).await
    }

    /// Validate the local root for the given direction
    fn validate_local_root(direction: SyncDirection, root: &Path) -> Result<()> {
        match direction {
            SyncDirection::Upload if !root.exists() => {
                Err(Error::filesystem(root, "source directory does not exist"))
            }
            _ if root.exists() && !root.is_dir() => {
                Err(Error::filesystem(root, "path is not a directory"))
            }
            _ => Ok(()),
        }
    }
}
