//! Plan execution against an object store

use crate::keys;
use crate::progress::{ProgressReporter, SyncPhase};
use bucketsync_types::{
    Concurrency, DeletionWarning, Error, FileRecord, ObjectStore, PutObject, Result,
    SyncDirection, SyncPlan, SyncReport, SyncStats, TransferFailure, TransferItem,
    TransferOutcome,
};
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Content type for extensions with no known MIME type
pub const DEFAULT_CONTENT_TYPE: &str = "binary/octet-stream";

const PARTIAL_SUFFIX: &str = ".partial";

/// The two roots a plan's relative keys are resolved against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTarget {
    /// Local directory
    pub local_root: PathBuf,
    /// Key prefix in the bucket
    pub prefix: String,
}

impl SyncTarget {
    /// Create a target
    pub fn new(local_root: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            local_root: local_root.into(),
            prefix: keys::normalize_prefix(&prefix.into()),
        }
    }

    /// Full bucket key for a relative key
    pub fn remote_key(&self, relative_key: &str) -> String {
        keys::remote_key(&self.prefix, relative_key)
    }

    /// Local path for a relative key
    pub fn local_path(&self, relative_key: &str) -> Result<PathBuf> {
        keys::local_path(&self.local_root, relative_key)
    }
}

/// Execution options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutorOptions {
    /// Log what would happen without touching either side
    pub dry_run: bool,
    /// Objects transferred at the same time
    pub concurrency: Concurrency,
    /// Canned ACL applied to uploads
    pub acl: Option<String>,
}

/// Drives a [`SyncPlan`] through an [`ObjectStore`]
pub struct TransferExecutor<'a, S: ObjectStore + ?Sized> {
    store: &'a S,
    target: SyncTarget,
    options: ExecutorOptions,
    cancel: CancellationToken,
    progress: Option<ProgressReporter>,
}

impl<'a, S: ObjectStore + ?Sized> TransferExecutor<'a, S> {
    /// Create an executor
    pub fn new(store: &'a S, target: SyncTarget, options: ExecutorOptions) -> Self {
        Self {
            store,
            target,
            options,
            cancel: CancellationToken::new(),
            progress: None,
        }
    }

    /// Stop once `cancel` fires. Uploads hand the token to the store, which
    /// cleans up its own partial state; downloads remove their `.partial` file.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Send progress events to `progress`
    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Execute the plan.
    ///
    /// Every transfer is attempted. If any failed, the result is
    /// [`Error::BatchIncomplete`] naming each failed object and deletions are
    /// not attempted. Otherwise deletions run best-effort and their failures
    /// are returned as warnings in the report.
    pub async fn execute(&self, plan: SyncPlan) -> Result<SyncReport> {
        let start = Instant::now();
        let direction = plan.direction;
        let mut stats = SyncStats::new();
        stats.files_skipped = plan.skipped_count() as u64;

        if let Some(progress) = &self.progress {
            progress
                .started(plan.total_work(), plan.bytes_to_transfer())
                .await;
            for key in &plan.skipped {
                progress.skipped(key).await;
            }
            progress.set_phase(SyncPhase::Transferring).await;
        }

        let outcomes: Vec<Result<TransferOutcome>> = stream::iter(plan.to_transfer)
            .map(|item| self.transfer_one(direction, item))
            .buffer_unordered(self.options.concurrency.get())
            .collect()
            .await;

        let mut failures = Vec::new();
        for outcome in outcomes {
            match outcome? {
                TransferOutcome::Transferred { bytes, .. } => {
                    stats.files_transferred += 1;
                    stats.bytes_transferred += bytes;
                }
                TransferOutcome::Failed(failure) => failures.push(failure),
            }
        }

        if !failures.is_empty() {
            failures.sort_by(|a, b| a.destination.cmp(&b.destination));
            error!(
                failed = failures.len(),
                transferred = stats.files_transferred,
                "Some objects failed to transfer; skipping deletions"
            );
            return Err(Error::BatchIncomplete { failures });
        }

        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let mut deletion_warnings = Vec::new();
        if !plan.to_delete.is_empty() {
            if let Some(progress) = &self.progress {
                progress.set_phase(SyncPhase::Deleting).await;
            }
            let (deleted, warnings) = self.delete_extra(direction, &plan.to_delete).await?;
            stats.files_deleted = deleted;
            stats.deletion_warnings = warnings.len() as u64;
            deletion_warnings = warnings;
        }

        stats.duration = start.elapsed();
        info!(
            direction = %direction,
            dry_run = self.options.dry_run,
            transferred = stats.files_transferred,
            bytes = stats.bytes_transferred,
            skipped = stats.files_skipped,
            deleted = stats.files_deleted,
            "Executed sync plan"
        );

        Ok(SyncReport {
            direction,
            dry_run: self.options.dry_run,
            stats,
            deletion_warnings,
        })
    }

    /// Transfer one item. The only error is [`Error::Cancelled`]; every
    /// other failure becomes [`TransferOutcome::Failed`].
    async fn transfer_one(
        &self,
        direction: SyncDirection,
        item: TransferItem,
    ) -> Result<TransferOutcome> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let key = item.destination_key.clone();
        let outcome = match direction {
            SyncDirection::Upload => {
                let remote_key = self.target.remote_key(&key);
                let result = if self.options.dry_run {
                    info!(key = %remote_key, bytes = item.source.size, "DRY RUN: would upload");
                    Ok(item.source.size)
                } else {
                    // the store watches the token so it can clean up partial uploads
                    self.upload(&item, &remote_key).await
                };
                self.outcome(remote_key, result)
            }
            SyncDirection::Download => match self.target.local_path(&key) {
                Err(e) => self.outcome(key.clone(), Err(e)),
                Ok(path) => {
                    let destination = path.display().to_string();
                    let result = if self.options.dry_run {
                        info!(path = %destination, bytes = item.source.size, "DRY RUN: would download");
                        Ok(item.source.size)
                    } else {
                        tokio::select! {
                            biased;
                            () = self.cancel.cancelled() => {
                                let _ = fs::remove_file(partial_path(&path)).await;
                                return Err(Error::Cancelled);
                            }
                            result = self.download(&item, &path) => result,
                        }
                    };
                    self.outcome(destination, result)
                }
            },
        };

        let outcome = outcome?;

        if let Some(progress) = &self.progress {
            let bytes = match &outcome {
                TransferOutcome::Transferred { bytes, .. } => *bytes,
                TransferOutcome::Failed(_) => 0,
            };
            progress
                .item_processed(&key, bytes, outcome.is_success())
                .await;
        }

        Ok(outcome)
    }

    fn outcome(&self, destination: String, result: Result<u64>) -> Result<TransferOutcome> {
        match result {
            Ok(bytes) => {
                if !self.options.dry_run {
                    info!(destination = %destination, bytes, "Transferred");
                }
                Ok(TransferOutcome::Transferred { destination, bytes })
            }
            Err(Error::Cancelled) => Err(Error::Cancelled),
            Err(e) => {
                warn!(destination = %destination, error = %e, "Transfer failed");
                Ok(TransferOutcome::Failed(TransferFailure::new(destination, e)))
            }
        }
    }

    async fn upload(&self, item: &TransferItem, remote_key: &str) -> Result<u64> {
        let path = item
            .source
            .absolute_location
            .as_deref()
            .ok_or_else(|| Error::other(format!("{} has no local path", item.destination_key)))?;

        let file = fs::File::open(path)
            .await
            .map_err(|e| Error::filesystem(path, e))?;
        let content_length = file
            .metadata()
            .await
            .map_err(|e| Error::filesystem(path, e))?
            .len();

        let object = PutObject {
            key: remote_key.to_string(),
            body: Box::new(file),
            content_length,
            content_type: content_type_for(&item.destination_key),
            acl: self.options.acl.clone(),
        };
        debug!(key = %object.key, content_type = %object.content_type, "Uploading");

        self.store.put_object(object, &self.cancel).await?;
        Ok(content_length)
    }

    async fn download(&self, item: &TransferItem, path: &Path) -> Result<u64> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::filesystem(parent, e))?;
        }

        let remote_key = self.target.remote_key(&item.destination_key);
        debug!(key = %remote_key, path = %path.display(), "Downloading");
        let mut body = self.store.get_object(&remote_key).await?;

        let partial = partial_path(path);
        let written = async {
            let mut file = fs::File::create(&partial).await?;
            let written = tokio::io::copy(&mut body, &mut file).await?;
            file.flush().await?;
            file.sync_all().await?;
            Ok::<u64, std::io::Error>(written)
        }
        .await;

        let result = match written {
            Ok(written) if written == item.source.size => fs::rename(&partial, path)
                .await
                .map(|()| written)
                .map_err(|e| Error::filesystem(path, e)),
            Ok(written) => Err(Error::storage(format!(
                "expected {} bytes, received {}",
                item.source.size, written
            ))),
            Err(e) => Err(Error::filesystem(&partial, e)),
        };

        if result.is_err() {
            let _ = fs::remove_file(&partial).await;
        }
        result
    }

    /// Best-effort removal of destination records with no source counterpart.
    /// Returns the number deleted and a warning per record that was not.
    async fn delete_extra(
        &self,
        direction: SyncDirection,
        records: &[FileRecord],
    ) -> Result<(u64, Vec<DeletionWarning>)> {
        if self.options.dry_run {
            for record in records {
                info!(key = %record.relative_key, "DRY RUN: would delete");
            }
            return Ok((records.len() as u64, Vec::new()));
        }

        let mut deleted = 0u64;
        let mut warnings = Vec::new();

        match direction {
            SyncDirection::Upload => {
                let remote_keys: Vec<String> = records
                    .iter()
                    .map(|record| self.target.remote_key(&record.relative_key))
                    .collect();

                for batch in remote_keys.chunks(self.store.max_delete_batch().max(1)) {
                    if self.cancel.is_cancelled() {
                        return Err(Error::Cancelled);
                    }

                    match self.store.delete_objects(batch).await {
                        Ok(outcomes) => {
                            for outcome in outcomes {
                                match outcome.error {
                                    None => {
                                        debug!(key = %outcome.key, "Deleted");
                                        deleted += 1;
                                    }
                                    Some(cause) => warnings.push(DeletionWarning {
                                        key: outcome.key,
                                        cause,
                                    }),
                                }
                            }
                        }
                        Err(e) => warnings.extend(batch.iter().map(|key| DeletionWarning {
                            key: key.clone(),
                            cause: e.to_string(),
                        })),
                    }
                }
            }
            SyncDirection::Download => {
                for record in records {
                    if self.cancel.is_cancelled() {
                        return Err(Error::Cancelled);
                    }

                    let path = match &record.absolute_location {
                        Some(path) => path.clone(),
                        None => match self.target.local_path(&record.relative_key) {
                            Ok(path) => path,
                            Err(e) => {
                                warnings.push(DeletionWarning {
                                    key: record.relative_key.clone(),
                                    cause: e.to_string(),
                                });
                                continue;
                            }
                        },
                    };
                    match fs::remove_file(&path).await {
                        Ok(()) => {
                            debug!(path = %path.display(), "Deleted");
                            deleted += 1;
                            prune_empty_parents(&self.target.local_root, &path).await;
                        }
                        Err(e) => warnings.push(DeletionWarning {
                            key: path.display().to_string(),
                            cause: e.to_string(),
                        }),
                    }
                }
            }
        }

        for warning in &warnings {
            warn!("{}", warning);
            if let Some(progress) = &self.progress {
                progress.deletion_warning(warning.to_string());
            }
        }

        Ok((deleted, warnings))
    }
}

/// MIME type for a key, from its extension
pub fn content_type_for(key: &str) -> String {
    mime_guess::from_path(key)
        .first_raw()
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string()
}

/// Remove the directories a deletion left empty, stopping below `root`
async fn prune_empty_parents(root: &Path, path: &Path) {
    let mut dir = path.parent();
    while let Some(current) = dir {
        if current == root || !current.starts_with(root) {
            break;
        }
        // fails on the first directory that still has entries
        if fs::remove_dir(current).await.is_err() {
            break;
        }
        debug!(path = %current.display(), "Removed empty directory");
        dir = current.parent();
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}
