//! Reconciliation of source and destination snapshots into a sync plan

use crate::fingerprint::ContentFingerprint;
use bucketsync_types::{
    Error, FileMap, FileRecord, Fingerprint, Result, SyncDirection, SyncPlan, TransferItem,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Plan-building options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanOptions {
    /// Schedule destination records without a source counterpart for deletion
    pub delete_extra: bool,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self { delete_extra: true }
    }
}

/// Builds a [`SyncPlan`] from two snapshots
#[derive(Debug, Clone, Default)]
pub struct SyncPlanner {
    fingerprint: ContentFingerprint,
    options: PlanOptions,
    cancel: CancellationToken,
}

impl SyncPlanner {
    /// Create a planner
    pub fn new(fingerprint: ContentFingerprint, options: PlanOptions) -> Self {
        Self {
            fingerprint,
            options,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop before fingerprinting the next file once `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Reconcile `source` against `destination`.
    ///
    /// For uploads the source is the local tree; for downloads it is the
    /// remote listing. Content is only fingerprinted when sizes match, and
    /// always on the local side of the pair. The only error is
    /// [`Error::Cancelled`].
    pub async fn plan(
        &self,
        direction: SyncDirection,
        source: &FileMap,
        destination: &FileMap,
    ) -> Result<SyncPlan> {
        let mut plan = SyncPlan::new(direction);
        let mut unmatched = destination.clone();

        for (key, source_record) in source {
            let transfer = match unmatched.remove(key) {
                None => {
                    debug!(key = %key, "New at source");
                    true
                }
                Some(destination_record) if destination_record.size != source_record.size => {
                    debug!(
                        key = %key,
                        source_size = source_record.size,
                        destination_size = destination_record.size,
                        "Size differs"
                    );
                    true
                }
                Some(destination_record) => {
                    if self.cancel.is_cancelled() {
                        return Err(Error::Cancelled);
                    }
                    let (local, remote) = if direction.source_is_local() {
                        (source_record, &destination_record)
                    } else {
                        (&destination_record, source_record)
                    };
                    !self.content_matches(local, remote).await
                }
            };

            if transfer {
                plan.to_transfer.push(TransferItem {
                    source: source_record.clone(),
                    destination_key: key.clone(),
                });
            } else {
                debug!(key = %key, "Identical, skipping");
                plan.skipped.push(key.clone());
            }
        }

        if self.options.delete_extra {
            plan.to_delete = unmatched.into_values().collect();
        }

        info!(
            direction = %direction,
            transfer = plan.to_transfer.len(),
            skip = plan.skipped.len(),
            delete = plan.to_delete.len(),
            "Built sync plan"
        );
        Ok(plan)
    }

    async fn content_matches(&self, local: &FileRecord, remote: &FileRecord) -> bool {
        let Some(remote_tag) = remote.identity_tag.as_deref() else {
            return false;
        };

        let fingerprint = match (&local.identity_tag, &local.absolute_location) {
            (Some(tag), _) => Fingerprint::Known(tag.clone()),
            (None, Some(path)) => self.fingerprint.fingerprint_file(path).await,
            (None, None) => Fingerprint::Unknown,
        };

        let matches = fingerprint.matches(remote_tag);
        debug!(
            key = %local.relative_key,
            local = %fingerprint,
            remote = %remote_tag,
            matches,
            "Compared fingerprints"
        );
        matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeMap;
    use std::fs;
    use tempfile::TempDir;

    fn local(key: &str, size: u64, tag: &str) -> (String, FileRecord) {
        (
            key.to_string(),
            FileRecord::local(key, size, format!("/nonexistent/{}", key)).with_identity_tag(tag),
        )
    }

    fn remote(key: &str, size: u64, tag: &str) -> (String, FileRecord) {
        (key.to_string(), FileRecord::remote(key, size, tag))
    }

    fn transfer_keys(plan: &SyncPlan) -> Vec<&str> {
        plan.to_transfer
            .iter()
            .map(|item| item.destination_key.as_str())
            .collect()
    }

    fn delete_keys(plan: &SyncPlan) -> Vec<&str> {
        plan.to_delete
            .iter()
            .map(|record| record.relative_key.as_str())
            .collect()
    }

    #[tokio::test]
    async fn test_new_file_is_transferred() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("x.txt");
        fs::write(&path, b"0123456789").unwrap();

        let source = FileMap::from([("x.txt".to_string(), FileRecord::local("x.txt", 10, &path))]);
        let plan = SyncPlanner::default()
            .plan(SyncDirection::Upload, &source, &FileMap::new())
            .await
            .unwrap();

        assert_eq!(transfer_keys(&plan), vec!["x.txt"]);
        assert!(plan.to_delete.is_empty());
        assert_eq!(plan.skipped_count(), 0);
    }

    #[tokio::test]
    async fn test_identical_file_is_skipped() {
        let source = FileMap::from([local("x.txt", 10, "A")]);
        let destination = FileMap::from([remote("x.txt", 10, "A")]);

        let plan = SyncPlanner::default()
            .plan(SyncDirection::Upload, &source, &destination)
            .await
            .unwrap();

        assert!(plan.to_transfer.is_empty());
        assert_eq!(plan.skipped_count(), 1);
        assert_eq!(plan.total_work(), 1);
    }

    #[tokio::test]
    async fn test_tag_mismatch_is_transferred() {
        let source = FileMap::from([local("x.txt", 10, "A")]);
        let destination = FileMap::from([remote("x.txt", 10, "B")]);

        let plan = SyncPlanner::default()
            .plan(SyncDirection::Upload, &source, &destination)
            .await
            .unwrap();

        assert_eq!(transfer_keys(&plan), vec!["x.txt"]);
        assert_eq!(plan.skipped_count(), 0);
    }

    #[tokio::test]
    async fn test_size_mismatch_skips_fingerprinting() {
        let source = FileMap::from([local("x.txt", 11, "A")]);
        let destination = FileMap::from([remote("x.txt", 10, "A")]);

        let plan = SyncPlanner::default()
            .plan(SyncDirection::Upload, &source, &destination)
            .await
            .unwrap();

        assert_eq!(transfer_keys(&plan), vec!["x.txt"]);
    }

    #[tokio::test]
    async fn test_unreadable_local_file_is_transferred() {
        let source = FileMap::from([(
            "x.txt".to_string(),
            FileRecord::local("x.txt", 0, "/nonexistent/bucketsync/x.txt"),
        )]);
        let destination = FileMap::from([remote("x.txt", 0, "\"d41d8cd98f00b204e9800998ecf8427e\"")]);

        let plan = SyncPlanner::default()
            .plan(SyncDirection::Upload, &source, &destination)
            .await
            .unwrap();

        assert_eq!(transfer_keys(&plan), vec!["x.txt"]);
    }

    #[tokio::test]
    async fn test_fingerprints_local_file_on_size_match() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("hello.txt");
        fs::write(&path, b"hello").unwrap();

        let source = FileMap::from([(
            "hello.txt".to_string(),
            FileRecord::local("hello.txt", 5, &path),
        )]);
        let destination = FileMap::from([remote(
            "hello.txt",
            5,
            "\"5d41402abc4b2a76b9719d911017c592\"",
        )]);

        let plan = SyncPlanner::default()
            .plan(SyncDirection::Upload, &source, &destination)
            .await
            .unwrap();

        assert!(plan.to_transfer.is_empty());
        assert_eq!(plan.skipped, vec!["hello.txt"]);
    }

    #[tokio::test]
    async fn test_deletion_completeness() {
        let source = FileMap::from([local("a", 1, "A")]);
        let destination = FileMap::from([remote("a", 1, "A"), remote("b", 1, "B"), remote("c", 1, "C")]);

        let plan = SyncPlanner::default()
            .plan(SyncDirection::Upload, &source, &destination)
            .await
            .unwrap();

        assert_eq!(delete_keys(&plan), vec!["b", "c"]);
        assert!(plan.to_transfer.is_empty());
    }

    #[tokio::test]
    async fn test_empty_source_deletes_everything() {
        let destination = FileMap::from([remote("a", 1, "A"), remote("b", 2, "B")]);

        let plan = SyncPlanner::default()
            .plan(SyncDirection::Upload, &FileMap::new(), &destination)
            .await
            .unwrap();

        assert!(plan.to_transfer.is_empty());
        assert_eq!(delete_keys(&plan), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_deletion_can_be_disabled() {
        let destination = FileMap::from([remote("a", 1, "A"), remote("b", 2, "B")]);
        let planner = SyncPlanner::new(
            ContentFingerprint::default(),
            PlanOptions {
                delete_extra: false,
            },
        );

        let plan = planner
            .plan(SyncDirection::Upload, &FileMap::new(), &destination)
            .await
            .unwrap();

        assert!(plan.is_empty());
    }

    #[tokio::test]
    async fn test_download_fingerprints_local_destination() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("hello.txt");
        fs::write(&path, b"hello").unwrap();

        let source = FileMap::from([
            remote("hello.txt", 5, "\"5d41402abc4b2a76b9719d911017c592\""),
            remote("new.txt", 3, "\"x\""),
        ]);
        let destination = FileMap::from([
            ("hello.txt".to_string(), FileRecord::local("hello.txt", 5, &path)),
            local("stale.txt", 1, "S"),
        ]);

        let plan = SyncPlanner::default()
            .plan(SyncDirection::Download, &source, &destination)
            .await
            .unwrap();

        assert_eq!(plan.direction, SyncDirection::Download);
        assert_eq!(plan.skipped, vec!["hello.txt"]);
        assert_eq!(transfer_keys(&plan), vec!["new.txt"]);
        assert_eq!(delete_keys(&plan), vec!["stale.txt"]);
        assert!(!plan.to_transfer[0].source.is_local());
    }

    #[tokio::test]
    async fn test_cancelled_before_fingerprinting() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("hello.txt");
        fs::write(&path, b"hello").unwrap();

        let source = FileMap::from([(
            "hello.txt".to_string(),
            FileRecord::local("hello.txt", 5, &path),
        )]);
        let destination = FileMap::from([remote("hello.txt", 5, "\"x\"")]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let error = SyncPlanner::default()
            .with_cancellation(cancel)
            .plan(SyncDirection::Upload, &source, &destination)
            .await
            .unwrap_err();

        assert!(matches!(error, Error::Cancelled));
    }

    #[tokio::test]
    async fn test_cancellation_without_size_matches_still_plans() {
        let source = FileMap::from([local("new.txt", 3, "A")]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let plan = SyncPlanner::default()
            .with_cancellation(cancel)
            .plan(SyncDirection::Upload, &source, &FileMap::new())
            .await
            .unwrap();

        assert_eq!(transfer_keys(&plan), vec!["new.txt"]);
    }

    fn apply(plan: &SyncPlan, source: &FileMap, destination: &mut FileMap) {
        for item in &plan.to_transfer {
            let record = &source[&item.destination_key];
            let tag = record.identity_tag.clone().unwrap_or_default();
            destination.insert(
                item.destination_key.clone(),
                FileRecord::remote(item.destination_key.clone(), record.size, tag),
            );
        }
        for record in &plan.to_delete {
            destination.remove(&record.relative_key);
        }
    }

    fn snapshot(entries: BTreeMap<String, (u64, u8)>, side_is_local: bool) -> FileMap {
        entries
            .into_iter()
            .map(|(key, (size, tag))| {
                let tag = format!("\"{}\"", tag);
                let record = if side_is_local {
                    FileRecord::local(key.clone(), size, format!("/nonexistent/{}", key))
                        .with_identity_tag(tag)
                } else {
                    FileRecord::remote(key.clone(), size, tag)
                };
                (key, record)
            })
            .collect()
    }

    proptest! {
        #[test]
        fn test_plan_converges_after_apply(
            local_entries in proptest::collection::btree_map("[a-d]{1,2}", (0u64..4, 0u8..3), 0..8),
            remote_entries in proptest::collection::btree_map("[a-d]{1,2}", (0u64..4, 0u8..3), 0..8),
        ) {
            let planner = SyncPlanner::default();
            let source = snapshot(local_entries, true);
            let mut destination = snapshot(remote_entries, false);

            let first = tokio_test::block_on(planner.plan(SyncDirection::Upload, &source, &destination)).unwrap();
            for item in &first.to_transfer {
                prop_assert!(!first.to_delete.iter().any(|r| r.relative_key == item.destination_key));
            }
            for record in &first.to_delete {
                prop_assert!(!source.contains_key(&record.relative_key));
            }

            apply(&first, &source, &mut destination);

            let second = tokio_test::block_on(planner.plan(SyncDirection::Upload, &source, &destination)).unwrap();
            prop_assert!(second.to_transfer.is_empty());
            prop_assert!(second.to_delete.is_empty());
            prop_assert_eq!(second.skipped_count(), source.len());
        }
    }
}
