//! Progress tracking for sync operations
//!
//! The total amount of work (transfers plus skips) is known once the plan is
//! built, so consumers can render determinate progress from the first event.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};

/// Progress information for a sync operation
#[derive(Debug, Clone)]
pub struct SyncProgress {
    /// Current operation ID
    pub operation_id: uuid::Uuid,
    /// Current phase of synchronization
    pub phase: SyncPhase,
    /// Work units processed so far (transfers attempted plus skips)
    pub items_processed: u64,
    /// Total work units in the plan
    pub total_items: u64,
    /// Bytes transferred so far
    pub bytes_processed: u64,
    /// Total bytes scheduled for transfer
    pub total_bytes: u64,
    /// Current transfer rate (bytes per second)
    pub transfer_rate: f64,
    /// Estimated time remaining
    pub eta: Option<Duration>,
    /// Start time of the operation
    pub start_time: Instant,
    /// Number of failed transfers
    pub errors_count: u64,
}

/// Synchronization phases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// Initializing synchronization
    Initializing,
    /// Scanning the local tree and listing the remote prefix
    Scanning,
    /// Reconciling the two snapshots
    Planning,
    /// Transferring objects
    Transferring,
    /// Removing destination objects with no source counterpart
    Deleting,
    /// Completed
    Completed,
    /// Failed
    Failed,
}

impl SyncProgress {
    /// Create a new sync progress
    pub fn new(operation_id: uuid::Uuid) -> Self {
        Self {
            operation_id,
            phase: SyncPhase::Initializing,
            items_processed: 0,
            total_items: 0,
            bytes_processed: 0,
            total_bytes: 0,
            transfer_rate: 0.0,
            eta: None,
            start_time: Instant::now(),
            errors_count: 0,
        }
    }

    /// Update the current phase
    pub fn set_phase(&mut self, phase: SyncPhase) {
        self.phase = phase;
        debug!("Sync phase changed to: {:?}", phase);
    }

    /// Set total counts
    pub fn set_totals(&mut self, total_items: u64, total_bytes: u64) {
        self.total_items = total_items;
        self.total_bytes = total_bytes;
    }

    /// Record processed work and refresh the rate and ETA
    pub fn advance(&mut self, items: u64, bytes: u64) {
        self.items_processed += items;
        self.bytes_processed += bytes;

        let elapsed = self.start_time.elapsed();
        if elapsed.as_secs_f64() > 0.0 {
            self.transfer_rate = self.bytes_processed as f64 / elapsed.as_secs_f64();
        }

        if self.transfer_rate > 0.0 && self.total_bytes > self.bytes_processed {
            let remaining_bytes = self.total_bytes - self.bytes_processed;
            self.eta = Some(Duration::from_secs_f64(
                remaining_bytes as f64 / self.transfer_rate,
            ));
        }
    }

    /// Get progress percentage over work units
    pub fn item_progress(&self) -> f64 {
        if self.total_items > 0 {
            (self.items_processed as f64 / self.total_items as f64) * 100.0
        } else {
            0.0
        }
    }

    /// Get elapsed time
    pub fn elapsed_time(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Check if sync is complete
    pub fn is_complete(&self) -> bool {
        matches!(self.phase, SyncPhase::Completed | SyncPhase::Failed)
    }

    /// Format transfer rate as human-readable string
    pub fn format_transfer_rate(&self) -> String {
        format_bytes_per_second(self.transfer_rate)
    }

    /// Format ETA as human-readable string
    pub fn format_eta(&self) -> String {
        match self.eta {
            Some(eta) => format_duration(eta),
            None => "Unknown".to_string(),
        }
    }
}

/// Progress event types
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Phase changed
    PhaseChanged(SyncPhase),
    /// Plan built; totals are final
    Started {
        /// Transfers plus skips
        total_items: u64,
        /// Bytes scheduled for transfer
        total_bytes: u64,
    },
    /// A key classified as identical during planning
    Skipped(String),
    /// One planned transfer finished, successfully or not
    ItemProcessed {
        /// Relative key of the object
        key: String,
        /// Bytes moved
        bytes: u64,
        /// Whether the transfer succeeded
        success: bool,
    },
    /// A best-effort deletion did not go through
    DeletionWarning(String),
    /// Sync completed
    Completed(SyncProgress),
    /// Sync failed
    Failed(String),
}

/// Progress reporter for sync operations.
///
/// Events are only sent once a receiver has been taken; until then the
/// reporter just keeps the shared [`SyncProgress`] up to date.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    progress: Arc<RwLock<SyncProgress>>,
    event_tx: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl ProgressReporter {
    /// Create a new progress reporter
    pub fn new(operation_id: uuid::Uuid) -> Self {
        Self {
            progress: Arc::new(RwLock::new(SyncProgress::new(operation_id))),
            event_tx: None,
        }
    }

    /// Get the current progress
    pub async fn get_progress(&self) -> SyncProgress {
        self.progress.read().await.clone()
    }

    /// Take the event receiver (can only be called once, and only on a
    /// reporter whose clones were made afterwards)
    pub fn take_event_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<ProgressEvent>> {
        if self.event_tx.is_some() {
            return None;
        }
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        self.event_tx = Some(event_tx);
        Some(event_rx)
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(event_tx) = &self.event_tx {
            let _ = event_tx.send(event);
        }
    }

    /// Start tracking a new operation, discarding the previous one's counters
    pub async fn begin(&self, operation_id: uuid::Uuid) {
        *self.progress.write().await = SyncProgress::new(operation_id);
    }

    /// Update the current phase
    pub async fn set_phase(&self, phase: SyncPhase) {
        self.progress.write().await.set_phase(phase);
        self.emit(ProgressEvent::PhaseChanged(phase));
    }

    /// Announce the plan totals before any work starts
    pub async fn started(&self, total_items: u64, total_bytes: u64) {
        self.progress.write().await.set_totals(total_items, total_bytes);
        self.emit(ProgressEvent::Started {
            total_items,
            total_bytes,
        });
    }

    /// Report a key skipped as identical
    pub async fn skipped(&self, key: &str) {
        self.progress.write().await.advance(1, 0);
        self.emit(ProgressEvent::Skipped(key.to_string()));
    }

    /// Report one processed transfer
    pub async fn item_processed(&self, key: &str, bytes: u64, success: bool) {
        {
            let mut progress = self.progress.write().await;
            progress.advance(1, bytes);
            if !success {
                progress.errors_count += 1;
            }
        }

        self.emit(ProgressEvent::ItemProcessed {
            key: key.to_string(),
            bytes,
            success,
        });
    }

    /// Report a deletion that did not go through
    pub fn deletion_warning(&self, message: String) {
        self.emit(ProgressEvent::DeletionWarning(message));
    }

    /// Report sync completed
    pub async fn completed(&self) {
        let progress = {
            let mut progress = self.progress.write().await;
            progress.set_phase(SyncPhase::Completed);
            progress.clone()
        };

        self.emit(ProgressEvent::Completed(progress));
        info!("Sync completed");
    }

    /// Report sync failed
    pub async fn failed(&self, error: String) {
        self.progress.write().await.set_phase(SyncPhase::Failed);
        self.emit(ProgressEvent::Failed(error));
    }
}

/// Format bytes per second as human-readable string
fn format_bytes_per_second(bytes_per_sec: f64) -> String {
    const UNITS: &[&str] = &["B/s", "KB/s", "MB/s", "GB/s", "TB/s"];
    let mut size = bytes_per_sec;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.1} {}", size, UNITS[unit_index])
}

/// Format duration as human-readable string
fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_progress_creation() {
        let operation_id = uuid::Uuid::new_v4();
        let progress = SyncProgress::new(operation_id);

        assert_eq!(progress.operation_id, operation_id);
        assert_eq!(progress.phase, SyncPhase::Initializing);
        assert_eq!(progress.items_processed, 0);
        assert_eq!(progress.bytes_processed, 0);
        assert!(!progress.is_complete());
    }

    #[test]
    fn test_progress_calculations() {
        let mut progress = SyncProgress::new(uuid::Uuid::new_v4());
        progress.set_totals(4, 1000);
        progress.advance(1, 0);
        progress.advance(1, 500);

        assert_eq!(progress.item_progress(), 50.0);
        assert_eq!(progress.bytes_processed, 500);
    }

    #[tokio::test]
    async fn test_skips_are_reported_before_items() {
        let mut reporter = ProgressReporter::new(uuid::Uuid::new_v4());
        let mut event_rx = reporter.take_event_receiver().unwrap();

        reporter.started(3, 20).await;
        reporter.skipped("same.txt").await;
        reporter.item_processed("a.txt", 10, true).await;
        reporter.item_processed("b.txt", 0, false).await;

        assert!(matches!(
            event_rx.recv().await.unwrap(),
            ProgressEvent::Started {
                total_items: 3,
                total_bytes: 20
            }
        ));
        assert!(matches!(
            event_rx.recv().await.unwrap(),
            ProgressEvent::Skipped(key) if key == "same.txt"
        ));
        assert!(matches!(
            event_rx.recv().await.unwrap(),
            ProgressEvent::ItemProcessed { success: true, .. }
        ));

        let progress = reporter.get_progress().await;
        assert_eq!(progress.items_processed, 3);
        assert_eq!(progress.errors_count, 1);
    }

    #[tokio::test]
    async fn test_clone_shares_state_and_sender() {
        let mut reporter = ProgressReporter::new(uuid::Uuid::new_v4());
        let mut event_rx = reporter.take_event_receiver().unwrap();
        let mut clone = reporter.clone();
        assert!(clone.take_event_receiver().is_none());
        assert!(reporter.take_event_receiver().is_none());

        clone.set_phase(SyncPhase::Transferring).await;
        assert_eq!(reporter.get_progress().await.phase, SyncPhase::Transferring);
        assert!(matches!(
            event_rx.recv().await.unwrap(),
            ProgressEvent::PhaseChanged(SyncPhase::Transferring)
        ));
    }

    #[tokio::test]
    async fn test_no_events_are_kept_without_a_receiver() {
        let reporter = ProgressReporter::new(uuid::Uuid::new_v4());

        reporter.started(1, 10).await;
        reporter.item_processed("a.txt", 10, true).await;
        reporter.completed().await;

        assert!(reporter.event_tx.is_none());
        assert_eq!(reporter.get_progress().await.items_processed, 1);
    }

    #[tokio::test]
    async fn test_begin_resets_counters() {
        let reporter = ProgressReporter::new(uuid::Uuid::new_v4());
        reporter.started(2, 10).await;
        reporter.skipped("a.txt").await;
        reporter.item_processed("b.txt", 10, false).await;

        let next = uuid::Uuid::new_v4();
        reporter.begin(next).await;
        reporter.started(1, 0).await;
        reporter.skipped("a.txt").await;

        let progress = reporter.get_progress().await;
        assert_eq!(progress.operation_id, next);
        assert_eq!(progress.items_processed, 1);
        assert_eq!(progress.total_items, 1);
        assert_eq!(progress.bytes_processed, 0);
        assert_eq!(progress.errors_count, 0);
        assert_eq!(progress.item_progress(), 100.0);
    }

    #[test]
    fn test_format_functions() {
        assert_eq!(format_bytes_per_second(1024.0), "1.0 KB/s");
        assert_eq!(format_bytes_per_second(1048576.0), "1.0 MB/s");

        assert_eq!(format_duration(Duration::from_secs(65)), "1m 5s");
        assert_eq!(format_duration(Duration::from_secs(3665)), "1h 1m 5s");
    }
}
