//! Progress bar driven by sync engine events

use bucketsync_sync::{ProgressEvent, SyncPhase};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

/// Progress bar sized with the plan's total work
pub struct SyncProgressBar {
    progress_bar: ProgressBar,
}

impl SyncProgressBar {
    /// Create a spinner that turns into a bar once the plan is known
    pub fn new() -> Self {
        let progress_bar = ProgressBar::new_spinner();
        progress_bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        progress_bar.enable_steady_tick(Duration::from_millis(100));

        Self { progress_bar }
    }

    /// Consume events until the engine drops its sender
    pub async fn run(self, mut events: UnboundedReceiver<ProgressEvent>) {
        while let Some(event) = events.recv().await {
            self.handle(event);
        }
    }

    fn handle(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::PhaseChanged(phase) => {
                self.progress_bar.set_message(phase_label(phase).to_string());
            }
            ProgressEvent::Started { total_items, .. } => {
                self.progress_bar.set_style(
                    ProgressStyle::default_bar()
                        .template("{spinner:.green} {msg} [{wide_bar:.cyan/blue}] {pos}/{len} ({eta})")
                        .unwrap_or_else(|_| ProgressStyle::default_bar())
                        .progress_chars("█▉▊▋▌▍▎▏  "),
                );
                self.progress_bar.set_length(total_items);
            }
            ProgressEvent::Skipped(_) => self.progress_bar.inc(1),
            ProgressEvent::ItemProcessed { key, success, .. } => {
                self.progress_bar.inc(1);
                if success {
                    self.progress_bar.set_message(key);
                } else {
                    self.display_error(&format!("{} failed", key));
                }
            }
            ProgressEvent::DeletionWarning(message) => self.display_warning(&message),
            ProgressEvent::Completed(_) => self.progress_bar.finish_with_message("Done."),
            ProgressEvent::Failed(_) => self.progress_bar.abandon(),
        }
    }

    fn display_warning(&self, message: &str) {
        self.progress_bar.suspend(|| {
            eprintln!("{} {}", style("⚠").yellow().bold(), style(message).yellow());
        });
    }

    fn display_error(&self, message: &str) {
        self.progress_bar.suspend(|| {
            eprintln!("{} {}", style("✗").red().bold(), style(message).red());
        });
    }
}

fn phase_label(phase: SyncPhase) -> &'static str {
    match phase {
        SyncPhase::Initializing => "Initializing...",
        SyncPhase::Scanning => "Scanning local tree and listing bucket...",
        SyncPhase::Planning => "Comparing...",
        SyncPhase::Transferring => "Transferring",
        SyncPhase::Deleting => "Deleting extra objects...",
        SyncPhase::Completed => "Done.",
        SyncPhase::Failed => "Failed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bar_follows_plan_totals() {
        let bar = SyncProgressBar::new();
        bar.progress_bar.set_draw_target(indicatif::ProgressDrawTarget::hidden());

        bar.handle(ProgressEvent::Started {
            total_items: 5,
            total_bytes: 100,
        });
        bar.handle(ProgressEvent::Skipped("a.css".to_string()));
        bar.handle(ProgressEvent::Skipped("b.css".to_string()));
        bar.handle(ProgressEvent::ItemProcessed {
            key: "a.txt".to_string(),
            bytes: 10,
            success: true,
        });

        assert_eq!(bar.progress_bar.length(), Some(5));
        assert_eq!(bar.progress_bar.position(), 3);
    }
}
