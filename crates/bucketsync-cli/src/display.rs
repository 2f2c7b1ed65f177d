//! Console output for sync results

use bucketsync_types::{SyncDirection, SyncReport, TransferFailure};
use console::style;
use std::time::Duration;

/// Print the one-line banner before a sync starts
pub fn display_header(direction: SyncDirection, local: &str, remote: &str, dry_run: bool) {
    let (from, to) = match direction {
        SyncDirection::Upload => (local, remote),
        SyncDirection::Download => (remote, local),
    };
    println!(
        "{} Synchronizing {} to {}",
        style("⟲").blue().bold(),
        style(from).cyan(),
        style(to).cyan()
    );

    if dry_run {
        println!(
            "{} Dry run mode - no changes will be made",
            style("ℹ").yellow()
        );
    }
}

/// Print statistics of a finished sync
pub fn display_sync_report(report: &SyncReport) {
    let stats = &report.stats;

    println!();
    println!("{}", style("Sync Statistics:").bold().underlined());
    println!(
        "  Files transferred: {}",
        style(stats.files_transferred).green()
    );
    println!(
        "  Bytes transferred: {}",
        style(format_bytes(stats.bytes_transferred)).green()
    );
    println!("  Files skipped: {}", style(stats.files_skipped).yellow());
    println!("  Files deleted: {}", style(stats.files_deleted).green());
    if stats.deletion_warnings > 0 {
        println!(
            "  Deletion warnings: {}",
            style(stats.deletion_warnings).yellow()
        );
    }
    println!(
        "  Duration: {}",
        style(format_duration(stats.duration)).blue()
    );
    println!(
        "  Transfer rate: {}",
        style(format!("{}/s", format_bytes(stats.transfer_rate() as u64))).blue()
    );

    for warning in &report.deletion_warnings {
        println!("  {} {}", style("⚠").yellow(), style(warning).yellow());
    }
}

/// Print every failed object and its cause
pub fn display_failures(failures: &[TransferFailure]) {
    eprintln!();
    eprintln!(
        "{} {} object(s) failed to transfer:",
        style("✗").red().bold(),
        failures.len()
    );
    for failure in failures {
        eprintln!(
            "  {} {}",
            style(&failure.destination).red(),
            style(&failure.cause).dim()
        );
    }
}

/// Format bytes in human-readable format
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

/// Format duration in human-readable format
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{:.2}s", duration.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
