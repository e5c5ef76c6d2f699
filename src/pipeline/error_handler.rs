//! Failure logging and the end-of-run summary.

use log::{debug, warn};
use std::path::Path;

use crate::pipeline::orchestrator::RunReport;
use crate::record::ReadError;
use crate::utils::Colors;

/// Log one skipped candidate. Non-records are routine in mixed trees, so they go to debug.
pub fn log_read_failure(path: &Path, err: &ReadError) {
    match err {
        ReadError::NotARecord(_) => debug!("Skipped {}: {}", path.display(), err),
        ReadError::Unreadable(_) | ReadError::Panicked(_) => {
            warn!("Failed {}: {}", path.display(), err)
        }
    }
}

/// Warn about inputs that could not be enumerated at all.
pub fn log_skipped_input(label: &str, err: &anyhow::Error) {
    warn!("Skipping input {label}: {err:#}");
}

/// Print the run summary to stdout.
pub fn print_summary(report: &RunReport) {
    let c = &report.counters;
    println!(
        "Scanned {} candidates in {:.2?}: {}, {}, {}",
        c.scanned,
        report.elapsed,
        Colors::colorize(Colors::EXTRACTED, &format!("{} extracted", c.extracted)),
        Colors::colorize(Colors::KNOWN, &format!("{} already known", c.already_known)),
        Colors::colorize(Colors::FAILED, &format!("{} failed", c.failed)),
    );
    println!(
        "Inserted {} of {} rows in {} batches",
        c.rows_inserted, c.insert_attempted, c.batches
    );
    let conflicts = report.ignored_conflicts();
    if conflicts > 0 {
        println!("{} rows were already stored and kept as they were", conflicts);
    }
    if c.duplicates > 0 {
        println!("Dropped {} repeated candidates", c.duplicates);
    }
    if c.failed_batches > 0 {
        println!(
            "{}",
            Colors::colorize(
                Colors::FAILED,
                &format!(
                    "{} batches failed ({} rows not written)",
                    c.failed_batches, c.rows_in_failed_batches
                )
            )
        );
    }
    if c.failed_commits > 0 {
        println!(
            "{}",
            Colors::colorize(
                Colors::WARNING,
                &format!(
                    "{} commits failed; uncommitted rows will be reprocessed on the next run",
                    c.failed_commits
                )
            )
        );
    }
    if c.skipped_inputs > 0 || c.skipped_paths > 0 {
        println!(
            "{}",
            Colors::colorize(
                Colors::WARNING,
                &format!(
                    "Skipped {} inputs and {} unreadable directory entries",
                    c.skipped_inputs, c.skipped_paths
                )
            )
        );
    }
}
