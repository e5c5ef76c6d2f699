//! Progress display: a kdam counter when verbose, periodic text lines otherwise.

use kdam::{Animation, Bar, BarExt};
use std::time::Instant;

use crate::utils::config::ProgressConsts;

/// Create a counter for unknown total (shows count without percentage)
pub fn create_counter(desc: &'static str) -> Bar {
    kdam::tqdm!(
        total = 0,
        desc = desc,
        animation = Animation::Classic,
        position = 0,
        unit = " files"
    )
}

/// Counts resolved work items (one tick per finished read, success or failure) and reports
/// them. Lives on the orchestrator thread, so the bar is owned directly.
pub struct ProgressReporter {
    bar: Option<Bar>,
    interval: usize,
    resolved: usize,
    extracted: usize,
    failed: usize,
    pending_ticks: usize,
    started: Instant,
}

impl ProgressReporter {
    pub fn new(verbose: bool, interval: usize) -> Self {
        ProgressReporter {
            bar: verbose.then(|| create_counter("Extracting")),
            interval,
            resolved: 0,
            extracted: 0,
            failed: 0,
            pending_ticks: 0,
            started: Instant::now(),
        }
    }

    pub fn resolved(&self) -> usize {
        self.resolved
    }

    /// Record one resolved item.
    pub fn tick(&mut self, extracted: bool) {
        self.resolved += 1;
        if extracted {
            self.extracted += 1;
        } else {
            self.failed += 1;
        }
        if let Some(bar) = self.bar.as_mut() {
            self.pending_ticks += 1;
            if self.pending_ticks >= ProgressConsts::BAR_UPDATE_BATCH_SIZE {
                let _ = bar.update(self.pending_ticks);
                self.pending_ticks = 0;
            }
        } else if self.interval > 0 && self.resolved.is_multiple_of(self.interval) {
            println!("{}", self.line());
        }
    }

    fn line(&self) -> String {
        let secs = self.started.elapsed().as_secs_f64();
        let rate = if secs > 0.0 {
            self.resolved as f64 / secs
        } else {
            0.0
        };
        format!(
            "Progress: {} resolved, {} extracted, {} failed ({:.1} files/s)",
            self.resolved, self.extracted, self.failed, rate
        )
    }

    /// Flush the remainder to the bar and end its line.
    pub fn finish(&mut self) {
        if let Some(bar) = self.bar.as_mut() {
            if self.pending_ticks > 0 {
                let _ = bar.update(self.pending_ticks);
                self.pending_ticks = 0;
            }
            let _ = bar.refresh();
            eprintln!();
        }
    }
}
