//! Run tuning: worker count, batch and chunk sizes, in-flight bound, progress cadence.

use crate::Opts;
use crate::utils::fd_limit::cap_workers_by_fd_limit;

/// Settings the orchestrator runs with, resolved once from [`Opts`].
#[derive(Clone, Debug)]
pub struct PipelineTuning {
    pub num_threads: usize,
    pub batch_size: usize,
    pub chunk_size: usize,
    /// Capacity of the worker pool's path and result channels.
    pub channel_cap: usize,
    pub progress_interval: usize,
    pub verbose: bool,
}

impl PipelineTuning {
    /// Worker count is capped by the file-descriptor limit; sizes are at least 1.
    pub fn from_opts(opts: &Opts) -> Self {
        PipelineTuning {
            num_threads: cap_workers_by_fd_limit(opts.effective_workers()),
            batch_size: opts.batch_size.max(1),
            chunk_size: opts.chunk_size.max(1),
            channel_cap: opts.in_flight_cap.max(1),
            progress_interval: opts.progress_interval,
            verbose: opts.verbose,
        }
    }
}
