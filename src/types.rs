//! Public and internal types for the dcmdex API and pipeline.

use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::utils::config::{
    DB_BUSY_TIMEOUT, DB_INSERT_BATCH_SIZE, DEFAULT_DB_FILENAME, DEFAULT_EXTENSIONS, IN_FLIGHT_CAP,
    ProgressConsts, SUBMIT_CHUNK_SIZE, WorkerThreadLimits,
};

/// What the positional inputs are.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InputMode {
    /// Directories to walk recursively.
    #[default]
    Tree,
    /// Text files with one candidate path per line.
    List,
}

/// Control flow used to drive workers and the writer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Topology {
    /// Stream each input, submit chunks, poll finished work, commit once per input.
    Interleaved,
    /// Materialize all candidates, filter in bulk, drain all work, commit once per run.
    Staged,
}

/// How candidates already present in the store are recognized.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FilterStrategy {
    /// One primary-key lookup per candidate.
    Lookup,
    /// Load every stored identity into memory once, then test membership.
    Snapshot,
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topology::Interleaved => write!(f, "interleaved"),
            Topology::Staged => write!(f, "staged"),
        }
    }
}

impl fmt::Display for FilterStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterStrategy::Lookup => write!(f, "lookup"),
            FilterStrategy::Snapshot => write!(f, "snapshot"),
        }
    }
}

impl InputMode {
    /// Topology used when none is configured: tree inputs stream, lists are staged.
    pub fn default_topology(self) -> Topology {
        match self {
            InputMode::Tree => Topology::Interleaved,
            InputMode::List => Topology::Staged,
        }
    }

    /// Filter used when none is configured: tree inputs look up per path, lists snapshot.
    pub fn default_filter(self) -> FilterStrategy {
        match self {
            InputMode::Tree => FilterStrategy::Lookup,
            InputMode::List => FilterStrategy::Snapshot,
        }
    }
}

/// Full options (CLI, config file and lib).
#[derive(Clone, Debug)]
pub struct Opts {
    /// Directories (tree mode) or list files (list mode).
    pub inputs: Vec<PathBuf>,
    pub input_mode: InputMode,
    /// Output SQLite database.
    pub db_path: PathBuf,
    /// When None, derived from the input mode.
    pub topology: Option<Topology>,
    /// When None, derived from the input mode.
    pub filter: Option<FilterStrategy>,
    /// Extraction worker count. When None, available parallelism capped by the FD limit.
    pub workers: Option<usize>,
    /// Records per batch insert.
    pub batch_size: usize,
    /// Candidates submitted per round (interleaved topology).
    pub chunk_size: usize,
    /// Max work items queued or running at once.
    pub in_flight_cap: usize,
    /// Tree walk: file name suffixes to accept (case-insensitive).
    pub extensions: Vec<String>,
    /// Tree walk: follow symbolic links.
    pub follow_links: bool,
    /// Tree walk: use jwalk instead of walkdir.
    pub parallel_walk: bool,
    /// Resolved items between progress lines. 0 disables them.
    pub progress_interval: usize,
    /// Lock-wait timeout on the store connection.
    pub busy_timeout: Duration,
    /// Debug logging and progress bar.
    pub verbose: bool,
}

impl Default for Opts {
    fn default() -> Self {
        Opts {
            inputs: Vec::new(),
            input_mode: InputMode::Tree,
            db_path: PathBuf::from(DEFAULT_DB_FILENAME),
            topology: None,
            filter: None,
            workers: None,
            batch_size: DB_INSERT_BATCH_SIZE,
            chunk_size: SUBMIT_CHUNK_SIZE,
            in_flight_cap: IN_FLIGHT_CAP,
            extensions: DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            follow_links: false,
            parallel_walk: false,
            progress_interval: ProgressConsts::REPORT_INTERVAL,
            busy_timeout: DB_BUSY_TIMEOUT,
            verbose: false,
        }
    }
}

impl Opts {
    pub fn effective_topology(&self) -> Topology {
        self.topology
            .unwrap_or_else(|| self.input_mode.default_topology())
    }

    pub fn effective_filter(&self) -> FilterStrategy {
        self.filter.unwrap_or_else(|| self.input_mode.default_filter())
    }

    /// Configured worker count, or the detected default. Always at least 1.
    pub fn effective_workers(&self) -> usize {
        self.workers
            .unwrap_or_else(|| WorkerThreadLimits::current().default_workers())
            .max(1)
    }

    /// Reject settings that cannot drive a run.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.inputs.is_empty() {
            anyhow::bail!("no inputs given");
        }
        if self.batch_size == 0 {
            anyhow::bail!("batch size must be at least 1");
        }
        if self.chunk_size == 0 {
            anyhow::bail!("chunk size must be at least 1");
        }
        if self.in_flight_cap == 0 {
            anyhow::bail!("in-flight cap must be at least 1");
        }
        Ok(())
    }
}
