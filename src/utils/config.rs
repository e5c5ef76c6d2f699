//! Application configuration constants.
//! Tuning and thresholds in one place.

use std::sync::OnceLock;
use std::time::Duration;

// ---- Package / paths (from CARGO_PKG_NAME, cached) ----

/// Package-derived names: built once from `CARGO_PKG_NAME`, then cached.
pub struct PackagePaths {
    config_filename: String,
}

static PACKAGE_PATHS: OnceLock<PackagePaths> = OnceLock::new();

impl PackagePaths {
    /// Build and cache names from `CARGO_PKG_NAME`. Called once on first use.
    pub fn get() -> &'static PackagePaths {
        PACKAGE_PATHS.get_or_init(|| {
            let pkg = env!("CARGO_PKG_NAME");
            PackagePaths {
                config_filename: format!(".{pkg}.toml"),
            }
        })
    }

    /// Optional settings file looked up in the working directory (e.g. `.dcmdex.toml`).
    pub fn config_filename(&self) -> &str {
        &self.config_filename
    }
}

/// Output database file used when `-o` is not given.
pub const DEFAULT_DB_FILENAME: &str = "dicom_metadata.db";

/// Table holding one row per extracted file.
pub const METADATA_TABLE: &str = "dicom_metadata";

/// File name suffixes treated as candidates by the tree walk (matched case-insensitively).
pub const DEFAULT_EXTENSIONS: &[&str] = &[".dcm"];

// ---- Worker threads ----

/// Thread limits for the extraction pool.
/// Use [`WorkerThreadLimits::current()`] to fill `all_threads` from rayon; the rest are const.
#[derive(Clone, Copy, Debug)]
pub struct WorkerThreadLimits {
    /// Available threads (from rayon); set by [`WorkerThreadLimits::current()`].
    pub all_threads: usize,
    /// Used when the available parallelism cannot be determined.
    pub fallback: usize,
    /// Never run fewer workers than this.
    pub floor: usize,
}

impl Default for WorkerThreadLimits {
    fn default() -> Self {
        Self {
            all_threads: 0, // use current() to set from rayon
            fallback: Self::FALLBACK_THREADS,
            floor: Self::FLOOR_THREADS,
        }
    }
}

impl WorkerThreadLimits {
    pub const FALLBACK_THREADS: usize = 4;
    pub const FLOOR_THREADS: usize = 1;

    /// Build limits with `all_threads` set from `rayon::current_num_threads()`.
    pub fn current() -> Self {
        Self {
            all_threads: rayon::current_num_threads(),
            ..Self::default()
        }
    }

    /// Default worker count: available threads, or the fallback when detection reported nothing.
    pub fn default_workers(&self) -> usize {
        if self.all_threads == 0 {
            self.fallback
        } else {
            self.all_threads.max(self.floor)
        }
    }
}

// ---- Database ----

/// Records per batch insert (one SAVEPOINT per batch).
pub const DB_INSERT_BATCH_SIZE: usize = 8000;

/// Lock-wait timeout for the store connection, so an external reader cannot stall a run forever.
pub const DB_BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// WAL tuning pragmas (synchronous, autocheckpoint, size limit). Use after PRAGMA journal_mode = WAL.
pub const WAL_PRAGMAS: &str = r#"
        PRAGMA synchronous = NORMAL;
        PRAGMA wal_autocheckpoint = 10000;
        PRAGMA journal_size_limit = 67108864;
        "#;

// ---- Pipeline ----

/// Candidates handed to the worker pool per submission round in the interleaved topology.
pub const SUBMIT_CHUNK_SIZE: usize = 1000;

/// Max work items queued or running at once. Bounds memory of both channels.
pub const IN_FLIGHT_CAP: usize = 50_000;

// ---- Progress ----

/// Progress bar and progress line tuning.
pub struct ProgressConsts;

impl ProgressConsts {
    /// Resolved work items between two progress lines.
    pub const REPORT_INTERVAL: usize = 10_000;
    /// Batch size for progress bar updates (reduce lock contention).
    pub const BAR_UPDATE_BATCH_SIZE: usize = 100;
}

// ---- DICOM parsing ----

/// Largest single element value the header reader will buffer (bytes). 1 MiB.
pub const MAX_ELEMENT_VALUE_LEN: u32 = 1024 * 1024;
