//! dcmdex: bulk DICOM header extraction into a deduplicated SQLite table

pub mod engine;
pub mod pipeline;
pub mod record;
pub mod types;
pub mod utils;

/// Re-export types for API
pub use types::*;

pub use engine::db_ops::{MetadataStore, SqliteStore, StoreError};
pub use pipeline::{RunCounters, RunPhase, RunReport, run_pipeline};
pub use record::{DicomHeaderReader, ExtractedRecord, ExtractionSchema, ReadError, RecordReader};

use log::debug;
use std::sync::Arc;

/// Result alias used by public dcmdex API
pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// Single entry point: open (or create) the store at `opts.db_path`, then extract every
/// new candidate from `opts.inputs` with the built-in DICOM reader.
///
/// Fails only when the options are invalid or the store cannot be initialized. Unreadable
/// files, failed batches and a failed commit are reported in the returned [`RunReport`].
pub fn extract_metadata(opts: &Opts) -> Result<RunReport> {
    opts.validate()?;
    let config_str = format!(
        "{} CONFIG:{:#?}",
        env!("CARGO_PKG_NAME").to_string().to_uppercase(),
        opts
    );
    debug!("{}", config_str);

    let schema = Arc::new(ExtractionSchema::dicom_default());
    let store = SqliteStore::open(&opts.db_path, Arc::clone(&schema), opts.busy_timeout)?;
    let reader: Arc<dyn RecordReader> = Arc::new(DicomHeaderReader::new(schema));
    run_pipeline(opts, pipeline::sources_for(opts), store, reader)
}
