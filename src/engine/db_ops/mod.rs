//! Database operations: store seam, open/ensure table, savepoint batch writes.

mod connection;
mod writer;

pub use connection::SqliteStore;

use std::collections::HashSet;
use std::path::PathBuf;
use thiserror::Error;

use crate::record::ExtractedRecord;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Opening the database or ensuring the table failed. Fatal for a run.
    #[error("cannot initialize store {}: {source}", .path.display())]
    Init {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },
    /// The table exists but was created with different columns.
    #[error("table {table} in {} lacks columns: {}", .path.display(), .missing.join(", "))]
    IncompatibleTable {
        path: PathBuf,
        table: String,
        missing: Vec<String>,
    },
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

/// Durable store as seen by the pipeline. Only the orchestrator's thread calls into it.
pub trait MetadataStore {
    /// Point lookup on the identity key.
    fn contains(&self, file_path: &str) -> Result<bool, StoreError>;

    /// Every identity currently in the table (including rows staged but not yet committed).
    fn known_paths(&self) -> Result<HashSet<String>, StoreError>;

    /// Stage one batch, ignoring identity conflicts. All-or-nothing: on error no row of the
    /// batch remains. Returns rows actually added.
    fn insert_batch(&mut self, records: &[ExtractedRecord]) -> Result<usize, StoreError>;

    /// Make every staged batch durable. No-op when nothing is staged.
    fn commit(&mut self) -> Result<(), StoreError>;

    fn row_count(&self) -> Result<u64, StoreError>;

    /// Release the connection. Anything staged and not committed is discarded.
    fn close(self) -> Result<(), StoreError>
    where
        Self: Sized,
    {
        Ok(())
    }
}
