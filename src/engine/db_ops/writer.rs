//! Batch staging: one open transaction per commit window, one SAVEPOINT per batch.

use log::debug;
use rusqlite::params_from_iter;
use std::collections::HashSet;

use crate::record::ExtractedRecord;

use super::connection::SqliteStore;
use super::{MetadataStore, StoreError};

impl SqliteStore {
    /// Insert `records` inside a savepoint of the run transaction. Dropping the savepoint on
    /// error rolls back every row of this batch and leaves earlier batches staged.
    fn stage_batch(&mut self, records: &[ExtractedRecord]) -> Result<usize, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }
        if self.conn.is_autocommit() {
            self.conn.execute_batch("BEGIN")?;
            debug!("Began store transaction");
        }
        let sp = self.conn.savepoint()?;
        let mut inserted = 0_usize;
        {
            let mut stmt = sp.prepare_cached(&self.insert_sql)?;
            for record in records {
                inserted += stmt.execute(params_from_iter(record.to_sql_params(&self.schema)))?;
            }
        }
        sp.commit()?;
        Ok(inserted)
    }

    /// COMMIT the run transaction if one is open. On failure the transaction stays open and
    /// a later commit may still succeed.
    fn commit_staged(&mut self) -> Result<(), StoreError> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("COMMIT")?;
            debug!("Committed store transaction");
        }
        Ok(())
    }
}

impl MetadataStore for SqliteStore {
    fn contains(&self, file_path: &str) -> Result<bool, StoreError> {
        Ok(self.lookup(file_path)?)
    }

    fn known_paths(&self) -> Result<HashSet<String>, StoreError> {
        Ok(self.load_identities()?)
    }

    fn insert_batch(&mut self, records: &[ExtractedRecord]) -> Result<usize, StoreError> {
        self.stage_batch(records)
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        self.commit_staged()
    }

    fn row_count(&self) -> Result<u64, StoreError> {
        Ok(self.count_rows()?)
    }

    fn close(self) -> Result<(), StoreError> {
        self.conn.close().map_err(|(_, e)| StoreError::Sqlite(e))
    }
}
