//! Batch writer: accumulate extracted records and insert them a batch at a time.

use log::{debug, warn};

use crate::engine::db_ops::MetadataStore;
use crate::record::ExtractedRecord;

/// Upper bound on the up-front allocation for a batch buffer.
const MAX_PREALLOC: usize = 8192;

/// What the writer handed to the store.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteStats {
    /// Records handed to `insert_batch`, including those in failed batches.
    pub attempted: usize,
    /// Rows the store reported as added.
    pub inserted: usize,
    pub batches: usize,
    pub failed_batches: usize,
    pub rows_in_failed_batches: usize,
    /// Size of every batch in flush order.
    pub batch_sizes: Vec<usize>,
}

pub struct BatchWriter {
    batch: Vec<ExtractedRecord>,
    threshold: usize,
    stats: WriteStats,
}

impl BatchWriter {
    pub fn new(threshold: usize) -> Self {
        let threshold = threshold.max(1);
        BatchWriter {
            batch: Vec::with_capacity(threshold.min(MAX_PREALLOC)),
            threshold,
            stats: WriteStats::default(),
        }
    }

    /// Add a record; inserts the batch once it reaches the threshold.
    pub fn push<S: MetadataStore + ?Sized>(&mut self, store: &mut S, record: ExtractedRecord) {
        self.batch.push(record);
        if self.batch.len() >= self.threshold {
            self.flush(store);
        }
    }

    /// Insert whatever is pending. A failed insert is logged and counted as zero rows.
    pub fn flush<S: MetadataStore + ?Sized>(&mut self, store: &mut S) {
        if self.batch.is_empty() {
            return;
        }
        let batch = std::mem::replace(
            &mut self.batch,
            Vec::with_capacity(self.threshold.min(MAX_PREALLOC)),
        );
        let n = batch.len();
        self.stats.attempted += n;
        self.stats.batches += 1;
        self.stats.batch_sizes.push(n);
        match store.insert_batch(&batch) {
            Ok(inserted) => {
                self.stats.inserted += inserted;
                if inserted < n {
                    debug!("Batch of {n}: {} already present", n - inserted);
                }
            }
            Err(e) => {
                self.stats.failed_batches += 1;
                self.stats.rows_in_failed_batches += n;
                warn!("Batch insert of {n} records failed, batch dropped: {e}");
            }
        }
    }

    pub fn pending(&self) -> usize {
        self.batch.len()
    }

    pub fn into_stats(self) -> WriteStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::db_ops::StoreError;
    use crate::record::ExtractionSchema;
    use std::collections::{HashMap, HashSet};

    /// Counts rows; fails the batch whose 1-based index is `fail_on`.
    #[derive(Default)]
    struct CountingStore {
        rows: HashSet<String>,
        calls: usize,
        fail_on: Option<usize>,
    }

    impl MetadataStore for CountingStore {
        fn contains(&self, file_path: &str) -> Result<bool, StoreError> {
            Ok(self.rows.contains(file_path))
        }
        fn known_paths(&self) -> Result<HashSet<String>, StoreError> {
            Ok(self.rows.clone())
        }
        fn insert_batch(&mut self, records: &[ExtractedRecord]) -> Result<usize, StoreError> {
            self.calls += 1;
            if self.fail_on == Some(self.calls) {
                return Err(StoreError::Sqlite(rusqlite::Error::InvalidQuery));
            }
            Ok(records
                .iter()
                .filter(|r| self.rows.insert(r.file_path().to_string()))
                .count())
        }
        fn commit(&mut self) -> Result<(), StoreError> {
            Ok(())
        }
        fn row_count(&self) -> Result<u64, StoreError> {
            Ok(self.rows.len() as u64)
        }
    }

    fn records(n: usize) -> Vec<ExtractedRecord> {
        let schema = ExtractionSchema::dicom_default();
        (0..n)
            .map(|i| schema.build_record(format!("/r/{i}.dcm"), &HashMap::new()))
            .collect()
    }

    #[test]
    fn batches_split_as_ceil_n_over_b() {
        for (n, b) in [(0, 4), (1, 4), (8, 4), (10, 4), (10, 1), (3, 100)] {
            let mut store = CountingStore::default();
            let mut writer = BatchWriter::new(b);
            for r in records(n) {
                writer.push(&mut store, r);
            }
            writer.flush(&mut store);
            let stats = writer.into_stats();
            assert_eq!(stats.attempted, n);
            assert_eq!(stats.batches, n.div_ceil(b));
            assert_eq!(stats.batch_sizes.iter().sum::<usize>(), n);
            if n > 0 {
                let last = *stats.batch_sizes.last().unwrap();
                assert_eq!(last, if n % b == 0 { b } else { n % b });
            }
            assert_eq!(store.row_count().unwrap(), n as u64);
        }
    }

    #[test]
    fn failed_batch_counts_zero_rows_and_writing_continues() {
        let mut store = CountingStore {
            fail_on: Some(2),
            ..CountingStore::default()
        };
        let mut writer = BatchWriter::new(3);
        for r in records(8) {
            writer.push(&mut store, r);
        }
        writer.flush(&mut store);
        assert_eq!(store.row_count().unwrap(), 5);
        let stats = writer.into_stats();
        assert_eq!(stats.batch_sizes, vec![3, 3, 2]);
        assert_eq!(stats.failed_batches, 1);
        assert_eq!(stats.rows_in_failed_batches, 3);
        assert_eq!(stats.inserted, 5);
        assert_eq!(stats.attempted, 8);
    }

    #[test]
    fn duplicate_identities_are_counted_as_ignored() {
        let mut store = CountingStore::default();
        let mut writer = BatchWriter::new(10);
        for r in records(3).into_iter().chain(records(2)) {
            writer.push(&mut store, r);
        }
        writer.flush(&mut store);
        assert_eq!(writer.pending(), 0);
        let stats = writer.into_stats();
        assert_eq!(stats.inserted, 3);
        assert_eq!(stats.attempted - stats.inserted, 2);
    }
}
