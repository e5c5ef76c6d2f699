//! Extraction worker pool: N threads read candidates through the shared record reader and
//! send results back. Workers never touch the store.

use crossbeam_channel::{Receiver, Sender, bounded};
use log::debug;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::record::{ExtractedRecord, ReadError, RecordReader};

/// Outcome of one work item.
pub struct WorkResult {
    pub path: PathBuf,
    pub outcome: Result<ExtractedRecord, ReadError>,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Single extraction worker: read paths from path_rx, run the reader, send on result_tx.
/// A panicking read becomes a failed result; the worker keeps going.
fn extraction_worker_loop(
    path_rx: Receiver<PathBuf>,
    result_tx: Sender<WorkResult>,
    reader: Arc<dyn RecordReader>,
) {
    while let Ok(path) = path_rx.recv() {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| reader.read(&path)))
            .unwrap_or_else(|payload| Err(ReadError::Panicked(panic_message(&*payload))));
        if result_tx.send(WorkResult { path, outcome }).is_err() {
            break;
        }
    }
}

/// Bounded pool. At most `capacity` items are queued or running; both channels are sized to
/// that bound so neither side can block while the caller respects [`is_full`](Self::is_full).
pub struct ExtractionPool {
    path_tx: Option<Sender<PathBuf>>,
    result_rx: Receiver<WorkResult>,
    handles: Vec<JoinHandle<()>>,
    in_flight: usize,
    capacity: usize,
}

impl ExtractionPool {
    pub fn spawn(reader: Arc<dyn RecordReader>, workers: usize, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (path_tx, path_rx) = bounded::<PathBuf>(capacity);
        let (result_tx, result_rx) = bounded::<WorkResult>(capacity);
        let handles = (0..workers.max(1))
            .map(|_| {
                let path_rx = path_rx.clone();
                let result_tx = result_tx.clone();
                let reader = Arc::clone(&reader);
                thread::spawn(move || extraction_worker_loop(path_rx, result_tx, reader))
            })
            .collect::<Vec<_>>();
        debug!(
            "Spawned {} extraction workers (in-flight cap {})",
            handles.len(),
            capacity
        );
        ExtractionPool {
            path_tx: Some(path_tx),
            result_rx,
            handles,
            in_flight: 0,
            capacity,
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn is_full(&self) -> bool {
        self.in_flight >= self.capacity
    }

    /// Queue one candidate. The caller drains results first when [`is_full`](Self::is_full).
    /// Returns the path back if the pool is shut down.
    pub fn submit(&mut self, path: PathBuf) -> Result<(), PathBuf> {
        let Some(tx) = self.path_tx.as_ref() else {
            return Err(path);
        };
        tx.send(path).map_err(|e| e.into_inner())?;
        self.in_flight += 1;
        Ok(())
    }

    /// A finished result if one is ready.
    pub fn try_next(&mut self) -> Option<WorkResult> {
        let result = self.result_rx.try_recv().ok()?;
        self.in_flight -= 1;
        Some(result)
    }

    /// Wait for the next finished result; `None` once nothing is in flight.
    pub fn next_blocking(&mut self) -> Option<WorkResult> {
        if self.in_flight == 0 {
            return None;
        }
        let result = self.result_rx.recv().ok()?;
        self.in_flight -= 1;
        Some(result)
    }

    /// Close the queue and join every worker.
    pub fn shutdown(mut self) {
        self.close_and_join();
    }

    fn close_and_join(&mut self) {
        // Dropping the last sender closes the channel so workers exit.
        drop(self.path_tx.take());
        for h in self.handles.drain(..) {
            let _ = h.join();
        }
    }
}

impl Drop for ExtractionPool {
    fn drop(&mut self) {
        self.close_and_join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ExtractionSchema;
    use std::collections::HashMap;
    use std::path::Path;

    struct PanicOnOdd {
        schema: ExtractionSchema,
    }

    impl RecordReader for PanicOnOdd {
        fn read(&self, path: &Path) -> Result<ExtractedRecord, ReadError> {
            let n: usize = path.to_string_lossy().parse().unwrap();
            if n % 2 == 1 {
                panic!("odd input {n}");
            }
            Ok(self
                .schema
                .build_record(path.to_string_lossy().into_owned(), &HashMap::new()))
        }
    }

    #[test]
    fn panics_are_isolated_per_item() {
        let reader = Arc::new(PanicOnOdd {
            schema: ExtractionSchema::dicom_default(),
        });
        let mut pool = ExtractionPool::spawn(reader, 3, 4);
        let mut ok = 0;
        let mut panicked = 0;
        let mut next = 0;
        while next < 20 || pool.in_flight() > 0 {
            if next < 20 && !pool.is_full() {
                pool.submit(PathBuf::from(next.to_string())).unwrap();
                next += 1;
                continue;
            }
            match pool.next_blocking().map(|r| r.outcome) {
                Some(Ok(_)) => ok += 1,
                Some(Err(ReadError::Panicked(msg))) => {
                    assert!(msg.starts_with("odd input"));
                    panicked += 1;
                }
                other => panic!("unexpected result: {:?}", other.map(|r| r.is_ok())),
            }
        }
        assert_eq!((ok, panicked), (10, 10));
        assert!(pool.try_next().is_none());
        pool.shutdown();
    }
}
