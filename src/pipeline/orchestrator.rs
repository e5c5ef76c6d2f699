//! Pipeline orchestrator: enumerate → filter → extract (pool) → batch insert → commit.
//!
//! The store lives on this thread only. Interleaved topology streams each input and commits
//! once per input; staged topology materializes every candidate, filters in bulk and commits
//! once per run.

use anyhow::Result;
use log::{debug, info, warn};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::engine::db_ops::MetadataStore;
use crate::engine::progress::ProgressReporter;
use crate::engine::tools::path_to_db_string;
use crate::record::RecordReader;
use crate::{FilterStrategy, Opts, Topology};

use super::batch::{BatchWriter, WriteStats};
use super::candidates::CandidateSource;
use super::context::PipelineTuning;
use super::error_handler::{log_read_failure, log_skipped_input};
use super::filter::KnownSet;
use super::workers::{ExtractionPool, WorkResult};

/// Run lifecycle. `Committed` is absent from a run's trace when the commit failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunPhase {
    Init,
    TableEnsured,
    Scanning,
    Filtering,
    Extracting,
    FinalFlush,
    Committed,
    Closed,
}

/// Aggregate counters for one run. Reset per run, never persisted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunCounters {
    /// Candidates produced by all inputs.
    pub scanned: usize,
    pub already_known: usize,
    /// Candidates whose identity was already seen earlier in this run.
    pub duplicates: usize,
    pub extracted: usize,
    pub failed: usize,
    pub insert_attempted: usize,
    pub rows_inserted: usize,
    pub batches: usize,
    pub failed_batches: usize,
    pub rows_in_failed_batches: usize,
    pub skipped_inputs: usize,
    pub skipped_paths: usize,
    pub commits: usize,
    pub failed_commits: usize,
}

#[derive(Clone, Debug)]
pub struct RunReport {
    pub counters: RunCounters,
    /// Size of every batch handed to the store, in order.
    pub batch_sizes: Vec<usize>,
    /// Every phase entered, in order.
    pub phases: Vec<RunPhase>,
    pub elapsed: Duration,
}

impl RunReport {
    /// Last phase reached (`Closed` for any run that returned).
    pub fn phase(&self) -> RunPhase {
        self.phases.last().copied().unwrap_or(RunPhase::Init)
    }

    /// Records absorbed by identity conflicts.
    pub fn ignored_conflicts(&self) -> usize {
        let c = &self.counters;
        c.insert_attempted
            .saturating_sub(c.rows_in_failed_batches)
            .saturating_sub(c.rows_inserted)
    }
}

struct Run<S: MetadataStore> {
    store: S,
    tuning: PipelineTuning,
    filter: FilterStrategy,
    counters: RunCounters,
    writer: BatchWriter,
    /// Identities admitted this run that the known-set filter cannot see yet.
    seen: HashSet<String>,
    /// Point lookups see staged rows, so `seen` only has to cover work in flight and the
    /// pending batch. Otherwise it holds every identity of the current scope.
    release_resolved: bool,
    /// Identities in the writer's pending batch, released from `seen` once it is staged.
    pending_ids: Vec<String>,
    progress: ProgressReporter,
    phases: Vec<RunPhase>,
}

impl<S: MetadataStore> Run<S> {
    fn new(opts: &Opts, store: S) -> Self {
        let tuning = PipelineTuning::from_opts(opts);
        let filter = opts.effective_filter();
        Run {
            store,
            writer: BatchWriter::new(tuning.batch_size),
            progress: ProgressReporter::new(tuning.verbose, tuning.progress_interval),
            release_resolved: opts.effective_topology() == Topology::Interleaved
                && filter == FilterStrategy::Lookup,
            tuning,
            filter,
            counters: RunCounters::default(),
            seen: HashSet::new(),
            pending_ids: Vec::new(),
            phases: Vec::new(),
        }
    }

    fn set_phase(&mut self, phase: RunPhase) {
        debug!("Run phase: {:?}", phase);
        self.phases.push(phase);
    }

    /// Count a candidate and drop repeats. Returns its identity when it is new in this run.
    fn admit(&mut self, path: &std::path::Path) -> Option<String> {
        self.counters.scanned += 1;
        let identity = path_to_db_string(path);
        if !self.seen.insert(identity.clone()) {
            self.counters.duplicates += 1;
            return None;
        }
        Some(identity)
    }

    fn handle(&mut self, result: WorkResult) {
        match result.outcome {
            Ok(record) => {
                self.counters.extracted += 1;
                self.progress.tick(true);
                if self.release_resolved {
                    self.pending_ids.push(path_to_db_string(&result.path));
                }
                self.writer.push(&mut self.store, record);
                if self.writer.pending() == 0 {
                    self.release_pending();
                }
            }
            Err(err) => {
                self.counters.failed += 1;
                self.progress.tick(false);
                if self.release_resolved {
                    self.seen.remove(&path_to_db_string(&result.path));
                }
                log_read_failure(&result.path, &err);
            }
        }
    }

    fn release_pending(&mut self) {
        for identity in self.pending_ids.drain(..) {
            self.seen.remove(&identity);
        }
    }

    /// Submit one unknown candidate, draining finished work first while the pool is full.
    fn submit(&mut self, pool: &mut ExtractionPool, path: PathBuf) {
        while pool.is_full() {
            match pool.next_blocking() {
                Some(result) => self.handle(result),
                None => break,
            }
        }
        if let Err(path) = pool.submit(path) {
            self.counters.failed += 1;
            self.progress.tick(false);
            warn!("Worker pool closed, dropped {}", path.display());
        }
    }

    /// Handle everything already finished without waiting.
    fn poll_finished(&mut self, pool: &mut ExtractionPool) {
        while let Some(result) = pool.try_next() {
            self.handle(result);
        }
    }

    /// Handle results in completion order until nothing is in flight.
    fn drain(&mut self, pool: &mut ExtractionPool) {
        while let Some(result) = pool.next_blocking() {
            self.handle(result);
        }
    }

    fn submit_chunk(&mut self, pool: &mut ExtractionPool, known: &KnownSet, chunk: &mut Vec<PathBuf>) {
        for path in chunk.drain(..) {
            let Some(identity) = self.admit(&path) else {
                continue;
            };
            if known.is_known(&self.store, &identity) {
                self.counters.already_known += 1;
                continue;
            }
            self.submit(pool, path);
        }
        self.poll_finished(pool);
    }

    /// Flush the partial batch, then commit. A failed commit is reported, not fatal.
    fn flush_and_commit(&mut self) {
        self.set_phase(RunPhase::FinalFlush);
        self.writer.flush(&mut self.store);
        self.release_pending();
        match self.store.commit() {
            Ok(()) => {
                self.counters.commits += 1;
                self.set_phase(RunPhase::Committed);
            }
            Err(e) => {
                self.counters.failed_commits += 1;
                warn!("Commit failed; rows staged since the last commit may be reprocessed next run: {e}");
            }
        }
    }

    fn run_interleaved(&mut self, sources: &[Box<dyn CandidateSource>], pool: &mut ExtractionPool) {
        let mut chunk = Vec::with_capacity(self.tuning.chunk_size);
        for source in sources {
            self.set_phase(RunPhase::Scanning);
            let mut candidates = match source.open() {
                Ok(c) => c,
                Err(e) => {
                    self.counters.skipped_inputs += 1;
                    log_skipped_input(&source.label(), &e);
                    continue;
                }
            };
            info!("Processing {}", source.label());
            self.set_phase(RunPhase::Filtering);
            // Everything from earlier inputs is staged now, so the fresh known set covers it.
            self.seen.clear();
            let known = KnownSet::prepare(self.filter, &self.store);
            self.set_phase(RunPhase::Extracting);
            for path in candidates.by_ref() {
                chunk.push(path);
                if chunk.len() >= self.tuning.chunk_size {
                    self.submit_chunk(pool, &known, &mut chunk);
                }
            }
            self.submit_chunk(pool, &known, &mut chunk);
            self.drain(pool);
            self.counters.skipped_paths += candidates.skipped();
            debug!("{}: {} candidates", source.label(), candidates.produced());
            self.flush_and_commit();
        }
    }

    fn run_staged(&mut self, sources: &[Box<dyn CandidateSource>], pool: &mut ExtractionPool) {
        self.set_phase(RunPhase::Scanning);
        let mut all = Vec::new();
        for source in sources {
            let mut candidates = match source.open() {
                Ok(c) => c,
                Err(e) => {
                    self.counters.skipped_inputs += 1;
                    log_skipped_input(&source.label(), &e);
                    continue;
                }
            };
            for path in candidates.by_ref() {
                if let Some(identity) = self.admit(&path) {
                    all.push((path, identity));
                }
            }
            self.counters.skipped_paths += candidates.skipped();
            debug!("{}: {} candidates", source.label(), candidates.produced());
        }
        info!("Found {} candidates", self.counters.scanned);

        self.set_phase(RunPhase::Filtering);
        let known = KnownSet::prepare(self.filter, &self.store);
        let (unknown, known_count) = known.partition(&self.store, all);
        drop(known);
        self.counters.already_known += known_count;
        info!(
            "{} already known, {} to extract",
            known_count,
            unknown.len()
        );

        self.set_phase(RunPhase::Extracting);
        for (i, (path, _)) in unknown.into_iter().enumerate() {
            self.submit(pool, path);
            if (i + 1).is_multiple_of(self.tuning.chunk_size) {
                self.poll_finished(pool);
            }
        }
        self.drain(pool);
        self.flush_and_commit();
    }

    fn finish(mut self, started: Instant) -> RunReport {
        self.progress.finish();
        let stats: WriteStats = self.writer.into_stats();
        self.counters.insert_attempted = stats.attempted;
        self.counters.rows_inserted = stats.inserted;
        self.counters.batches = stats.batches;
        self.counters.failed_batches = stats.failed_batches;
        self.counters.rows_in_failed_batches = stats.rows_in_failed_batches;
        if let Err(e) = self.store.close() {
            warn!("Closing the store failed: {e}");
        }
        debug!("Run phase: {:?}", RunPhase::Closed);
        self.phases.push(RunPhase::Closed);
        RunReport {
            counters: self.counters,
            batch_sizes: stats.batch_sizes,
            phases: self.phases,
            elapsed: started.elapsed(),
        }
    }
}

/// Drive one run over `sources` with an already-opened `store` (its table ensured).
/// Per-item, per-batch and commit failures are absorbed into the report.
pub fn run_pipeline<S: MetadataStore>(
    opts: &Opts,
    sources: Vec<Box<dyn CandidateSource>>,
    store: S,
    reader: Arc<dyn RecordReader>,
) -> Result<RunReport> {
    let started = Instant::now();
    let topology = opts.effective_topology();
    let mut run = Run::new(opts, store);
    debug!(
        "Topology {topology}, filter {}, {} workers, batch {}",
        run.filter, run.tuning.num_threads, run.tuning.batch_size
    );

    let mut pool = ExtractionPool::spawn(reader, run.tuning.num_threads, run.tuning.channel_cap);
    run.set_phase(RunPhase::Init);
    run.set_phase(RunPhase::TableEnsured);

    match topology {
        Topology::Interleaved => run.run_interleaved(&sources, &mut pool),
        Topology::Staged => run.run_staged(&sources, &mut pool),
    }
    pool.shutdown();
    Ok(run.finish(started))
}
