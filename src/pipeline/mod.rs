//! Pipeline components: enumeration, known-set filter, worker pool, batch writer, orchestrator.

pub mod batch;
pub mod candidates;
pub mod context;
pub mod error_handler;
pub mod filter;
pub mod orchestrator;
pub mod workers;

pub use batch::{BatchWriter, WriteStats};
pub use candidates::{CandidateSource, Candidates, FileList, TreeWalk, WalkOutcome, sources_for};
pub use context::PipelineTuning;
pub use error_handler::print_summary;
pub use filter::KnownSet;
pub use orchestrator::{RunCounters, RunPhase, RunReport, run_pipeline};
pub use workers::{ExtractionPool, WorkResult};
