//! Engine module: CLI, store access, progress and path helpers

pub mod arg_parser;
pub mod cli;
pub mod db_ops;
pub mod progress;
pub mod tools;

// Re-export commonly used items
pub use arg_parser::Cli;
pub use cli::handle_run;
pub use db_ops::{MetadataStore, SqliteStore, StoreError};
pub use progress::ProgressReporter;
pub use tools::path_to_db_string;
