use clap::Parser;
use std::path::PathBuf;

use crate::{FilterStrategy, Topology};

/// Bulk DICOM header extraction into a deduplicated SQLite table.
#[derive(Clone, Parser)]
#[command(name = "dcmdex")]
#[command(
    about = "Extract DICOM header metadata from directory trees (or path lists) into SQLite. Re-runs only process new files."
)]
pub struct Cli {
    /// Directories to scan, or newline-delimited path lists with --from-list.
    #[arg(value_name = "INPUTS", required = true)]
    pub inputs: Vec<PathBuf>,

    /// Output SQLite database. Default: `dicom_metadata.db`.
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// Extraction worker threads. Default: available cores (capped by the open-file limit).
    #[arg(long, short = 'w', value_parser = clap::value_parser!(usize))]
    pub workers: Option<usize>,

    /// Records per batch insert.
    #[arg(long, short = 'b', value_parser = clap::value_parser!(usize))]
    pub batch_size: Option<usize>,

    /// Treat INPUTS as files listing one candidate path per line.
    #[arg(long)]
    pub from_list: bool,

    /// Control flow. Default: interleaved for directories, staged for lists.
    #[arg(long, value_enum)]
    pub topology: Option<Topology>,

    /// Known-file detection. Default: lookup for directories, snapshot for lists.
    #[arg(long, value_enum)]
    pub filter: Option<FilterStrategy>,

    /// File suffixes to pick up in directories (case-insensitive). Comma-separated or repeated: -e .dcm,.ima
    #[arg(long, short = 'e', value_delimiter = ',')]
    pub extensions: Vec<String>,

    /// Candidates submitted per round in the interleaved topology.
    #[arg(long, value_parser = clap::value_parser!(usize))]
    pub chunk_size: Option<usize>,

    /// Resolved files between progress lines (0 disables).
    #[arg(long, value_parser = clap::value_parser!(usize))]
    pub progress_interval: Option<usize>,

    /// Follow symbolic links.
    #[arg(long, short = 'f', num_args = 0..=1, require_equals = true, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub follow_links: Option<bool>,

    /// Walk directories with a parallel walker (helps on network drives).
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub parallel_walk: Option<bool>,

    /// Seconds to wait on a locked database before a write fails.
    #[arg(long, value_parser = clap::value_parser!(u64))]
    pub busy_timeout: Option<u64>,

    /// Verbose output and progress bar. An explicit value needs `=`: --verbose=false
    #[arg(long, short = 'v', num_args = 0..=1, require_equals = true, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub verbose: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags() {
        let cli = Cli::try_parse_from([
            "dcmdex", "/data", "/more", "-o", "out.db", "-w", "3", "-b", "100", "--topology",
            "staged", "--filter", "snapshot", "-v",
        ])
        .unwrap();
        assert_eq!(cli.inputs.len(), 2);
        assert_eq!(cli.output, Some(PathBuf::from("out.db")));
        assert_eq!(cli.workers, Some(3));
        assert_eq!(cli.batch_size, Some(100));
        assert_eq!(cli.topology, Some(Topology::Staged));
        assert_eq!(cli.filter, Some(FilterStrategy::Snapshot));
        assert_eq!(cli.verbose, Some(true));
        assert!(!cli.from_list);
    }

    #[test]
    fn switches_do_not_swallow_inputs() {
        let cli = Cli::try_parse_from(["dcmdex", "-v", "/data"]).unwrap();
        assert_eq!(cli.verbose, Some(true));
        assert_eq!(cli.inputs, vec![PathBuf::from("/data")]);

        let cli = Cli::try_parse_from(["dcmdex", "-e", ".dcm,.IMA", "/data", "-f", "/more"]).unwrap();
        assert_eq!(cli.extensions, vec![".dcm".to_string(), ".IMA".to_string()]);
        assert_eq!(cli.follow_links, Some(true));
        assert_eq!(
            cli.inputs,
            vec![PathBuf::from("/data"), PathBuf::from("/more")]
        );

        let cli = Cli::try_parse_from(["dcmdex", "--verbose=false", "--parallel-walk", "/data"]).unwrap();
        assert_eq!(cli.verbose, Some(false));
        assert_eq!(cli.parallel_walk, Some(true));
        assert_eq!(cli.inputs.len(), 1);
    }

    #[test]
    fn requires_an_input() {
        assert!(Cli::try_parse_from(["dcmdex"]).is_err());
    }
}
