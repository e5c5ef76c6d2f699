//! CLI command handler: defaults < `.dcmdex.toml` < flags, then one extraction run.

use anyhow::Result;
use log::{debug, warn};
use std::path::Path;
use std::time::Duration;

use crate::engine::arg_parser::Cli;
use crate::pipeline::print_summary;
use crate::utils::dcmdex_toml::{apply_file_to_opts, load_dcmdex_toml};
use crate::utils::setup_logging;
use crate::{InputMode, Opts, extract_metadata};

/// Overwrite opts field from CLI when given.
macro_rules! apply_cli_opt {
    ($cli:expr, $opts:expr, $cli_field:ident => $opts_field:ident) => {
        if let Some(v) = $cli.$cli_field {
            $opts.$opts_field = v;
        }
    };
}

fn apply_cli_to_opts(cli: &Cli, opts: &mut Opts) {
    opts.inputs = cli.inputs.clone();
    if cli.from_list {
        opts.input_mode = InputMode::List;
    }
    if let Some(ref p) = cli.output {
        opts.db_path = p.clone();
    }
    if cli.workers.is_some() {
        opts.workers = cli.workers;
    }
    apply_cli_opt!(cli, opts, batch_size => batch_size);
    if cli.topology.is_some() {
        opts.topology = cli.topology;
    }
    if cli.filter.is_some() {
        opts.filter = cli.filter;
    }
    if !cli.extensions.is_empty() {
        opts.extensions = cli.extensions.clone();
    }
    apply_cli_opt!(cli, opts, chunk_size => chunk_size);
    apply_cli_opt!(cli, opts, progress_interval => progress_interval);
    apply_cli_opt!(cli, opts, follow_links => follow_links);
    apply_cli_opt!(cli, opts, parallel_walk => parallel_walk);
    apply_cli_opt!(cli, opts, verbose => verbose);
    if let Some(secs) = cli.busy_timeout {
        opts.busy_timeout = Duration::from_secs(secs);
    }
}

/// Resolve options for `cli`, reading the settings file from `config_dir`.
/// A settings file that cannot be parsed is ignored; its error is returned for logging.
pub fn setup_opts(cli: &Cli, config_dir: &Path) -> (Opts, Option<anyhow::Error>) {
    let mut opts = Opts::default();
    let file_error = match load_dcmdex_toml(config_dir) {
        Ok(Some(file)) => {
            apply_file_to_opts(&file, &mut opts);
            None
        }
        Ok(None) => None,
        Err(e) => Some(e),
    };
    apply_cli_to_opts(cli, &mut opts);
    (opts, file_error)
}

/// Run one extraction and print the summary. Only store initialization and invalid
/// options produce an error (exit code 1).
pub fn handle_run(cli: &Cli) -> Result<()> {
    let (opts, file_error) = setup_opts(cli, Path::new("."));
    setup_logging(opts.verbose);
    if let Some(e) = file_error {
        warn!("Ignoring settings file: {e:#}");
    }
    debug!("Extracting into {}", opts.db_path.display());
    let report = extract_metadata(&opts)?;
    print_summary(&report);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FilterStrategy, Topology};
    use clap::Parser;
    use std::path::PathBuf;

    #[test]
    fn cli_overrides_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(".dcmdex.toml"),
            "[settings]\nbatch_size = 500\nworkers = 2\nfilter = \"lookup\"\n",
        )
        .unwrap();
        let cli =
            Cli::try_parse_from(["dcmdex", "--from-list", "list.txt", "-b", "64"]).unwrap();
        let (opts, err) = setup_opts(&cli, dir.path());
        assert!(err.is_none());
        assert_eq!(opts.batch_size, 64);
        assert_eq!(opts.workers, Some(2));
        assert_eq!(opts.input_mode, InputMode::List);
        assert_eq!(opts.inputs, vec![PathBuf::from("list.txt")]);
        assert_eq!(opts.effective_filter(), FilterStrategy::Lookup);
        assert_eq!(opts.effective_topology(), Topology::Staged);
    }

    #[test]
    fn broken_settings_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".dcmdex.toml"), "not = [valid").unwrap();
        let cli = Cli::try_parse_from(["dcmdex", "/data"]).unwrap();
        let (opts, err) = setup_opts(&cli, dir.path());
        assert!(err.is_some());
        assert_eq!(opts.batch_size, Opts::default().batch_size);
        assert_eq!(opts.effective_topology(), Topology::Interleaved);
    }
}
