//! Load `.dcmdex.toml` from a directory (CLI only). The library takes everything through Opts.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::utils::config::PackagePaths;
use crate::{FilterStrategy, Opts, Topology};

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct DcmdexToml {
    #[serde(default)]
    settings: SettingsSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SettingsSection {
    output: Option<String>,
    workers: Option<usize>,
    batch_size: Option<usize>,
    chunk_size: Option<usize>,
    topology: Option<Topology>,
    filter: Option<FilterStrategy>,
    extensions: Option<Vec<String>>,
    progress_interval: Option<usize>,
    follow_links: Option<bool>,
    parallel_walk: Option<bool>,
    verbose: Option<bool>,
    /// Seconds.
    busy_timeout: Option<u64>,
}

/// Read the settings file from `dir`. `Ok(None)` when there is no file.
pub(crate) fn load_dcmdex_toml(dir: &Path) -> Result<Option<DcmdexToml>> {
    let path = dir.join(PackagePaths::get().config_filename());
    if !path.is_file() {
        return Ok(None);
    }
    let s = std::fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
    let parsed = toml::from_str(&s).with_context(|| format!("parse {}", path.display()))?;
    Ok(Some(parsed))
}

/// Overwrite opts field from file when present.
macro_rules! apply_file_opt {
    ($idx:expr, $opts:expr, $idx_field:ident => $opts_field:ident) => {
        if let Some(v) = $idx.$idx_field {
            $opts.$opts_field = v;
        }
    };
}

/// Apply file config to opts (only fields present in the file). Call before applying CLI.
pub(crate) fn apply_file_to_opts(file: &DcmdexToml, opts: &mut Opts) {
    let s = &file.settings;
    if let Some(ref p) = s.output {
        opts.db_path = PathBuf::from(p);
    }
    if s.workers.is_some() {
        opts.workers = s.workers;
    }
    apply_file_opt!(s, opts, batch_size => batch_size);
    apply_file_opt!(s, opts, chunk_size => chunk_size);
    if s.topology.is_some() {
        opts.topology = s.topology;
    }
    if s.filter.is_some() {
        opts.filter = s.filter;
    }
    if let Some(ref v) = s.extensions {
        opts.extensions = v.clone();
    }
    apply_file_opt!(s, opts, progress_interval => progress_interval);
    apply_file_opt!(s, opts, follow_links => follow_links);
    apply_file_opt!(s, opts, parallel_walk => parallel_walk);
    apply_file_opt!(s, opts, verbose => verbose);
    if let Some(secs) = s.busy_timeout {
        opts.busy_timeout = Duration::from_secs(secs);
    }
}
