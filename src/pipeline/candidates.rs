//! Candidate enumeration: recursive tree walk (walkdir / jwalk) or a newline-delimited list.

use anyhow::{Context, Result};
use log::{debug, warn};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::engine::tools::{
    absolute_root, has_candidate_extension, is_os_hidden_file, normalize_extensions,
};
use crate::{InputMode, Opts};

/// One item from a walk or list: a path to consider, something to pass over, or an error
/// with optional path.
pub enum WalkOutcome {
    Candidate(PathBuf),
    Ignored,
    Err { msg: String, path: Option<PathBuf> },
}

impl WalkOutcome {
    /// Keep a walked file only if it is not OS junk and its name has a wanted suffix.
    fn keep_if_matching(self, extensions: &[String]) -> WalkOutcome {
        match self {
            WalkOutcome::Candidate(path)
                if is_os_hidden_file(&path) || !has_candidate_extension(&path, extensions) =>
            {
                WalkOutcome::Ignored
            }
            other => other,
        }
    }
}

/// Convert a jwalk result into [`WalkOutcome`].
pub fn to_outcome_jwalk(r: Result<jwalk::DirEntry<((), ())>, jwalk::Error>) -> WalkOutcome {
    match r {
        Ok(entry) if entry.file_type().is_dir() => WalkOutcome::Ignored,
        Ok(entry) => WalkOutcome::Candidate(entry.path()),
        Err(err) => WalkOutcome::Err {
            msg: format!("{}", err),
            path: err.path().map(PathBuf::from),
        },
    }
}

/// Convert a walkdir result into [`WalkOutcome`].
pub fn to_outcome_walkdir(r: Result<walkdir::DirEntry, walkdir::Error>) -> WalkOutcome {
    match r {
        Ok(entry) if entry.file_type().is_dir() => WalkOutcome::Ignored,
        Ok(entry) => WalkOutcome::Candidate(entry.into_path()),
        Err(err) => WalkOutcome::Err {
            msg: format!("{}", err),
            path: err.path().map(PathBuf::from),
        },
    }
}

/// Convert one raw line of a file list. Blank lines are ignored; the path is not checked.
fn to_outcome_line(r: std::io::Result<Vec<u8>>, line_no: usize) -> WalkOutcome {
    match r {
        Ok(bytes) => match String::from_utf8(bytes) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    WalkOutcome::Ignored
                } else {
                    WalkOutcome::Candidate(PathBuf::from(line))
                }
            }
            Err(_) => WalkOutcome::Err {
                msg: format!("line {line_no} is not valid UTF-8"),
                path: None,
            },
        },
        Err(err) => WalkOutcome::Err {
            msg: format!("line {line_no}: {err}"),
            path: None,
        },
    }
}

/// Lazy, finite, non-restartable stream of candidate paths. Counts what it yielded and the
/// walk errors it passed over.
pub struct Candidates {
    outcomes: Box<dyn Iterator<Item = WalkOutcome>>,
    label: String,
    produced: usize,
    skipped: usize,
}

impl Candidates {
    pub fn new(label: String, outcomes: Box<dyn Iterator<Item = WalkOutcome>>) -> Self {
        Candidates {
            outcomes,
            label,
            produced: 0,
            skipped: 0,
        }
    }

    /// Candidates yielded so far (the final total once exhausted).
    pub fn produced(&self) -> usize {
        self.produced
    }

    /// Walk or list errors passed over so far.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl Iterator for Candidates {
    type Item = PathBuf;

    fn next(&mut self) -> Option<PathBuf> {
        for outcome in self.outcomes.by_ref() {
            match outcome {
                WalkOutcome::Candidate(path) => {
                    self.produced += 1;
                    return Some(path);
                }
                WalkOutcome::Ignored => {}
                WalkOutcome::Err { msg, path } => {
                    self.skipped += 1;
                    match path {
                        Some(p) => warn!("{}: skipped {}: {}", self.label, p.display(), msg),
                        None => warn!("{}: {}", self.label, msg),
                    }
                }
            }
        }
        None
    }
}

/// Anything that can produce candidate paths for one input.
pub trait CandidateSource {
    /// Name used in logs (root or list path).
    fn label(&self) -> String;

    /// Start enumerating. Fails when the input itself is unusable (missing root, unreadable
    /// list); the caller skips that input.
    fn open(&self) -> Result<Candidates>;
}

/// Recursive walk of one root directory.
pub struct TreeWalk {
    pub root: PathBuf,
    /// Normalized, lowercase suffixes (e.g. `.dcm`).
    pub extensions: Vec<String>,
    pub follow_links: bool,
    pub parallel_walk: bool,
}

impl TreeWalk {
    pub fn new(root: &Path, opts: &Opts) -> Self {
        TreeWalk {
            root: root.to_path_buf(),
            extensions: normalize_extensions(&opts.extensions),
            follow_links: opts.follow_links,
            parallel_walk: opts.parallel_walk,
        }
    }

    fn jwalk_iter(&self, root: &Path) -> Box<dyn Iterator<Item = WalkOutcome>> {
        use jwalk::Parallelism;
        use std::time::Duration;
        Box::new(
            jwalk::WalkDir::new(root)
                .follow_links(self.follow_links)
                .parallelism(Parallelism::RayonDefaultPool {
                    busy_timeout: Duration::from_secs(60),
                })
                .into_iter()
                .map(to_outcome_jwalk),
        )
    }

    fn walkdir_iter(&self, root: &Path) -> Box<dyn Iterator<Item = WalkOutcome>> {
        use walkdir::WalkDir;
        Box::new(
            WalkDir::new(root)
                .follow_links(self.follow_links)
                .into_iter()
                .map(to_outcome_walkdir),
        )
    }
}

impl CandidateSource for TreeWalk {
    fn label(&self) -> String {
        self.root.display().to_string()
    }

    fn open(&self) -> Result<Candidates> {
        if !self.root.is_dir() {
            anyhow::bail!("{} is not a directory", self.root.display());
        }
        let root = absolute_root(&self.root)?;
        let raw = if self.parallel_walk {
            debug!("Walking {} in parallel", root.display());
            self.jwalk_iter(&root)
        } else {
            debug!("Walking {} serially", root.display());
            self.walkdir_iter(&root)
        };
        let extensions = self.extensions.clone();
        Ok(Candidates::new(
            self.label(),
            Box::new(raw.map(move |o| o.keep_if_matching(&extensions))),
        ))
    }
}

/// Newline-delimited list of candidate paths, used verbatim.
pub struct FileList {
    pub path: PathBuf,
}

impl CandidateSource for FileList {
    fn label(&self) -> String {
        self.path.display().to_string()
    }

    fn open(&self) -> Result<Candidates> {
        if !self.path.is_file() {
            anyhow::bail!("{} is not a file", self.path.display());
        }
        let file = File::open(&self.path)
            .with_context(|| format!("open file list {}", self.path.display()))?;
        Ok(Candidates::new(self.label(), list_outcomes(BufReader::new(file))))
    }
}

/// Lines of a list as outcomes. A read error ends the list after it is reported once.
fn list_outcomes(reader: impl BufRead + 'static) -> Box<dyn Iterator<Item = WalkOutcome>> {
    let mut read_failed = false;
    Box::new(
        reader
            .split(b'\n')
            .map_while(move |r| {
                if read_failed {
                    return None;
                }
                read_failed = r.is_err();
                Some(r)
            })
            .enumerate()
            .map(|(i, r)| to_outcome_line(r, i + 1)),
    )
}

/// One source per configured input, according to the input mode.
pub fn sources_for(opts: &Opts) -> Vec<Box<dyn CandidateSource>> {
    opts.inputs
        .iter()
        .map(|input| -> Box<dyn CandidateSource> {
            match opts.input_mode {
                InputMode::Tree => Box::new(TreeWalk::new(input, opts)),
                InputMode::List => Box::new(FileList {
                    path: input.clone(),
                }),
            }
        })
        .collect()
}
