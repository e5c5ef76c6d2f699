//! Path and candidate filter utilities

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Identity string stored in the `file_path` column. Backslashes are normalized on Windows so
/// the same file has the same identity regardless of how it was listed.
pub fn path_to_db_string(path: &Path) -> String {
    let s = path.to_string_lossy();
    if cfg!(windows) {
        s.replace('\\', "/")
    } else {
        s.into_owned()
    }
}

/// Check if a file should be excluded based on OS-specific junk files
pub fn is_os_hidden_file(path: &Path) -> bool {
    match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => {
            matches!(
                name,
                // macOS
                ".DS_Store" | ".AppleDouble" | ".LSOverride"
                // Windows
                | "Thumbs.db" | "ehthumbs.db" | "Desktop.ini"
                // Linux
                | ".directory"
            ) || name.starts_with("._")
        }
        None => false,
    }
}

/// Lowercase and dot-prefix configured suffixes once (`DCM` -> `.dcm`).
pub fn normalize_extensions(extensions: &[String]) -> Vec<String> {
    extensions
        .iter()
        .map(|e| e.trim())
        .filter(|e| !e.is_empty())
        .map(|e| {
            let lower = e.to_lowercase();
            if lower.starts_with('.') {
                lower
            } else {
                format!(".{lower}")
            }
        })
        .collect()
}

/// True if the file name ends with one of `extensions` (already normalized, lowercase).
pub fn has_candidate_extension(path: &Path, extensions: &[String]) -> bool {
    let Some(name) = path.file_name() else {
        return false;
    };
    let name = name.to_string_lossy().to_lowercase();
    extensions.iter().any(|ext| name.ends_with(ext.as_str()))
}

/// Make a tree root absolute without resolving symlinks, so stored identities keep the
/// path the user gave.
pub fn absolute_root(root: &Path) -> Result<PathBuf> {
    std::path::absolute(root).with_context(|| format!("resolve {}", root.display()))
}
