//! DerivedData cleanup before a run

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use globset::Glob;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum CleanError {
    #[error("invalid derived data pattern: {0}")]
    Pattern(#[from] globset::Error),

    #[error("failed to remove {}: {source}", path.display())]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to list {}: {source}", path.display())]
    List {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// `~/Library/Developer/Xcode/DerivedData`, if HOME is set
pub fn default_derived_data_root() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join("Library/Developer/Xcode/DerivedData"))
}

/// Remove every entry of `root` named `<prefix>-*`. A missing root is not an
/// error. Returns the removed paths.
pub fn clean_derived_data(root: &Path, prefix: &str) -> Result<Vec<PathBuf>, CleanError> {
    if !root.exists() {
        debug!(root = %root.display(), "no derived data to clean");
        return Ok(Vec::new());
    }

    let matcher = Glob::new(&format!("{}-*", prefix))?.compile_matcher();
    let entries = fs::read_dir(root).map_err(|source| CleanError::List {
        path: root.to_path_buf(),
        source,
    })?;

    let mut removed = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| CleanError::List {
            path: root.to_path_buf(),
            source,
        })?;
        if !matcher.is_match(entry.file_name()) {
            continue;
        }

        let path = entry.path();
        let result = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        result.map_err(|source| CleanError::Remove {
            path: path.clone(),
            source,
        })?;
        info!(path = %path.display(), "removed derived data");
        removed.push(path);
    }
    removed.sort();
    Ok(removed)
}
