//! `.beads` directory discovery and path expansion.

use std::env;
use std::path::{Path, PathBuf};

use crate::config::{ConfigError, Result};

/// Name of the per-repo beads directory.
pub const BEADS_DIR_NAME: &str = ".beads";

/// Name of the persistent database file inside `.beads`.
pub const DB_FILE_NAME: &str = "beads.db";

/// Name of the ephemeral (wisp) database file inside `.beads`.
pub const WISP_DB_FILE_NAME: &str = "wisps.db";

/// Walks up from `start` looking for a `.beads` directory.
pub fn find_beads_dir_from(start: &Path) -> Option<PathBuf> {
    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(BEADS_DIR_NAME);
        if candidate.is_dir() {
            return Some(candidate);
        }
        if !dir.pop() {
            break;
        }
    }
    None
}

/// Walks up from the current directory looking for a `.beads` directory.
pub fn find_beads_dir() -> Result<PathBuf> {
    let cwd = env::current_dir()?;
    find_beads_dir_from(&cwd).ok_or(ConfigError::BeadsDirNotFound)
}

/// Expands `~` and resolves relative paths against the given base.
///
/// - `~` / `~/x` resolve against `$HOME`.
/// - Absolute paths pass through.
/// - Anything else is joined onto `base`.
pub fn expand_path(p: &str, base: &Path) -> PathBuf {
    if p == "~" {
        return home_dir().unwrap_or_else(|| PathBuf::from("~"));
    }
    if let Some(rest) = p.strip_prefix("~/") {
        if let Some(home) = home_dir() {
            return home.join(rest);
        }
    }
    let path = PathBuf::from(p);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

/// Returns the `.beads` directory for a repository root path.
pub fn beads_dir_for_repo(repo: &Path) -> PathBuf {
    if repo.file_name().is_some_and(|n| n == BEADS_DIR_NAME) {
        repo.to_path_buf()
    } else {
        repo.join(BEADS_DIR_NAME)
    }
}

fn home_dir() -> Option<PathBuf> {
    env::var_os("HOME").map(PathBuf::from)
}
