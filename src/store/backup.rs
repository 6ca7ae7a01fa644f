//! Two-generation backups: `<file>.bak` holds the state before the latest
//! successful mutation, `<file>.bak.old` the state before that.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use tracing::{debug, info, warn};

use super::sidecar_path;
use crate::{Error, Result};

pub const CURRENT_SUFFIX: &str = ".bak";
pub const OLD_SUFFIX: &str = ".bak.old";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupPaths {
    pub current: PathBuf,
    pub old: PathBuf,
}

impl BackupPaths {
    pub fn for_target(target: &Path) -> Self {
        Self {
            current: sidecar_path(target, CURRENT_SUFFIX),
            old: sidecar_path(target, OLD_SUFFIX),
        }
    }

    /// Number of generations present on disk (0..=2).
    pub fn generations(&self) -> usize {
        [&self.current, &self.old]
            .iter()
            .filter(|p| p.is_file())
            .count()
    }
}

/// Shifts `current` to `old` (dropping the previous `old`) and snapshots the
/// target into a fresh `current`.
///
/// Returns the path of the new backup, or `None` when the target is missing
/// or empty and there is nothing worth keeping. Any I/O failure surfaces as
/// `BackupFailed`; the caller must not touch the target after that.
pub fn rotate_and_backup(target: &Path) -> Result<Option<PathBuf>> {
    let failed = |source: io::Error| Error::BackupFailed {
        path: target.display().to_string(),
        source,
    };

    let len = match fs::metadata(target) {
        Ok(meta) => meta.len(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(failed(err).into()),
    };
    if len == 0 {
        debug!(path = %target.display(), "empty target; no backup taken");
        return Ok(None);
    }

    let paths = BackupPaths::for_target(target);
    if paths.current.exists() {
        remove_if_present(&paths.old).map_err(failed)?;
        fs::rename(&paths.current, &paths.old).map_err(failed)?;
    }
    fs::copy(target, &paths.current).map_err(failed)?;

    debug!(
        path = %target.display(),
        backup = %paths.current.display(),
        bytes = len,
        "backup rotated"
    );
    Ok(Some(paths.current))
}

/// Best-effort restore of `target` from its current backup.
pub fn restore_latest(target: &Path) -> Result<PathBuf> {
    let paths = BackupPaths::for_target(target);
    if !paths.current.is_file() {
        return Err(Error::BackupFailed {
            path: target.display().to_string(),
            source: io::Error::new(io::ErrorKind::NotFound, "no backup to restore from"),
        }
        .into());
    }
    match fs::copy(&paths.current, target) {
        Ok(_) => {
            info!(path = %target.display(), backup = %paths.current.display(), "restored from backup");
            Ok(paths.current)
        }
        Err(source) => {
            warn!(path = %target.display(), error = %source, "restore from backup failed");
            Err(Error::BackupFailed {
                path: target.display().to_string(),
                source,
            }
            .into())
        }
    }
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}
