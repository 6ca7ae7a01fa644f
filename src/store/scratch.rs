//! Process-wide registry of paths that must not outlive the process, and
//! the scratch file used to stage a new version of a definition file.
//!
//! Every scratch file is registered from creation until it is either renamed
//! into place or discarded. Held lock tokens are registered too. Whatever is
//! still registered when the process ends (normal return, error return or
//! SIGINT/SIGTERM) is deleted by [`cleanup_all`].

use std::{
    collections::BTreeSet,
    fs::{self, Permissions},
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Once,
};

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tempfile::{Builder, NamedTempFile};
use tracing::{debug, info, warn};

use crate::{Error, Result};

/// Exit status used after cleaning up on an interrupt.
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

static PENDING: Lazy<Mutex<BTreeSet<PathBuf>>> = Lazy::new(|| Mutex::new(BTreeSet::new()));
static SIGNAL_HOOK: Once = Once::new();

pub fn register(path: &Path) {
    PENDING.lock().insert(path.to_path_buf());
}

/// Returns `true` if the path was registered.
pub fn unregister(path: &Path) -> bool {
    PENDING.lock().remove(path)
}

pub fn is_registered(path: &Path) -> bool {
    PENDING.lock().contains(path)
}

pub fn pending() -> Vec<PathBuf> {
    PENDING.lock().iter().cloned().collect()
}

/// Deletes every registered path and empties the registry. Returns how many
/// files were actually removed.
pub fn cleanup_all() -> usize {
    let paths: Vec<PathBuf> = std::mem::take(&mut *PENDING.lock()).into_iter().collect();
    let mut removed = 0;
    for path in paths {
        match fs::remove_file(&path) {
            Ok(()) => {
                removed += 1;
                debug!(path = %path.display(), "removed unfinished file");
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => warn!(path = %path.display(), error = %err, "failed to remove unfinished file"),
        }
    }
    removed
}

/// Installs the SIGINT/SIGTERM handler that runs [`cleanup_all`] before
/// exiting. Only the first call installs anything.
pub fn install_signal_cleanup() -> Result<()> {
    let mut outcome = Ok(());
    SIGNAL_HOOK.call_once(|| {
        outcome = ctrlc::set_handler(|| {
            let removed = cleanup_all();
            info!(removed, "interrupted; unfinished files removed");
            std::process::exit(INTERRUPTED_EXIT_CODE);
        })
        .map_err(|e| Error::Cli(format!("failed to install signal handler: {e}")));
    });
    outcome.map_err(Into::into)
}

/// Staging file created in the target's directory so the final rename
/// stays on one filesystem. Deleted on drop unless persisted.
#[derive(Debug)]
pub struct ScratchFile {
    file: Option<NamedTempFile>,
    path: PathBuf,
}

impl ScratchFile {
    pub fn create_beside(target: &Path) -> Result<Self> {
        let dir = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let stem = target
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "definitions".into());

        let file = Builder::new()
            .prefix(&format!(".{stem}."))
            .suffix(".tmp")
            .tempfile_in(dir)
            .map_err(|source| Error::ScratchCreationFailed {
                path: target.display().to_string(),
                source,
            })?;
        let path = file.path().to_path_buf();
        register(&path);
        debug!(path = %path.display(), "scratch file created");
        Ok(Self {
            file: Some(file),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the full new content and flushes it to disk.
    pub fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let path = self.path.display().to_string();
        let file = self.file.as_mut().ok_or_else(|| Error::WriteFailed {
            path: path.clone(),
            source: io::Error::new(io::ErrorKind::Other, "scratch file already handed off"),
        })?;
        write_and_sync(file, bytes).map_err(|source| Error::WriteFailed { path, source })?;
        Ok(())
    }

    pub fn set_permissions(&self, perms: Permissions) -> Result<()> {
        if let Some(file) = &self.file {
            file.as_file()
                .set_permissions(perms)
                .map_err(|source| Error::WriteFailed {
                    path: self.path.display().to_string(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Atomically renames the scratch file over `target`. On failure the
    /// scratch file is discarded.
    pub fn persist(mut self, target: &Path) -> io::Result<()> {
        let file = self
            .file
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "scratch file already handed off"))?;
        // On failure the handle inside the error is dropped here, deleting the file.
        let outcome = file.persist(target).map(|_| ()).map_err(|err| err.error);
        unregister(&self.path);
        outcome
    }

    /// Deletes the scratch file now.
    pub fn discard(mut self) {
        self.close();
    }

    fn close(&mut self) {
        if let Some(file) = self.file.take() {
            if let Err(err) = file.close() {
                warn!(path = %self.path.display(), error = %err, "failed to remove scratch file");
            }
            unregister(&self.path);
        }
    }
}

fn write_and_sync(file: &mut NamedTempFile, bytes: &[u8]) -> io::Result<()> {
    file.write_all(bytes)?;
    file.flush()?;
    file.as_file().sync_all()
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        self.close();
    }
}
