//! Crash-safe publish protocol for one definition file.
//!
//! 1. take the per-file lock;
//! 2. read the current content and check free space against its size;
//! 3. compute the new content (the edit can still fail with
//!    `NotFound`/`AlreadyExists`, nothing has been touched);
//! 4. stage the new content in a registered scratch file beside the target;
//! 5. validate the scratch file; an invalid candidate is discarded;
//! 6. rotate backups;
//! 7. rename the scratch file over the target, restoring from the backup
//!    if the rename fails and left the target different from it;
//! 8. release the lock and re-validate the live file, reporting a failure
//!    as a critical finding rather than an error.
//!
//! The rename in step 7 is the only change other processes can observe.

use std::{
    fs::{self, Permissions},
    io,
    path::Path,
    time::Duration,
};

use tracing::{debug, error, info, instrument, warn};

use super::{
    backup::{self, BackupPaths},
    lock::{self, LockStrategy},
    scratch::ScratchFile,
    space, DefinitionKind,
};
use crate::{
    config::StoreConfig,
    oracle::{SyntaxOracle, Verdict},
    report::Report,
    Error, Result,
};

#[cfg(unix)]
const NEW_FILE_MODE: u32 = 0o644;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriterSettings {
    pub lock_timeout: Duration,
    pub lock_strategy: LockStrategy,
    pub min_free_bytes: u64,
}

impl From<&StoreConfig> for WriterSettings {
    fn from(config: &StoreConfig) -> Self {
        Self {
            lock_timeout: config.lock_timeout,
            lock_strategy: config.lock_strategy,
            min_free_bytes: config.min_free_bytes,
        }
    }
}

pub struct AtomicWriter<'a> {
    oracle: &'a dyn SyntaxOracle,
    settings: WriterSettings,
}

impl<'a> AtomicWriter<'a> {
    pub fn new(oracle: &'a dyn SyntaxOracle, settings: WriterSettings) -> Self {
        Self { oracle, settings }
    }

    /// Replaces the content of `target` with `edit(current)` under the full
    /// protocol. A missing target reads as empty content.
    #[instrument(skip(self, edit), fields(path = %target.display(), kind = %kind))]
    pub fn commit<F>(&self, target: &Path, kind: DefinitionKind, edit: F) -> Result<Report>
    where
        F: FnOnce(&str) -> Result<String>,
    {
        let mut report = Report::new();

        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut guard = lock::acquire(target, self.settings.lock_timeout, self.settings.lock_strategy)?;

        let current = read_current(target)?;
        let current_len = current.as_ref().map_or(0, |c| c.len() as u64);
        space::ensure_capacity(target, current_len, self.settings.min_free_bytes, &mut report)?;

        let updated = edit(current.as_deref().unwrap_or(""))?;

        let mut scratch = ScratchFile::create_beside(target)?;
        scratch.write_all(updated.as_bytes())?;
        if let Some(perms) = permissions_for(target)? {
            scratch.set_permissions(perms)?;
        }

        if let Verdict::Invalid(detail) = self.oracle.validate(scratch.path(), kind)? {
            warn!(oracle = self.oracle.name(), %detail, "candidate rejected; target untouched");
            scratch.discard();
            return Err(Error::SyntaxInvalid {
                path: target.display().to_string(),
                detail,
            }
            .into());
        }

        let backup_path = backup::rotate_and_backup(target)?;
        if let Some(path) = &backup_path {
            report.info(format!("backup written to {}", path.display()));
        }

        if let Err(source) = scratch.persist(target) {
            error!(error = %source, "publish failed");
            if let Some(backup) = &backup_path {
                restore_if_changed(target, backup);
            }
            return Err(Error::PublishFailed {
                path: target.display().to_string(),
                backup: backup_path.map(|p| p.display().to_string()),
                source,
            }
            .into());
        }

        guard.release();
        info!(bytes = updated.len(), "published");

        self.verify_live(target, kind, &mut report);
        Ok(report)
    }

    fn verify_live(&self, target: &Path, kind: DefinitionKind, report: &mut Report) {
        let backup = BackupPaths::for_target(target).current;
        let backup_hint = backup
            .is_file()
            .then(|| format!("; backup at {}", backup.display()))
            .unwrap_or_default();

        match self.oracle.validate(target, kind) {
            Ok(Verdict::Valid) => debug!("live file validated"),
            Ok(Verdict::Invalid(detail)) => {
                error!(path = %target.display(), %detail, "live file failed validation after publish");
                report.critical(
                    format!("{} failed validation after publish: {detail}{backup_hint}", target.display()),
                    Some(target.to_path_buf()),
                );
            }
            Err(err) => {
                error!(path = %target.display(), error = %err, "could not re-validate live file");
                report.critical(
                    format!("{} could not be re-validated: {err}{backup_hint}", target.display()),
                    Some(target.to_path_buf()),
                );
            }
        }
    }
}

/// Copies `backup` over `target` unless the failed rename left the target
/// identical to it.
fn restore_if_changed(target: &Path, backup: &Path) {
    match (fs::read(target), fs::read(backup)) {
        (Ok(live), Ok(saved)) if live == saved => {
            debug!(path = %target.display(), "target unchanged by failed publish; no restore needed");
        }
        _ => {
            if let Err(err) = backup::restore_latest(target) {
                error!(path = %target.display(), error = %err, "restore after failed publish also failed");
            }
        }
    }
}

fn read_current(target: &Path) -> Result<Option<String>> {
    match fs::read_to_string(target) {
        Ok(content) => Ok(Some(content)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(Error::WriteFailed {
            path: target.display().to_string(),
            source,
        }
        .into()),
    }
}

/// Mode of the file being replaced, or the default for a new file.
fn permissions_for(target: &Path) -> Result<Option<Permissions>> {
    match fs::metadata(target) {
        Ok(meta) => Ok(Some(meta.permissions())),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(default_permissions()),
        Err(err) => Err(Error::Io(err).into()),
    }
}

#[cfg(unix)]
fn default_permissions() -> Option<Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Some(Permissions::from_mode(NEW_FILE_MODE))
}

#[cfg(not(unix))]
fn default_permissions() -> Option<Permissions> {
    None
}
