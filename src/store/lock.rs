//! Per-file mutual exclusion across invocations.
//!
//! The token lives at `<file>.lock` and carries a JSON [`LockOwner`] record.
//! The preferred strategy holds an advisory exclusive lock on the token;
//! where the filesystem refuses advisory locks the token itself becomes the
//! mutex (exclusive create), and tokens whose owner process is gone are
//! reclaimed. Reclaiming is serialized through a second exclusive-create
//! file, `<file>.lock.reclaim`, and the token is re-judged while it is held,
//! so a contender can only ever delete the stale token it inspected.

use std::{
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use clap::ValueEnum;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{scratch, sidecar_path};
use crate::{Error, Result};

pub const LOCK_SUFFIX: &str = ".lock";
pub const RECLAIM_SUFFIX: &str = ".reclaim";
const POLL_INTERVAL: Duration = Duration::from_millis(25);
/// A token whose owner record cannot be read is treated as stale only after
/// this long, so a holder caught between create and write is not robbed.
const UNREADABLE_TOKEN_GRACE: Duration = Duration::from_secs(30);
/// A reclaim guard older than this was left by a contender that died while
/// reclaiming.
const RECLAIM_GUARD_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockStrategy {
    /// Advisory lock, falling back to the token file when unsupported.
    #[default]
    Auto,
    Advisory,
    /// Exclusive-create token with stale-owner reclamation.
    Token,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockOwner {
    pub token: Uuid,
    pub pid: i32,
    pub host: String,
    pub acquired_at: u64,
}

impl LockOwner {
    fn current() -> Self {
        Self {
            token: Uuid::new_v4(),
            pid: std::process::id() as i32,
            host: std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".into()),
            acquired_at: now_secs(),
        }
    }

    pub fn read(path: &Path) -> Result<Self> {
        let data = fs::read(path)?;
        let owner: LockOwner = serde_json::from_slice(&data)?;
        Ok(owner)
    }

    pub fn is_alive(&self) -> bool {
        pid_alive(self.pid)
    }
}

/// Exclusive hold on one definition file. Released on drop.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    owner: LockOwner,
    /// Open token handle while an advisory lock is held.
    file: Option<File>,
    released: bool,
}

impl LockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn owner(&self) -> &LockOwner {
        &self.owner
    }

    /// Removes the token and drops the advisory lock. Idempotent.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        // Remove the token before unlocking so a waiter that wins the old
        // inode notices it was unlinked and retries on a fresh token.
        let still_ours = match &self.file {
            Some(_) => true,
            None => LockOwner::read(&self.path)
                .map(|owner| owner.token == self.owner.token)
                .unwrap_or(false),
        };
        if still_ours {
            if let Err(err) = fs::remove_file(&self.path) {
                if err.kind() != io::ErrorKind::NotFound {
                    warn!(path = %self.path.display(), error = %err, "failed to remove lock token");
                }
            }
        }
        if let Some(file) = self.file.take() {
            let _ = file.unlock();
        }
        scratch::unregister(&self.path);
        debug!(path = %self.path.display(), "lock released");
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.release();
    }
}

pub fn lock_path(target: &Path) -> PathBuf {
    sidecar_path(target, LOCK_SUFFIX)
}

/// Blocks up to `timeout` for exclusive access to `target`.
pub fn acquire(target: &Path, timeout: Duration, strategy: LockStrategy) -> Result<LockGuard> {
    let path = lock_path(target);
    let started = Instant::now();
    // A timeout too large to represent never expires.
    let deadline = started.checked_add(timeout);

    let guard = match strategy {
        LockStrategy::Token => acquire_token(&path, deadline)?,
        LockStrategy::Advisory | LockStrategy::Auto => match acquire_advisory(&path, deadline)? {
            Some(guard) => guard,
            None if strategy == LockStrategy::Auto => {
                warn!(path = %path.display(), "advisory locks unsupported; using token file");
                acquire_token(&path, deadline)?
            }
            None => {
                return Err(Error::Cli(format!(
                    "advisory locks are not supported for {}",
                    path.display()
                ))
                .into())
            }
        },
    };

    match guard {
        Some(guard) => {
            debug!(path = %path.display(), waited_ms = started.elapsed().as_millis(), "lock acquired");
            Ok(guard)
        }
        None => Err(Error::LockTimeout {
            path: path.display().to_string(),
            waited_ms: started.elapsed().as_millis(),
        }
        .into()),
    }
}

/// `Ok(None)` means advisory locking is unsupported here; `Ok(Some(None))`
/// means the deadline passed.
fn acquire_advisory(path: &Path, deadline: Option<Instant>) -> Result<Option<Option<LockGuard>>> {
    let contended = fs2::lock_contended_error().raw_os_error();
    loop {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                if !same_file(&file, path) {
                    // The previous holder unlinked the token after we opened it.
                    let _ = file.unlock();
                    continue;
                }
                let owner = LockOwner::current();
                write_owner(&file, &owner)?;
                scratch::register(path);
                return Ok(Some(Some(LockGuard {
                    path: path.to_path_buf(),
                    owner,
                    file: Some(file),
                    released: false,
                })));
            }
            Err(err) if err.raw_os_error() == contended || err.kind() == io::ErrorKind::WouldBlock => {}
            Err(err) if unsupported(&err) => return Ok(None),
            Err(err) => return Err(Error::Io(err).into()),
        }

        if expired(deadline) {
            return Ok(Some(None));
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn acquire_token(path: &Path, deadline: Option<Instant>) -> Result<Option<LockGuard>> {
    loop {
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => {
                let owner = LockOwner::current();
                write_owner(&file, &owner)?;
                scratch::register(path);
                return Ok(Some(LockGuard {
                    path: path.to_path_buf(),
                    owner,
                    file: None,
                    released: false,
                }));
            }
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                if reclaim_if_stale(path)? {
                    continue;
                }
            }
            Err(err) => return Err(Error::Io(err).into()),
        }

        if expired(deadline) {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn expired(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|deadline| Instant::now() >= deadline)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenState {
    Missing,
    Held,
    Stale,
}

fn token_state(path: &Path) -> Result<TokenState> {
    match LockOwner::read(path) {
        Ok(owner) if owner.is_alive() => Ok(TokenState::Held),
        Ok(_) => Ok(TokenState::Stale),
        Err(err) if is_not_found(&err) => Ok(TokenState::Missing),
        Err(_) => {
            let age = fs::metadata(path)
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| modified.elapsed().ok());
            Ok(match age {
                Some(age) if age >= UNREADABLE_TOKEN_GRACE => TokenState::Stale,
                Some(_) => TokenState::Held,
                None => TokenState::Missing,
            })
        }
    }
}

/// Deletes the token when its recorded owner is no longer running.
/// Returns `true` when the token was reclaimed (or vanished meanwhile), and
/// `false` when it is held or another contender is reclaiming it.
pub fn reclaim_if_stale(path: &Path) -> Result<bool> {
    match token_state(path)? {
        TokenState::Missing => return Ok(true),
        TokenState::Held => return Ok(false),
        TokenState::Stale => {}
    }

    let Some(_guard) = ReclaimGuard::try_acquire(path)? else {
        return Ok(false);
    };
    // Another contender may have reclaimed and re-locked since the first look.
    match token_state(path)? {
        TokenState::Missing => Ok(true),
        TokenState::Held => Ok(false),
        TokenState::Stale => {
            match LockOwner::read(path) {
                Ok(owner) => {
                    warn!(path = %path.display(), pid = owner.pid, host = %owner.host, "reclaiming stale lock")
                }
                Err(_) => warn!(path = %path.display(), "reclaiming unreadable lock token"),
            }
            match fs::remove_file(path) {
                Ok(()) => Ok(true),
                Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(true),
                Err(err) => Err(Error::Io(err).into()),
            }
        }
    }
}

/// Exclusive right to delete a stale token. Removed on drop.
struct ReclaimGuard {
    path: PathBuf,
}

impl ReclaimGuard {
    fn try_acquire(token: &Path) -> Result<Option<Self>> {
        let path = sidecar_path(token, RECLAIM_SUFFIX);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => {
                scratch::register(&path);
                Ok(Some(Self { path }))
            }
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                let abandoned = fs::metadata(&path)
                    .and_then(|m| m.modified())
                    .ok()
                    .and_then(|modified| modified.elapsed().ok())
                    .is_some_and(|age| age >= RECLAIM_GUARD_GRACE);
                if abandoned {
                    warn!(path = %path.display(), "removing abandoned reclaim guard");
                    let _ = fs::remove_file(&path);
                }
                Ok(None)
            }
            Err(err) => Err(Error::Io(err).into()),
        }
    }
}

impl Drop for ReclaimGuard {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            if err.kind() != io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %err, "failed to remove reclaim guard");
            }
        }
        scratch::unregister(&self.path);
    }
}

fn write_owner(mut file: &File, owner: &LockOwner) -> Result<()> {
    let data = serde_json::to_vec_pretty(owner)?;
    file.set_len(0)?;
    file.write_all(&data)?;
    file.sync_all()?;
    Ok(())
}

#[cfg(unix)]
fn same_file(file: &File, path: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;

    match (file.metadata(), fs::metadata(path)) {
        (Ok(held), Ok(current)) => held.dev() == current.dev() && held.ino() == current.ino(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn same_file(_file: &File, path: &Path) -> bool {
    path.exists()
}

fn unsupported(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::Unsupported {
        return true;
    }
    #[cfg(unix)]
    {
        matches!(err.raw_os_error(), Some(libc::ENOLCK) | Some(libc::EOPNOTSUPP) | Some(libc::ENOSYS))
    }
    #[cfg(not(unix))]
    {
        false
    }
}

fn is_not_found(err: &anyhow::Error) -> bool {
    err.downcast_ref::<io::Error>()
        .map(|io| io.kind() == io::ErrorKind::NotFound)
        .unwrap_or(false)
}

/// `kill(pid, 0)` probe: the process exists unless the kernel says ESRCH.
pub fn pid_alive(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    #[cfg(unix)]
    {
        if unsafe { libc::kill(pid, 0) } == 0 {
            return true;
        }
        io::Error::last_os_error().raw_os_error() != Some(libc::ESRCH)
    }
    #[cfg(not(unix))]
    {
        true
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
