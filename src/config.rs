//! Store configuration shared by the library and the CLI.

use std::{path::PathBuf, time::Duration};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::{oracle::shell::DEFAULT_SHELL, store::lock::LockStrategy};

pub const DEFAULT_DIR_NAME: &str = ".shdefs";
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);
/// Floor for the free-space check; the guard also requires room for a backup
/// copy and a rewritten copy of the current file.
pub const DEFAULT_MIN_FREE_BYTES: u64 = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OracleKind {
    /// Minimal checker for the alias and function record grammars.
    #[default]
    Builtin,
    /// `bash -n` on the candidate file.
    Shell,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Directory holding `aliases`, `functions` and their sidecars.
    pub dir: PathBuf,
    pub lock_timeout: Duration,
    pub lock_strategy: LockStrategy,
    pub min_free_bytes: u64,
    pub oracle: OracleKind,
    /// Interpreter used by [`OracleKind::Shell`].
    pub shell: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let dir = dirs::home_dir()
            .map(|home| home.join(DEFAULT_DIR_NAME))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DIR_NAME));
        Self {
            dir,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            lock_strategy: LockStrategy::default(),
            min_free_bytes: DEFAULT_MIN_FREE_BYTES,
            oracle: OracleKind::default(),
            shell: DEFAULT_SHELL.to_string(),
        }
    }
}

impl StoreConfig {
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Self::default()
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_lock_strategy(mut self, strategy: LockStrategy) -> Self {
        self.lock_strategy = strategy;
        self
    }

    pub fn with_min_free_bytes(mut self, bytes: u64) -> Self {
        self.min_free_bytes = bytes;
        self
    }

    pub fn with_oracle(mut self, oracle: OracleKind) -> Self {
        self.oracle = oracle;
        self
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }
}
