//! `bash -n` as the oracle: parse without executing.

use std::{path::Path, process::Command};

use tracing::debug;

use super::{SyntaxOracle, Verdict};
use crate::{store::DefinitionKind, Error, Result};

pub const DEFAULT_SHELL: &str = "bash";

#[derive(Debug, Clone)]
pub struct ShellOracle {
    program: String,
}

impl ShellOracle {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for ShellOracle {
    fn default() -> Self {
        Self::new(DEFAULT_SHELL)
    }
}

impl SyntaxOracle for ShellOracle {
    fn name(&self) -> &'static str {
        "shell"
    }

    fn validate(&self, path: &Path, _kind: DefinitionKind) -> Result<Verdict> {
        let output = Command::new(&self.program)
            .arg("-n")
            .arg(path)
            .output()
            .map_err(|err| Error::Cli(format!("failed to run {} -n: {err}", self.program)))?;

        if output.status.success() {
            return Ok(Verdict::Valid);
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        debug!(program = %self.program, path = %path.display(), %stderr, "shell rejected file");
        Ok(Verdict::Invalid(if stderr.is_empty() {
            format!("{} -n exited with {}", self.program, output.status)
        } else {
            stderr
        }))
    }
}
