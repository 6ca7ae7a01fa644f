//! Syntax oracles: confirm a candidate file is a loadable script fragment
//! before (and after) it is published.

use std::path::Path;

use crate::{
    config::{OracleKind, StoreConfig},
    store::DefinitionKind,
    Result,
};

pub mod builtin;
pub mod shell;

pub use builtin::BuiltinOracle;
pub use shell::ShellOracle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Valid,
    /// Human-readable reason, usually naming the offending line.
    Invalid(String),
}

impl Verdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, Verdict::Valid)
    }
}

/// Validator contract. `Err` means the oracle itself could not run; a
/// malformed file is `Ok(Verdict::Invalid(_))`.
pub trait SyntaxOracle: Send + Sync {
    fn name(&self) -> &'static str;

    fn validate(&self, path: &Path, kind: DefinitionKind) -> Result<Verdict>;
}

pub fn from_config(config: &StoreConfig) -> Box<dyn SyntaxOracle> {
    match config.oracle {
        OracleKind::Builtin => Box::new(BuiltinOracle),
        OracleKind::Shell => Box::new(ShellOracle::new(config.shell.as_str())),
    }
}
