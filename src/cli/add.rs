//! Implementation of `shdefs add` and `shdefs update`.

use std::io::Read;

use clap::Args;
use tracing::info;

use crate::{store::DefinitionKind, DefinitionStore, Error, Result};

#[derive(Debug, Clone, Args)]
pub struct AddArgs {
    /// Record kind
    #[arg(value_enum)]
    pub kind: DefinitionKind,

    /// Alias or function name
    pub name: String,

    /// Alias command or function body; `-` reads it from stdin
    #[arg(allow_hyphen_values = true)]
    pub body: String,
}

pub fn execute(store: &DefinitionStore, args: AddArgs, replace: bool) -> Result<()> {
    let body = if args.body == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .map_err(|e| Error::Cli(format!("failed to read body from stdin: {e}")))?;
        buf
    } else {
        args.body
    };

    let report = if replace {
        store.update(&args.name, &body, args.kind)?
    } else {
        store.add(&args.name, &body, args.kind)?
    };
    info!(kind = %args.kind, name = %args.name, replace, "definition stored");
    super::finish(store, args.kind, report)
}
