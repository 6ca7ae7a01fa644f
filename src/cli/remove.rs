//! Implementation of `shdefs remove`.

use clap::Args;
use tracing::info;

use crate::{store::DefinitionKind, DefinitionStore, Result};

#[derive(Debug, Clone, Args)]
pub struct RemoveArgs {
    /// Alias or function name
    pub name: String,

    /// Record kind; required when the name is both an alias and a function
    #[arg(long = "kind", value_enum)]
    pub kind: Option<DefinitionKind>,
}

pub fn execute(store: &DefinitionStore, args: RemoveArgs) -> Result<()> {
    let kind = store.resolve_kind(&args.name, args.kind)?;
    let report = store.remove(&args.name, kind)?;
    info!(%kind, name = %args.name, "definition removed");
    super::finish(store, kind, report)
}
