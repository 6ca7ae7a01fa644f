//! Read-only lookups: `shdefs get` and `shdefs exists`.

use clap::Args;

use crate::{store::DefinitionKind, DefinitionStore, Error, Result};

#[derive(Debug, Clone, Args)]
pub struct GetArgs {
    /// Alias or function name
    pub name: String,

    /// Record kind; required when the name is both an alias and a function
    #[arg(long = "kind", value_enum)]
    pub kind: Option<DefinitionKind>,

    /// Print the stored record instead of just the command/body
    #[arg(long = "source", default_value_t = false)]
    pub source: bool,
}

#[derive(Debug, Clone, Args)]
pub struct ExistsArgs {
    /// Alias or function name
    pub name: String,

    /// Only look in this collection
    #[arg(long = "kind", value_enum)]
    pub kind: Option<DefinitionKind>,
}

pub fn get(store: &DefinitionStore, args: GetArgs) -> Result<()> {
    let kind = store.resolve_kind(&args.name, args.kind)?;
    let definition = store.get(&args.name, kind)?;
    if args.source {
        println!("{}", definition.source);
    } else {
        println!("{}", definition.body);
    }
    Ok(())
}

/// Prints the kinds holding the name; `NotFound` when there are none.
pub fn exists(store: &DefinitionStore, args: ExistsArgs) -> Result<()> {
    let kinds: Vec<DefinitionKind> = match args.kind {
        Some(kind) => store
            .exists(&args.name, kind)
            .then_some(kind)
            .into_iter()
            .collect(),
        None => store.kinds_of(&args.name),
    };
    if kinds.is_empty() {
        return Err(Error::NotFound {
            kind: args.kind,
            name: args.name,
        }
        .into());
    }
    for kind in kinds {
        println!("{kind}");
    }
    Ok(())
}
