//! Implementation of `shdefs list`.

use clap::{Args, ValueEnum};
use serde::Serialize;

use crate::{store::DefinitionKind, DefinitionStore, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum ListFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Args, Default)]
pub struct ListArgs {
    /// Only list this collection
    #[arg(long = "kind", value_enum)]
    pub kind: Option<DefinitionKind>,

    /// Output format
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: ListFormat,
}

#[derive(Debug, Serialize)]
struct Listing {
    kind: DefinitionKind,
    names: Vec<String>,
}

pub fn execute(store: &DefinitionStore, args: ListArgs) -> Result<()> {
    let kinds = match args.kind {
        Some(kind) => vec![kind],
        None => DefinitionKind::ALL.to_vec(),
    };
    let mut listings = Vec::with_capacity(kinds.len());
    for kind in kinds {
        listings.push(Listing {
            kind,
            names: store.list(kind)?,
        });
    }

    match args.format {
        ListFormat::Json => println!("{}", serde_json::to_string_pretty(&listings)?),
        ListFormat::Text => print!("{}", format_text(&listings)),
    }
    Ok(())
}

fn format_text(listings: &[Listing]) -> String {
    let mut out = String::new();
    for listing in listings {
        for name in &listing.names {
            out.push_str(&format!("{}\t{name}\n", listing.kind));
        }
    }
    out
}
