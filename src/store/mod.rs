//! The definition store: `aliases` and `functions` files in one directory,
//! with their `.bak`, `.bak.old` and `.lock` sidecars.
//!
//! Mutations (`add`, `update`, `remove`) go through the [`writer::AtomicWriter`]
//! protocol. Reads (`get`, `exists`, `list`) take no lock; the atomic rename
//! on publish means they see either the old or the new file, never a mix.

use std::{
    ffi::OsString,
    fmt, fs, io,
    path::{Path, PathBuf},
    str::FromStr,
};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    config::StoreConfig,
    oracle::{self, SyntaxOracle},
    parser::{self, alias, function, AliasEntry, FunctionEntry},
    report::Report,
    Error, Result,
};

pub mod backup;
pub mod lock;
pub mod scratch;
pub mod space;
pub mod writer;

use writer::{AtomicWriter, WriterSettings};

pub const ALIASES_FILE: &str = "aliases";
pub const FUNCTIONS_FILE: &str = "functions";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefinitionKind {
    Alias,
    Function,
}

impl DefinitionKind {
    pub const ALL: [DefinitionKind; 2] = [DefinitionKind::Alias, DefinitionKind::Function];

    pub fn file_name(self) -> &'static str {
        match self {
            DefinitionKind::Alias => ALIASES_FILE,
            DefinitionKind::Function => FUNCTIONS_FILE,
        }
    }
}

impl fmt::Display for DefinitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DefinitionKind::Alias => "alias",
            DefinitionKind::Function => "function",
        })
    }
}

impl FromStr for DefinitionKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "alias" | "aliases" => Ok(DefinitionKind::Alias),
            "function" | "functions" | "fn" => Ok(DefinitionKind::Function),
            other => Err(Error::Cli(format!("unknown definition kind: {other}")).into()),
        }
    }
}

/// One record as read back from its file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Definition {
    pub kind: DefinitionKind,
    pub name: String,
    /// Alias command, or function body.
    pub body: String,
    /// Record text exactly as stored.
    pub source: String,
}

/// `<file><suffix>` in the same directory, e.g. `aliases.bak`.
pub fn sidecar_path(target: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = target
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(suffix);
    target.with_file_name(name)
}

pub struct DefinitionStore {
    config: StoreConfig,
    oracle: Box<dyn SyntaxOracle>,
}

impl fmt::Debug for DefinitionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefinitionStore")
            .field("config", &self.config)
            .field("oracle", &self.oracle.name())
            .finish()
    }
}

impl DefinitionStore {
    /// Store over `config.dir`. Files are created lazily on the first add.
    pub fn open(config: StoreConfig) -> Self {
        let oracle = oracle::from_config(&config);
        Self { config, oracle }
    }

    pub fn with_oracle(mut self, oracle: Box<dyn SyntaxOracle>) -> Self {
        self.oracle = oracle;
        self
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn path(&self, kind: DefinitionKind) -> PathBuf {
        self.config.dir.join(kind.file_name())
    }

    fn writer(&self) -> AtomicWriter<'_> {
        AtomicWriter::new(self.oracle.as_ref(), WriterSettings::from(&self.config))
    }

    /// Appends a new record. Fails with `AlreadyExists` if the name is taken.
    pub fn add(&self, name: &str, body: &str, kind: DefinitionKind) -> Result<Report> {
        ensure_valid_name(name)?;
        debug!(%kind, name, "add");
        self.writer().commit(&self.path(kind), kind, |content| {
            if contains(content, name, kind) {
                return Err(Error::AlreadyExists {
                    kind,
                    name: name.to_string(),
                }
                .into());
            }
            Ok(append(content, name, body, kind))
        })
    }

    /// Replaces an existing record: remove then append in one transaction,
    /// so backups rotate once and no reader sees the record missing.
    pub fn update(&self, name: &str, body: &str, kind: DefinitionKind) -> Result<Report> {
        ensure_valid_name(name)?;
        debug!(%kind, name, "update");
        self.writer().commit(&self.path(kind), kind, |content| {
            let remaining = exclude(content, name, kind)?.ok_or_else(|| not_found(name, kind))?;
            Ok(append(&remaining, name, body, kind))
        })
    }

    pub fn remove(&self, name: &str, kind: DefinitionKind) -> Result<Report> {
        ensure_valid_name(name)?;
        let content = self.read(kind)?;
        if !contains(&content, name, kind) {
            return Err(not_found(name, kind));
        }
        debug!(%kind, name, "remove");
        self.writer().commit(&self.path(kind), kind, |content| {
            exclude(content, name, kind)?.ok_or_else(|| not_found(name, kind))
        })
    }

    pub fn get(&self, name: &str, kind: DefinitionKind) -> Result<Definition> {
        ensure_valid_name(name)?;
        let content = self.read(kind)?;
        let found = match kind {
            DefinitionKind::Alias => alias::get(&content, name)
                .map(|(entry, source)| (entry.command, source)),
            DefinitionKind::Function => function::get(&content, name)
                .map(|(entry, source)| (entry.body, source)),
        };
        let (body, source) = found.ok_or_else(|| not_found(name, kind))?;
        Ok(Definition {
            kind,
            name: name.to_string(),
            body,
            source,
        })
    }

    /// `false` for invalid names and unreadable files.
    pub fn exists(&self, name: &str, kind: DefinitionKind) -> bool {
        if !parser::is_valid_name(name) {
            return false;
        }
        self.read(kind)
            .map(|content| contains(&content, name, kind))
            .unwrap_or(false)
    }

    /// Names in file order.
    pub fn list(&self, kind: DefinitionKind) -> Result<Vec<String>> {
        let content = self.read(kind)?;
        Ok(match kind {
            DefinitionKind::Alias => alias::names(&content),
            DefinitionKind::Function => function::names(&content),
        })
    }

    /// Kinds under which `name` is currently defined.
    pub fn kinds_of(&self, name: &str) -> Vec<DefinitionKind> {
        DefinitionKind::ALL
            .into_iter()
            .filter(|kind| self.exists(name, *kind))
            .collect()
    }

    /// Picks the kind for a name-only request: the explicit kind if given,
    /// otherwise the single kind holding the name. A name held by both
    /// kinds is `Ambiguous`; one held by neither is `NotFound`.
    pub fn resolve_kind(&self, name: &str, kind: Option<DefinitionKind>) -> Result<DefinitionKind> {
        if let Some(kind) = kind {
            return Ok(kind);
        }
        ensure_valid_name(name)?;
        match self.kinds_of(name).as_slice() {
            [only] => Ok(*only),
            [] => Err(Error::NotFound {
                kind: None,
                name: name.to_string(),
            }
            .into()),
            _ => Err(Error::Ambiguous(name.to_string()).into()),
        }
    }

    fn read(&self, kind: DefinitionKind) -> Result<String> {
        match fs::read_to_string(self.path(kind)) {
            Ok(content) => Ok(content),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(String::new()),
            Err(err) => Err(Error::Io(err).into()),
        }
    }
}

fn ensure_valid_name(name: &str) -> Result<()> {
    if parser::is_valid_name(name) {
        Ok(())
    } else {
        Err(Error::NameInvalid(name.to_string()).into())
    }
}

fn not_found(name: &str, kind: DefinitionKind) -> anyhow::Error {
    Error::NotFound {
        kind: Some(kind),
        name: name.to_string(),
    }
    .into()
}

fn contains(content: &str, name: &str, kind: DefinitionKind) -> bool {
    match kind {
        DefinitionKind::Alias => alias::find(content, name).is_some(),
        DefinitionKind::Function => function::find(content, name).is_some(),
    }
}

fn append(content: &str, name: &str, body: &str, kind: DefinitionKind) -> String {
    match kind {
        DefinitionKind::Alias => alias::append(content, &AliasEntry::new(name, body)),
        DefinitionKind::Function => function::append(content, &FunctionEntry::new(name, body)),
    }
}

fn exclude(content: &str, name: &str, kind: DefinitionKind) -> Result<Option<String>> {
    match kind {
        DefinitionKind::Alias => Ok(alias::remove(content, name)),
        DefinitionKind::Function => function::remove(content, name),
    }
}
