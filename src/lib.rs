use thiserror::Error;

pub mod cli;
pub mod config;
pub mod logging;
pub mod oracle;
pub mod parser;
pub mod report;
pub mod store;

pub use config::StoreConfig;
pub use report::{Finding, Report, Severity};
pub use store::{Definition, DefinitionKind, DefinitionStore};

pub type Result<T> = anyhow::Result<T>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid name: {0:?} (expected a letter or underscore followed by letters, digits or underscores)")]
    NameInvalid(String),
    #[error("{} not found: {name}", kind_label(.kind))]
    NotFound {
        kind: Option<DefinitionKind>,
        name: String,
    },
    #[error("{kind} already exists: {name}")]
    AlreadyExists { kind: DefinitionKind, name: String },
    #[error("{0} is defined both as an alias and as a function; pass an explicit kind")]
    Ambiguous(String),
    #[error("lock timeout: {path} still held after {waited_ms} ms")]
    LockTimeout { path: String, waited_ms: u128 },
    #[error("insufficient disk space for {path}: {available} bytes free, {required} required")]
    InsufficientDiskSpace {
        path: String,
        available: u64,
        required: u64,
    },
    #[error("scratch file creation failed next to {path}")]
    ScratchCreationFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("write failed: {path}")]
    WriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("syntax invalid: {path}: {detail}")]
    SyntaxInvalid { path: String, detail: String },
    #[error("publish failed: {path}{}", backup_hint(.backup))]
    PublishFailed {
        path: String,
        backup: Option<String>,
        #[source]
        source: std::io::Error,
    },
    #[error("backup failed: {path}")]
    BackupFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("integrity warning: {path} failed validation after publish{}", backup_hint(.backup))]
    IntegrityWarning {
        path: String,
        backup: Option<String>,
    },
    #[error("serialization error")]
    Serde(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("cli error: {0}")]
    Cli(String),
}

fn kind_label(kind: &Option<DefinitionKind>) -> String {
    kind.map_or_else(|| "definition".to_string(), |k| k.to_string())
}

fn backup_hint(backup: &Option<String>) -> String {
    match backup {
        Some(path) => format!(" (backup available at {path})"),
        None => String::new(),
    }
}

impl Error {
    /// Process exit status for this failure kind. Every kind maps to its own
    /// non-zero code so scripts can tell them apart.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::NameInvalid(_) => 2,
            Error::NotFound { .. } => 3,
            Error::AlreadyExists { .. } => 4,
            Error::Ambiguous(_) => 5,
            Error::LockTimeout { .. } => 6,
            Error::InsufficientDiskSpace { .. } => 7,
            Error::ScratchCreationFailed { .. } => 8,
            Error::WriteFailed { .. } => 9,
            Error::SyntaxInvalid { .. } => 10,
            Error::PublishFailed { .. } => 11,
            Error::BackupFailed { .. } => 12,
            Error::IntegrityWarning { .. } => 13,
            Error::Serde(_) | Error::Io(_) | Error::Cli(_) => 1,
        }
    }
}

/// Exit code for an arbitrary error coming out of [`run`].
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<Error>().map_or(1, Error::exit_code)
}

/// Entry point for the library, called by the CLI thin wrapper.
pub fn run<I, S>(args: I) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    // Initialize logging before doing anything else.
    logging::init_logging(logging::LogFormat::from_env())?;

    let cli_args = cli::parse_args(args.into_iter().map(Into::into))?;
    cli::dispatch(cli_args)
}
