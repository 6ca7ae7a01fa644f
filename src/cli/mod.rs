//! Thin command-line layer over [`DefinitionStore`]; subcommands live here.

use std::{path::PathBuf, time::Duration};

use clap::{Args, CommandFactory, Parser, Subcommand};

use crate::{
    config::{OracleKind, StoreConfig, DEFAULT_MIN_FREE_BYTES},
    report::{Report, Severity},
    store::{backup::BackupPaths, lock::LockStrategy, scratch, DefinitionKind, DefinitionStore},
    Error, Result,
};

pub mod add;
pub mod list;
pub mod remove;
pub mod show;

#[derive(Debug, Clone)]
pub enum Command {
    Add(add::AddArgs),
    Update(add::AddArgs),
    Remove(remove::RemoveArgs),
    Get(show::GetArgs),
    Exists(show::ExistsArgs),
    List(list::ListArgs),
    None,
}

#[derive(Debug, Clone)]
pub struct CliArgs {
    pub command: Command,
    pub store: StoreArgs,
}

/// Store location and tuning shared by every subcommand.
#[derive(Debug, Clone, Args, Default)]
pub struct StoreArgs {
    /// Directory holding the `aliases` and `functions` files
    #[arg(long = "dir", env = "SHDEFS_DIR", global = true)]
    pub dir: Option<PathBuf>,

    /// Seconds to wait for another writer before giving up
    #[arg(long = "lock-timeout", env = "SHDEFS_LOCK_TIMEOUT", global = true)]
    pub lock_timeout: Option<f64>,

    /// Locking mechanism for mutating commands
    #[arg(long = "lock-strategy", value_enum, global = true)]
    pub lock_strategy: Option<LockStrategy>,

    /// Minimum free bytes required before a mutation is attempted
    #[arg(long = "min-free-bytes", env = "SHDEFS_MIN_FREE_BYTES", global = true)]
    pub min_free_bytes: Option<u64>,

    /// Validator used before and after publishing a file
    #[arg(long = "oracle", value_enum, global = true)]
    pub oracle: Option<OracleKind>,

    /// Interpreter run as `<shell> -n <file>` by the shell oracle
    #[arg(long = "shell", env = "SHDEFS_SHELL", global = true)]
    pub shell: Option<String>,
}

impl StoreArgs {
    pub fn to_config(&self) -> Result<StoreConfig> {
        let mut config = StoreConfig::default();
        if let Some(dir) = &self.dir {
            config.dir = dir.clone();
        }
        if let Some(secs) = self.lock_timeout {
            config.lock_timeout = Duration::try_from_secs_f64(secs)
                .map_err(|_| Error::Cli(format!("invalid lock timeout: {secs}")))?;
        }
        if let Some(strategy) = self.lock_strategy {
            config.lock_strategy = strategy;
        }
        config.min_free_bytes = self.min_free_bytes.unwrap_or(DEFAULT_MIN_FREE_BYTES);
        if let Some(oracle) = self.oracle {
            config.oracle = oracle;
        }
        if let Some(shell) = &self.shell {
            config.shell = shell.clone();
        }
        Ok(config)
    }
}

pub fn dispatch(args: CliArgs) -> Result<()> {
    if matches!(args.command, Command::None) {
        return Ok(());
    }
    let store = DefinitionStore::open(args.store.to_config()?);

    match args.command {
        Command::Add(a) => {
            scratch::install_signal_cleanup()?;
            add::execute(&store, a, false)
        }
        Command::Update(a) => {
            scratch::install_signal_cleanup()?;
            add::execute(&store, a, true)
        }
        Command::Remove(r) => {
            scratch::install_signal_cleanup()?;
            remove::execute(&store, r)
        }
        Command::Get(g) => show::get(&store, g),
        Command::Exists(e) => show::exists(&store, e),
        Command::List(l) => list::execute(&store, l),
        Command::None => Ok(()),
    }
}

/// Prints non-info findings to stderr and escalates a post-publish
/// validation failure to `IntegrityWarning`.
pub(crate) fn finish(store: &DefinitionStore, kind: DefinitionKind, report: Report) -> Result<()> {
    for finding in report.findings() {
        if finding.severity > Severity::Info {
            eprintln!("{}: {}", finding.severity, finding.message);
        }
    }
    if report.has_critical() {
        let path = store.path(kind);
        let backup = BackupPaths::for_target(&path).current;
        return Err(Error::IntegrityWarning {
            path: path.display().to_string(),
            backup: backup.is_file().then(|| backup.display().to_string()),
        }
        .into());
    }
    Ok(())
}

#[derive(Parser, Debug)]
#[command(name = "shdefs", version, about = "Crash-safe store for shell aliases and functions")]
struct Cli {
    #[command(flatten)]
    store: StoreArgs,

    #[command(subcommand)]
    command: Option<Subcommands>,
}

#[derive(Subcommand, Debug)]
enum Subcommands {
    /// Add a new alias or function.
    Add(add::AddArgs),
    /// Replace the body of an existing alias or function.
    Update(add::AddArgs),
    /// Remove an alias or function.
    #[command(alias = "rm")]
    Remove(remove::RemoveArgs),
    /// Print the command of an alias or the body of a function.
    Get(show::GetArgs),
    /// Exit successfully if the name is defined.
    Exists(show::ExistsArgs),
    /// List defined names.
    #[command(alias = "ls")]
    List(list::ListArgs),
}

/// Parse CLI arguments into internal representation.
pub fn parse_args<I, S>(args: I) -> Result<CliArgs>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let argv: Vec<String> = args.into_iter().map(Into::into).collect();
    let cli = Cli::parse_from(argv);
    let command = match cli.command {
        Some(Subcommands::Add(args)) => Command::Add(args),
        Some(Subcommands::Update(args)) => Command::Update(args),
        Some(Subcommands::Remove(args)) => Command::Remove(args),
        Some(Subcommands::Get(args)) => Command::Get(args),
        Some(Subcommands::Exists(args)) => Command::Exists(args),
        Some(Subcommands::List(args)) => Command::List(args),
        None => Command::None,
    };

    Ok(CliArgs {
        command,
        store: cli.store,
    })
}

/// Build the underlying clap `Command` (useful for help/usage contract tests).
pub fn clap_command() -> clap::Command {
    Cli::command()
}
