//! CLI command definitions and dispatch.

pub mod decode;
pub mod export;
pub mod observe;
pub mod show;

use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use sockflow_common::config::SockflowConfig;

/// Sockflow: socket relationship tracking and NetFlow v9 export.
#[derive(Parser, Debug)]
#[command(name = sockflow_common::constants::BIN_NAME, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Path to a YAML configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the tracking state file (overrides the configuration).
    #[arg(long, global = true)]
    pub state_file: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fold a batch of raw socket observations into the tracking cache.
    Observe(observe::ObserveArgs),
    /// Encode the tracked relationships as a NetFlow v9 document.
    Export(export::ExportArgs),
    /// Decode a NetFlow document back into connection tables.
    Decode(decode::DecodeArgs),
    /// List tracked relationships by recency.
    Show(show::ShowArgs),
}

/// Settings shared by every subcommand.
#[derive(Debug)]
pub struct Context {
    /// Effective configuration.
    pub config: SockflowConfig,
    /// Where the tracking cache is persisted.
    pub state_file: PathBuf,
}

impl Context {
    /// Resolves configuration and state location from the global flags.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file cannot be loaded.
    pub fn from_cli(config: Option<&PathBuf>, state_file: Option<PathBuf>) -> anyhow::Result<Self> {
        let config = match config {
            Some(path) => SockflowConfig::load(path)
                .with_context(|| format!("failed to load configuration {}", path.display()))?,
            None => SockflowConfig::default(),
        };
        let state_file = state_file.unwrap_or_else(|| config.state_file());
        Ok(Self { config, state_file })
    }
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let ctx = Context::from_cli(cli.config.as_ref(), cli.state_file)?;
    match cli.command {
        Command::Observe(args) => observe::execute(&ctx, args),
        Command::Export(args) => export::execute(&ctx, args),
        Command::Decode(args) => decode::execute(args),
        Command::Show(args) => show::execute(&ctx, args),
    }
}
