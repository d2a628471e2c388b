//! CLI command definitions and dispatch.

mod check;
mod run;
mod tags;
mod version;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{self, DEFAULT_CONFIG_PATH};
use crate::logging::{self, LogFormat};

/// Shipwatch - watch running containers for image updates.
#[derive(Parser)]
#[command(name = "shipwatch", version, about)]
pub struct Cli {
    /// Configuration file
    #[arg(long, short = 'c', global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Log line format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Command {
    /// Register every configured component and watch until interrupted
    Run(run::RunArgs),
    /// Validate the configuration and print it with secrets masked
    Check(check::CheckArgs),
    /// List update candidates for one image reference
    Tags(tags::TagsArgs),
    /// Show version information
    Version(version::VersionArgs),
}

/// Dispatch a parsed CLI to the appropriate command handler.
pub async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let command = match cli.command {
        Command::Version(args) => return version::execute(args).await,
        command => command,
    };

    let config = config::load(&cli.config)?;
    logging::init(cli.log_format, config.log_level)?;

    match command {
        Command::Run(args) => run::execute(args, config).await,
        Command::Check(args) => check::execute(args, config).await,
        Command::Tags(args) => tags::execute(args, config).await,
        Command::Version(args) => version::execute(args).await,
    }
}
