//! Command-line interface.
//!
//! Each subcommand lives in its own module with a `cmd` entry point. All of
//! them build the same [`Orchestrator`] from the saved configuration.

pub mod check;
pub mod download;
pub mod init;
pub mod install;
pub mod startup;
pub mod status;
pub mod update;

use crate::libs::config::Config;
use crate::libs::http::HttpTransport;
use crate::libs::orchestrator::Orchestrator;
use crate::libs::process::SystemProcess;
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Configuration initialization")]
    Init(init::InitArgs),
    #[command(about = "Check whether a newer version is available")]
    Check(check::CheckArgs),
    #[command(about = "Download the latest version without installing it")]
    Download,
    #[command(about = "Install the downloaded update")]
    Install,
    #[command(about = "Check, download and install the latest version")]
    Update(update::UpdateArgs),
    #[command(about = "Show current version and pending update")]
    Status,
    #[command(about = "Report what the previous run left behind")]
    Startup,
}

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help(true))]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    pub async fn menu() -> Result<()> {
        let cli = Self::parse();
        match cli.command {
            Commands::Init(args) => init::cmd(args),
            Commands::Check(args) => check::cmd(args).await,
            Commands::Download => download::cmd().await,
            Commands::Install => install::cmd().await,
            Commands::Update(args) => update::cmd(args).await,
            Commands::Status => status::cmd(),
            Commands::Startup => startup::cmd(),
        }
    }
}

pub(crate) fn orchestrator() -> Result<Orchestrator> {
    let settings = Config::read()?.settings()?;
    let transport = HttpTransport::new(&settings.user_agent)?;
    Ok(Orchestrator::new(
        settings,
        Arc::new(transport),
        Arc::new(SystemProcess::new()),
    ))
}
