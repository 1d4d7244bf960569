//! CLI commands for isthmus.
//!
//! This crate provides the command-line interface:
//! - [`Cli`] - Top-level CLI parser
//! - [`Commands`] - Available subcommands
//! - [`IsthmusConfig`] - Layered configuration
//!
//! Configuration is loaded using Figment with the following priority
//! (highest wins):
//!
//! 1. CLI arguments
//! 2. Config file (TOML)
//! 3. Environment variables (`ISTHMUS_` prefix)
//! 4. Defaults

mod cli;
pub mod commands;
pub mod config;

pub use cli::{Cli, Commands, PlanArgs, ProbeArgs, ResolverArgs, SimulateArgs};
pub use config::IsthmusConfig;

use clap::Parser;
use color_eyre::eyre;
use isthmus_node_core::{logging, version};
use tracing::info;

/// Run isthmus with the process's CLI arguments.
///
/// This is the main entry point that should be called from the binary.
pub async fn run() -> eyre::Result<()> {
    // Setup error handling
    color_eyre::install()?;

    let cli = Cli::parse();
    logging::init_logging(&cli.logs)?;

    info!(version = version::VERSION, commit = version::GIT_SHA, "Starting isthmus");

    let config = IsthmusConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Plan(args) => commands::plan::run(args, config)?,
        Commands::Simulate(args) => commands::simulate::run(args, config).await?,
        Commands::Probe(args) => commands::probe::run(args).await?,
    }

    Ok(())
}
