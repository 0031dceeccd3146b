//! CLI command definitions and dispatch.

pub mod generate;
pub mod input;
pub mod manifests;
pub mod plan;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Grund — compose manifests for local multi-service development.
#[derive(Parser, Debug)]
#[command(name = "grund", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Path to the project configuration file.
    #[arg(long, global = true, env = "GRUND_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory holding the generated manifests.
    #[arg(long, global = true, env = "GRUND_ROOT")]
    pub root: Option<PathBuf>,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate manifests for the selected services and their dependencies.
    Generate(generate::GenerateArgs),
    /// Show what `generate` would write, without writing it.
    Plan(plan::PlanArgs),
    /// List the manifests generated so far.
    Manifests(manifests::ManifestsArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let config = input::load_config(cli.config.as_deref(), cli.root)?;
    match cli.command {
        Command::Generate(args) => generate::execute(args, &config),
        Command::Plan(args) => plan::execute(args, &config),
        Command::Manifests(args) => manifests::execute(args, &config),
    }
}
