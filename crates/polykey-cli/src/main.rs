//! Polykey CLI - drives the voice-control core against the simulated backend.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "polykey")]
#[command(author, version, about = "Polykey voice-control core CLI", long_about = None)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Engine config file (defaults to the user config directory)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play a note script in real time on the control thread
    Play(commands::play::PlayArgs),

    /// Run a note script deterministically on a manual clock
    Scenario(commands::scenario::ScenarioArgs),

    /// List, show, and copy voice templates
    Templates(commands::templates::TemplatesArgs),

    /// Show, create, and validate engine configuration
    Config(commands::config::ConfigArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()),
        )
        .with_target(false)
        .init();

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Play(args) => commands::play::run(args, config),
        Commands::Scenario(args) => commands::scenario::run(args, config),
        Commands::Templates(args) => commands::templates::run(args),
        Commands::Config(args) => commands::config::run(args, config),
    }
}
