//! Engine configuration commands.

use std::path::{Path, PathBuf};

use anyhow::bail;
use clap::{Args, Subcommand};
use polykey_config::{EngineConfig, engine_config_path, user_config_dir};

use super::common::load_config;

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print the effective configuration as TOML
    Show,

    /// Write a default configuration file
    Init {
        /// Destination (defaults to the user config file)
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Check a configuration file
    Validate {
        /// Configuration file
        path: PathBuf,
    },

    /// Show configuration paths
    Paths,
}

pub fn run(args: ConfigArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    match args.command {
        ConfigCommand::Show => {
            let config = load_config(config_path)?;
            print!("{}", config.to_toml()?);
            Ok(())
        }
        ConfigCommand::Init { path, force } => {
            let path = path.unwrap_or_else(engine_config_path);
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            EngineConfig::default().save(&path)?;
            println!("Wrote {}", path.display());
            Ok(())
        }
        ConfigCommand::Validate { path } => {
            let config = EngineConfig::load(&path)?;
            let settings = config.to_settings()?;
            println!(
                "{} is valid: {} ms interval, {} of {} voices{}",
                path.display(),
                settings.control_interval.as_millis(),
                settings.pool.polyphony,
                settings.pool.max_polyphony,
                if settings.pool.legato { ", legato" } else { "" },
            );
            Ok(())
        }
        ConfigCommand::Paths => {
            println!("Config directory: {}", user_config_dir().display());
            println!("Engine config:    {}", engine_config_path().display());
            Ok(())
        }
    }
}
