use std::path::Path;

use clap::{Args, Subcommand};
use tsuna::config::{ClientConfig, load_config_from, save_config_to};

use crate::error::Result;

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommands,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Write the default configuration
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
    /// Show the effective configuration
    Show,
    /// Validate the configuration
    Validate,
}

/// Run a config subcommand against `config_path`.
pub async fn config(args: ConfigArgs, config_path: &Path) -> Result<()> {
    match args.command {
        ConfigCommands::Init { force } => {
            if config_path.exists() && !force {
                println!("Configuration already exists at: {}", config_path.display());
                println!("Use --force to overwrite.");
                return Ok(());
            }
            save_config_to(&ClientConfig::default(), config_path).await?;
            println!("Configuration created: {}", config_path.display());
        }
        ConfigCommands::Show => {
            let config = load_config_from(config_path).await?;
            print!("{}", config.to_toml()?);
        }
        ConfigCommands::Validate => {
            let config = load_config_from(config_path).await?;
            config.validate()?;
            println!("Configuration is valid ({} chains).", config.chains.len());
        }
    }
    Ok(())
}
