use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod config;
pub mod run;
pub mod stats;
pub mod version;

use config::{default_config_path, default_store_path, GatewayConfig};

#[derive(Parser)]
#[command(name = "channel-gate")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Operator CLI for the channel access gateway bot", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the bot service
    Run {
        /// Path to config file (default: ~/.config/channel-gate/config.toml)
        #[arg(long)]
        config: Option<String>,
    },

    /// Write a commented default config file
    InitConfig {
        /// Where to write the config file
        #[arg(long)]
        config: Option<String>,

        /// Database path to put in the config
        #[arg(long)]
        store_path: Option<String>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print user counts from the store
    Stats {
        /// Path to config file
        #[arg(long)]
        config: Option<String>,
    },

    /// Display version information
    Version,
}

pub async fn execute(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Run { config } => run::execute(config).await,
        Commands::InitConfig {
            config,
            store_path,
            force,
        } => init_config(config, store_path, force),
        Commands::Stats { config } => stats::execute(config).await,
        Commands::Version => {
            version::execute();
            Ok(())
        }
    }
}

fn init_config(
    config_path: Option<String>,
    store_path: Option<String>,
    force: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = config_path
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path);
    let store_path = store_path
        .map(PathBuf::from)
        .unwrap_or_else(default_store_path);

    if config_path.exists() && !force {
        return Err(format!(
            "Config file '{}' already exists (use --force to overwrite)",
            config_path.display()
        )
        .into());
    }

    GatewayConfig::create_default(&config_path, &store_path)?;
    println!("📝 Created: {}", config_path.display());
    println!(
        "   Set telegram.token (or {}), telegram.channel_id and access.admin_ids.",
        config::TOKEN_ENV
    );
    Ok(())
}
