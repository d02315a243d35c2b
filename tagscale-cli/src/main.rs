//! Tagscale CLI - administrative commands for the storage adapter

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tagscale_core::schema::{InitOutcome, CREATE_STATEMENTS};
use tagscale_core::storage::{PoolConfig, StorageConfig, TimescaleStorage};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Debug, Parser)]
#[command(name = "tagscale", version, about = "Tag-indexed time-series storage on TimescaleDB")]
struct Cli {
    /// PostgreSQL connection URL
    #[arg(long, env = "TAGSCALE_DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    /// Maximum pooled connections
    #[arg(long, default_value_t = tagscale_core::config::MAX_CONNECTIONS)]
    max_connections: u32,

    /// Storage config (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create the schema if the TimescaleDB extension is installed
    Init {
        /// Print the DDL instead of running it
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Init { dry_run: true } => {
            for stmt in CREATE_STATEMENTS {
                println!("{};", stmt);
            }
        }
        Command::Init { dry_run: false } => {
            let url = cli
                .database_url
                .ok_or_else(|| anyhow::anyhow!("--database-url or TAGSCALE_DATABASE_URL is required"))?;

            let config = match &cli.config {
                Some(path) => StorageConfig::from_json_file(path)?,
                None => StorageConfig::default(),
            };
            let pool_config = PoolConfig {
                max_connections: cli.max_connections,
                ..PoolConfig::new(url)
            };

            let storage = TimescaleStorage::connect(&pool_config, config).await?;
            match storage.init().await? {
                InitOutcome::Created => info!("Schema created"),
                InitOutcome::AlreadyInitialized => info!("Schema already initialized"),
                InitOutcome::ExtensionMissing => {
                    warn!("TimescaleDB extension is not installed; nothing was created");
                    std::process::exit(2);
                }
            }
        }
    }

    Ok(())
}
