//! # KuraDB CLI
//!
//! Issues `set`/`get`/`delete` against a running cluster, routing each key
//! to its owning shard exactly like the server-side router would.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use kura_api::ClusterClient;
use kura_core::config::{Cluster, Config};

#[derive(Parser)]
#[command(name = "kura")]
#[command(about = "KuraDB - sharded persistent key-value store")]
struct Cli {
    /// Node configuration file (default: CONFIG_PATH or ./config.yml)
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a value under a key
    Set { key: String, value: String },
    /// Fetch the value for a key
    Get { key: String },
    /// Delete a key
    Delete { key: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing_subscriber::filter::LevelFilter::WARN)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("loading node configuration")?;

    let cluster = Cluster::load(&config.shard_config_path).context("loading cluster topology")?;
    let client = ClusterClient::new(&cluster)?;

    match cli.command {
        Commands::Set { key, value } => {
            let resp = client.set(&key, &value).await?;
            println!("Set response: Success={}, Message={}", resp.success, resp.message);
            if !resp.success {
                std::process::exit(1);
            }
        }
        Commands::Get { key } => {
            let resp = client.get(&key).await?;
            if resp.found {
                println!("Get response: Found=true, Value={}", resp.value);
            } else {
                println!("Get response: Found=false, Message={}", resp.message);
            }
        }
        Commands::Delete { key } => {
            let resp = client.delete(&key).await?;
            println!(
                "Delete response: Success={}, Message={}",
                resp.success, resp.message
            );
            if !resp.success {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
