//! # KuraDB Shard Server
//!
//! Run with: `kura-shard --shard-id 0`
//!
//! Loads node configuration (YAML + environment overrides) and the cluster
//! topology, opens the shard's storage engine, and serves the RPC surface at
//! the shard's cluster address plus Prometheus metrics on
//! `metrics_port + shard_id`. SIGINT/SIGTERM trigger graceful shutdown:
//! stop accepting, drain in-flight requests, flush the memtable, close the
//! WAL and release the lockfile.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, Level};

use kura_api::server::{create_metrics_router, create_router, AppState};
use kura_core::config::{Cluster, Config};
use kura_core::metrics::Metrics;
use kura_storage::{CdcPublisher, Engine, EngineConfig, LogSink};

#[derive(Parser)]
#[command(name = "kura-shard")]
#[command(about = "KuraDB shard server - one storage engine per shard")]
struct Cli {
    /// Shard ID; must exist in the cluster topology
    #[arg(long)]
    shard_id: u32,

    /// Node configuration file (default: CONFIG_PATH or ./config.yml)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("loading node configuration")?;

    let cluster =
        Cluster::load(&config.shard_config_path).context("loading cluster topology")?;
    let shard = cluster
        .shard_by_id(cli.shard_id)
        .context("resolving shard id")?
        .clone();

    let metrics = Metrics::new();
    let cdc = config
        .cdc
        .enabled
        .then(|| CdcPublisher::new(Arc::new(LogSink), &config.cdc, shard.id, metrics.clone()));

    let engine_config = EngineConfig::from_tuning(
        config.shard_dir(shard.id),
        &config.engine,
        config.wal_path.clone(),
    );
    let engine = Arc::new(
        Engine::open(engine_config, cdc, metrics.clone())
            .await
            .context("opening storage engine")?,
    );

    let state = Arc::new(AppState {
        engine: Arc::clone(&engine),
        metrics: metrics.clone(),
        shard_id: shard.id,
    });

    let rpc_listener = tokio::net::TcpListener::bind(&shard.address)
        .await
        .with_context(|| format!("binding RPC listener on {}", shard.address))?;

    let metrics_port = config
        .metrics_port
        .checked_add(shard.id as u16)
        .context("metrics port out of range for this shard id")?;
    let metrics_addr = format!("0.0.0.0:{metrics_port}");
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("binding metrics listener on {metrics_addr}"))?;

    info!(shard = shard.id, address = %shard.address, "shard listening");
    info!(address = %metrics_addr, "metrics listening");

    let metrics_server = tokio::spawn(async move {
        let _ = axum::serve(metrics_listener, create_metrics_router(metrics)).await;
    });

    axum::serve(rpc_listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving RPC")?;

    info!(shard = shard.id, "shutting down shard");
    engine.close().context("closing storage engine")?;
    metrics_server.abort();

    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
