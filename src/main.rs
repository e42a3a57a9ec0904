//! Cacher - A Small Networked Key-Value Cache
//!
//! This is the main entry point for the Cacher server.
//! It sets up logging, the storage engine and the optional snapshot store,
//! then serves until Ctrl+C or SIGTERM.

use anyhow::Context;
use cacher::persistence::{default_data_dir, SnapshotStore};
use cacher::server::{Server, ServerConfig};
use cacher::storage::{ExpiryConfig, ExpirySweeper, StorageEngine};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Cacher - A Small Networked Key-Value Cache
#[derive(Parser, Debug)]
#[command(name = "cacher", version = cacher::VERSION)]
#[command(about = "In-memory key-value cache served over TCP")]
struct Args {
    /// Host to bind to
    #[arg(long, default_value = cacher::DEFAULT_HOST)]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = cacher::DEFAULT_PORT)]
    port: u16,

    /// Restore the snapshot at startup and write it at shutdown
    #[arg(long)]
    persist: bool,

    /// Directory holding the snapshot (default: $XDG_CONFIG_HOME/cacher)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Grace period for open connections at shutdown, in seconds
    #[arg(long, default_value_t = 5)]
    shutdown_timeout: u64,

    /// Bound on each connection's read and write phases, in seconds
    #[arg(long, default_value_t = 5)]
    io_timeout: u64,

    /// Interval between expiry sweeps, in seconds
    #[arg(long, default_value_t = 5)]
    sweep_interval: u64,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            address: format!("{}:{}", self.host, self.port),
            shutdown_timeout: Duration::from_secs(self.shutdown_timeout),
            io_timeout: Duration::from_secs(self.io_timeout),
            ..ServerConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(&args.log_level))
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = args.server_config();
    info!(version = cacher::VERSION, address = %config.address, "Starting Cacher");

    // Shared across all connections
    let storage = Arc::new(StorageEngine::new());

    let _sweeper = ExpirySweeper::start(
        Arc::clone(&storage),
        ExpiryConfig {
            interval: Duration::from_secs(args.sweep_interval.max(1)),
        },
    );

    let mut server = Server::new(config, Arc::clone(&storage));

    if args.persist {
        let data_dir = match args.data_dir.clone().or_else(default_data_dir) {
            Some(dir) => dir,
            None => {
                error!("Could not determine a data directory, pass --data-dir");
                anyhow::bail!("no data directory for persistence");
            }
        };

        let snapshots = SnapshotStore::open(&data_dir)
            .await
            .inspect_err(|e| error!(error = %e, "Failed to open the data directory"))
            .with_context(|| format!("opening data directory {}", data_dir.display()))?;
        info!(path = %snapshots.path().display(), "Persistence enabled");

        server = server.with_snapshots(snapshots);
    }

    if let Err(e) = server.listen(shutdown_signal()).await {
        error!(error = %e, "Server failed");
        return Err(e.into());
    }

    let stats = storage.stats();
    info!(
        keys = stats.keys,
        gets = stats.gets,
        sets = stats.sets,
        deletes = stats.deletes,
        expired = stats.expired,
        "Server shutdown complete"
    );
    Ok(())
}

/// Completes on Ctrl+C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("Shutdown signal received, stopping server...");
}
