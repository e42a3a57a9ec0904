//! Listener and Graceful Shutdown
//!
//! ```text
//!  Created ──listen()──> Listening ──shutdown signal──> ShuttingDown ──> Stopped
//!     │                     │                               │
//!  restore snapshot     accept loop                   stop accepting,
//!                       + one task per               wait for connections
//!                         connection                 (or grace period),
//!                                                    persist snapshot
//! ```
//!
//! Every connection task holds a clone of a drain sender, and so does the
//! accept loop. Once the accept loop has exited and every connection task
//! has finished, all senders are gone and the drain receiver completes.
//! Shutdown races that completion against the grace period timer.
//!
//! If the grace period runs out, connections still in flight keep running
//! while the snapshot is taken, so their writes may or may not be part of
//! it.

use crate::commands::CommandHandler;
use crate::connection::{handle_connection, ConnectionStats};
use crate::persistence::{PersistenceError, SnapshotStore};
use crate::server::ServerConfig;
use crate::storage::StorageEngine;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

/// Lifecycle of a [`Server`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Created,
    Listening,
    ShuttingDown,
    Stopped,
}

/// Errors that end [`Server::listen`].
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {address}: {source}")]
    Bind { address: String, source: io::Error },

    #[error("failed to restore snapshot: {0}")]
    Restore(#[source] PersistenceError),

    #[error("failed to persist snapshot: {0}")]
    Persist(#[source] PersistenceError),
}

/// The cache server.
///
/// # Example
///
/// ```ignore
/// use cacher::server::{Server, ServerConfig};
/// use cacher::storage::StorageEngine;
/// use std::sync::Arc;
///
/// let storage = Arc::new(StorageEngine::new());
/// let server = Server::new(ServerConfig::default(), storage);
///
/// server.listen(async { tokio::signal::ctrl_c().await.ok(); }).await?;
/// ```
#[derive(Debug)]
pub struct Server {
    config: ServerConfig,
    storage: Arc<StorageEngine>,
    snapshots: Option<SnapshotStore>,
    stats: Arc<ConnectionStats>,
    state_tx: watch::Sender<ServerState>,
}

impl Server {
    /// Creates a server without persistence.
    pub fn new(config: ServerConfig, storage: Arc<StorageEngine>) -> Self {
        let (state_tx, _) = watch::channel(ServerState::Created);

        Self {
            config,
            storage,
            snapshots: None,
            stats: Arc::new(ConnectionStats::new()),
            state_tx,
        }
    }

    /// Enables persistence: the snapshot is restored before listening and
    /// written after shutdown.
    pub fn with_snapshots(mut self, snapshots: SnapshotStore) -> Self {
        self.snapshots = Some(snapshots);
        self
    }

    /// Subscribes to lifecycle changes.
    pub fn state(&self) -> watch::Receiver<ServerState> {
        self.state_tx.subscribe()
    }

    /// Shared connection statistics.
    pub fn stats(&self) -> Arc<ConnectionStats> {
        Arc::clone(&self.stats)
    }

    /// Restores the snapshot, binds the configured address and serves until
    /// `shutdown` completes.
    ///
    /// Returns once the server has fully stopped, including the final
    /// snapshot write.
    pub async fn listen<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        self.restore().await?;

        let listener = TcpListener::bind(&self.config.address)
            .await
            .map_err(|source| ServerError::Bind {
                address: self.config.address.clone(),
                source,
            })?;

        self.run(listener, shutdown).await
    }

    /// Like [`listen`](Self::listen), on an already bound listener.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        self.restore().await?;
        self.run(listener, shutdown).await
    }

    async fn restore(&self) -> Result<(), ServerError> {
        if let Some(snapshots) = &self.snapshots {
            snapshots
                .restore_within(&self.storage, self.config.persist_timeout)
                .await
                .map_err(|e| {
                    error!(error = %e, "Error restoring the data from disk");
                    ServerError::Restore(e)
                })?;
        }
        Ok(())
    }

    async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        match listener.local_addr() {
            Ok(addr) => info!(addr = %addr, "TCP server is listening"),
            Err(_) => info!(addr = %self.config.address, "TCP server is listening"),
        }
        self.state_tx.send_replace(ServerState::Listening);

        let (stop_tx, stop_rx) = watch::channel(false);
        let (drain_tx, mut drain_rx) = mpsc::channel::<()>(1);

        tokio::spawn(accept_loop(
            listener,
            CommandHandler::new(Arc::clone(&self.storage)),
            self.config.io_timeout,
            Arc::clone(&self.stats),
            drain_tx,
            stop_rx,
        ));

        shutdown.await;

        info!("Started shutting down the server");
        self.state_tx.send_replace(ServerState::ShuttingDown);
        let _ = stop_tx.send(true);

        if drain(&mut drain_rx, self.config.shutdown_timeout).await {
            info!("All connections finished");
        } else {
            error!(
                active = self.stats.active(),
                grace_period_ms = self.config.shutdown_timeout.as_millis() as u64,
                "The server has timed out while waiting for open connections"
            );
        }

        let result = self.persist().await;

        info!(
            connections = self.stats.connections_accepted.load(Ordering::Relaxed),
            requests = self.stats.requests_processed.load(Ordering::Relaxed),
            "Server stopped"
        );
        self.state_tx.send_replace(ServerState::Stopped);

        result
    }

    /// Writes the snapshot if persistence is enabled.
    async fn persist(&self) -> Result<(), ServerError> {
        let Some(snapshots) = &self.snapshots else {
            return Ok(());
        };

        info!("Started persisting the data on disk");
        snapshots
            .persist_within(&self.storage, self.config.persist_timeout)
            .await
            .map(|_| ())
            .map_err(|e| {
                error!(error = %e, "Error persisting the data on disk");
                ServerError::Persist(e)
            })
    }
}

/// Waits until every drain sender is dropped or `grace_period` elapses,
/// whichever comes first.
///
/// Returns `true` if every sender was dropped in time.
async fn drain(drain_rx: &mut mpsc::Receiver<()>, grace_period: Duration) -> bool {
    debug!("Waiting for open connections before shutting down the server");

    tokio::select! {
        _ = drain_rx.recv() => true,
        _ = tokio::time::sleep(grace_period) => false,
    }
}

/// Accepts connections until the stop signal fires.
///
/// Each connection runs in its own task, wrapped in a supervisor task that
/// contains panics and keeps the connection counters accurate.
async fn accept_loop(
    listener: TcpListener,
    command_handler: CommandHandler,
    io_timeout: Duration,
    stats: Arc<ConnectionStats>,
    drain_tx: mpsc::Sender<()>,
    mut stop_rx: watch::Receiver<bool>,
) {
    loop {
        let (stream, addr) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                    continue;
                }
            },
            _ = stop_rx.changed() => break,
        };

        stats.connection_opened();

        let connection = handle_connection(
            stream,
            addr,
            command_handler.clone(),
            io_timeout,
            Arc::clone(&stats),
        );
        tokio::spawn(supervise(
            connection,
            addr,
            Arc::clone(&stats),
            drain_tx.clone(),
        ));
    }

    debug!("Accept loop stopped");
}

/// Runs `connection` in a task of its own and waits for it.
///
/// A panic inside `connection` ends that task only: it is logged here and
/// the connection is counted as closed. `drain_guard` is held until then.
async fn supervise<F>(
    connection: F,
    addr: SocketAddr,
    stats: Arc<ConnectionStats>,
    drain_guard: mpsc::Sender<()>,
) where
    F: Future<Output = ()> + Send + 'static,
{
    if let Err(e) = tokio::spawn(connection).await {
        if e.is_panic() {
            error!(client = %addr, "Recovered from a panic while processing a request");
        } else {
            debug!(client = %addr, error = %e, "Connection task cancelled");
        }
    }

    stats.connection_closed();
    drop(drain_guard);
}
