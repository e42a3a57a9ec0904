//! # Cacher - A Small Networked Key-Value Cache
//!
//! Cacher keeps string values in memory and serves them over TCP with a
//! one-line text protocol. Every connection carries exactly one request
//! and one response.
//!
//! ## Features
//!
//! - **Four Operations**: `GET`, `SET`, `DEL` and `EXP` (expire at a unix timestamp)
//! - **Expiry**: Entries live for a year by default, expired entries are
//!   removed lazily on read and actively by a background sweeper
//! - **Graceful Shutdown**: In-flight connections get a grace period before
//!   the server stops
//! - **Snapshots**: Optional JSON snapshot, restored at startup and written
//!   at shutdown
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                               Cacher                                │
//! │                                                                     │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐              │
//! │  │ TCP Server  │───>│ Connection  │───>│  Command    │              │
//! │  │ (Listener)  │    │  Handler    │    │  Handler    │              │
//! │  └──────┬──────┘    └─────────────┘    └──────┬──────┘              │
//! │         │                  ▲                  │                     │
//! │         │           ┌──────┴──────┐           ▼                     │
//! │         │           │  Protocol   │    ┌──────────────────────────┐ │
//! │         │           │  (codec)    │    │      StorageEngine       │ │
//! │         │           └─────────────┘    │ Mutex<HashMap<_, Entry>> │ │
//! │         ▼                              └──────────────────────────┘ │
//! │  ┌─────────────┐                          ▲               ▲         │
//! │  │  Snapshot   │──── dump / restore ──────┘               │         │
//! │  │   Store     │                            ┌─────────────┴───────┐ │
//! │  └─────────────┘                            │    ExpirySweeper    │ │
//! │                                             └─────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use cacher::server::{Server, ServerConfig};
//! use cacher::storage::{ExpiryConfig, ExpirySweeper, StorageEngine};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let storage = Arc::new(StorageEngine::new());
//!     let _sweeper = ExpirySweeper::start(Arc::clone(&storage), ExpiryConfig::default());
//!
//!     Server::new(ServerConfig::default(), storage)
//!         .listen(async { tokio::signal::ctrl_c().await.ok(); })
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: Request and response codec
//! - [`storage`]: Thread-safe table with expiry
//! - [`commands`]: Executes requests against the table
//! - [`connection`]: One request/response exchange per connection
//! - [`server`]: Listener, accept loop and graceful shutdown
//! - [`persistence`]: JSON snapshot of the table
//! - [`client`]: Async client used by `cacher-cli`

pub mod client;
pub mod commands;
pub mod connection;
pub mod persistence;
pub mod protocol;
pub mod server;
pub mod storage;

// Re-export commonly used types for convenience
pub use client::{Client, ClientError};
pub use commands::CommandHandler;
pub use connection::{handle_connection, ConnectionStats};
pub use persistence::SnapshotStore;
pub use protocol::{Operation, ProtocolError, Request, Response, Status};
pub use server::{Server, ServerConfig, ServerError, ServerState};
pub use storage::{ExpiryConfig, ExpirySweeper, StorageEngine};

/// The default port Cacher listens on
pub const DEFAULT_PORT: u16 = 8595;

/// The default host Cacher binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of Cacher
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
