//! Server configuration

use crate::{DEFAULT_HOST, DEFAULT_PORT};
use std::time::Duration;

/// Settings for a [`Server`](crate::server::Server).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to bind, in `host:port` form
    pub address: String,

    /// Grace period for in-flight connections once shutdown starts
    pub shutdown_timeout: Duration,

    /// Bound on each of a connection's read and write phases
    pub io_timeout: Duration,

    /// Bound on reading the snapshot at startup and on writing it at shutdown
    pub persist_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: format!("{}:{}", DEFAULT_HOST, DEFAULT_PORT),
            shutdown_timeout: Duration::from_secs(5),
            io_timeout: Duration::from_secs(5),
            persist_timeout: Duration::from_secs(5),
        }
    }
}

impl ServerConfig {
    /// Default configuration bound to `address`.
    pub fn with_address(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }
}
