//! Client
//!
//! A minimal async client. Every call opens a fresh connection, writes one
//! request, half-closes the write side and reads the response until the
//! server closes the connection.
//!
//! ## Example
//!
//! ```ignore
//! use cacher::client::Client;
//!
//! let client = Client::new("127.0.0.1:8595");
//! client.set("name", "Ariz").await?;
//! let response = client.get("name").await?;
//! assert_eq!(response.message, "Ariz");
//! ```

use crate::protocol::{ProtocolError, Request, Response};
use std::io;
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::trace;

/// Default bound on a whole request/response exchange.
pub const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors returned by [`Client`].
///
/// An `ERROR` response from the server is not an error at this level: it
/// comes back as a [`Response`] with [`Status::Error`](crate::protocol::Status::Error).
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to connect to {addr}: {source}")]
    Connect { addr: String, source: io::Error },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

/// Connection settings for talking to a cache server.
#[derive(Debug, Clone)]
pub struct Client {
    addr: String,
    timeout: Duration,
}

impl Client {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            timeout: DEFAULT_CLIENT_TIMEOUT,
        }
    }

    /// Sets the bound on each exchange, connecting included.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Sends `request` on a new connection and returns the server's reply.
    ///
    /// The request is validated by encoding it before anything is sent.
    pub async fn send(&self, request: &Request) -> Result<Response, ClientError> {
        let bytes = request.encode()?;

        tokio::time::timeout(self.timeout, self.exchange(&bytes))
            .await
            .map_err(|_| ClientError::Timeout(self.timeout))?
    }

    async fn exchange(&self, bytes: &[u8]) -> Result<Response, ClientError> {
        let mut stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|source| ClientError::Connect {
                addr: self.addr.clone(),
                source,
            })?;

        stream.write_all(bytes).await?;
        // Lets the server see the end of a request that fills whole chunks
        stream.shutdown().await?;

        let mut reply = Vec::new();
        stream.read_to_end(&mut reply).await?;
        trace!(addr = %self.addr, bytes = reply.len(), "Received response");

        Ok(Response::decode(&reply)?)
    }

    pub async fn get(&self, key: impl Into<String>) -> Result<Response, ClientError> {
        self.send(&Request::get(key)).await
    }

    pub async fn set(
        &self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Response, ClientError> {
        self.send(&Request::set(key, value)).await
    }

    pub async fn del(&self, key: impl Into<String>) -> Result<Response, ClientError> {
        self.send(&Request::del(key)).await
    }

    /// Schedules `key` to expire at `at`, which must be in the future.
    pub async fn expire_at(
        &self,
        key: impl Into<String>,
        at: SystemTime,
    ) -> Result<Response, ClientError> {
        self.send(&Request::expire_at(key, at)).await
    }
}
