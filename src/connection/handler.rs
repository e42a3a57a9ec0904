//! Connection Handler Module
//!
//! This module handles individual client connections. Each connection
//! carries exactly one request and one response.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Client connects (TCP handshake)
//!        │
//!        ▼
//! 2. ConnectionHandler spawned
//!        │
//!        ▼
//! 3. Read chunks until a short read   (bounded by the I/O timeout)
//!        │
//!        ▼
//! 4. Decode request ──── error ──┐
//!        │                       │
//!        ▼                       │
//! 5. Execute against storage     │
//!        │                       │
//!        ▼                       ▼
//! 6. Write response               (bounded by the I/O timeout)
//!        │
//!        ▼
//! 7. Close the connection
//! ```
//!
//! ## Framing
//!
//! There is no delimiter or length prefix. The handler reads
//! [`READ_CHUNK_SIZE`] bytes at a time and stops at the first read that
//! returns fewer bytes than that. A request that is an exact multiple of
//! the chunk size must be followed by a half-close from the client,
//! otherwise the read phase runs into its timeout.

use crate::commands::CommandHandler;
use crate::protocol::{Request, Response};
use bytes::{BufMut, BytesMut};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace, warn};

/// Bytes requested from the socket per read.
pub const READ_CHUNK_SIZE: usize = 4096;

/// Maximum size of a request (64 KB)
pub const MAX_REQUEST_SIZE: usize = 64 * 1024;

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total requests decoded and executed
    pub requests_processed: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn request_processed(&self) {
        self.requests_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Number of connections currently being handled.
    pub fn active(&self) -> u64 {
        self.active_connections.load(Ordering::Relaxed)
    }
}

/// Handles a single client connection.
///
/// Generic over the stream so it can run on a `TcpStream` in the server
/// and on in-memory pipes in tests.
pub struct ConnectionHandler<S> {
    /// The client stream
    stream: S,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Accumulated request bytes
    buffer: BytesMut,

    /// The command handler (shared across connections)
    command_handler: CommandHandler,

    /// Bound on each of the read and write phases
    io_timeout: Duration,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new connection handler.
    ///
    /// # Arguments
    ///
    /// * `stream` - The client stream
    /// * `addr` - The client's socket address
    /// * `command_handler` - The command handler for executing requests
    /// * `io_timeout` - Deadline for the read phase and for the write phase
    /// * `stats` - Shared connection statistics
    pub fn new(
        stream: S,
        addr: SocketAddr,
        command_handler: CommandHandler,
        io_timeout: Duration,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        Self {
            stream,
            addr,
            buffer: BytesMut::with_capacity(READ_CHUNK_SIZE),
            command_handler,
            io_timeout,
            stats,
        }
    }

    /// Runs the request/response exchange and closes the stream.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        trace!(client = %self.addr, "Client connected");

        let result = self.exchange().await;

        match &result {
            Ok(()) => trace!(client = %self.addr, "Request served"),
            Err(ConnectionError::ClientDisconnected) => {
                debug!(client = %self.addr, "Client disconnected before sending a request")
            }
            Err(ConnectionError::Io(io_err))
                if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
            {
                debug!(client = %self.addr, "Connection reset by client")
            }
            Err(e) => warn!(client = %self.addr, error = %e, "Connection error"),
        }

        // No keep-alive: the connection is closed whatever happened
        if let Err(e) = self.stream.shutdown().await {
            trace!(client = %self.addr, error = %e, "Shutdown after reply failed");
        }

        result
    }

    /// Reads one request, executes it and writes the response.
    async fn exchange(&mut self) -> Result<(), ConnectionError> {
        if let Err(err) = self.read_request().await {
            if !matches!(err, ConnectionError::ClientDisconnected) {
                // Best effort, the peer may already be gone
                let _ = self.send_response(&Response::error(err.to_string())).await;
            }
            return Err(err);
        }

        let response = match Request::decode(&self.buffer) {
            Ok(request) => {
                trace!(client = %self.addr, %request, "Decoded request");
                self.command_handler.execute(request)
            }
            Err(e) => {
                debug!(client = %self.addr, error = %e, "Rejected request");
                Response::from(e)
            }
        };
        self.stats.request_processed();

        self.send_response(&response).await
    }

    /// Reads the request into the buffer, bounded by the I/O timeout.
    async fn read_request(&mut self) -> Result<(), ConnectionError> {
        tokio::time::timeout(self.io_timeout, self.read_until_short_read())
            .await
            .map_err(|_| ConnectionError::ReadTimeout)?
    }

    /// Reads chunks until one comes back shorter than [`READ_CHUNK_SIZE`].
    async fn read_until_short_read(&mut self) -> Result<(), ConnectionError> {
        loop {
            self.buffer.reserve(READ_CHUNK_SIZE);
            let n = self
                .stream
                .read_buf(&mut (&mut self.buffer).limit(READ_CHUNK_SIZE))
                .await?;

            if n == 0 && self.buffer.is_empty() {
                return Err(ConnectionError::ClientDisconnected);
            }

            self.stats.bytes_read(n);
            trace!(client = %self.addr, bytes = n, "Read data");

            if self.buffer.len() > MAX_REQUEST_SIZE {
                return Err(ConnectionError::RequestTooLarge);
            }

            if n < READ_CHUNK_SIZE {
                return Ok(());
            }
        }
    }

    /// Sends a response to the client, bounded by the I/O timeout.
    async fn send_response(&mut self, response: &Response) -> Result<(), ConnectionError> {
        let bytes = response.encode();
        let stream = &mut self.stream;

        tokio::time::timeout(self.io_timeout, async {
            stream.write_all(&bytes).await?;
            stream.flush().await
        })
        .await
        .map_err(|_| ConnectionError::WriteTimeout)??;

        self.stats.bytes_written(bytes.len());
        trace!(client = %self.addr, bytes = bytes.len(), "Sent response");

        Ok(())
    }
}

/// Errors that can occur while handling a connection.
///
/// The `Display` text of the read-side variants is sent to the client as
/// the message of an `ERROR` response.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The request did not arrive within the I/O timeout
    #[error("read timed out")]
    ReadTimeout,

    /// The response could not be written within the I/O timeout
    #[error("write timed out")]
    WriteTimeout,

    /// Client closed the connection without sending anything
    #[error("client disconnected")]
    ClientDisconnected,

    /// Request size limit exceeded
    #[error("request too large")]
    RequestTooLarge,
}

/// Handles a client connection.
///
/// This is a convenience function that creates a ConnectionHandler
/// and runs it to completion.
pub async fn handle_connection<S>(
    stream: S,
    addr: SocketAddr,
    command_handler: CommandHandler,
    io_timeout: Duration,
    stats: Arc<ConnectionStats>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let handler = ConnectionHandler::new(stream, addr, command_handler, io_timeout, stats);
    let _ = handler.run().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{KEY_NOT_FOUND, VALUE_INSERTED};
    use crate::storage::StorageEngine;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    const TEST_TIMEOUT: Duration = Duration::from_millis(200);

    async fn create_test_server() -> (SocketAddr, Arc<StorageEngine>, Arc<ConnectionStats>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let storage = Arc::new(StorageEngine::new());
        let stats = Arc::new(ConnectionStats::new());

        let storage_clone = Arc::clone(&storage);
        let stats_clone = Arc::clone(&stats);

        tokio::spawn(async move {
            while let Ok((stream, client_addr)) = listener.accept().await {
                let handler = CommandHandler::new(Arc::clone(&storage_clone));
                let stats = Arc::clone(&stats_clone);
                tokio::spawn(handle_connection(
                    stream,
                    client_addr,
                    handler,
                    TEST_TIMEOUT,
                    stats,
                ));
            }
        });

        (addr, storage, stats)
    }

    async fn roundtrip(addr: SocketAddr, request: &[u8]) -> String {
        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(request).await.unwrap();

        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();
        String::from_utf8(reply).unwrap()
    }

    fn test_handler(
        stream: tokio::io::DuplexStream,
    ) -> (ConnectionHandler<tokio::io::DuplexStream>, Arc<ConnectionStats>) {
        let storage = Arc::new(StorageEngine::new());
        let stats = Arc::new(ConnectionStats::new());
        let handler = ConnectionHandler::new(
            stream,
            "127.0.0.1:9".parse().unwrap(),
            CommandHandler::new(storage),
            TEST_TIMEOUT,
            Arc::clone(&stats),
        );
        (handler, stats)
    }

    #[tokio::test]
    async fn test_set_get() {
        let (addr, _, _) = create_test_server().await;

        let reply = roundtrip(addr, b"SET foo bar\n").await;
        assert_eq!(reply, format!("OK {}\n", VALUE_INSERTED));

        let reply = roundtrip(addr, b"GET foo").await;
        assert_eq!(reply, "OK bar\n");
    }

    #[tokio::test]
    async fn test_get_missing() {
        let (addr, _, _) = create_test_server().await;

        let reply = roundtrip(addr, b"GET nope\n").await;
        assert_eq!(reply, format!("ERROR {}\n", KEY_NOT_FOUND));
    }

    #[tokio::test]
    async fn test_malformed_request() {
        let (addr, storage, _) = create_test_server().await;

        let reply = roundtrip(addr, b"SET foo\n").await;
        assert_eq!(reply, "ERROR message format is invalid\n");
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn test_read_timeout() {
        let (addr, _, _) = create_test_server().await;

        // Connect and never send anything
        let mut client = TcpStream::connect(addr).await.unwrap();

        let mut reply = Vec::new();
        tokio::time::timeout(Duration::from_secs(2), client.read_to_end(&mut reply))
            .await
            .expect("server should reply before the test timeout")
            .unwrap();

        assert_eq!(reply, b"ERROR read timed out\n");
    }

    #[tokio::test]
    async fn test_request_too_large() {
        let (mut client, server) = tokio::io::duplex(256 * 1024);
        let (handler, _) = test_handler(server);
        let task = tokio::spawn(handler.run());

        let mut request = b"SET big ".to_vec();
        request.extend(std::iter::repeat(b'x').take(MAX_REQUEST_SIZE + READ_CHUNK_SIZE));
        client.write_all(&request).await.unwrap();

        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();

        assert_eq!(reply, b"ERROR request too large\n");
        assert!(matches!(
            task.await.unwrap(),
            Err(ConnectionError::RequestTooLarge)
        ));
    }

    #[tokio::test]
    async fn test_exact_chunk_request_needs_half_close() {
        let (mut client, server) = tokio::io::duplex(64 * 1024);
        let (handler, _) = test_handler(server);
        let task = tokio::spawn(handler.run());

        let mut request = b"SET k ".to_vec();
        request.resize(READ_CHUNK_SIZE, b'v');
        client.write_all(&request).await.unwrap();
        client.shutdown().await.unwrap();

        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();

        assert_eq!(reply, format!("OK {}\n", VALUE_INSERTED).as_bytes());
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_disconnect_without_request() {
        let (client, server) = tokio::io::duplex(1024);
        let (handler, stats) = test_handler(server);
        drop(client);

        assert!(matches!(
            handler.run().await,
            Err(ConnectionError::ClientDisconnected)
        ));
        assert_eq!(stats.requests_processed.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_connection_stats() {
        let (mut client, server) = tokio::io::duplex(1024);
        let (handler, stats) = test_handler(server);
        let task = tokio::spawn(handler.run());

        client.write_all(b"SET foo bar\n").await.unwrap();
        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();
        task.await.unwrap().unwrap();

        assert_eq!(stats.requests_processed.load(Ordering::Relaxed), 1);
        assert_eq!(stats.bytes_read.load(Ordering::Relaxed), 12);
        assert_eq!(
            stats.bytes_written.load(Ordering::Relaxed),
            reply.len() as u64
        );
    }
}
