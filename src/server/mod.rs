//! TCP Server
//!
//! Binds the listener, spawns one task per accepted connection and drives
//! the graceful shutdown sequence, including the snapshot restore before
//! listening and the snapshot write after draining.

pub mod config;
pub mod listener;

pub use config::ServerConfig;
pub use listener::{Server, ServerError, ServerState};
