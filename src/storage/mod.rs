//! Storage Engine Module
//!
//! This module provides the in-memory table of the cache and the background
//! task that keeps expired entries from piling up.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │             StorageEngine               │
//! │   Mutex<HashMap<String, Entry>>         │
//! └─────────────────────────────────────────┘
//!                      ▲
//!                      │ cleanup_expired()
//!        ┌─────────────┴─────────────┐
//!        │       ExpirySweeper       │
//!        │  (Background Tokio Task)  │
//!        └───────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Single Lock**: Operations, dumps and sweeps are mutually serialized
//! - **Default Expiry**: `SET` entries live for a year unless `EXP` says otherwise
//! - **Lazy Expiry**: Expired keys are removed when read
//! - **Active Expiry**: The sweeper removes expired keys nobody reads
//! - **Dump / Restore**: Point-in-time copies and insert-if-absent merges
//!
//! ## Example
//!
//! ```
//! use cacher::storage::StorageEngine;
//!
//! let engine = StorageEngine::new();
//! engine.set("name", "Ariz");
//! assert_eq!(engine.get("name"), Some("Ariz".to_string()));
//!
//! let snapshot = engine.dump();
//! let other = StorageEngine::new();
//! assert_eq!(other.restore(snapshot), 1);
//! ```

pub mod engine;
pub mod expiry;

// Re-export commonly used types
pub use engine::{Entry, Snapshot, StorageEngine, StorageStats, DEFAULT_TTL};
pub use expiry::{ExpiryConfig, ExpirySweeper};
