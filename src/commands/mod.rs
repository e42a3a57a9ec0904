//! Command Handler Module
//!
//! This module implements the command processing layer of the cache.
//! It receives decoded requests, executes them against the storage engine,
//! and returns the response to send.
//!
//! ## Architecture
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  Wire Codec     │  (protocol module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (this module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ StorageEngine   │  (storage module)
//! └─────────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! | Request            | Success reply                                  |
//! |--------------------|------------------------------------------------|
//! | `GET key`          | `OK <value>` or `ERROR key not found`          |
//! | `SET key value`    | `OK the value has been inserted successfully`  |
//! | `DEL key`          | `OK the value has been deleted successfully`   |
//! | `EXP key unixtime` | `OK the expiry has been set successfully`      |

pub mod handler;

pub use handler::{
    CommandHandler, EXPIRY_SET, INTERNAL_ERROR, KEY_NOT_FOUND, VALUE_DELETED, VALUE_INSERTED,
};
