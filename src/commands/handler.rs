//! Command Dispatch
//!
//! Maps a decoded [`Request`] onto the storage engine and builds the
//! [`Response`] for it. Every operation is infallible at the storage level,
//! so the only `ERROR` produced here is the miss on `GET`.

use crate::protocol::{Operation, Request, Response};
use crate::storage::StorageEngine;
use std::sync::Arc;
use tracing::error;

/// Reply to a `GET` of an absent or expired key.
pub const KEY_NOT_FOUND: &str = "key not found";

/// Reply to a successful `SET`.
pub const VALUE_INSERTED: &str = "the value has been inserted successfully";

/// Reply to a `DEL`, whether or not the key existed.
pub const VALUE_DELETED: &str = "the value has been deleted successfully";

/// Reply to an `EXP`, whether or not the key existed.
pub const EXPIRY_SET: &str = "the expiry has been set successfully";

/// Reply to a request whose argument does not match its operation.
pub const INTERNAL_ERROR: &str = "internal error";

/// Executes requests against the storage engine.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    /// The storage engine
    storage: Arc<StorageEngine>,
}

impl CommandHandler {
    /// Creates a new command handler with the given storage engine.
    pub fn new(storage: Arc<StorageEngine>) -> Self {
        Self { storage }
    }

    /// Executes a request and returns the response.
    pub fn execute(&self, request: Request) -> Response {
        let Request {
            operation,
            key,
            value,
            expiry,
        } = request;

        match operation {
            Operation::Get => self.cmd_get(&key),
            Operation::Set => match value {
                Some(value) => self.cmd_set(key, value),
                None => internal_error(operation, &key),
            },
            Operation::Del => self.cmd_del(&key),
            // EXP on an absent key is accepted silently
            Operation::Exp => match expiry {
                Some(at) => {
                    self.storage.expire_at(&key, at);
                    Response::ok(EXPIRY_SET)
                }
                None => internal_error(operation, &key),
            },
        }
    }

    /// GET key
    fn cmd_get(&self, key: &str) -> Response {
        match self.storage.get(key) {
            Some(value) => Response::ok(value),
            None => Response::error(KEY_NOT_FOUND),
        }
    }

    /// SET key value
    fn cmd_set(&self, key: String, value: String) -> Response {
        self.storage.set(key, value);
        Response::ok(VALUE_INSERTED)
    }

    /// DEL key
    fn cmd_del(&self, key: &str) -> Response {
        self.storage.delete(key);
        Response::ok(VALUE_DELETED)
    }
}

/// Decoding guarantees SET carries a value and EXP carries an expiry, so
/// this only fires for hand-built requests.
fn internal_error(operation: Operation, key: &str) -> Response {
    error!(%operation, key, "Request is missing the argument its operation requires");
    Response::error(INTERNAL_ERROR)
}
