//! Wire Protocol
//!
//! Requests and responses are single lines of text. Encoding and decoding
//! are pure functions: no I/O and no shared state.
//!
//! ## Grammar
//!
//! ```text
//! Request  ::= OP SP KEY [SP ARG]
//! OP       ::= "GET" | "SET" | "DEL" | "EXP"
//! ARG      ::= VALUE             (required for SET)
//!            | UNIX_TIMESTAMP    (required for EXP, must be > now)
//! Response ::= STATUS SP MESSAGE
//! STATUS   ::= "OK" | "ERROR"
//! ```
//!
//! There is no length prefix: one connection carries exactly one request
//! and one response, and the line terminator is optional on requests.
//!
//! ## Example
//!
//! ```
//! use cacher::protocol::{Operation, Request, Response};
//!
//! let request = Request::decode(b"SET foo bar\n").unwrap();
//! assert_eq!(request.operation, Operation::Set);
//! assert_eq!(request.value.as_deref(), Some("bar"));
//!
//! let response = Response::ok("bar");
//! assert_eq!(response.encode(), b"OK bar\n");
//! ```

pub mod error;
pub mod request;
pub mod response;

pub use error::ProtocolError;
pub use request::{Operation, Request};
pub use response::{Response, Status};

/// Strips one trailing `\n` (and a `\r` right before it) from a line.
pub(crate) fn strip_terminator(line: &str) -> &str {
    match line.strip_suffix('\n') {
        Some(line) => line.strip_suffix('\r').unwrap_or(line),
        None => line,
    }
}
