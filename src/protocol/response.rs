//! Response Encoding and Decoding
//!
//! ```text
//! STATUS SP MESSAGE LF
//! ```

use crate::protocol::error::ProtocolError;
use crate::protocol::strip_terminator;
use std::fmt;
use std::str::FromStr;

/// Outcome of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Error,
}

impl Status {
    /// Returns the wire token for this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::Error => "ERROR",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OK" => Ok(Status::Ok),
            "ERROR" => Ok(Status::Error),
            _ => Err(ProtocolError::InvalidStatus),
        }
    }
}

/// A reply to a single request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: Status,
    pub message: String,
}

impl Response {
    pub fn new(status: Status, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Creates an `OK` response.
    pub fn ok(message: impl Into<String>) -> Self {
        Self::new(Status::Ok, message)
    }

    /// Creates an `ERROR` response.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Status::Error, message)
    }

    /// Returns true if this is an `OK` response.
    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    /// Renders the response as a newline-terminated line.
    ///
    /// The status is a closed enum, so there is nothing left to validate.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.status.as_str().len() + self.message.len() + 2);
        buf.extend_from_slice(self.status.as_str().as_bytes());
        buf.push(b' ');
        buf.extend_from_slice(self.message.as_bytes());
        buf.push(b'\n');
        buf
    }

    /// Decodes a response line.
    ///
    /// The status token must be exactly `OK` or `ERROR` and be followed by a
    /// space; everything after the first space is the message.
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        let text = String::from_utf8_lossy(data);
        let (status, message) = strip_terminator(&text)
            .split_once(' ')
            .ok_or(ProtocolError::InvalidStatus)?;

        Ok(Self::new(status.parse()?, message))
    }
}

impl From<ProtocolError> for Response {
    fn from(err: ProtocolError) -> Self {
        Response::error(err.to_string())
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status, self.message)
    }
}
