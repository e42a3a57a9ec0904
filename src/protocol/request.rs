//! Request Encoding and Decoding
//!
//! A request is a single line of text:
//!
//! ```text
//! OP SP KEY [SP ARG]
//! ```
//!
//! The line is split on the first two spaces only, so everything after the
//! key is one token. For `SET` that token is the value (which may itself
//! contain spaces), for `EXP` it is a Unix timestamp in seconds. `GET` and
//! `DEL` ignore it when decoding and never produce it when encoding.

use crate::protocol::error::ProtocolError;
use crate::protocol::strip_terminator;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A request line has at most an operation, a key and one argument.
const MAX_TOKENS: usize = 3;

/// The operations understood by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Get,
    Set,
    Del,
    Exp,
}

impl Operation {
    /// Returns the wire token for this operation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Get => "GET",
            Operation::Set => "SET",
            Operation::Del => "DEL",
            Operation::Exp => "EXP",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = ProtocolError;

    /// Operation tokens are case-sensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GET" => Ok(Operation::Get),
            "SET" => Ok(Operation::Set),
            "DEL" => Ok(Operation::Del),
            "EXP" => Ok(Operation::Exp),
            _ => Err(ProtocolError::InvalidOperation),
        }
    }
}

/// A parsed client command.
///
/// `value` is only meaningful for [`Operation::Set`] and `expiry` only for
/// [`Operation::Exp`]. Requests built through [`Request::decode`] or the
/// constructors always carry the argument their operation needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub operation: Operation,
    pub key: String,
    pub value: Option<String>,
    pub expiry: Option<SystemTime>,
}

impl Request {
    /// Creates a `GET key` request.
    pub fn get(key: impl Into<String>) -> Self {
        Self {
            operation: Operation::Get,
            key: key.into(),
            value: None,
            expiry: None,
        }
    }

    /// Creates a `SET key value` request.
    pub fn set(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            operation: Operation::Set,
            key: key.into(),
            value: Some(value.into()),
            expiry: None,
        }
    }

    /// Creates a `DEL key` request.
    pub fn del(key: impl Into<String>) -> Self {
        Self {
            operation: Operation::Del,
            key: key.into(),
            value: None,
            expiry: None,
        }
    }

    /// Creates an `EXP key timestamp` request.
    ///
    /// Only whole seconds travel on the wire; any sub-second part of `at`
    /// is dropped when the request is encoded.
    pub fn expire_at(key: impl Into<String>, at: SystemTime) -> Self {
        Self {
            operation: Operation::Exp,
            key: key.into(),
            value: None,
            expiry: Some(at),
        }
    }

    /// Validates the request and renders it as a newline-terminated line.
    ///
    /// Only requests that decode back to themselves are accepted: the key
    /// cannot contain a space, neither key nor value can end in `\r` (it
    /// would be taken for part of a `\r\n` terminator), and a request cannot
    /// carry an argument its operation does not use.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        if self.key.is_empty() {
            return Err(ProtocolError::MissingKey);
        }
        if self.key.contains(' ') || self.key.ends_with('\r') {
            return Err(ProtocolError::InvalidFormat);
        }

        let mut line = format!("{} {}", self.operation, self.key);
        match self.operation {
            Operation::Get | Operation::Del => {
                if self.value.is_some() || self.expiry.is_some() {
                    return Err(ProtocolError::InvalidFormat);
                }
            }
            Operation::Set => {
                if self.expiry.is_some() {
                    return Err(ProtocolError::InvalidFormat);
                }
                match self.value.as_deref() {
                    Some(value) if value.ends_with('\r') => {
                        return Err(ProtocolError::InvalidFormat);
                    }
                    Some(value) if !value.is_empty() => {
                        line.push(' ');
                        line.push_str(value);
                    }
                    _ => return Err(ProtocolError::MissingValue),
                }
            }
            Operation::Exp => {
                if self.value.is_some() {
                    return Err(ProtocolError::InvalidFormat);
                }
                let secs = self
                    .expiry
                    .and_then(unix_seconds)
                    .ok_or(ProtocolError::InvalidTimestamp)?;
                line.push(' ');
                line.push_str(&secs.to_string());
            }
        }
        line.push('\n');

        Ok(line.into_bytes())
    }

    /// Decodes a request line, validating EXP timestamps against the
    /// current wall-clock time.
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        Self::decode_at(data, SystemTime::now())
    }

    /// Decodes a request line, validating EXP timestamps against `now`.
    pub fn decode_at(data: &[u8], now: SystemTime) -> Result<Self, ProtocolError> {
        let text = std::str::from_utf8(data).map_err(|_| ProtocolError::InvalidFormat)?;
        let mut tokens = strip_terminator(text).splitn(MAX_TOKENS, ' ');

        let (operation, key) = match (tokens.next(), tokens.next()) {
            (Some(operation), Some(key)) => (operation.parse::<Operation>()?, key),
            _ => return Err(ProtocolError::InvalidFormat),
        };
        let argument = tokens.next();

        if matches!(operation, Operation::Set | Operation::Exp) && argument.is_none() {
            return Err(ProtocolError::InvalidFormat);
        }
        if key.is_empty() {
            return Err(ProtocolError::MissingKey);
        }

        match (operation, argument) {
            (Operation::Set, Some(value)) => {
                if value.is_empty() {
                    return Err(ProtocolError::MissingValue);
                }
                Ok(Request::set(key, value))
            }
            (Operation::Exp, Some(timestamp)) => {
                let at = parse_timestamp(timestamp, now)?;
                Ok(Request::expire_at(key, at))
            }
            (Operation::Get, _) => Ok(Request::get(key)),
            (Operation::Del, _) => Ok(Request::del(key)),
            (Operation::Set | Operation::Exp, None) => Err(ProtocolError::InvalidFormat),
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.operation, self.key)?;
        if let Some(value) = &self.value {
            write!(f, " {}", value)?;
        }
        if let Some(secs) = self.expiry.and_then(unix_seconds) {
            write!(f, " {}", secs)?;
        }
        Ok(())
    }
}

/// Parses a decimal Unix timestamp that must lie strictly after `now`.
fn parse_timestamp(token: &str, now: SystemTime) -> Result<SystemTime, ProtocolError> {
    let secs: u64 = token
        .parse::<i64>()
        .ok()
        .and_then(|secs| u64::try_from(secs).ok())
        .ok_or(ProtocolError::InvalidTimestamp)?;

    let at = UNIX_EPOCH
        .checked_add(Duration::from_secs(secs))
        .ok_or(ProtocolError::InvalidTimestamp)?;

    if at <= now {
        return Err(ProtocolError::InvalidTimestamp);
    }

    Ok(at)
}

/// Whole seconds since the Unix epoch, or `None` for pre-epoch times.
pub(crate) fn unix_seconds(at: SystemTime) -> Option<u64> {
    at.duration_since(UNIX_EPOCH).ok().map(|d| d.as_secs())
}
