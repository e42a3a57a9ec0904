//! Protocol Error Taxonomy
//!
//! Every variant is a client-caused, per-request failure. The `Display`
//! text of each variant is exactly the message carried by the `ERROR`
//! response sent back to the client, so changing it changes the wire.

use thiserror::Error;

/// Errors produced while encoding or decoding requests and responses.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// The operation token is not one of GET, SET, DEL or EXP
    #[error("operation must be GET, SET, DEL or EXP")]
    InvalidOperation,

    /// The message does not have the `OP KEY [ARG]` shape
    #[error("message format is invalid")]
    InvalidFormat,

    /// The key token is empty
    #[error("should provide a key")]
    MissingKey,

    /// A SET request without a value
    #[error("should provide a value when operation is SET")]
    MissingValue,

    /// An EXP timestamp that is not an integer or not in the future
    #[error("should provide a valid unix timestamp in the future")]
    InvalidTimestamp,

    /// A response whose status token is neither OK nor ERROR
    #[error("status must be OK or ERROR")]
    InvalidStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_are_client_facing() {
        assert_eq!(
            ProtocolError::InvalidFormat.to_string(),
            "message format is invalid"
        );
        assert_eq!(
            ProtocolError::InvalidStatus.to_string(),
            "status must be OK or ERROR"
        );
    }
}
