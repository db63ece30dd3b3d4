//! Protocol error types.

use thiserror::Error;

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced while encoding or decoding wire data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame text was not a valid JSON envelope.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// Event name is not part of the inbound vocabulary.
    #[error("unknown event: {0}")]
    UnknownEvent(String),

    /// Payload did not match the shape expected for the event.
    #[error("invalid payload for {event}: {reason}")]
    InvalidPayload {
        /// Event whose payload failed to decode
        event: String,
        /// Decoder message
        reason: String,
    },

    /// Value could not be serialized.
    #[error("encode failed: {0}")]
    Encode(String),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedFrame(err.to_string())
    }
}
