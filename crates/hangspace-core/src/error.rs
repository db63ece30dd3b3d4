//! Error types for the Hangspace client core.
//!
//! Three classes, each with its own recovery policy:
//!
//! - [`ChannelError`]: event channel failures. Recovered locally by bounded
//!   reconnect; surfaced as connection status.
//! - [`RequestError`]: request/response API failures. Surfaced as a transient
//!   toast and never retried automatically.
//! - [`ValidationError`]: rejected locally before any network call.
//!
//! An optimistic counter that would go negative is clamped, not an error.

use std::time::Duration;

use hangspace_proto::ProtocolError;
use thiserror::Error;

use crate::channel::ChannelState;

/// Errors raised by the event channel state machine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// Send attempted while the channel is down. Caller may queue or drop.
    #[error("channel not connected (state {state:?})")]
    NotConnected {
        /// State at the time of the send
        state: ChannelState,
    },

    /// Connection attempt failed or an established connection was lost.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Server rejected our credentials.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// No acknowledgement arrived in time.
    #[error("acknowledgement timeout after {elapsed:?}")]
    AckTimeout {
        /// How long we waited
        elapsed: Duration,
    },

    /// Invalid state transition attempted
    #[error("invalid state transition: cannot {operation} from {state:?}")]
    InvalidState {
        /// Current state when error occurred
        state: ChannelState,
        /// Operation that was attempted
        operation: String,
    },

    /// Inbound frame could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ChannelError {
    /// Returns true if this error is transient and may succeed on retry.
    ///
    /// Protocol violations and authorization failures are never transient.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::NotConnected { .. } | Self::ConnectionFailed(_) | Self::AckTimeout { .. }
        )
    }
}

impl From<ProtocolError> for ChannelError {
    fn from(err: ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}

/// Errors from request/response API calls.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// Server answered with a non-2xx status.
    #[error("request failed with status {code}: {message}")]
    Status {
        /// HTTP status code
        code: u16,
        /// Server-provided description, possibly empty
        message: String,
    },

    /// Request never reached the server or the response was lost.
    #[error("network error: {0}")]
    Network(String),

    /// Response body did not have the expected shape.
    #[error("unexpected response: {0}")]
    Decode(String),

    /// Server reported `success: false`.
    #[error("rejected: {0}")]
    Rejected(String),
}

/// Input rejected before any network call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Message body is empty after trimming.
    #[error("message is empty")]
    EmptyMessage,

    /// Chat operation without an open chat.
    #[error("no chat is open")]
    NoActiveChat,

    /// Referenced message does not exist or does not allow the operation.
    #[error("no such message {0}")]
    UnknownMessage(String),
}
