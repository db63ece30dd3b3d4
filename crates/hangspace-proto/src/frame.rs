//! JSON frame envelope.
//!
//! Every message on the event channel is one text frame holding a JSON object:
//!
//! ```text
//! { "event": "send_message", "data": { ... }, "ack": 7 }
//! ```
//!
//! A frame that wants an acknowledgement carries an `ack` id. The peer answers
//! with an [`ACK_EVENT`] frame carrying the same id and the acknowledgement
//! payload in `data`.

use std::fmt;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::error::{ProtocolError, Result};

/// Event name reserved for acknowledgement replies.
pub const ACK_EVENT: &str = "ack";

/// Identifier correlating a request frame with its acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AckId(pub u64);

impl fmt::Display for AckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ack#{}", self.0)
    }
}

/// One message on the event channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Event name.
    pub event: String,
    /// Event payload. `Null` when the event carries no data.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
    /// Acknowledgement id. `None` for fire-and-forget events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack: Option<AckId>,
}

impl Frame {
    /// Create a fire-and-forget frame.
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self { event: event.into(), data, ack: None }
    }

    /// Request an acknowledgement for this frame.
    #[must_use]
    pub fn with_ack(mut self, ack: AckId) -> Self {
        self.ack = Some(ack);
        self
    }

    /// Create an acknowledgement reply for `ack`.
    pub fn ack_reply(ack: AckId, data: Value) -> Self {
        Self { event: ACK_EVENT.to_string(), data, ack: Some(ack) }
    }

    /// Acknowledgement id if this frame answers an earlier request.
    pub fn ack_reply_id(&self) -> Option<AckId> {
        if self.event == ACK_EVENT { self.ack } else { None }
    }

    /// Decode the payload into `T`.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::InvalidPayload` if `data` does not match `T`
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T> {
        T::deserialize(&self.data).map_err(|e| ProtocolError::InvalidPayload {
            event: self.event.clone(),
            reason: e.to_string(),
        })
    }

    /// Serialize to the JSON text sent on the wire.
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    /// Parse JSON text received from the wire.
    pub fn decode(text: &str) -> Result<Self> {
        let frame: Self = serde_json::from_str(text)?;
        if frame.event.is_empty() {
            return Err(ProtocolError::MalformedFrame("empty event name".to_string()));
        }
        Ok(frame)
    }
}
