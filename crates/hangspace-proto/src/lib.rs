//! Hangspace wire protocol.
//!
//! Everything that crosses the process boundary lives here: the JSON
//! [`Frame`] envelope carried by the persistent event channel, the typed
//! [`InboundEvent`] and [`OutboundEvent`] vocabularies, and the
//! request/response API surface ([`ApiRequest`] and its response bodies).
//!
//! This crate does not know about connection state, timers, or UI. It only
//! converts between text on the wire and strongly-typed values.
//!
//! # Invariants
//!
//! - Each [`InboundEvent`] variant maps to exactly one event name, and
//!   [`InboundEvent::from_frame`] rejects names it does not know.
//! - Acknowledgement frames never decode as inbound events; they carry the
//!   [`AckId`] of the request they answer.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod api;
mod error;
mod frame;
pub mod inbound;
mod model;
mod outbound;

pub use api::{ApiRequest, FriendResponse, Method, StoredMessage};
pub use error::{ProtocolError, Result};
pub use frame::{ACK_EVENT, AckId, Frame};
pub use inbound::{ChatMessage, EventKind, InboundEvent};
pub use model::{
    ChatId, MessageId, MessageKind, NotificationData, NotificationId, NotificationKind,
    NotificationRecord, Presence, UserId, UserRecord, parse_timestamp,
};
pub use outbound::{AckPayload, OutboundEvent};
