//! Events the client emits on the event channel.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    ChatId, Frame, MessageId, MessageKind, UserId,
    error::{ProtocolError, Result},
};

/// Typed outbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundEvent {
    /// Subscribe to a chat room.
    JoinChat {
        /// Chat to join.
        chat_id: ChatId,
    },
    /// Unsubscribe from a chat room.
    LeaveChat {
        /// Chat to leave.
        chat_id: ChatId,
    },
    /// Ask for the presence of a chat's participants.
    RequestInitialStatuses {
        /// Chat whose participants to report.
        chat_id: ChatId,
    },
    /// Post a message. Acknowledged by the server.
    SendMessage {
        /// Target chat.
        chat_id: ChatId,
        /// Message body.
        message: String,
        /// Content type.
        kind: MessageKind,
        /// Client correlation id, echoed back in `new_message` when supported.
        client_msg_id: String,
    },
    /// Typing indicator.
    Typing {
        /// Chat being typed into.
        chat_id: ChatId,
        /// `true` on start, `false` on stop.
        is_typing: bool,
    },
    /// Mark every message notification from a sender as read.
    MarkAllMessageNotificationsRead {
        /// Sender whose notifications to clear.
        sender_id: UserId,
    },
    /// Ask the server to push a `notifications_data` snapshot.
    RequestNotifications,
    /// Tell the author their message was displayed to us.
    MessageRead {
        /// Message read.
        message_id: MessageId,
    },
}

impl OutboundEvent {
    /// Wire name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::JoinChat { .. } => "join_chat",
            Self::LeaveChat { .. } => "leave_chat",
            Self::RequestInitialStatuses { .. } => "request_initial_statuses",
            Self::SendMessage { .. } => "send_message",
            Self::Typing { .. } => "typing",
            Self::MarkAllMessageNotificationsRead { .. } => "mark_all_message_notifications_read",
            Self::RequestNotifications => "request_notifications",
            Self::MessageRead { .. } => "message_read",
        }
    }

    /// Whether the server answers this event with an acknowledgement.
    pub fn expects_ack(&self) -> bool {
        matches!(self, Self::SendMessage { .. })
    }

    /// Encode as a frame without an ack id.
    pub fn to_frame(&self) -> Frame {
        let data = match self {
            Self::JoinChat { chat_id }
            | Self::LeaveChat { chat_id }
            | Self::RequestInitialStatuses { chat_id } => json!({ "chat_id": chat_id }),
            Self::SendMessage { chat_id, message, kind, client_msg_id } => json!({
                "chat_id": chat_id,
                "message": message,
                "type": kind,
                "client_msg_id": client_msg_id,
            }),
            Self::Typing { chat_id, is_typing } => {
                json!({ "chat_id": chat_id, "is_typing": is_typing })
            },
            Self::MarkAllMessageNotificationsRead { sender_id } => {
                json!({ "sender_id": sender_id })
            },
            Self::RequestNotifications => json!({}),
            Self::MessageRead { message_id } => json!({ "message_id": message_id }),
        };
        Frame::new(self.name(), data)
    }
}

/// Acknowledgement payload for `send_message`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AckPayload {
    /// Failure description. `None` on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Server-assigned id of the stored message, when the server reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<MessageId>,
}

impl AckPayload {
    /// Decode the acknowledgement carried by an ack reply frame.
    ///
    /// An empty or null payload is a successful acknowledgement.
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        if frame.data.is_null() {
            return Ok(Self::default());
        }
        frame.payload().map_err(|e| match e {
            ProtocolError::InvalidPayload { reason, .. } => {
                ProtocolError::InvalidPayload { event: "ack".to_string(), reason }
            },
            other => other,
        })
    }

    /// Convert into a result, treating an `error` field as failure.
    pub fn into_result(self) -> std::result::Result<Option<MessageId>, String> {
        match self.error {
            Some(reason) => Err(reason),
            None => Ok(self.message_id),
        }
    }
}
