//! Events pushed by the server over the event channel.
//!
//! The server emits named events with JSON payloads. [`InboundEvent`] is the
//! closed set the client understands; [`EventKind`] is its name-only
//! projection, used for channel subscriptions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    ChatId, Frame, MessageId, MessageKind, NotificationId, NotificationKind, NotificationRecord,
    Presence, UserId,
    error::{ProtocolError, Result},
    model::lenient_timestamp,
};

/// Name of an inbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    /// `user_online`
    UserOnline,
    /// `user_offline`
    UserOffline,
    /// `initial_statuses`
    InitialStatuses,
    /// `friend_request_received`
    FriendRequestReceived,
    /// `friend_request_accepted`
    FriendRequestAccepted,
    /// `new_message`
    NewMessage,
    /// `message_updated`
    MessageUpdated,
    /// `message_deleted`
    MessageDeleted,
    /// `message_error`
    MessageError,
    /// `message_read_receipt`
    MessageReadReceipt,
    /// `new_notification`
    NewNotification,
    /// `notification_updated`
    NotificationUpdated,
    /// `notification_badge_updated`
    NotificationBadgeUpdated,
    /// `notifications_data`
    NotificationsData,
    /// `notifications_cleared`
    NotificationsCleared,
    /// `new_message_notification`
    NewMessageNotification,
    /// `unread_message_notifications_count`
    SenderUnreadCount,
    /// `user_typing`
    UserTyping,
    /// `user_joined`
    UserJoined,
    /// `user_left`
    UserLeft,
}

impl EventKind {
    /// Every inbound event kind.
    pub const ALL: [Self; 20] = [
        Self::UserOnline,
        Self::UserOffline,
        Self::InitialStatuses,
        Self::FriendRequestReceived,
        Self::FriendRequestAccepted,
        Self::NewMessage,
        Self::MessageUpdated,
        Self::MessageDeleted,
        Self::MessageError,
        Self::MessageReadReceipt,
        Self::NewNotification,
        Self::NotificationUpdated,
        Self::NotificationBadgeUpdated,
        Self::NotificationsData,
        Self::NotificationsCleared,
        Self::NewMessageNotification,
        Self::SenderUnreadCount,
        Self::UserTyping,
        Self::UserJoined,
        Self::UserLeft,
    ];

    /// Wire name.
    pub fn name(self) -> &'static str {
        match self {
            Self::UserOnline => "user_online",
            Self::UserOffline => "user_offline",
            Self::InitialStatuses => "initial_statuses",
            Self::FriendRequestReceived => "friend_request_received",
            Self::FriendRequestAccepted => "friend_request_accepted",
            Self::NewMessage => "new_message",
            Self::MessageUpdated => "message_updated",
            Self::MessageDeleted => "message_deleted",
            Self::MessageError => "message_error",
            Self::MessageReadReceipt => "message_read_receipt",
            Self::NewNotification => "new_notification",
            Self::NotificationUpdated => "notification_updated",
            Self::NotificationBadgeUpdated => "notification_badge_updated",
            Self::NotificationsData => "notifications_data",
            Self::NotificationsCleared => "notifications_cleared",
            Self::NewMessageNotification => "new_message_notification",
            Self::SenderUnreadCount => "unread_message_notifications_count",
            Self::UserTyping => "user_typing",
            Self::UserJoined => "user_joined",
            Self::UserLeft => "user_left",
        }
    }

    /// Look up a kind by wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

/// `user_online` / `user_offline` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    /// User whose status changed.
    pub user_id: UserId,
}

/// One entry of `initial_statuses`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEntry {
    /// User id.
    pub user_id: UserId,
    /// Reported status.
    pub status: Presence,
}

/// `initial_statuses` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialStatuses {
    /// Statuses of the other participants of a chat.
    #[serde(default)]
    pub statuses: Vec<StatusEntry>,
}

/// `friend_request_received` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendRequestReceived {
    /// Requesting user's handle.
    pub from_username: String,
    /// Requesting user's id, when included.
    #[serde(default, alias = "from_user_id", skip_serializing_if = "Option::is_none")]
    pub from_id: Option<UserId>,
    /// Request id to answer with `respond-friend-request`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// `friend_request_accepted` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendRequestAccepted {
    /// Handle of the user who accepted.
    pub username: String,
    /// Their id, when included.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
}

/// `new_message` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Server-assigned id.
    pub message_id: MessageId,
    /// Chat the message belongs to.
    pub chat_id: ChatId,
    /// Author.
    pub sender_id: UserId,
    /// Author display name.
    #[serde(default)]
    pub sender_username: String,
    /// Message body.
    pub content: String,
    /// Content type.
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
    /// Server time. `None` if the server sent an unparseable value.
    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<DateTime<Utc>>,
    /// Correlation id chosen by the sending client, echoed back by servers
    /// that support it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_msg_id: Option<String>,
}

/// `message_updated` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageUpdated {
    /// Edited message.
    pub message_id: MessageId,
    /// Its chat.
    pub chat_id: ChatId,
    /// Replacement body.
    pub new_content: String,
}

/// `message_deleted` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDeleted {
    /// Deleted message.
    pub message_id: MessageId,
    /// Its chat.
    pub chat_id: ChatId,
}

/// `message_error` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageError {
    /// Server-provided description.
    #[serde(default)]
    pub error: String,
}

/// `message_read_receipt` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadReceipt {
    /// Message that was read.
    pub message_id: MessageId,
    /// Reader.
    pub reader_id: UserId,
    /// Chat of the message.
    pub chat_id: ChatId,
}

/// `new_notification` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewNotification {
    /// Human-readable summary.
    pub message: String,
    /// Sender, when the notification has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<UserId>,
    /// Sender handle, when included.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_username: Option<String>,
    /// Category.
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    /// Related chat.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<ChatId>,
    /// Stored notification id, when included.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_id: Option<NotificationId>,
}

/// `notification_updated` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationUpdated {
    /// Category that changed.
    #[serde(rename = "type")]
    pub kind: NotificationKind,
}

/// `notification_badge_updated` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadgeUpdated {
    /// Authoritative unread count.
    pub unread_count: u64,
}

/// `notifications_data` payload, also the body of `GET /api/notifications`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NotificationsData {
    /// Most recent notifications, read and unread.
    #[serde(default)]
    pub notifications: Vec<NotificationRecord>,
    /// Authoritative unread count.
    #[serde(default)]
    pub unread_count: u64,
}

/// `notifications_cleared` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationsCleared {
    /// Sender whose notifications were cleared. `None` clears all senders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<UserId>,
}

/// `new_message_notification` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessageNotification {
    /// Message author.
    pub sender_id: UserId,
    /// Author handle. May be omitted on follow-up notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_username: Option<String>,
    /// Server-side consolidated count for this sender.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_count: Option<u32>,
    /// Chat the messages were sent to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<ChatId>,
    /// Preview of the newest message.
    #[serde(default, alias = "latest_content", skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// `unread_message_notifications_count` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderUnreadCount {
    /// Sender the count refers to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<UserId>,
    /// Unread message notifications from that sender.
    pub count: u32,
}

/// `user_typing` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserTyping {
    /// Display name of the typist.
    pub username: String,
    /// Typist id, when included.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    /// `true` on start, `false` on stop.
    pub is_typing: bool,
}

/// `user_joined` / `user_left` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    /// User who joined or left.
    pub username: String,
}

/// Typed inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// User came online.
    UserOnline(UserRef),
    /// User went offline.
    UserOffline(UserRef),
    /// Bulk presence for chat participants.
    InitialStatuses(InitialStatuses),
    /// Someone sent us a friend request.
    FriendRequestReceived(FriendRequestReceived),
    /// Someone accepted our friend request.
    FriendRequestAccepted(FriendRequestAccepted),
    /// Chat message.
    NewMessage(ChatMessage),
    /// Chat message edited.
    MessageUpdated(MessageUpdated),
    /// Chat message deleted.
    MessageDeleted(MessageDeleted),
    /// Server failed to store a message.
    MessageError(MessageError),
    /// Our message was read.
    MessageReadReceipt(ReadReceipt),
    /// Generic notification push.
    NewNotification(NewNotification),
    /// Notification category changed; badge should refresh.
    NotificationUpdated(NotificationUpdated),
    /// Authoritative badge count.
    NotificationBadgeUpdated(BadgeUpdated),
    /// Full notification snapshot.
    NotificationsData(NotificationsData),
    /// Notifications cleared on the server.
    NotificationsCleared(NotificationsCleared),
    /// Consolidated per-sender message notification.
    NewMessageNotification(NewMessageNotification),
    /// Per-sender unread message count.
    SenderUnreadCount(SenderUnreadCount),
    /// Typing indicator.
    UserTyping(UserTyping),
    /// User joined the current chat.
    UserJoined(Membership),
    /// User left the current chat.
    UserLeft(Membership),
}

impl InboundEvent {
    /// Event kind.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::UserOnline(_) => EventKind::UserOnline,
            Self::UserOffline(_) => EventKind::UserOffline,
            Self::InitialStatuses(_) => EventKind::InitialStatuses,
            Self::FriendRequestReceived(_) => EventKind::FriendRequestReceived,
            Self::FriendRequestAccepted(_) => EventKind::FriendRequestAccepted,
            Self::NewMessage(_) => EventKind::NewMessage,
            Self::MessageUpdated(_) => EventKind::MessageUpdated,
            Self::MessageDeleted(_) => EventKind::MessageDeleted,
            Self::MessageError(_) => EventKind::MessageError,
            Self::MessageReadReceipt(_) => EventKind::MessageReadReceipt,
            Self::NewNotification(_) => EventKind::NewNotification,
            Self::NotificationUpdated(_) => EventKind::NotificationUpdated,
            Self::NotificationBadgeUpdated(_) => EventKind::NotificationBadgeUpdated,
            Self::NotificationsData(_) => EventKind::NotificationsData,
            Self::NotificationsCleared(_) => EventKind::NotificationsCleared,
            Self::NewMessageNotification(_) => EventKind::NewMessageNotification,
            Self::SenderUnreadCount(_) => EventKind::SenderUnreadCount,
            Self::UserTyping(_) => EventKind::UserTyping,
            Self::UserJoined(_) => EventKind::UserJoined,
            Self::UserLeft(_) => EventKind::UserLeft,
        }
    }

    /// Decode a frame into a typed event.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::UnknownEvent` if the event name is not recognized
    /// - `ProtocolError::InvalidPayload` if the payload does not match
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        let Some(kind) = EventKind::from_name(&frame.event) else {
            return Err(ProtocolError::UnknownEvent(frame.event.clone()));
        };

        let event = match kind {
            EventKind::UserOnline => Self::UserOnline(frame.payload()?),
            EventKind::UserOffline => Self::UserOffline(frame.payload()?),
            EventKind::InitialStatuses => Self::InitialStatuses(frame.payload()?),
            EventKind::FriendRequestReceived => Self::FriendRequestReceived(frame.payload()?),
            EventKind::FriendRequestAccepted => Self::FriendRequestAccepted(frame.payload()?),
            EventKind::NewMessage => Self::NewMessage(frame.payload()?),
            EventKind::MessageUpdated => Self::MessageUpdated(frame.payload()?),
            EventKind::MessageDeleted => Self::MessageDeleted(frame.payload()?),
            EventKind::MessageError => Self::MessageError(frame.payload()?),
            EventKind::MessageReadReceipt => Self::MessageReadReceipt(frame.payload()?),
            EventKind::NewNotification => Self::NewNotification(frame.payload()?),
            EventKind::NotificationUpdated => Self::NotificationUpdated(frame.payload()?),
            EventKind::NotificationBadgeUpdated => Self::NotificationBadgeUpdated(frame.payload()?),
            EventKind::NotificationsData => Self::NotificationsData(frame.payload()?),
            EventKind::NotificationsCleared => Self::NotificationsCleared(frame.payload()?),
            EventKind::NewMessageNotification => Self::NewMessageNotification(frame.payload()?),
            EventKind::SenderUnreadCount => Self::SenderUnreadCount(frame.payload()?),
            EventKind::UserTyping => Self::UserTyping(frame.payload()?),
            EventKind::UserJoined => Self::UserJoined(frame.payload()?),
            EventKind::UserLeft => Self::UserLeft(frame.payload()?),
        };
        Ok(event)
    }

    /// Encode as a frame. Used by simulated servers and tests.
    pub fn into_frame(self) -> Result<Frame> {
        let name = self.kind().name();
        let data = match self {
            Self::UserOnline(p) | Self::UserOffline(p) => serde_json::to_value(p),
            Self::InitialStatuses(p) => serde_json::to_value(p),
            Self::FriendRequestReceived(p) => serde_json::to_value(p),
            Self::FriendRequestAccepted(p) => serde_json::to_value(p),
            Self::NewMessage(p) => serde_json::to_value(p),
            Self::MessageUpdated(p) => serde_json::to_value(p),
            Self::MessageDeleted(p) => serde_json::to_value(p),
            Self::MessageError(p) => serde_json::to_value(p),
            Self::MessageReadReceipt(p) => serde_json::to_value(p),
            Self::NewNotification(p) => serde_json::to_value(p),
            Self::NotificationUpdated(p) => serde_json::to_value(p),
            Self::NotificationBadgeUpdated(p) => serde_json::to_value(p),
            Self::NotificationsData(p) => serde_json::to_value(p),
            Self::NotificationsCleared(p) => serde_json::to_value(p),
            Self::NewMessageNotification(p) => serde_json::to_value(p),
            Self::SenderUnreadCount(p) => serde_json::to_value(p),
            Self::UserTyping(p) => serde_json::to_value(p),
            Self::UserJoined(p) | Self::UserLeft(p) => serde_json::to_value(p),
        }
        .map_err(|e| ProtocolError::Encode(e.to_string()))?;

        Ok(Frame::new(name, data))
    }
}
