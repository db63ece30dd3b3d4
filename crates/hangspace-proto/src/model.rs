//! Shared identifiers and record types.
//!
//! Identifiers are opaque server-assigned strings. They are wrapped in
//! newtypes so a chat id can never be passed where a user id is expected.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Borrow the raw identifier.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Server-assigned user profile id.
    UserId
);
string_id!(
    /// Server-assigned chat id.
    ChatId
);
string_id!(
    /// Server-assigned message id.
    MessageId
);
string_id!(
    /// Server-assigned notification id.
    NotificationId
);

/// Online status of a user as known to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Presence {
    /// Connected to the event channel.
    Online,
    /// Not connected.
    #[default]
    Offline,
    /// Connected but idle.
    Away,
}

impl Presence {
    /// Wire spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
            Self::Away => "away",
        }
    }
}

impl From<String> for Presence {
    fn from(value: String) -> Self {
        match value.as_str() {
            "online" => Self::Online,
            "away" | "idle" => Self::Away,
            _ => Self::Offline,
        }
    }
}

impl From<Presence> for String {
    fn from(value: Presence) -> Self {
        value.as_str().to_string()
    }
}

/// Category of a notification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NotificationKind {
    /// Unread chat messages from a sender.
    NewMessage,
    /// Incoming friend request.
    FriendRequest,
    /// Someone accepted our friend request.
    FriendRequestAccepted,
    /// Any other server-defined category.
    Other(String),
}

impl NotificationKind {
    /// Wire spelling.
    pub fn as_str(&self) -> &str {
        match self {
            Self::NewMessage => "new_message",
            Self::FriendRequest => "friend_request",
            Self::FriendRequestAccepted => "friend_request_accepted",
            Self::Other(kind) => kind,
        }
    }
}

impl From<String> for NotificationKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "new_message" | "message" => Self::NewMessage,
            "friend_request" => Self::FriendRequest,
            "friend_request_accepted" | "friend_accepted" => Self::FriendRequestAccepted,
            _ => Self::Other(value),
        }
    }
}

impl From<NotificationKind> for String {
    fn from(value: NotificationKind) -> Self {
        value.as_str().to_string()
    }
}

/// Content type of a chat message.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageKind {
    /// Plain text.
    #[default]
    Text,
    /// Image attachment.
    Image,
    /// File attachment.
    File,
    /// Any other server-defined type.
    Other(String),
}

impl MessageKind {
    /// Wire spelling.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::File => "file",
            Self::Other(kind) => kind,
        }
    }
}

impl From<String> for MessageKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "text" => Self::Text,
            "image" => Self::Image,
            "file" => Self::File,
            _ => Self::Other(value),
        }
    }
}

impl From<MessageKind> for String {
    fn from(value: MessageKind) -> Self {
        value.as_str().to_string()
    }
}

/// User profile as returned by the friends and search endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Profile id.
    #[serde(rename = "_id", alias = "id", alias = "user_id")]
    pub id: UserId,
    /// Unique handle.
    pub username: String,
    /// Display name. Falls back to `username` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Last known status. `None` if the endpoint does not report it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Presence>,
}

impl UserRecord {
    /// Name to show in the UI.
    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().filter(|name| !name.is_empty()).unwrap_or(&self.username)
    }
}

/// Sender/chat details attached to a stored notification.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NotificationData {
    /// User that caused the notification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<UserId>,
    /// Sender handle, when the server includes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_username: Option<String>,
    /// Chat the notification refers to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<ChatId>,
    /// Number of consolidated messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_count: Option<u32>,
    /// Preview of the newest message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_content: Option<String>,
    /// Time of the newest message.
    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub latest_timestamp: Option<DateTime<Utc>>,
}

/// Notification as stored on the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    /// Notification id.
    #[serde(rename = "_id", alias = "id")]
    pub id: NotificationId,
    /// Category.
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    /// Human-readable summary.
    #[serde(default)]
    pub message: String,
    /// Sender/chat details.
    #[serde(default)]
    pub data: NotificationData,
    /// Whether the user has already read it.
    #[serde(default)]
    pub is_read: bool,
    /// Creation time.
    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,
}

/// Parse a server timestamp.
///
/// Accepts RFC 3339, RFC 2822 (the server's default JSON date encoding), and
/// naive ISO 8601 which is interpreted as UTC.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_rfc2822(text) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f").ok().map(|ts| ts.and_utc())
}

/// Serde adapter for optional timestamps in any format [`parse_timestamp`]
/// accepts. Unparseable values decode as `None`.
pub(crate) fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_timestamp))
}
