//! Request/response API surface.
//!
//! Mutations and bulk reads go over plain HTTP rather than the event channel.
//! [`ApiRequest`] describes each call as method, path and JSON body; executing
//! it is the driver's job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

pub use crate::inbound::NotificationsData;
use crate::{
    ChatId, MessageId, MessageKind, NotificationId, UserId, UserRecord, model::lenient_timestamp,
};

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// `GET`
    Get,
    /// `POST`
    Post,
}

/// Answer to a friend request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FriendResponse {
    /// Accept the request.
    Accept,
    /// Decline the request.
    Decline,
}

impl FriendResponse {
    /// Wire spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Decline => "decline",
        }
    }
}

/// One request/response API call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiRequest {
    /// `GET /api/notifications?limit=N`
    Notifications {
        /// Page size.
        limit: u32,
    },
    /// `GET /api/notifications/unread-count`
    UnreadCount,
    /// `POST /api/notifications/mark-read`
    MarkRead {
        /// Notification to mark.
        notification_id: NotificationId,
    },
    /// `POST /api/notifications/mark-all-read`
    MarkAllRead,
    /// `POST /api/search-users`
    SearchUsers {
        /// Trimmed, non-empty query.
        query: String,
    },
    /// `GET /api/friends`
    Friends,
    /// `POST /api/send-friend-request`
    SendFriendRequest {
        /// Target user.
        user_id: UserId,
    },
    /// `POST /api/respond-friend-request`
    RespondFriendRequest {
        /// Request being answered.
        request_id: String,
        /// Accept or decline.
        action: FriendResponse,
    },
    /// `POST /api/remove-friend`
    RemoveFriend {
        /// Friend to remove.
        friend_id: UserId,
    },
    /// `POST /api/create-chat`
    CreateChat {
        /// Other participants. The server adds the caller.
        participants: Vec<UserId>,
        /// Group chat rather than direct message.
        is_group: bool,
    },
    /// `GET /api/chat/<chat_id>/messages?limit=N`
    ChatMessages {
        /// Chat whose history to load.
        chat_id: ChatId,
        /// Newest messages to return.
        limit: u32,
    },
    /// `POST /api/update-message`
    UpdateMessage {
        /// Own message to edit.
        message_id: MessageId,
        /// Replacement body.
        new_content: String,
    },
    /// `POST /api/delete-message`
    DeleteMessage {
        /// Own message to delete.
        message_id: MessageId,
    },
}

impl ApiRequest {
    /// HTTP method.
    pub fn method(&self) -> Method {
        match self {
            Self::Notifications { .. }
            | Self::UnreadCount
            | Self::Friends
            | Self::ChatMessages { .. } => Method::Get,
            Self::MarkRead { .. }
            | Self::MarkAllRead
            | Self::SearchUsers { .. }
            | Self::SendFriendRequest { .. }
            | Self::RespondFriendRequest { .. }
            | Self::RemoveFriend { .. }
            | Self::CreateChat { .. }
            | Self::UpdateMessage { .. }
            | Self::DeleteMessage { .. } => Method::Post,
        }
    }

    /// Path including any query string.
    pub fn path(&self) -> String {
        match self {
            Self::Notifications { limit } => format!("/api/notifications?limit={limit}"),
            Self::UnreadCount => "/api/notifications/unread-count".to_string(),
            Self::MarkRead { .. } => "/api/notifications/mark-read".to_string(),
            Self::MarkAllRead => "/api/notifications/mark-all-read".to_string(),
            Self::SearchUsers { .. } => "/api/search-users".to_string(),
            Self::Friends => "/api/friends".to_string(),
            Self::SendFriendRequest { .. } => "/api/send-friend-request".to_string(),
            Self::RespondFriendRequest { .. } => "/api/respond-friend-request".to_string(),
            Self::RemoveFriend { .. } => "/api/remove-friend".to_string(),
            Self::CreateChat { .. } => "/api/create-chat".to_string(),
            Self::ChatMessages { chat_id, limit } => {
                format!("/api/chat/{chat_id}/messages?limit={limit}")
            },
            Self::UpdateMessage { .. } => "/api/update-message".to_string(),
            Self::DeleteMessage { .. } => "/api/delete-message".to_string(),
        }
    }

    /// JSON body. `None` for bodiless requests.
    pub fn body(&self) -> Option<Value> {
        match self {
            Self::Notifications { .. }
            | Self::UnreadCount
            | Self::Friends
            | Self::ChatMessages { .. } => None,
            Self::MarkAllRead => Some(json!({})),
            Self::MarkRead { notification_id } => {
                Some(json!({ "notification_id": notification_id }))
            },
            Self::SearchUsers { query } => Some(json!({ "query": query })),
            Self::SendFriendRequest { user_id } => Some(json!({ "user_id": user_id })),
            Self::RespondFriendRequest { request_id, action } => {
                Some(json!({ "request_id": request_id, "action": action.as_str() }))
            },
            Self::RemoveFriend { friend_id } => Some(json!({ "friend_id": friend_id })),
            Self::CreateChat { participants, is_group } => {
                Some(json!({ "participants": participants, "is_group": is_group }))
            },
            Self::UpdateMessage { message_id, new_content } => {
                Some(json!({ "message_id": message_id, "new_content": new_content }))
            },
            Self::DeleteMessage { message_id } => Some(json!({ "message_id": message_id })),
        }
    }
}

/// Body of `GET /api/notifications/unread-count`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnreadCountResponse {
    /// Authoritative unread count.
    pub unread_count: u64,
}

/// Body of `POST /api/search-users`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SearchUsersResponse {
    /// Matching users.
    #[serde(default, alias = "results")]
    pub users: Vec<UserRecord>,
}

/// Body of `GET /api/friends`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FriendsResponse {
    /// Current friends with their last known status.
    #[serde(default)]
    pub friends: Vec<UserRecord>,
}

/// Body of `POST /api/create-chat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateChatResponse {
    /// New (or existing) chat.
    pub chat_id: ChatId,
}

/// Body of `GET /api/chat/<chat_id>/messages`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChatMessagesResponse {
    /// Stored messages, oldest first.
    #[serde(default)]
    pub messages: Vec<StoredMessage>,
}

/// A message as the server stores it.
///
/// Unlike `new_message`, stored messages carry no author name and report
/// edits, deletion and readers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    /// Server-assigned id.
    #[serde(rename = "_id", alias = "message_id")]
    pub message_id: MessageId,
    /// Author.
    pub sender_id: UserId,
    /// Author name, when the server includes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_username: Option<String>,
    /// Message body.
    #[serde(default)]
    pub content: String,
    /// Content type.
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
    /// Server time.
    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<DateTime<Utc>>,
    /// Edited after sending.
    #[serde(default)]
    pub is_edited: bool,
    /// Deleted; the body is a placeholder.
    #[serde(default)]
    pub is_deleted: bool,
    /// Users who have read it.
    #[serde(default)]
    pub read_by: Vec<UserId>,
}

/// Body of mutation endpoints that report success as a flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResponse {
    /// Whether the server applied the change. Absent means success.
    #[serde(default = "default_success")]
    pub success: bool,
    /// Failure description.
    #[serde(default, alias = "message", skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn default_success() -> bool {
    true
}
