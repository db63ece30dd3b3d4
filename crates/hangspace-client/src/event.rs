//! Client events and actions.

use std::fmt;

use hangspace_core::{DropReason, LocalId, RequestError};
use hangspace_proto::{
    ApiRequest, ChatId, Frame, FriendResponse, MessageId, NotificationId, UserId,
};
use serde_json::Value;

/// Correlates an [`ApiRequest`] with its response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req#{}", self.0)
    }
}

/// Events the caller feeds into the client.
///
/// The caller is responsible for:
/// - Reporting transport lifecycle (opened, failed, dropped)
/// - Receiving frames from the channel and responses from the API
/// - Driving time forward via ticks
/// - Forwarding user intents (open chat, send message, search, etc.)
///
/// Generic over `I` (Instant type) to support both production
/// (`std::time::Instant`) and simulated time.
#[derive(Debug, Clone)]
pub enum ClientEvent<I = std::time::Instant> {
    /// Start the event channel.
    Connect,

    /// Tear the event channel down.
    Disconnect,

    /// User asked to retry after reconnect attempts ran out.
    RetryConnection,

    /// Transport opened the channel.
    ChannelOpened,

    /// Transport could not open the channel.
    ChannelOpenFailed {
        /// Transport-specific description.
        reason: String,
    },

    /// Established channel went away.
    ChannelDropped(DropReason),

    /// Outcome of a credential refresh requested by
    /// [`ClientAction::Reauthenticate`].
    Reauthenticated(Result<(), String>),

    /// Frame received from the channel.
    FrameReceived(Frame),

    /// Response to a [`ClientAction::Request`].
    ApiResponse {
        /// Request being answered.
        id: RequestId,
        /// Response body, or why there is none.
        result: Result<Value, RequestError>,
    },

    /// Time tick for debounce, backoff, expiry and reconcile timers.
    ///
    /// The caller should send ticks periodically (every 100ms or so).
    Tick {
        /// Current time from the environment.
        now: I,
    },

    /// Open a chat: join it on the channel and start its message stream.
    OpenChat {
        /// Chat to open.
        chat_id: ChatId,
    },

    /// Close the open chat.
    CloseChat,

    /// User typed in the composer of the open chat.
    Keystroke,

    /// User sent a message in the open chat.
    SendMessage {
        /// Raw composer content. Trimmed before sending.
        content: String,
    },

    /// User retried a failed message.
    RetryMessage {
        /// Local id of the failed entry.
        local_id: LocalId,
    },

    /// User edited one of their stored messages.
    EditMessage {
        /// Message to edit.
        message_id: MessageId,
        /// Replacement body. Trimmed before sending.
        content: String,
    },

    /// User deleted one of their stored messages.
    DeleteMessage {
        /// Message to delete.
        message_id: MessageId,
    },

    /// User read a single notification.
    MarkRead {
        /// Notification read.
        notification_id: NotificationId,
        /// Its sender, when known. All of the sender's bundles are evicted.
        sender_id: Option<UserId>,
    },

    /// User read all message notifications from one sender.
    MarkSenderRead {
        /// Sender whose messages were read.
        sender_id: UserId,
    },

    /// User cleared all notifications.
    MarkAllRead,

    /// Fetch an authoritative notification snapshot now.
    RefreshNotifications,

    /// Search box content changed.
    SearchInput {
        /// Raw search box content.
        text: String,
    },

    /// Enter pressed in the search box.
    SearchSubmit,

    /// Reload the friend list.
    LoadFriends,

    /// Send a friend request.
    SendFriendRequest {
        /// Target user.
        user_id: UserId,
    },

    /// Accept or decline a friend request.
    RespondFriendRequest {
        /// Request id from the notification.
        request_id: String,
        /// Accept or decline.
        action: FriendResponse,
    },

    /// Remove a friend.
    RemoveFriend {
        /// Friend to remove.
        friend_id: UserId,
    },

    /// Start a chat with the given users.
    CreateChat {
        /// Other participants.
        participants: Vec<UserId>,
        /// Group chat rather than direct message.
        is_group: bool,
    },
}

/// Part of the view that must be redrawn.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ViewChange {
    /// Connection status line.
    Connection,
    /// A user's presence dot.
    Presence(UserId),
    /// Notification bell, counter and list.
    Notifications,
    /// Message stream of a chat.
    Messages(ChatId),
    /// Typing indicator of a chat.
    Typing(ChatId),
    /// Search results.
    Search,
    /// Friend list.
    Friends,
}

/// Severity of a toast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastLevel {
    /// Neutral information.
    Info,
    /// Operation succeeded.
    Success,
    /// Operation failed.
    Error,
}

/// Transient message shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    /// Severity.
    pub level: ToastLevel,
    /// Text.
    pub message: String,
}

impl Toast {
    /// Informational toast.
    pub fn info(message: impl Into<String>) -> Self {
        Self { level: ToastLevel::Info, message: message.into() }
    }

    /// Success toast.
    pub fn success(message: impl Into<String>) -> Self {
        Self { level: ToastLevel::Success, message: message.into() }
    }

    /// Error toast.
    pub fn error(message: impl Into<String>) -> Self {
        Self { level: ToastLevel::Error, message: message.into() }
    }
}

/// Actions the client produces for the caller to execute.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientAction {
    /// Open the channel transport, then report `ChannelOpened` or
    /// `ChannelOpenFailed`.
    OpenChannel {
        /// 0 for the first attempt, then the reconnect attempt number.
        attempt: u32,
    },

    /// Close the channel transport.
    CloseChannel,

    /// Refresh credentials, then report `Reauthenticated`.
    Reauthenticate,

    /// Send a frame on the channel.
    Send(Frame),

    /// Execute an API call, then report `ApiResponse` with the same id.
    Request {
        /// Correlation id.
        id: RequestId,
        /// Call to make.
        request: ApiRequest,
    },

    /// Redraw part of the view.
    Render(ViewChange),

    /// Show a transient message.
    Toast(Toast),

    /// A chat was created and opened.
    ChatCreated {
        /// New chat.
        chat_id: ChatId,
    },
}
