//! Application side-effects and intents.
//!
//! This module defines the [`AppAction`] enum, which represents instructions
//! produced by the [`crate::App`] state machine for the runtime to execute.

use hangspace_proto::{ChatId, FriendResponse, NotificationId, UserId};

/// Actions produced by the App state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppAction {
    /// Render the UI.
    Render,

    /// Quit the application.
    Quit,

    /// Open the event channel.
    Connect,

    /// Reconnect after attempts were exhausted.
    RetryConnection,

    /// Open a chat.
    OpenChat {
        /// Chat to open.
        chat_id: ChatId,
    },

    /// Close the open chat.
    CloseChat,

    /// Send a message to the open chat.
    SendMessage {
        /// Text typed by the user.
        content: String,
    },

    /// User typed in the composer.
    Keystroke,

    /// Resend the newest failed message in the open chat.
    RetryFailed,

    /// Edit our newest stored message in the open chat.
    EditLast {
        /// Replacement text.
        content: String,
    },

    /// Delete our newest stored message in the open chat.
    DeleteLast,

    /// Mark one notification read.
    MarkRead {
        /// Notification id.
        notification_id: NotificationId,
        /// Sender, when the notification list knows it.
        sender_id: Option<UserId>,
    },

    /// Mark everything read.
    MarkAllRead,

    /// Mark all message notifications from one sender read.
    MarkSenderRead {
        /// Sender.
        sender_id: UserId,
    },

    /// Ask for a fresh notification snapshot.
    RefreshNotifications,

    /// Search box text changed.
    SearchInput {
        /// Full box contents.
        text: String,
    },

    /// Enter pressed in the search box.
    SearchSubmit,

    /// Reload the friends list.
    LoadFriends,

    /// Send a friend request.
    SendFriendRequest {
        /// Recipient.
        user_id: UserId,
    },

    /// Accept or decline a friend request.
    RespondFriendRequest {
        /// Request id.
        request_id: String,
        /// Decision.
        action: FriendResponse,
    },

    /// Remove a friend.
    RemoveFriend {
        /// Friend to remove.
        friend_id: UserId,
    },

    /// Create a chat.
    CreateChat {
        /// Other participants.
        participants: Vec<UserId>,
        /// Group or direct chat.
        is_group: bool,
    },
}
