//! Observable application state types.
//!
//! These structures are the "View Model": snapshots of client state taken by
//! the [`crate::Bridge`] whenever the client reports a view change, already
//! formatted for display.

use hangspace_client::FriendView;
use hangspace_core::{ChannelState, RenderedEntry, SearchStatus};
use hangspace_proto::{ChatId, NotificationId, UserId, UserRecord};

/// Which input has the keyboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Focus {
    /// Message composer (also accepts `/commands`).
    #[default]
    Composer,
    /// User search box.
    Search,
}

impl Focus {
    /// The other input.
    pub fn toggled(self) -> Self {
        match self {
            Self::Composer => Self::Search,
            Self::Search => Self::Composer,
        }
    }
}

/// The open chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatView {
    /// Chat id.
    pub chat_id: ChatId,
    /// Rendered entries, oldest first.
    pub entries: Vec<RenderedEntry>,
    /// "X is typing..." line.
    pub typing: Option<String>,
}

/// One row of the notification list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationItem {
    /// Sender of the bundle.
    pub sender_id: UserId,
    /// Display text.
    pub summary: String,
    /// Formatted time of the newest item.
    pub time: String,
    /// Newest server notification in the bundle.
    pub notification_id: Option<NotificationId>,
}

/// Notification badge and list.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NotificationsView {
    /// Badge count.
    pub unread: u64,
    /// Bundles, newest first.
    pub items: Vec<NotificationItem>,
}

/// Search box results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchView {
    /// Query the results belong to.
    pub query: String,
    /// Lifecycle.
    pub status: SearchStatus,
    /// Matches.
    pub results: Vec<UserRecord>,
}

impl Default for SearchView {
    fn default() -> Self {
        Self { query: String::new(), status: SearchStatus::Idle, results: Vec::new() }
    }
}

/// A refreshed piece of the view model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewUpdate {
    /// Connection status line.
    Connection {
        /// Channel state.
        state: ChannelState,
        /// Status line text.
        status: String,
    },
    /// Open chat, or `None` when closed.
    Chat(Option<ChatView>),
    /// Badge and bundles.
    Notifications(NotificationsView),
    /// Search results.
    Search(SearchView),
    /// Friends with presence.
    Friends(Vec<FriendView>),
}
