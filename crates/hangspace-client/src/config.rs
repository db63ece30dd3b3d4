//! Client configuration.

use hangspace_core::{ChannelConfig, NotificationConfig, SearchConfig, TypingConfig};
use hangspace_proto::UserId;

/// Who the client is logged in as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    /// Our user id. Messages from this id are rendered as our own.
    pub user_id: UserId,
    /// Our handle. Typing events with this name are ignored.
    pub username: String,
}

impl ClientIdentity {
    /// Create an identity.
    pub fn new(user_id: impl Into<UserId>, username: impl Into<String>) -> Self {
        Self { user_id: user_id.into(), username: username.into() }
    }
}

/// Stored messages fetched when a chat is opened.
pub const DEFAULT_HISTORY_LIMIT: u32 = 50;

/// Timing and sizing knobs for every component.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Reconnect and acknowledgement settings
    pub channel: ChannelConfig,
    /// Reconcile interval and page size
    pub notifications: NotificationConfig,
    /// Typing debounce and expiry
    pub typing: TypingConfig,
    /// Search debounce
    pub search: SearchConfig,
    /// Messages of history loaded per opened chat
    pub history_limit: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            channel: ChannelConfig::default(),
            notifications: NotificationConfig::default(),
            typing: TypingConfig::default(),
            search: SearchConfig::default(),
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}
