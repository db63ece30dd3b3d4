//! Observable state snapshots for invariant checking.
//!
//! Snapshots capture the observable state of the system at a point in time.
//! Invariants operate on snapshots rather than live state to ensure
//! consistent, atomic checks.

use hangspace_app::App;
use hangspace_client::Client;
use hangspace_core::{BundleKey, LocalId, MonotonicInstant, env::Environment};
use hangspace_proto::{ChatId, MessageId, UserId};

/// Snapshot of the entire system state.
///
/// Contains observable state from one or more clients for invariant checking.
#[derive(Debug, Clone, Default)]
pub struct SystemSnapshot {
    /// Per-client state snapshots.
    pub clients: Vec<ClientSnapshot>,
}

impl SystemSnapshot {
    /// Create an empty snapshot (no clients).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create a snapshot with a single client.
    pub fn single(client: ClientSnapshot) -> Self {
        Self { clients: vec![client] }
    }
}

/// One notification bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleSnapshot {
    /// Sender and kind.
    pub key: BundleKey,
    /// Unread units in the bundle.
    pub count: u32,
}

/// One entry of the open chat's stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySnapshot {
    /// Correlation id of an own message.
    pub local_id: Option<LocalId>,
    /// Server id once known.
    pub server_id: Option<MessageId>,
    /// Whether the server stored it.
    pub confirmed: bool,
}

/// What the App is showing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewSnapshot {
    /// Chat in the chat view.
    pub chat: Option<ChatId>,
    /// Visible toasts.
    pub toasts: usize,
}

/// Snapshot of a single client's observable state.
#[derive(Debug, Clone)]
pub struct ClientSnapshot {
    /// Logged-in user.
    pub user_id: UserId,
    /// Global unread counter.
    pub unread: u64,
    /// Live notification bundles.
    pub bundles: Vec<BundleSnapshot>,
    /// Open chat.
    pub active_chat: Option<ChatId>,
    /// Entries of the open chat.
    pub entries: Vec<EntrySnapshot>,
    /// App view, when the client runs under an App.
    pub view: Option<ViewSnapshot>,
}

impl ClientSnapshot {
    /// Empty snapshot for `user_id`.
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            unread: 0,
            bundles: Vec::new(),
            active_chat: None,
            entries: Vec::new(),
            view: None,
        }
    }

    /// Capture the client's state.
    pub fn from_client<E: Environment>(client: &Client<E>) -> Self {
        let bundles = client
            .notifications()
            .bundles()
            .into_iter()
            .map(|bundle| BundleSnapshot { key: bundle.key(), count: bundle.count })
            .collect();

        let entries = client
            .active_stream()
            .map(|stream| {
                stream
                    .entries()
                    .iter()
                    .map(|entry| EntrySnapshot {
                        local_id: entry.local_id.clone(),
                        server_id: entry.server_id.clone(),
                        confirmed: entry.state.is_confirmed(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            user_id: client.identity().user_id.clone(),
            unread: client.unread_count(),
            bundles,
            active_chat: client.active_chat().cloned(),
            entries,
            view: None,
        }
    }

    /// Attach what the App shows.
    #[must_use]
    pub fn with_view<I: MonotonicInstant>(mut self, app: &App<I>) -> Self {
        self.view = Some(ViewSnapshot {
            chat: app.chat().map(|chat| chat.chat_id.clone()),
            toasts: app.toasts().count(),
        });
        self
    }
}
