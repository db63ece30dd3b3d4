//! Log-based rendering.
//!
//! The CLI has no screen. Each render captures the App as plain text
//! sections and logs only the sections that changed since the last render.

use hangspace_app::App;
use hangspace_core::{DeliveryState, MonotonicInstant, SearchStatus};

/// The App as text, one field per screen region.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Screen {
    /// Connection status line.
    pub status: String,
    /// Open chat header and entries.
    pub chat: Vec<String>,
    /// Badge and notification rows.
    pub notifications: Vec<String>,
    /// Search status and results.
    pub search: Vec<String>,
    /// Friends with presence.
    pub friends: Vec<String>,
    /// Visible toasts.
    pub toasts: Vec<String>,
}

impl Screen {
    /// Capture what `app` shows.
    pub fn capture<I: MonotonicInstant>(app: &App<I>) -> Self {
        let chat = app.chat().map_or_else(Vec::new, |chat| {
            let mut lines = vec![format!("#{}", chat.chat_id)];
            lines.extend(chat.entries.iter().map(|entry| {
                let marker = match &entry.state {
                    DeliveryState::Pending => " (sending)".to_string(),
                    DeliveryState::Confirmed => String::new(),
                    DeliveryState::Read => " (read)".to_string(),
                    DeliveryState::Failed { reason } => format!(" (failed: {reason})"),
                };
                if entry.system {
                    format!("  * {}", entry.text)
                } else {
                    format!("  [{}] {}: {}{marker}", entry.time, entry.author, entry.text)
                }
            }));
            if let Some(typing) = &chat.typing {
                lines.push(format!("  {typing}"));
            }
            lines
        });

        let view = app.notifications();
        let mut notifications = vec![format!("unread: {}", view.unread)];
        notifications.extend(view.items.iter().map(|item| match &item.notification_id {
            Some(id) => format!("  [{}] {} ({id})", item.time, item.summary),
            None => format!("  [{}] {}", item.time, item.summary),
        }));

        let view = app.search();
        let search = match &view.status {
            SearchStatus::Idle => Vec::new(),
            SearchStatus::Loading => vec![format!("searching \"{}\"...", view.query)],
            SearchStatus::Errored(reason) => vec![format!("search failed: {reason}")],
            SearchStatus::Done => {
                let count = view.results.len();
                let mut lines = vec![format!("{count} result(s) for \"{}\"", view.query)];
                lines.extend(
                    view.results
                        .iter()
                        .map(|user| format!("  {} ({})", user.display_name(), user.id)),
                );
                lines
            },
        };

        let friends = app
            .friends()
            .iter()
            .map(|friend| format!("  {} [{}]", friend.display_name, friend.presence.as_str()))
            .collect();

        let toasts =
            app.toasts().map(|toast| format!("{:?}: {}", toast.level, toast.message)).collect();

        Self {
            status: app.status_line().to_string(),
            chat,
            notifications,
            search,
            friends,
            toasts,
        }
    }

    /// Labelled sections of `self` that differ from `previous`.
    pub fn changes(&self, previous: Option<&Screen>) -> Vec<(&'static str, Vec<String>)> {
        let mut out = Vec::new();
        let changed = |pick: fn(&Screen) -> &Vec<String>| {
            previous.is_none_or(|previous| pick(previous) != pick(self))
        };

        if previous.is_none_or(|previous| previous.status != self.status) {
            out.push(("status", vec![self.status.clone()]));
        }
        if changed(|screen| &screen.chat) {
            out.push(("chat", self.chat.clone()));
        }
        if changed(|screen| &screen.notifications) {
            out.push(("notifications", self.notifications.clone()));
        }
        if changed(|screen| &screen.search) && !self.search.is_empty() {
            out.push(("search", self.search.clone()));
        }
        if changed(|screen| &screen.friends) {
            out.push(("friends", self.friends.clone()));
        }
        if changed(|screen| &screen.toasts) {
            out.push(("toasts", self.toasts.clone()));
        }
        out
    }
}
