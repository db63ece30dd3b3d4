//! Presence tracking.
//!
//! Last-write-wins map from user to [`Presence`]. Updates are idempotent: a
//! repeated status for the same user is not a change and triggers no view
//! update. Users never reported are treated as offline.

use std::collections::HashMap;

use hangspace_proto::{Presence, UserId, inbound::StatusEntry};

/// Online/offline/away state for every user the client has heard about.
#[derive(Debug, Clone, Default)]
pub struct PresenceTracker {
    states: HashMap<UserId, Presence>,
}

impl PresenceTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a status update.
    ///
    /// Returns `true` if the visible state changed.
    pub fn set(&mut self, user_id: &UserId, presence: Presence) -> bool {
        let previous = self.states.insert(user_id.clone(), presence);
        let changed = previous.unwrap_or_default() != presence;
        if changed {
            tracing::trace!(%user_id, status = presence.as_str(), "presence changed");
        }
        changed
    }

    /// Apply a bulk status snapshot in order.
    ///
    /// Returns the users whose visible state changed.
    pub fn apply_all<'a>(
        &mut self,
        entries: impl IntoIterator<Item = &'a StatusEntry>,
    ) -> Vec<UserId> {
        entries
            .into_iter()
            .filter(|entry| self.set(&entry.user_id, entry.status))
            .map(|entry| entry.user_id.clone())
            .collect()
    }

    /// Current status. Unknown users are offline.
    #[must_use]
    pub fn get(&self, user_id: &UserId) -> Presence {
        self.states.get(user_id).copied().unwrap_or_default()
    }

    /// Whether the user has ever been reported.
    #[must_use]
    pub fn is_known(&self, user_id: &UserId) -> bool {
        self.states.contains_key(user_id)
    }

    /// Users currently online.
    pub fn online(&self) -> impl Iterator<Item = &UserId> {
        self.states
            .iter()
            .filter(|(_, presence)| **presence == Presence::Online)
            .map(|(user_id, _)| user_id)
    }

    /// Forget everything. Used when the session ends.
    pub fn clear(&mut self) {
        self.states.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_status_is_not_a_change() {
        let mut tracker = PresenceTracker::new();
        let alice = UserId::from("alice");

        assert!(tracker.set(&alice, Presence::Online));
        assert!(!tracker.set(&alice, Presence::Online));
        assert!(tracker.set(&alice, Presence::Offline));
        assert_eq!(tracker.get(&alice), Presence::Offline);
    }

    #[test]
    fn unknown_user_is_offline_and_offline_report_is_silent() {
        let mut tracker = PresenceTracker::new();
        let bob = UserId::from("bob");

        assert_eq!(tracker.get(&bob), Presence::Offline);
        assert!(!tracker.set(&bob, Presence::Offline));
        assert!(tracker.is_known(&bob));
    }

    #[test]
    fn bulk_snapshot_reports_changes_only() {
        let mut tracker = PresenceTracker::new();
        tracker.set(&UserId::from("a"), Presence::Online);

        let entries = vec![
            StatusEntry { user_id: UserId::from("a"), status: Presence::Online },
            StatusEntry { user_id: UserId::from("b"), status: Presence::Away },
        ];
        let changed = tracker.apply_all(&entries);

        assert_eq!(changed, vec![UserId::from("b")]);
        assert_eq!(tracker.online().count(), 1);
    }
}
