//! Known users.
//!
//! Identity lookups for senders, typists and friends. Presence is not stored
//! here; it lives in [`crate::PresenceTracker`] and is joined at render time.

use std::collections::{BTreeSet, HashMap};

use hangspace_proto::{UserId, UserRecord};

/// A user the client knows by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Server id
    pub id: UserId,
    /// Unique handle
    pub username: String,
    /// Display name, falls back to the handle
    pub display_name: String,
}

impl From<&UserRecord> for User {
    fn from(record: &UserRecord) -> Self {
        Self {
            id: record.id.clone(),
            username: record.username.clone(),
            display_name: record.display_name().to_string(),
        }
    }
}

/// Directory of known users and the friend list.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    users: HashMap<UserId, User>,
    friends: BTreeSet<UserId>,
}

impl Roster {
    /// Create an empty roster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or refresh a user.
    ///
    /// An empty display name keeps the previous one.
    pub fn upsert(&mut self, user: User) {
        match self.users.get_mut(&user.id) {
            Some(existing) => {
                existing.username = user.username;
                if !user.display_name.is_empty() {
                    existing.display_name = user.display_name;
                }
            },
            None => {
                self.users.insert(user.id.clone(), user);
            },
        }
    }

    /// Learn a user from an event that carries only id and handle.
    pub fn remember(&mut self, id: &UserId, username: &str) {
        if username.is_empty() {
            return;
        }
        self.upsert(User {
            id: id.clone(),
            username: username.to_string(),
            display_name: String::new(),
        });
        if let Some(user) = self.users.get_mut(id)
            && user.display_name.is_empty()
        {
            user.display_name = username.to_string();
        }
    }

    /// Look up by id.
    #[must_use]
    pub fn get(&self, id: &UserId) -> Option<&User> {
        self.users.get(id)
    }

    /// Look up by handle.
    #[must_use]
    pub fn find_by_username(&self, username: &str) -> Option<&User> {
        self.users.values().find(|user| user.username == username)
    }

    /// Name to show for `id`, if known.
    #[must_use]
    pub fn display_name(&self, id: &UserId) -> Option<&str> {
        self.users.get(id).map(|user| user.display_name.as_str())
    }

    /// Replace the friend list.
    pub fn set_friends(&mut self, records: &[UserRecord]) {
        self.friends.clear();
        for record in records {
            self.friends.insert(record.id.clone());
            self.upsert(User::from(record));
        }
    }

    /// Add a single friend.
    pub fn add_friend(&mut self, user: User) {
        self.friends.insert(user.id.clone());
        self.upsert(user);
    }

    /// Drop a friend. The user stays known.
    pub fn remove_friend(&mut self, id: &UserId) -> bool {
        self.friends.remove(id)
    }

    /// Whether `id` is on the friend list.
    #[must_use]
    pub fn is_friend(&self, id: &UserId) -> bool {
        self.friends.contains(id)
    }

    /// Friends ordered by display name.
    pub fn friends(&self) -> Vec<&User> {
        let mut friends: Vec<&User> =
            self.friends.iter().filter_map(|id| self.users.get(id)).collect();
        friends.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        friends
    }

    /// Number of known users.
    #[must_use]
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Whether no users are known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, username: &str, display: Option<&str>) -> UserRecord {
        UserRecord {
            id: UserId::from(id),
            username: username.to_string(),
            display_name: display.map(str::to_string),
            status: None,
        }
    }

    #[test]
    fn remember_uses_handle_as_display_name() {
        let mut roster = Roster::new();
        roster.remember(&UserId::from("u1"), "alice");

        assert_eq!(roster.display_name(&UserId::from("u1")), Some("alice"));
        assert_eq!(roster.find_by_username("alice").map(|u| u.id.as_str()), Some("u1"));
    }

    #[test]
    fn remember_keeps_richer_display_name() {
        let mut roster = Roster::new();
        roster.set_friends(&[record("u1", "alice", Some("Alice Liddell"))]);
        roster.remember(&UserId::from("u1"), "alice");

        assert_eq!(roster.display_name(&UserId::from("u1")), Some("Alice Liddell"));
    }

    #[test]
    fn friend_list_replaced_wholesale() {
        let mut roster = Roster::new();
        roster.set_friends(&[record("u1", "zed", None), record("u2", "amy", None)]);
        let names: Vec<&str> = roster.friends().iter().map(|u| u.username.as_str()).collect();
        assert_eq!(names, vec!["amy", "zed"]);

        roster.set_friends(&[record("u2", "amy", None)]);
        assert!(!roster.is_friend(&UserId::from("u1")));
        assert_eq!(roster.len(), 2);
    }
}
