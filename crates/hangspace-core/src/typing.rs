//! Typing coordination.
//!
//! Two halves:
//!
//! - Local: turns a stream of keystrokes into exactly one "started" signal
//!   per burst and one "stopped" signal after [`TypingConfig::debounce`] of
//!   inactivity. Sending a message always emits "stopped".
//! - Remote: per chat, the ordered set of other users currently typing.
//!   Entries expire after [`TypingConfig::remote_ttl`] without a refresh so a
//!   lost "stopped" event cannot leave a stale indicator.

use std::{collections::HashMap, time::Duration};

use hangspace_proto::ChatId;

use crate::{env::MonotonicInstant, timer::Timer};

/// Inactivity after the last keystroke before "stopped" is emitted.
pub const DEFAULT_TYPING_DEBOUNCE: Duration = Duration::from_millis(1000);

/// Lifetime of a remote typing entry without a refresh.
pub const DEFAULT_REMOTE_TYPING_TTL: Duration = Duration::from_secs(5);

/// Typing configuration
#[derive(Debug, Clone)]
pub struct TypingConfig {
    /// Local stop debounce
    pub debounce: Duration,
    /// Remote entry expiry
    pub remote_ttl: Duration,
}

impl Default for TypingConfig {
    fn default() -> Self {
        Self { debounce: DEFAULT_TYPING_DEBOUNCE, remote_ttl: DEFAULT_REMOTE_TYPING_TTL }
    }
}

/// A typing signal to send on the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingEmit {
    /// Chat the signal is for
    pub chat_id: ChatId,
    /// `true` for started, `false` for stopped
    pub is_typing: bool,
}

impl TypingEmit {
    fn start(chat_id: ChatId) -> Self {
        Self { chat_id, is_typing: true }
    }

    fn stop(chat_id: ChatId) -> Self {
        Self { chat_id, is_typing: false }
    }
}

#[derive(Debug, Clone)]
struct RemoteTypist<I> {
    username: String,
    last_seen: I,
}

/// Local typing debounce and remote typing sets.
#[derive(Debug, Clone)]
pub struct TypingCoordinator<I> {
    config: TypingConfig,
    /// Chat we told the server we are typing in.
    local: Option<ChatId>,
    idle: Timer<I>,
    remote: HashMap<ChatId, Vec<RemoteTypist<I>>>,
}

impl<I: MonotonicInstant> TypingCoordinator<I> {
    /// Create an idle coordinator.
    pub fn new(config: TypingConfig) -> Self {
        let idle = Timer::new(config.debounce);
        Self { config, local: None, idle, remote: HashMap::new() }
    }

    /// Whether we are currently signalling "typing".
    #[must_use]
    pub fn is_typing(&self) -> bool {
        self.local.is_some()
    }

    /// Record a keystroke in `chat_id`.
    ///
    /// Emits "started" on the first keystroke of a burst. Switching chats
    /// mid-burst stops the old chat first. Every keystroke restarts the
    /// debounce.
    pub fn keystroke(&mut self, chat_id: &ChatId, now: I) -> Vec<TypingEmit> {
        let mut emits = Vec::new();

        match self.local.take() {
            Some(current) if &current == chat_id => self.local = Some(current),
            Some(previous) => {
                emits.push(TypingEmit::stop(previous));
                emits.push(TypingEmit::start(chat_id.clone()));
                self.local = Some(chat_id.clone());
            },
            None => {
                emits.push(TypingEmit::start(chat_id.clone()));
                self.local = Some(chat_id.clone());
            },
        }

        self.idle.arm(now);
        emits
    }

    /// A message was sent in `chat_id`.
    ///
    /// Always emits "stopped" for that chat, even when no burst is active.
    pub fn message_sent(&mut self, chat_id: &ChatId) -> Vec<TypingEmit> {
        let mut emits = Vec::new();
        if let Some(current) = self.local.take()
            && &current != chat_id
        {
            emits.push(TypingEmit::stop(current));
        }
        self.idle.cancel();
        emits.push(TypingEmit::stop(chat_id.clone()));
        emits
    }

    /// Leave the local burst without sending, e.g. when the chat is closed.
    pub fn reset_local(&mut self) -> Option<TypingEmit> {
        self.idle.cancel();
        self.local.take().map(TypingEmit::stop)
    }

    /// Fire the debounce. Emits "stopped" once after inactivity.
    pub fn poll_local(&mut self, now: I) -> Option<TypingEmit> {
        if !self.idle.poll(now) {
            return None;
        }
        self.local.take().map(TypingEmit::stop)
    }

    /// Apply a remote typing event.
    ///
    /// Returns `true` if the set for `chat_id` changed. Refreshing an
    /// existing typist only updates its expiry.
    pub fn remote_update(
        &mut self,
        chat_id: &ChatId,
        username: &str,
        is_typing: bool,
        now: I,
    ) -> bool {
        let typists = self.remote.entry(chat_id.clone()).or_default();
        let position = typists.iter().position(|t| t.username == username);

        let changed = match (position, is_typing) {
            (Some(index), true) => {
                typists[index].last_seen = now;
                false
            },
            (None, true) => {
                typists.push(RemoteTypist { username: username.to_string(), last_seen: now });
                true
            },
            (Some(index), false) => {
                typists.remove(index);
                true
            },
            (None, false) => false,
        };

        if typists.is_empty() {
            self.remote.remove(chat_id);
        }
        changed
    }

    /// Drop remote entries older than the TTL.
    ///
    /// Returns the chats whose set changed.
    pub fn expire_remote(&mut self, now: I) -> Vec<ChatId> {
        let ttl = self.config.remote_ttl;
        let mut changed = Vec::new();

        self.remote.retain(|chat_id, typists| {
            let before = typists.len();
            typists.retain(|t| now - t.last_seen < ttl);
            if typists.len() != before {
                tracing::trace!(%chat_id, expired = before - typists.len(), "typing expired");
                changed.push(chat_id.clone());
            }
            !typists.is_empty()
        });

        changed.sort();
        changed
    }

    /// Forget remote typists for a chat.
    pub fn clear_chat(&mut self, chat_id: &ChatId) {
        self.remote.remove(chat_id);
    }

    /// Usernames typing in `chat_id`, in the order they started.
    pub fn typists(&self, chat_id: &ChatId) -> Vec<&str> {
        self.remote
            .get(chat_id)
            .map(|typists| typists.iter().map(|t| t.username.as_str()).collect())
            .unwrap_or_default()
    }

    /// Indicator text for `chat_id`, or `None` when nobody is typing.
    pub fn indicator(&self, chat_id: &ChatId) -> Option<String> {
        let names = self.typists(chat_id);
        let verb = if names.len() == 1 { "is" } else { "are" };
        compose_names(&names).map(|label| format!("{label} {verb} typing..."))
    }
}

/// Join typist names for display.
///
/// `A`, `A and B`, then `A and N others` for three or more.
pub fn compose_names(names: &[&str]) -> Option<String> {
    match names {
        [] => None,
        [only] => Some((*only).to_string()),
        [first, second] => Some(format!("{first} and {second}")),
        [first, rest @ ..] => Some(format!("{first} and {} others", rest.len())),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    fn coordinator() -> TypingCoordinator<Instant> {
        TypingCoordinator::new(TypingConfig::default())
    }

    #[test]
    fn burst_emits_one_start_and_one_stop() {
        let t0 = Instant::now();
        let chat = ChatId::from("c1");
        let mut typing = coordinator();

        let mut emits = Vec::new();
        for ms in [0, 200, 400, 900] {
            emits.extend(typing.keystroke(&chat, t0 + Duration::from_millis(ms)));
        }
        assert_eq!(emits, vec![TypingEmit::start(chat.clone())]);

        assert_eq!(typing.poll_local(t0 + Duration::from_millis(1899)), None);
        assert_eq!(
            typing.poll_local(t0 + Duration::from_millis(1900)),
            Some(TypingEmit::stop(chat))
        );
        assert_eq!(typing.poll_local(t0 + Duration::from_secs(5)), None);
        assert!(!typing.is_typing());
    }

    #[test]
    fn send_always_stops() {
        let t0 = Instant::now();
        let chat = ChatId::from("c1");
        let mut typing = coordinator();

        assert_eq!(typing.message_sent(&chat), vec![TypingEmit::stop(chat.clone())]);

        typing.keystroke(&chat, t0);
        assert_eq!(typing.message_sent(&chat), vec![TypingEmit::stop(chat.clone())]);
        assert_eq!(typing.poll_local(t0 + Duration::from_secs(2)), None);
    }

    #[test]
    fn switching_chats_stops_previous() {
        let t0 = Instant::now();
        let mut typing = coordinator();
        typing.keystroke(&ChatId::from("a"), t0);

        let emits = typing.keystroke(&ChatId::from("b"), t0);
        assert_eq!(emits, vec![
            TypingEmit::stop(ChatId::from("a")),
            TypingEmit::start(ChatId::from("b")),
        ]);
    }

    #[test]
    fn remote_set_has_no_duplicates() {
        let t0 = Instant::now();
        let chat = ChatId::from("c1");
        let mut typing = coordinator();

        assert!(typing.remote_update(&chat, "alice", true, t0));
        assert!(!typing.remote_update(&chat, "alice", true, t0));
        assert!(typing.remote_update(&chat, "bob", true, t0));
        assert_eq!(typing.typists(&chat), vec!["alice", "bob"]);

        assert!(typing.remote_update(&chat, "alice", false, t0));
        assert!(!typing.remote_update(&chat, "alice", false, t0));
        assert_eq!(typing.indicator(&chat).as_deref(), Some("bob is typing..."));
    }

    #[test]
    fn remote_entries_expire_unless_refreshed() {
        let t0 = Instant::now();
        let chat = ChatId::from("c1");
        let mut typing = coordinator();
        typing.remote_update(&chat, "alice", true, t0);
        typing.remote_update(&chat, "bob", true, t0);
        typing.remote_update(&chat, "bob", true, t0 + Duration::from_secs(3));

        let changed = typing.expire_remote(t0 + DEFAULT_REMOTE_TYPING_TTL);
        assert_eq!(changed, vec![chat.clone()]);
        assert_eq!(typing.typists(&chat), vec!["bob"]);

        typing.expire_remote(t0 + Duration::from_secs(8));
        assert_eq!(typing.indicator(&chat), None);
    }

    #[test]
    fn name_composition() {
        assert_eq!(compose_names(&[]), None);
        assert_eq!(compose_names(&["A"]).as_deref(), Some("A"));
        assert_eq!(compose_names(&["A", "B"]).as_deref(), Some("A and B"));
        assert_eq!(compose_names(&["A", "B", "C"]).as_deref(), Some("A and 2 others"));
        assert_eq!(compose_names(&["A", "B", "C", "D"]).as_deref(), Some("A and 3 others"));
    }
}
