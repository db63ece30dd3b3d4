//! Message stream reconciliation.
//!
//! One [`MessageStream`] per open chat. Local sends appear immediately as
//! pending entries keyed by a [`LocalId`]; acknowledgements and server echoes
//! then confirm them in place. Remote messages are appended in arrival order
//! and never reordered.
//!
//! # Invariants
//!
//! - At most one entry per server message id
//! - An echo of our own message replaces at most one unconfirmed local entry
//! - Retrying a failed entry reuses it; it never creates a second one
//! - Stored history is placed ahead of live entries, deduplicated by server id
//! - Each message from someone else is reported read at most once

use std::{collections::BTreeSet, fmt};

use chrono::{DateTime, FixedOffset, Utc};
use hangspace_proto::{ChatId, ChatMessage, MessageId, MessageKind, StoredMessage, UserId};

use crate::{error::ValidationError, format::format_timestamp};

/// Prefix of every locally generated message id.
pub const LOCAL_ID_PREFIX: &str = "temp-";

/// Client-generated id of an optimistic message.
///
/// Sent to the server as `client_msg_id`; servers that support it echo it
/// back on the stored message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalId(String);

impl LocalId {
    /// Build `temp-<session>-<sequence>`.
    pub fn new(session: u64, sequence: u64) -> Self {
        Self(format!("{LOCAL_ID_PREFIX}{session:016x}-{sequence}"))
    }

    /// Wrap an existing id string.
    pub fn parse(raw: &str) -> Option<Self> {
        raw.starts_with(LOCAL_ID_PREFIX).then(|| Self(raw.to_string()))
    }

    /// Raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Delivery progress of an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryState {
    /// Sent, awaiting acknowledgement or echo
    Pending,
    /// Stored by the server
    Confirmed,
    /// Read by a recipient
    Read,
    /// Server rejected it or the acknowledgement never came
    Failed {
        /// Shown next to the entry
        reason: String,
    },
}

impl DeliveryState {
    /// Whether the server has stored the message.
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Read)
    }
}

/// Whether an entry is a chat message or a system line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    /// Message with a content type
    Message(MessageKind),
    /// Join/leave and similar lines, view-only
    System,
}

/// One line of the chat stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    /// Local id, for entries we sent from this session
    pub local_id: Option<LocalId>,
    /// Server id, once known
    pub server_id: Option<MessageId>,
    /// Author, `None` for system lines
    pub sender_id: Option<UserId>,
    /// Author name as shown
    pub sender_name: String,
    /// Body
    pub content: String,
    /// Message or system line
    pub kind: EntryKind,
    /// Server timestamp, or local send time until confirmed
    pub sent_at: DateTime<Utc>,
    /// Delivery progress
    pub state: DeliveryState,
    /// Whether we authored it
    pub own: bool,
    /// Whether it was edited after sending
    pub edited: bool,
}

impl StreamEntry {
    /// Local entry without a server id yet.
    pub fn is_unconfirmed_local(&self) -> bool {
        self.local_id.is_some() && self.server_id.is_none()
    }
}

/// Outcome of [`MessageStream::ingest_remote`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingested {
    /// Added at the end
    Appended,
    /// Replaced one of our unconfirmed entries in place
    ReplacedLocal,
    /// Already present, ignored
    Duplicate,
}

/// A rendered stream line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEntry {
    /// "You" for own messages, else the sender name; empty for system lines
    pub author: String,
    /// Body
    pub text: String,
    /// Formatted timestamp
    pub time: String,
    /// Delivery progress
    pub state: DeliveryState,
    /// Whether this is a system line
    pub system: bool,
}

/// Ordered messages of one chat.
#[derive(Debug, Clone)]
pub struct MessageStream {
    chat_id: ChatId,
    own_id: UserId,
    own_name: String,
    entries: Vec<StreamEntry>,
    receipts_sent: BTreeSet<MessageId>,
}

impl MessageStream {
    /// Empty stream for `chat_id`, viewed by `own_id`.
    pub fn new(chat_id: ChatId, own_id: UserId, own_name: impl Into<String>) -> Self {
        Self {
            chat_id,
            own_id,
            own_name: own_name.into(),
            entries: Vec::new(),
            receipts_sent: BTreeSet::new(),
        }
    }

    /// Chat this stream belongs to.
    pub fn chat_id(&self) -> &ChatId {
        &self.chat_id
    }

    /// All entries in display order.
    pub fn entries(&self) -> &[StreamEntry] {
        &self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the stream is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries awaiting acknowledgement.
    pub fn pending_count(&self) -> usize {
        self.entries.iter().filter(|e| e.state == DeliveryState::Pending).count()
    }

    /// Find by local id.
    pub fn get_local(&self, local_id: &LocalId) -> Option<&StreamEntry> {
        self.entries.iter().find(|e| e.local_id.as_ref() == Some(local_id))
    }

    /// Find by server id.
    pub fn get(&self, server_id: &MessageId) -> Option<&StreamEntry> {
        self.entries.iter().find(|e| e.server_id.as_ref() == Some(server_id))
    }

    /// Append an optimistic entry for a local send.
    ///
    /// # Errors
    ///
    /// - `ValidationError::EmptyMessage` if `content` is blank
    pub fn send_local(
        &mut self,
        local_id: LocalId,
        content: &str,
        kind: MessageKind,
        at: DateTime<Utc>,
    ) -> Result<&StreamEntry, ValidationError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ValidationError::EmptyMessage);
        }

        self.entries.push(StreamEntry {
            local_id: Some(local_id),
            server_id: None,
            sender_id: Some(self.own_id.clone()),
            sender_name: self.own_name.clone(),
            content: content.to_string(),
            kind: EntryKind::Message(kind),
            sent_at: at,
            state: DeliveryState::Pending,
            own: true,
            edited: false,
        });

        let index = self.entries.len() - 1;
        Ok(&self.entries[index])
    }

    /// Acknowledgement succeeded.
    ///
    /// Marks the entry confirmed and records the server id when the
    /// acknowledgement carries one. Returns `false` if nothing changed.
    pub fn confirm(&mut self, local_id: &LocalId, server_id: Option<MessageId>) -> bool {
        let known = server_id.as_ref().is_some_and(|id| self.get(id).is_some());
        let Some(entry) = self.local_mut(local_id) else {
            tracing::debug!(%local_id, "ack for unknown local message");
            return false;
        };

        let mut changed = false;
        if !entry.state.is_confirmed() {
            entry.state = DeliveryState::Confirmed;
            changed = true;
        }
        if entry.server_id.is_none()
            && !known
            && let Some(id) = server_id
        {
            entry.server_id = Some(id);
            changed = true;
        }
        changed
    }

    /// Acknowledgement failed or timed out.
    ///
    /// Only a pending entry can fail; one already confirmed by its echo stays
    /// confirmed. Never resends.
    pub fn fail(&mut self, local_id: &LocalId, reason: &str) -> bool {
        match self.local_mut(local_id) {
            Some(entry) if entry.state == DeliveryState::Pending => {
                entry.state = DeliveryState::Failed { reason: reason.to_string() };
                true
            },
            _ => false,
        }
    }

    /// Mark the newest pending local entry failed.
    ///
    /// Used for `message_error`, which does not say which send it refers to.
    pub fn fail_latest_pending(&mut self, reason: &str) -> Option<LocalId> {
        let entry = self
            .entries
            .iter_mut()
            .rev()
            .find(|e| e.own && e.state == DeliveryState::Pending)?;
        entry.state = DeliveryState::Failed { reason: reason.to_string() };
        entry.local_id.clone()
    }

    /// Put a failed entry back to pending for a resend.
    ///
    /// Returns the content and kind to send again.
    ///
    /// # Errors
    ///
    /// - `ValidationError::UnknownMessage` unless the entry exists and failed
    pub fn retry(
        &mut self,
        local_id: &LocalId,
        at: DateTime<Utc>,
    ) -> Result<(String, MessageKind), ValidationError> {
        let Some(entry) = self.local_mut(local_id) else {
            return Err(ValidationError::UnknownMessage(local_id.to_string()));
        };
        if !matches!(entry.state, DeliveryState::Failed { .. }) {
            return Err(ValidationError::UnknownMessage(local_id.to_string()));
        }

        entry.state = DeliveryState::Pending;
        entry.sent_at = at;
        let kind = match &entry.kind {
            EntryKind::Message(kind) => kind.clone(),
            EntryKind::System => MessageKind::Text,
        };
        Ok((entry.content.clone(), kind))
    }

    /// Apply a message pushed by the server.
    ///
    /// Our own echo replaces the entry whose local id matches
    /// `client_msg_id`; without one it replaces the newest unconfirmed local
    /// entry with identical content. Everything else is appended.
    pub fn ingest_remote(
        &mut self,
        message: &ChatMessage,
        fallback_at: DateTime<Utc>,
    ) -> Ingested {
        if self.get(&message.message_id).is_some() {
            return Ingested::Duplicate;
        }

        let own = message.sender_id == self.own_id;
        let at = message.timestamp.unwrap_or(fallback_at);

        if own && let Some(index) = self.find_local_match(message) {
            let entry = &mut self.entries[index];
            entry.server_id = Some(message.message_id.clone());
            entry.sent_at = at;
            entry.content.clone_from(&message.content);
            if !entry.state.is_confirmed() {
                entry.state = DeliveryState::Confirmed;
            }
            return Ingested::ReplacedLocal;
        }

        self.entries.push(StreamEntry {
            local_id: None,
            server_id: Some(message.message_id.clone()),
            sender_id: Some(message.sender_id.clone()),
            sender_name: message.sender_username.clone(),
            content: message.content.clone(),
            kind: EntryKind::Message(message.kind.clone()),
            sent_at: at,
            state: DeliveryState::Confirmed,
            own,
            edited: false,
        });
        Ingested::Appended
    }

    /// Merge stored history, oldest first, ahead of the live entries.
    ///
    /// Messages already in the stream and deleted ones are skipped. Authors
    /// without a name in the record are looked up with `resolve_name`, then
    /// fall back to their id. Returns how many entries were added.
    pub fn load_history(
        &mut self,
        history: &[StoredMessage],
        fallback_at: DateTime<Utc>,
        resolve_name: impl Fn(&UserId) -> Option<String>,
    ) -> usize {
        let mut older: Vec<StreamEntry> = Vec::new();

        for message in history {
            let id = &message.message_id;
            let seen = self.get(id).is_some()
                || older.iter().any(|entry| entry.server_id.as_ref() == Some(id));
            if message.is_deleted || seen {
                continue;
            }

            let own = message.sender_id == self.own_id;
            if message.read_by.contains(&self.own_id) {
                self.receipts_sent.insert(id.clone());
            }
            let read_by_other = message.read_by.iter().any(|reader| *reader != self.own_id);
            let sender_name = if own {
                self.own_name.clone()
            } else {
                message
                    .sender_username
                    .clone()
                    .or_else(|| resolve_name(&message.sender_id))
                    .unwrap_or_else(|| message.sender_id.to_string())
            };

            older.push(StreamEntry {
                local_id: None,
                server_id: Some(id.clone()),
                sender_id: Some(message.sender_id.clone()),
                sender_name,
                content: message.content.clone(),
                kind: EntryKind::Message(message.kind.clone()),
                sent_at: message.timestamp.unwrap_or(fallback_at),
                state: if own && read_by_other {
                    DeliveryState::Read
                } else {
                    DeliveryState::Confirmed
                },
                own,
                edited: message.is_edited,
            });
        }

        let added = older.len();
        older.append(&mut self.entries);
        self.entries = older;
        added
    }

    /// Server ids of messages from others that have not been reported read.
    ///
    /// Each id is returned once per stream.
    pub fn take_read_receipts(&mut self) -> Vec<MessageId> {
        let mut out = Vec::new();
        for entry in &self.entries {
            if entry.own || entry.kind == EntryKind::System {
                continue;
            }
            if let Some(id) = &entry.server_id
                && self.receipts_sent.insert(id.clone())
            {
                out.push(id.clone());
            }
        }
        out
    }

    /// Newest own message the server has stored.
    pub fn newest_own_stored(&self) -> Option<&MessageId> {
        self.entries
            .iter()
            .rev()
            .filter(|entry| entry.own && entry.state.is_confirmed())
            .find_map(|entry| entry.server_id.as_ref())
    }

    /// Replace the body of a stored message.
    pub fn apply_edit(&mut self, server_id: &MessageId, content: &str) -> bool {
        match self.entries.iter_mut().find(|e| e.server_id.as_ref() == Some(server_id)) {
            Some(entry) => {
                entry.content = content.to_string();
                entry.edited = true;
                true
            },
            None => false,
        }
    }

    /// Remove a stored message.
    pub fn remove(&mut self, server_id: &MessageId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.server_id.as_ref() != Some(server_id));
        self.entries.len() != before
    }

    /// Apply a read receipt for one of our messages.
    pub fn mark_read(&mut self, server_id: &MessageId) -> bool {
        match self.entries.iter_mut().find(|e| e.server_id.as_ref() == Some(server_id)) {
            Some(entry) if entry.own && entry.state == DeliveryState::Confirmed => {
                entry.state = DeliveryState::Read;
                true
            },
            _ => false,
        }
    }

    /// Append a view-only system line.
    pub fn push_system(&mut self, text: impl Into<String>, at: DateTime<Utc>) {
        self.entries.push(StreamEntry {
            local_id: None,
            server_id: None,
            sender_id: None,
            sender_name: String::new(),
            content: text.into(),
            kind: EntryKind::System,
            sent_at: at,
            state: DeliveryState::Confirmed,
            own: false,
            edited: false,
        });
    }

    /// Render for display at `now` in the viewer's timezone.
    pub fn render(&self, now: DateTime<Utc>, offset: FixedOffset) -> Vec<RenderedEntry> {
        self.entries
            .iter()
            .map(|entry| {
                let system = entry.kind == EntryKind::System;
                let author = match (system, entry.own) {
                    (true, _) => String::new(),
                    (false, true) => "You".to_string(),
                    (false, false) => entry.sender_name.clone(),
                };
                let text = if entry.edited {
                    format!("{} (edited)", entry.content)
                } else {
                    entry.content.clone()
                };
                RenderedEntry {
                    author,
                    text,
                    time: format_timestamp(entry.sent_at, now, offset),
                    state: entry.state.clone(),
                    system,
                }
            })
            .collect()
    }

    fn local_mut(&mut self, local_id: &LocalId) -> Option<&mut StreamEntry> {
        self.entries.iter_mut().find(|e| e.local_id.as_ref() == Some(local_id))
    }

    fn find_local_match(&self, message: &ChatMessage) -> Option<usize> {
        if let Some(local_id) = message.client_msg_id.as_deref().and_then(LocalId::parse) {
            let exact = self
                .entries
                .iter()
                .position(|e| e.local_id.as_ref() == Some(&local_id) && e.server_id.is_none());
            if exact.is_some() {
                return exact;
            }
        }

        self.entries
            .iter()
            .rposition(|e| e.is_unconfirmed_local() && e.content == message.content)
    }
}
