//! Notification aggregation.
//!
//! Collapses notification pushes into one bundle per `(sender, kind)` and
//! keeps the global unread counter. Pushes are applied optimistically; the
//! server snapshot (fetched on an interval and after mark-all failures)
//! overwrites local state wholesale.
//!
//! # Invariants
//!
//! - At most one bundle per `(sender, kind)`, each with `count >= 1`
//! - The unread counter never goes below zero; decrements that would
//!   underflow are clamped
//! - Marking the same notification read twice decrements at most once
//! - Reading any notification from a sender evicts all of that sender's
//!   bundles

use std::{
    collections::{HashMap, HashSet},
    time::Duration,
};

use chrono::{DateTime, Utc};
use hangspace_proto::{
    ChatId, NotificationId, NotificationKind, NotificationRecord, UserId,
    inbound::NotificationsData,
};

use crate::{env::MonotonicInstant, timer::Timer};

/// Interval between authoritative snapshot fetches.
pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(30);

/// Notifications requested per snapshot.
pub const DEFAULT_PAGE_LIMIT: u32 = 20;

/// Aggregator configuration
#[derive(Debug, Clone)]
pub struct NotificationConfig {
    /// Time between snapshot fetches
    pub reconcile_interval: Duration,
    /// Page size of each snapshot
    pub page_limit: u32,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self { reconcile_interval: DEFAULT_RECONCILE_INTERVAL, page_limit: DEFAULT_PAGE_LIMIT }
    }
}

/// Bundle identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BundleKey {
    /// Sender the bundle groups by
    pub sender_id: UserId,
    /// Notification category
    pub kind: NotificationKind,
}

/// Unread notifications from one sender, collapsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationBundle {
    /// Sender
    pub sender_id: UserId,
    /// Sender name at the time of the newest push
    pub sender_name: String,
    /// Category
    pub kind: NotificationKind,
    /// Number of collapsed items, always >= 1
    pub count: u32,
    /// Preview of the newest item
    pub latest_message: String,
    /// Time of the newest item
    pub latest_at: DateTime<Utc>,
    /// Chat to open when the bundle is selected
    pub chat_id: Option<ChatId>,
    /// Server id of the newest item, when known
    pub notification_id: Option<NotificationId>,
}

impl NotificationBundle {
    /// Bundle identity.
    pub fn key(&self) -> BundleKey {
        BundleKey { sender_id: self.sender_id.clone(), kind: self.kind.clone() }
    }

    /// One-line summary for the notification list.
    pub fn summary(&self) -> String {
        match (&self.kind, self.count) {
            (NotificationKind::NewMessage, 1) => {
                format!("{}: {}", self.sender_name, self.latest_message)
            },
            (NotificationKind::NewMessage, n) => {
                format!("{} sent you {} messages", self.sender_name, n)
            },
            (NotificationKind::FriendRequest, _) => {
                format!("{} sent you a friend request", self.sender_name)
            },
            (NotificationKind::FriendRequestAccepted, _) => {
                format!("{} accepted your friend request", self.sender_name)
            },
            (NotificationKind::Other(_), _) => self.latest_message.clone(),
        }
    }
}

/// Who a push came from, as resolved by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushSender {
    /// System notification without a sender. Counts, never bundles.
    Anonymous,
    /// Sender with a known name.
    Known {
        /// Sender id
        id: UserId,
        /// Name to show
        name: String,
    },
    /// Sender id we cannot name. Counts, but the bundle is dropped.
    Unresolved(UserId),
}

/// A live notification push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Push {
    /// Origin
    pub sender: PushSender,
    /// Category
    pub kind: NotificationKind,
    /// Preview text
    pub message: String,
    /// Related chat
    pub chat_id: Option<ChatId>,
    /// Authoritative collapsed count, when the server sends one
    pub count: Option<u32>,
    /// Server id, when the push carries one
    pub notification_id: Option<NotificationId>,
    /// Arrival time
    pub at: DateTime<Utc>,
}

/// Result of ingesting a push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// Bundle created or updated
    Bundled {
        /// Affected bundle
        key: BundleKey,
        /// Its count after the push
        count: u32,
    },
    /// Counter incremented, no bundle
    CounterOnly,
    /// Counter incremented, bundle dropped because the sender is unknown
    UnknownSender,
}

#[derive(Debug, Clone)]
struct Snapshot {
    bundles: HashMap<BundleKey, NotificationBundle>,
    unread: u64,
}

/// Per-sender notification bundles and the global unread counter.
#[derive(Debug, Clone)]
pub struct NotificationAggregator<I> {
    config: NotificationConfig,
    bundles: HashMap<BundleKey, NotificationBundle>,
    unread: u64,
    read_ids: HashSet<NotificationId>,
    /// State before an unconfirmed mark-all, restored on failure.
    pending_mark_all: Option<Snapshot>,
    reconcile: Timer<I>,
}

impl<I: MonotonicInstant> NotificationAggregator<I> {
    /// Create an empty aggregator. The reconcile timer starts disarmed.
    pub fn new(config: NotificationConfig) -> Self {
        let reconcile = Timer::new(config.reconcile_interval);
        Self {
            config,
            bundles: HashMap::new(),
            unread: 0,
            read_ids: HashSet::new(),
            pending_mark_all: None,
            reconcile,
        }
    }

    /// Active configuration
    #[must_use]
    pub fn config(&self) -> &NotificationConfig {
        &self.config
    }

    /// Global unread counter.
    #[must_use]
    pub fn unread_count(&self) -> u64 {
        self.unread
    }

    /// Bundles, newest first.
    pub fn bundles(&self) -> Vec<&NotificationBundle> {
        let mut bundles: Vec<&NotificationBundle> = self.bundles.values().collect();
        bundles.sort_by(|a, b| {
            b.latest_at.cmp(&a.latest_at).then_with(|| a.sender_id.cmp(&b.sender_id))
        });
        bundles
    }

    /// Look up one bundle.
    #[must_use]
    pub fn bundle(&self, key: &BundleKey) -> Option<&NotificationBundle> {
        self.bundles.get(key)
    }

    /// Number of bundles.
    #[must_use]
    pub fn bundle_count(&self) -> usize {
        self.bundles.len()
    }

    /// Whether a mark-all is awaiting confirmation.
    #[must_use]
    pub fn has_pending_mark_all(&self) -> bool {
        self.pending_mark_all.is_some()
    }

    /// Start periodic reconciliation.
    pub fn start(&mut self, now: I) {
        self.reconcile.arm(now);
    }

    /// Stop periodic reconciliation.
    pub fn stop(&mut self) {
        self.reconcile.cancel();
    }

    /// Returns `true` when a snapshot fetch is due. Re-arms itself.
    pub fn tick(&mut self, now: I) -> bool {
        if self.reconcile.poll(now) {
            self.reconcile.arm(now);
            return true;
        }
        false
    }

    /// Apply a live push.
    ///
    /// The counter always increments. A bundle is created or updated only
    /// when the sender is known; the server's collapsed count wins over local
    /// incrementing when present.
    pub fn ingest(&mut self, push: Push) -> PushOutcome {
        self.unread = self.unread.saturating_add(1);

        let (sender_id, sender_name) = match push.sender {
            PushSender::Anonymous => return PushOutcome::CounterOnly,
            PushSender::Unresolved(id) => {
                tracing::warn!(sender = %id, kind = push.kind.as_str(), "push from unknown sender");
                return PushOutcome::UnknownSender;
            },
            PushSender::Known { id, name } => (id, name),
        };

        let key = BundleKey { sender_id: sender_id.clone(), kind: push.kind.clone() };
        let bundle = self.bundles.entry(key.clone()).or_insert_with(|| NotificationBundle {
            sender_id,
            sender_name: sender_name.clone(),
            kind: push.kind,
            count: 0,
            latest_message: String::new(),
            latest_at: push.at,
            chat_id: None,
            notification_id: None,
        });

        bundle.count = match push.count {
            Some(count) => count.max(1),
            None => bundle.count.saturating_add(1),
        };
        bundle.sender_name = sender_name;
        bundle.latest_message = push.message;
        bundle.latest_at = bundle.latest_at.max(push.at);
        if push.chat_id.is_some() {
            bundle.chat_id = push.chat_id;
        }
        if push.notification_id.is_some() {
            bundle.notification_id = push.notification_id;
        }

        PushOutcome::Bundled { key, count: bundle.count }
    }

    /// Mark one notification read.
    ///
    /// Decrements the counter once per notification id (clamped at zero) and
    /// evicts every bundle from `sender_id`. Without a sender, only the bundle
    /// whose newest item is `notification_id` is evicted.
    ///
    /// Returns whether the counter was decremented.
    pub fn mark_read(
        &mut self,
        notification_id: &NotificationId,
        sender_id: Option<&UserId>,
    ) -> bool {
        match sender_id {
            Some(sender) => {
                self.evict_sender(sender);
            },
            None => self
                .bundles
                .retain(|_, bundle| bundle.notification_id.as_ref() != Some(notification_id)),
        }

        if !self.read_ids.insert(notification_id.clone()) {
            tracing::debug!(%notification_id, "already marked read");
            return false;
        }
        self.decrement(1);
        true
    }

    /// Evict every bundle from `sender_id`. Returns how many were removed.
    pub fn evict_sender(&mut self, sender_id: &UserId) -> usize {
        let before = self.bundles.len();
        self.bundles.retain(|key, _| &key.sender_id != sender_id);
        before - self.bundles.len()
    }

    /// Optimistically clear everything.
    ///
    /// The previous state is kept until [`confirm_mark_all`] or
    /// [`rollback_mark_all`].
    ///
    /// [`confirm_mark_all`]: Self::confirm_mark_all
    /// [`rollback_mark_all`]: Self::rollback_mark_all
    pub fn mark_all_read(&mut self) {
        let current = Snapshot { bundles: std::mem::take(&mut self.bundles), unread: self.unread };
        self.unread = 0;

        self.pending_mark_all = Some(match self.pending_mark_all.take() {
            Some(earlier) => merge(earlier, current),
            None => current,
        });
    }

    /// Server confirmed the mark-all. Discards the saved state.
    pub fn confirm_mark_all(&mut self) {
        self.pending_mark_all = None;
    }

    /// Server rejected the mark-all. Restores the saved state, merged with
    /// anything that arrived since.
    ///
    /// Returns `false` if no mark-all was pending.
    pub fn rollback_mark_all(&mut self) -> bool {
        let Some(saved) = self.pending_mark_all.take() else {
            return false;
        };
        let since = Snapshot { bundles: std::mem::take(&mut self.bundles), unread: self.unread };
        let restored = merge(saved, since);
        self.bundles = restored.bundles;
        self.unread = restored.unread;
        true
    }

    /// Overwrite the counter with the server's value.
    pub fn set_unread_count(&mut self, count: u64) {
        if count != self.unread {
            tracing::debug!(local = self.unread, server = count, "unread count corrected");
        }
        self.unread = count;
    }

    /// Apply a per-sender unread message count.
    ///
    /// Zero evicts the sender's message bundle; otherwise an existing bundle
    /// takes the count.
    pub fn set_sender_count(&mut self, sender_id: &UserId, count: u32) {
        let key = BundleKey { sender_id: sender_id.clone(), kind: NotificationKind::NewMessage };
        if count == 0 {
            self.bundles.remove(&key);
        } else if let Some(bundle) = self.bundles.get_mut(&key) {
            bundle.count = count;
        }
    }

    /// Replace all state with the server snapshot.
    ///
    /// Unread records with a sender are grouped into bundles (records arrive
    /// newest first). Any pending mark-all is discarded. `resolve` supplies
    /// names for senders the snapshot does not name.
    pub fn reconcile(
        &mut self,
        snapshot: &NotificationsData,
        now: I,
        fallback_at: DateTime<Utc>,
        resolve: impl Fn(&UserId) -> Option<String>,
    ) {
        let mut bundles: HashMap<BundleKey, NotificationBundle> = HashMap::new();
        self.read_ids.clear();

        for record in &snapshot.notifications {
            if record.is_read {
                self.read_ids.insert(record.id.clone());
                continue;
            }
            let Some(sender_id) = record.data.sender_id.clone() else {
                continue;
            };

            let key = BundleKey { sender_id: sender_id.clone(), kind: record.kind.clone() };
            let items = record.data.message_count.unwrap_or(1).max(1);
            let at = record.data.latest_timestamp.or(record.created_at).unwrap_or(fallback_at);

            match bundles.get_mut(&key) {
                Some(bundle) => {
                    bundle.count = bundle.count.saturating_add(items);
                    if at > bundle.latest_at {
                        apply_record(bundle, record, at);
                    }
                },
                None => {
                    let sender_name = record
                        .data
                        .sender_username
                        .clone()
                        .or_else(|| resolve(&sender_id))
                        .unwrap_or_else(|| sender_id.to_string());
                    let mut bundle = NotificationBundle {
                        sender_id,
                        sender_name,
                        kind: record.kind.clone(),
                        count: items,
                        latest_message: String::new(),
                        latest_at: at,
                        chat_id: None,
                        notification_id: None,
                    };
                    apply_record(&mut bundle, record, at);
                    bundles.insert(key, bundle);
                },
            }
        }

        tracing::debug!(
            bundles = bundles.len(),
            unread = snapshot.unread_count,
            "notifications reconciled"
        );
        self.bundles = bundles;
        self.unread = snapshot.unread_count;
        self.pending_mark_all = None;
        self.reconcile.arm(now);
    }

    fn decrement(&mut self, by: u64) {
        if self.unread < by {
            tracing::debug!(unread = self.unread, by, "clamping unread counter at zero");
        }
        self.unread = self.unread.saturating_sub(by);
    }
}

fn apply_record(bundle: &mut NotificationBundle, record: &NotificationRecord, at: DateTime<Utc>) {
    bundle.latest_message =
        record.data.latest_content.clone().unwrap_or_else(|| record.message.clone());
    bundle.latest_at = at;
    bundle.chat_id = record.data.chat_id.clone();
    bundle.notification_id = Some(record.id.clone());
}

fn merge(older: Snapshot, newer: Snapshot) -> Snapshot {
    let mut bundles = older.bundles;
    for (key, incoming) in newer.bundles {
        match bundles.get_mut(&key) {
            Some(existing) => {
                existing.count = existing.count.saturating_add(incoming.count);
                if incoming.latest_at >= existing.latest_at {
                    let count = existing.count;
                    *existing = NotificationBundle { count, ..incoming };
                }
            },
            None => {
                bundles.insert(key, incoming);
            },
        }
    }
    Snapshot { bundles, unread: older.unread.saturating_add(newer.unread) }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Instant;

    use chrono::TimeZone;
    use hangspace_proto::NotificationData;

    use super::*;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 12, minute, 0).single().unwrap()
    }

    fn push_from(sender: &str, message: &str, minute: u32) -> Push {
        Push {
            sender: PushSender::Known { id: UserId::from(sender), name: sender.to_string() },
            kind: NotificationKind::NewMessage,
            message: message.to_string(),
            chat_id: Some(ChatId::from("c1")),
            count: None,
            notification_id: None,
            at: at(minute),
        }
    }

    fn aggregator() -> NotificationAggregator<Instant> {
        NotificationAggregator::new(NotificationConfig::default())
    }

    fn message_key(sender: &str) -> BundleKey {
        BundleKey { sender_id: UserId::from(sender), kind: NotificationKind::NewMessage }
    }

    #[test]
    fn pushes_from_same_sender_collapse() {
        let mut agg = aggregator();
        agg.ingest(push_from("alice", "hi", 1));
        agg.ingest(push_from("alice", "hi again", 2));
        let outcome = agg.ingest(push_from("alice", "hello?", 3));

        assert_eq!(outcome, PushOutcome::Bundled { key: message_key("alice"), count: 3 });
        assert_eq!(agg.bundle_count(), 1);
        assert_eq!(agg.unread_count(), 3);

        let bundle = agg.bundle(&message_key("alice")).unwrap();
        assert_eq!(bundle.latest_message, "hello?");
        assert_eq!(bundle.latest_at, at(3));
        assert_eq!(bundle.summary(), "alice sent you 3 messages");
    }

    #[test]
    fn server_count_is_authoritative() {
        let mut agg = aggregator();
        agg.ingest(push_from("alice", "hi", 1));
        agg.ingest(Push { count: Some(7), ..push_from("alice", "hey", 2) });

        assert_eq!(agg.bundle(&message_key("alice")).unwrap().count, 7);
    }

    #[test]
    fn unknown_sender_counts_without_bundle() {
        let mut agg = aggregator();
        let outcome = agg.ingest(Push {
            sender: PushSender::Unresolved(UserId::from("ghost")),
            ..push_from("x", "boo", 1)
        });

        assert_eq!(outcome, PushOutcome::UnknownSender);
        assert_eq!(agg.unread_count(), 1);
        assert_eq!(agg.bundle_count(), 0);
    }

    #[test]
    fn mark_read_is_idempotent_and_clamped() {
        let mut agg = aggregator();
        agg.ingest(push_from("alice", "hi", 1));
        let id = NotificationId::from("n1");

        assert!(agg.mark_read(&id, Some(&UserId::from("alice"))));
        assert!(!agg.mark_read(&id, Some(&UserId::from("alice"))));
        assert_eq!(agg.unread_count(), 0);
        assert_eq!(agg.bundle_count(), 0);

        assert!(agg.mark_read(&NotificationId::from("n2"), None));
        assert_eq!(agg.unread_count(), 0);
    }

    #[test]
    fn reading_one_evicts_all_of_sender() {
        let mut agg = aggregator();
        agg.ingest(push_from("alice", "hi", 1));
        agg.ingest(Push { kind: NotificationKind::FriendRequest, ..push_from("alice", "", 2) });
        agg.ingest(push_from("bob", "yo", 3));

        agg.mark_read(&NotificationId::from("n1"), Some(&UserId::from("alice")));

        let senders: Vec<&str> = agg.bundles().iter().map(|b| b.sender_id.as_str()).collect();
        assert_eq!(senders, vec!["bob"]);
    }

    #[test]
    fn mark_all_rollback_restores_and_keeps_new_pushes() {
        let mut agg = aggregator();
        agg.ingest(push_from("alice", "hi", 1));
        agg.ingest(push_from("bob", "yo", 2));

        agg.mark_all_read();
        assert_eq!(agg.unread_count(), 0);
        assert_eq!(agg.bundle_count(), 0);

        agg.ingest(push_from("alice", "again", 3));
        assert!(agg.rollback_mark_all());

        assert_eq!(agg.unread_count(), 3);
        let alice = agg.bundle(&message_key("alice")).unwrap();
        assert_eq!(alice.count, 2);
        assert_eq!(alice.latest_message, "again");
        assert!(agg.bundle(&message_key("bob")).is_some());
    }

    #[test]
    fn mark_all_confirm_discards_snapshot() {
        let mut agg = aggregator();
        agg.ingest(push_from("alice", "hi", 1));
        agg.mark_all_read();
        agg.confirm_mark_all();

        assert!(!agg.rollback_mark_all());
        assert_eq!(agg.unread_count(), 0);
    }

    #[test]
    fn reconcile_overwrites_local_state() {
        let t0 = Instant::now();
        let mut agg = aggregator();
        agg.ingest(push_from("alice", "hi", 1));
        agg.mark_all_read();

        let record = |id: &str, sender: &str, minute: u32, is_read: bool| NotificationRecord {
            id: NotificationId::from(id),
            kind: NotificationKind::NewMessage,
            message: format!("{sender}: msg {id}"),
            data: NotificationData {
                sender_id: Some(UserId::from(sender)),
                latest_content: Some(format!("msg {id}")),
                ..NotificationData::default()
            },
            is_read,
            created_at: Some(at(minute)),
        };
        let snapshot = NotificationsData {
            notifications: vec![
                record("n3", "bob", 3, false),
                record("n2", "bob", 2, false),
                record("n1", "carol", 1, true),
            ],
            unread_count: 2,
        };

        agg.reconcile(&snapshot, t0, at(0), |_| None);

        assert!(!agg.has_pending_mark_all());
        assert_eq!(agg.unread_count(), 2);
        let bundles = agg.bundles();
        assert_eq!(bundles.len(), 1);
        assert_eq!(bundles[0].count, 2);
        assert_eq!(bundles[0].latest_message, "msg n3");
        assert_eq!(bundles[0].sender_name, "bob");

        assert!(!agg.mark_read(&NotificationId::from("n1"), None));
    }

    #[test]
    fn sender_count_zero_evicts() {
        let mut agg = aggregator();
        agg.ingest(push_from("alice", "hi", 1));
        agg.set_sender_count(&UserId::from("alice"), 4);
        assert_eq!(agg.bundle(&message_key("alice")).unwrap().count, 4);

        agg.set_sender_count(&UserId::from("alice"), 0);
        assert_eq!(agg.bundle_count(), 0);
    }

    #[test]
    fn reconcile_timer_rearms() {
        let t0 = Instant::now();
        let mut agg = aggregator();
        agg.start(t0);

        assert!(!agg.tick(t0 + Duration::from_secs(29)));
        assert!(agg.tick(t0 + DEFAULT_RECONCILE_INTERVAL));
        assert!(!agg.tick(t0 + DEFAULT_RECONCILE_INTERVAL));
        assert!(agg.tick(t0 + DEFAULT_RECONCILE_INTERVAL * 2));

        agg.stop();
        assert!(!agg.tick(t0 + DEFAULT_RECONCILE_INTERVAL * 4));
    }
}
