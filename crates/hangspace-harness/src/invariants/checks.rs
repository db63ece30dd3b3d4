//! The checks in [`InvariantRegistry::standard`](super::InvariantRegistry::standard).

use std::collections::HashSet;

use hangspace_app::MAX_TOASTS;

use super::{Invariant, InvariantResult, SystemSnapshot, Violation};

/// At most one bundle per sender and kind.
pub struct UniqueBundles;

impl Invariant for UniqueBundles {
    fn name(&self) -> &'static str {
        "unique_bundles"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            let mut seen = HashSet::new();
            for bundle in &client.bundles {
                if !seen.insert(&bundle.key) {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!(
                            "client {}: duplicate bundle {:?}/{}",
                            client.user_id,
                            bundle.key.sender_id,
                            bundle.key.kind.as_str()
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

/// A live bundle always has something unread.
///
/// Bundles whose count reaches zero must be evicted, not kept empty.
pub struct NonEmptyBundles;

impl Invariant for NonEmptyBundles {
    fn name(&self) -> &'static str {
        "non_empty_bundles"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            if let Some(bundle) = client.bundles.iter().find(|bundle| bundle.count == 0) {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "client {}: empty bundle for {}",
                        client.user_id, bundle.key.sender_id
                    ),
                });
            }
        }
        Ok(())
    }
}

/// An optimistic message is never shown twice.
///
/// Each correlation id and each server id appears on at most one entry of
/// the open chat.
pub struct SingleEntryPerMessage;

impl Invariant for SingleEntryPerMessage {
    fn name(&self) -> &'static str {
        "single_entry_per_message"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            let mut local_ids = HashSet::new();
            let mut server_ids = HashSet::new();
            for entry in &client.entries {
                let duplicate_local =
                    entry.local_id.as_ref().is_some_and(|id| !local_ids.insert(id.clone()));
                let duplicate_server =
                    entry.server_id.as_ref().is_some_and(|id| !server_ids.insert(id.clone()));
                if duplicate_local || duplicate_server {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!(
                            "client {}: duplicate entry local={:?} server={:?}",
                            client.user_id, entry.local_id, entry.server_id
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

/// The App shows the chat the client has open.
pub struct ViewFollowsClient;

impl Invariant for ViewFollowsClient {
    fn name(&self) -> &'static str {
        "view_follows_client"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            let Some(view) = &client.view else {
                continue;
            };
            if view.chat != client.active_chat {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "client {}: view shows {:?} but active chat is {:?}",
                        client.user_id, view.chat, client.active_chat
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Toasts never pile up past the cap.
pub struct ToastLimit;

impl Invariant for ToastLimit {
    fn name(&self) -> &'static str {
        "toast_limit"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            if let Some(view) = &client.view
                && view.toasts > MAX_TOASTS
            {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("client {}: {} toasts visible", client.user_id, view.toasts),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use hangspace_core::{BundleKey, LocalId};
    use hangspace_proto::{ChatId, NotificationKind, UserId};

    use super::*;
    use crate::invariants::{BundleSnapshot, ClientSnapshot, EntrySnapshot, ViewSnapshot};

    fn bundle(sender: &str, count: u32) -> BundleSnapshot {
        BundleSnapshot {
            key: BundleKey { sender_id: UserId::from(sender), kind: NotificationKind::NewMessage },
            count,
        }
    }

    fn client() -> ClientSnapshot {
        ClientSnapshot::new(UserId::from("u-me"))
    }

    #[test]
    fn duplicate_bundles_detected() {
        let mut snapshot = client();
        snapshot.bundles = vec![bundle("u1", 1), bundle("u1", 2)];
        assert!(UniqueBundles.check(&SystemSnapshot::single(snapshot)).is_err());
    }

    #[test]
    fn empty_bundle_detected() {
        let mut snapshot = client();
        snapshot.bundles = vec![bundle("u1", 0)];
        assert!(NonEmptyBundles.check(&SystemSnapshot::single(snapshot)).is_err());
    }

    #[test]
    fn duplicate_local_entry_detected() {
        let entry =
            EntrySnapshot { local_id: Some(LocalId::new(7, 1)), server_id: None, confirmed: false };
        let mut snapshot = client();
        snapshot.entries = vec![entry.clone(), entry];
        assert!(SingleEntryPerMessage.check(&SystemSnapshot::single(snapshot)).is_err());
    }

    #[test]
    fn stale_view_detected() {
        let mut snapshot = client();
        snapshot.active_chat = Some(ChatId::from("c2"));
        snapshot.view = Some(ViewSnapshot { chat: Some(ChatId::from("c1")), toasts: 0 });
        assert!(ViewFollowsClient.check(&SystemSnapshot::single(snapshot)).is_err());
    }

    #[test]
    fn toast_overflow_detected() {
        let mut snapshot = client();
        snapshot.view = Some(ViewSnapshot { chat: None, toasts: MAX_TOASTS + 1 });
        assert!(ToastLimit.check(&SystemSnapshot::single(snapshot)).is_err());
    }
}
