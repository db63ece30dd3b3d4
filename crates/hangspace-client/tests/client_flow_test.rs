//! End-to-end client flows driven through `Client::handle`.
//!
//! These exercise the wiring between components that the per-component unit
//! tests cannot see: reconnect rejoins the open chat, pushes resolve senders
//! through the roster, API responses land in the right component.

use std::time::Duration;

use chrono::{Offset, Utc};
use hangspace_client::{
    Client, ClientAction, ClientConfig, ClientEvent, ClientIdentity, Environment, RequestId,
    ToastLevel, ViewChange,
};
use hangspace_core::{ChannelState, DropReason, env::test_utils::MockEnv};
use hangspace_proto::{
    ApiRequest, ChatId, ChatMessage, Frame, InboundEvent, MessageKind, Presence, UserId,
    inbound::{
        BadgeUpdated, FriendRequestReceived, InitialStatuses, Membership, NewMessageNotification,
        NotificationsCleared, StatusEntry, UserRef,
    },
};
use serde_json::json;

fn connected_client() -> (MockEnv, Client<MockEnv>) {
    let env = MockEnv::new();
    let mut client =
        Client::new(env.clone(), ClientIdentity::new("u-me", "me"), ClientConfig::default());
    client.handle(ClientEvent::Connect).expect("connect");
    client.handle(ClientEvent::ChannelOpened).expect("opened");
    (env, client)
}

fn deliver(client: &mut Client<MockEnv>, event: InboundEvent) -> Vec<ClientAction> {
    let frame = event.into_frame().expect("encode inbound");
    client.handle(ClientEvent::FrameReceived(frame)).expect("frame")
}

fn frames(actions: &[ClientAction]) -> Vec<Frame> {
    actions
        .iter()
        .filter_map(|a| match a {
            ClientAction::Send(frame) => Some(frame.clone()),
            _ => None,
        })
        .collect()
}

fn requests(actions: &[ClientAction]) -> Vec<(RequestId, ApiRequest)> {
    actions
        .iter()
        .filter_map(|a| match a {
            ClientAction::Request { id, request } => Some((*id, request.clone())),
            _ => None,
        })
        .collect()
}

#[test]
fn network_drop_reconnects_and_rejoins_open_chat() {
    let (env, mut client) = connected_client();
    client.handle(ClientEvent::OpenChat { chat_id: ChatId::from("c1") }).expect("open");

    let actions = client
        .handle(ClientEvent::ChannelDropped(DropReason::Network("reset".into())))
        .expect("drop");
    assert!(actions.contains(&ClientAction::Render(ViewChange::Connection)));
    assert_eq!(client.state(), ChannelState::Reconnecting);
    assert_eq!(client.status_text(), "Reconnecting (1/5)...");

    env.advance(Duration::from_secs(1));
    let actions = client.handle(ClientEvent::Tick { now: env.now() }).expect("tick");
    assert!(actions.contains(&ClientAction::OpenChannel { attempt: 1 }));

    let actions = client.handle(ClientEvent::ChannelOpened).expect("reopened");
    let events: Vec<String> = frames(&actions).into_iter().map(|f| f.event).collect();
    assert_eq!(events, vec!["join_chat", "request_initial_statuses"]);
    assert_eq!(client.status_text(), "Connected");
}

#[test]
fn exhausted_reconnects_fail_until_retry() {
    let (env, mut client) = connected_client();
    client
        .handle(ClientEvent::ChannelDropped(DropReason::Network("reset".into())))
        .expect("drop");

    for attempt in 1..=5 {
        env.advance(Duration::from_secs(5));
        let actions = client.handle(ClientEvent::Tick { now: env.now() }).expect("tick");
        assert!(actions.contains(&ClientAction::OpenChannel { attempt }));
        client
            .handle(ClientEvent::ChannelOpenFailed { reason: "refused".into() })
            .expect("open failed");
    }

    assert_eq!(client.state(), ChannelState::Failed);
    env.advance(Duration::from_secs(60));
    let actions = client.handle(ClientEvent::Tick { now: env.now() }).expect("tick");
    assert!(!actions.iter().any(|a| matches!(a, ClientAction::OpenChannel { .. })));

    let actions = client.handle(ClientEvent::RetryConnection).expect("retry");
    assert!(actions.contains(&ClientAction::OpenChannel { attempt: 0 }));
}

#[test]
fn server_close_requests_reauthentication() {
    let (env, mut client) = connected_client();

    let actions =
        client.handle(ClientEvent::ChannelDropped(DropReason::ServerInitiated)).expect("drop");
    assert!(actions.contains(&ClientAction::Reauthenticate));

    client.handle(ClientEvent::Reauthenticated(Ok(()))).expect("reauth");
    env.advance(Duration::from_secs(1));
    let actions = client.handle(ClientEvent::Tick { now: env.now() }).expect("tick");
    assert!(actions.contains(&ClientAction::OpenChannel { attempt: 1 }));
}

#[test]
fn send_while_disconnected_fails_immediately() {
    let (_, mut client) = connected_client();
    client.handle(ClientEvent::OpenChat { chat_id: ChatId::from("c1") }).expect("open");
    client.handle(ClientEvent::Disconnect).expect("disconnect");

    let actions = client.handle(ClientEvent::SendMessage { content: "hi".into() }).expect("send");
    assert!(frames(&actions).is_empty());
    assert!(
        actions
            .iter()
            .any(|a| matches!(a, ClientAction::Toast(t) if t.level == ToastLevel::Error))
    );

    let stream = client.active_stream().expect("stream");
    assert_eq!(stream.len(), 1);
    assert_eq!(stream.pending_count(), 0);
}

#[test]
fn presence_snapshot_and_updates() {
    let (_, mut client) = connected_client();
    let alice = UserId::from("u-alice");
    let bob = UserId::from("u-bob");

    deliver(
        &mut client,
        InboundEvent::InitialStatuses(InitialStatuses {
            statuses: vec![
                StatusEntry { user_id: alice.clone(), status: Presence::Online },
                StatusEntry { user_id: bob.clone(), status: Presence::Away },
            ],
        }),
    );
    assert_eq!(client.presence(&alice), Presence::Online);
    assert_eq!(client.presence(&bob), Presence::Away);

    let actions =
        deliver(&mut client, InboundEvent::UserOffline(UserRef { user_id: alice.clone() }));
    assert_eq!(actions, vec![ClientAction::Render(ViewChange::Presence(alice.clone()))]);
    assert_eq!(client.presence(&alice), Presence::Offline);

    let actions = deliver(&mut client, InboundEvent::UserOffline(UserRef { user_id: alice }));
    assert!(actions.is_empty());
    assert_eq!(client.presence(&UserId::from("u-nobody")), Presence::Offline);
}

#[test]
fn message_pushes_bundle_per_sender() {
    let (_, mut client) = connected_client();

    for count in 1..=3 {
        deliver(
            &mut client,
            InboundEvent::NewMessageNotification(NewMessageNotification {
                sender_id: UserId::from("u-bob"),
                sender_username: Some("Bob".into()),
                message_count: Some(count),
                chat_id: Some(ChatId::from("c1")),
                message: Some(format!("message {count}")),
            }),
        );
    }

    let bundles = client.notifications().bundles();
    assert_eq!(bundles.len(), 1);
    assert_eq!(bundles[0].count, 3);
    assert_eq!(bundles[0].summary(), "Bob sent you 3 messages");
    assert_eq!(client.unread_count(), 3);

    let actions = deliver(&mut client, InboundEvent::NotificationBadgeUpdated(BadgeUpdated {
        unread_count: 7,
    }));
    assert_eq!(actions, vec![ClientAction::Render(ViewChange::Notifications)]);
    assert_eq!(client.unread_count(), 7);
}

#[test]
fn friend_request_from_unknown_username_is_counted_only() {
    let (_, mut client) = connected_client();

    let actions = deliver(
        &mut client,
        InboundEvent::FriendRequestReceived(FriendRequestReceived {
            from_username: "carol".into(),
            from_id: None,
            request_id: None,
        }),
    );

    assert_eq!(client.unread_count(), 1);
    assert_eq!(client.notifications().bundle_count(), 0);
    assert!(actions.iter().any(|a| matches!(a, ClientAction::Toast(_))));
    assert!(requests(&actions).iter().any(|(_, r)| *r == ApiRequest::Friends));
}

#[test]
fn cleared_sender_refreshes_count() {
    let (_, mut client) = connected_client();
    deliver(
        &mut client,
        InboundEvent::NewMessageNotification(NewMessageNotification {
            sender_id: UserId::from("u-bob"),
            sender_username: Some("Bob".into()),
            message_count: None,
            chat_id: None,
            message: None,
        }),
    );

    let actions = deliver(
        &mut client,
        InboundEvent::NotificationsCleared(NotificationsCleared {
            sender_id: Some(UserId::from("u-bob")),
        }),
    );
    assert_eq!(client.notifications().bundle_count(), 0);

    let (id, request) = requests(&actions).remove(0);
    assert_eq!(request, ApiRequest::UnreadCount);
    client
        .handle(ClientEvent::ApiResponse { id, result: Ok(json!({ "unread_count": 0 })) })
        .expect("response");
    assert_eq!(client.unread_count(), 0);
}

#[test]
fn reconcile_poll_replaces_local_state() {
    let (env, mut client) = connected_client();

    env.advance(Duration::from_secs(30));
    let actions = client.handle(ClientEvent::Tick { now: env.now() }).expect("tick");
    let (id, request) = requests(&actions).remove(0);
    assert_eq!(request, ApiRequest::Notifications { limit: 20 });

    let body = json!({
        "notifications": [{
            "_id": "n1",
            "type": "new_message",
            "message": "hi",
            "data": { "sender_id": "u-bob", "sender_username": "Bob", "message_count": 2 },
            "is_read": false,
            "created_at": "2026-01-05T08:00:00Z"
        }],
        "unread_count": 2
    });
    client.handle(ClientEvent::ApiResponse { id, result: Ok(body) }).expect("snapshot");

    assert_eq!(client.unread_count(), 2);
    assert_eq!(client.notifications().bundles()[0].count, 2);
    assert_eq!(client.roster().display_name(&UserId::from("u-bob")), Some("Bob"));
}

#[test]
fn friends_load_with_presence() {
    let (_, mut client) = connected_client();
    let actions = client.handle(ClientEvent::LoadFriends).expect("load");
    let (id, _) = requests(&actions).remove(0);

    let body = json!({ "friends": [
        { "_id": "u-zed", "username": "zed", "status": "online" },
        { "_id": "u-amy", "username": "amy", "display_name": "Amy" },
    ]});
    let actions = client.handle(ClientEvent::ApiResponse { id, result: Ok(body) }).expect("resp");
    assert_eq!(actions, vec![ClientAction::Render(ViewChange::Friends)]);

    let friends = client.friends();
    let names: Vec<&str> = friends.iter().map(|f| f.display_name.as_str()).collect();
    assert_eq!(names, vec!["Amy", "zed"]);
    assert_eq!(friends[1].presence, Presence::Online);
}

#[test]
fn rejected_friend_request_toasts_error() {
    let (_, mut client) = connected_client();
    let actions = client
        .handle(ClientEvent::SendFriendRequest { user_id: UserId::from("u-bob") })
        .expect("send");
    let (id, _) = requests(&actions).remove(0);

    let body = json!({ "success": false, "error": "Already friends" });
    let actions = client.handle(ClientEvent::ApiResponse { id, result: Ok(body) }).expect("resp");
    match actions.as_slice() {
        [ClientAction::Toast(toast)] => {
            assert_eq!(toast.level, ToastLevel::Error);
            assert!(toast.message.contains("Already friends"));
        },
        other => panic!("unexpected actions {other:?}"),
    }
}

#[test]
fn created_chat_opens() {
    let (_, mut client) = connected_client();
    let actions = client
        .handle(ClientEvent::CreateChat {
            participants: vec![UserId::from("u-bob")],
            is_group: false,
        })
        .expect("create");
    let (id, _) = requests(&actions).remove(0);

    let actions = client
        .handle(ClientEvent::ApiResponse { id, result: Ok(json!({ "chat_id": "c9" })) })
        .expect("resp");
    assert!(actions.contains(&ClientAction::ChatCreated { chat_id: ChatId::from("c9") }));
    assert_eq!(client.active_chat(), Some(&ChatId::from("c9")));
}

#[test]
fn membership_lines_render_as_system_entries() {
    let (_, mut client) = connected_client();
    client.handle(ClientEvent::OpenChat { chat_id: ChatId::from("c1") }).expect("open");

    deliver(&mut client, InboundEvent::UserJoined(Membership { username: "bob".into() }));
    let rendered = client.render_active(Utc.fix());
    assert_eq!(rendered.len(), 1);
    assert!(rendered[0].system);
    assert_eq!(rendered[0].text, "bob joined the chat");
}

#[test]
fn keystrokes_without_chat_are_rejected() {
    let (_, mut client) = connected_client();
    let err = client.handle(ClientEvent::Keystroke).expect_err("no chat");
    assert!(err.is_validation());
}

fn chat_message(id: &str, sender: &str, content: &str) -> InboundEvent {
    InboundEvent::NewMessage(ChatMessage {
        message_id: id.into(),
        chat_id: "c1".into(),
        sender_id: sender.into(),
        sender_username: sender.trim_start_matches("u-").into(),
        content: content.into(),
        kind: MessageKind::Text,
        timestamp: None,
        client_msg_id: None,
    })
}

fn read_receipts(actions: &[ClientAction]) -> Vec<serde_json::Value> {
    frames(actions)
        .into_iter()
        .filter(|frame| frame.event == "message_read")
        .map(|frame| frame.data["message_id"].clone())
        .collect()
}

fn open_c1(client: &mut Client<MockEnv>) -> Vec<ClientAction> {
    client.handle(ClientEvent::OpenChat { chat_id: ChatId::from("c1") }).expect("open")
}

fn has_error_toast(actions: &[ClientAction]) -> bool {
    actions.iter().any(|a| matches!(a, ClientAction::Toast(t) if t.level == ToastLevel::Error))
}

fn contents(client: &Client<MockEnv>) -> Vec<String> {
    client
        .active_stream()
        .map(|stream| stream.entries().iter().map(|entry| entry.content.clone()).collect())
        .unwrap_or_default()
}

#[test]
fn opened_chat_merges_history_behind_live_messages() {
    let (_, mut client) = connected_client();
    let actions = open_c1(&mut client);
    let (id, request) = requests(&actions).remove(0);
    assert_eq!(request, ApiRequest::ChatMessages { chat_id: ChatId::from("c1"), limit: 50 });

    let actions = deliver(&mut client, chat_message("m2", "u-bob", "live"));
    assert_eq!(read_receipts(&actions), vec![json!("m2")]);

    let body = json!({
        "success": true,
        "messages": [
            { "_id": "m0", "sender_id": "u-bob", "content": "gone", "is_deleted": true },
            { "_id": "m1", "sender_id": "u-bob", "sender_username": "bob", "content": "earlier" },
            { "_id": "m2", "sender_id": "u-bob", "content": "live" },
        ],
        "count": 3,
    });
    let actions =
        client.handle(ClientEvent::ApiResponse { id, result: Ok(body) }).expect("history");

    assert_eq!(contents(&client), vec!["earlier".to_string(), "live".to_string()]);
    assert_eq!(read_receipts(&actions), vec![json!("m1")]);
}

#[test]
fn failed_history_load_keeps_live_messages() {
    let (_, mut client) = connected_client();
    let actions = open_c1(&mut client);
    let (id, _) = requests(&actions).remove(0);
    deliver(&mut client, chat_message("m1", "u-bob", "live"));

    let failure = Err(hangspace_core::RequestError::Network("timed out".into()));
    let actions = client.handle(ClientEvent::ApiResponse { id, result: failure }).expect("resp");

    assert_eq!(contents(&client), vec!["live".to_string()]);
    assert!(has_error_toast(&actions));
}

#[test]
fn own_messages_are_edited_and_deleted_through_the_api() {
    let (_, mut client) = connected_client();
    open_c1(&mut client);
    let actions =
        client.handle(ClientEvent::SendMessage { content: "helo".into() }).expect("send");
    let ack = frames(&actions)[0].ack.expect("ack id");
    let reply = Frame::ack_reply(ack, json!({ "message_id": "m1" }));
    client.handle(ClientEvent::FrameReceived(reply)).expect("ack");
    deliver(&mut client, chat_message("m2", "u-bob", "theirs"));

    let err = client
        .handle(ClientEvent::EditMessage { message_id: "m2".into(), content: "mine now".into() })
        .expect_err("not ours");
    assert!(err.is_validation());

    let actions = client
        .handle(ClientEvent::EditMessage { message_id: "m1".into(), content: " hello ".into() })
        .expect("edit");
    let (id, request) = requests(&actions).remove(0);
    assert_eq!(request, ApiRequest::UpdateMessage {
        message_id: "m1".into(),
        new_content: "hello".into(),
    });
    client
        .handle(ClientEvent::ApiResponse { id, result: Ok(json!({ "success": true })) })
        .expect("edited");
    let entry = client.active_stream().expect("stream").entries()[0].clone();
    assert_eq!(entry.content, "hello");
    assert!(entry.edited);

    let actions =
        client.handle(ClientEvent::DeleteMessage { message_id: "m1".into() }).expect("delete");
    let (id, _) = requests(&actions).remove(0);
    let rejected = json!({ "success": false, "error": "Message not found" });
    let actions =
        client.handle(ClientEvent::ApiResponse { id, result: Ok(rejected) }).expect("rejected");
    assert!(has_error_toast(&actions));
    assert_eq!(contents(&client).len(), 2);

    let actions =
        client.handle(ClientEvent::DeleteMessage { message_id: "m1".into() }).expect("delete");
    let (id, _) = requests(&actions).remove(0);
    client
        .handle(ClientEvent::ApiResponse { id, result: Ok(json!({ "success": true })) })
        .expect("deleted");
    assert_eq!(contents(&client), vec!["theirs".to_string()]);
}
