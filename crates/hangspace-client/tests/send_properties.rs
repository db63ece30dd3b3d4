//! Property tests for optimistic sends.
//!
//! Acks, server echoes, ack timeouts and retries arrive in arbitrary order
//! and multiplicity. Whatever the interleaving, every send owns exactly one
//! stream entry and no server id is shown twice.

#![allow(clippy::unwrap_used)]

use std::{collections::BTreeSet, time::Duration};

use hangspace_client::{Client, ClientAction, ClientConfig, ClientEvent, ClientIdentity, Environment};
use hangspace_core::{DeliveryState, LocalId, env::test_utils::MockEnv};
use hangspace_proto::{AckId, ChatId, ChatMessage, Frame, InboundEvent, MessageKind};
use proptest::prelude::*;
use serde_json::json;

#[derive(Debug, Clone)]
enum Op {
    Send,
    Ack(u8),
    Echo(u8),
    Timeout,
    Retry(u8),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::Send),
        3 => any::<u8>().prop_map(Op::Ack),
        3 => any::<u8>().prop_map(Op::Echo),
        1 => Just(Op::Timeout),
        2 => any::<u8>().prop_map(Op::Retry),
    ]
}

/// One user send as the server sees it.
struct Sent {
    local_id: LocalId,
    ack: AckId,
    server_id: String,
}

fn send_frame(actions: &[ClientAction]) -> Option<&Frame> {
    actions.iter().find_map(|action| match action {
        ClientAction::Send(frame) if frame.event == "send_message" => Some(frame),
        _ => None,
    })
}

fn pick(sent: &[Sent], index: u8) -> Option<&Sent> {
    (!sent.is_empty()).then(|| &sent[usize::from(index) % sent.len()])
}

fn run(ops: &[Op]) -> (Client<MockEnv>, Vec<Sent>) {
    let env = MockEnv::new();
    let mut client =
        Client::new(env.clone(), ClientIdentity::new("u-me", "me"), ClientConfig::default());
    client.handle(ClientEvent::Connect).unwrap();
    client.handle(ClientEvent::ChannelOpened).unwrap();
    client.handle(ClientEvent::OpenChat { chat_id: ChatId::from("c1") }).unwrap();

    let mut sent: Vec<Sent> = Vec::new();
    for op in ops {
        match op {
            Op::Send => {
                let content = format!("message {}", sent.len());
                let actions = client.handle(ClientEvent::SendMessage { content }).unwrap();
                let ack = send_frame(&actions).and_then(|frame| frame.ack).unwrap();
                let local_id = client.active_stream().unwrap().entries().last().unwrap();
                let local_id = local_id.local_id.clone().unwrap();
                let server_id = format!("m{}", sent.len());
                sent.push(Sent { local_id, ack, server_id });
            },
            Op::Ack(index) => {
                if let Some(target) = pick(&sent, *index) {
                    let body = json!({ "message_id": target.server_id });
                    let reply = Frame::ack_reply(target.ack, body);
                    client.handle(ClientEvent::FrameReceived(reply)).unwrap();
                }
            },
            Op::Echo(index) => {
                if let Some(target) = pick(&sent, *index) {
                    let echo = InboundEvent::NewMessage(ChatMessage {
                        message_id: target.server_id.as_str().into(),
                        chat_id: "c1".into(),
                        sender_id: "u-me".into(),
                        sender_username: "me".into(),
                        content: "echo".into(),
                        kind: MessageKind::Text,
                        timestamp: None,
                        client_msg_id: Some(target.local_id.to_string()),
                    });
                    let frame = echo.into_frame().unwrap();
                    client.handle(ClientEvent::FrameReceived(frame)).unwrap();
                }
            },
            Op::Timeout => {
                env.advance(Duration::from_secs(11));
                client.handle(ClientEvent::Tick { now: env.now() }).unwrap();
            },
            Op::Retry(index) => {
                if sent.is_empty() {
                    continue;
                }
                let position = usize::from(*index) % sent.len();
                let local_id = sent[position].local_id.clone();
                let failed = client
                    .active_stream()
                    .and_then(|stream| stream.get_local(&local_id))
                    .is_some_and(|entry| matches!(entry.state, DeliveryState::Failed { .. }));
                if failed {
                    let actions = client.handle(ClientEvent::RetryMessage { local_id }).unwrap();
                    sent[position].ack = send_frame(&actions).and_then(|frame| frame.ack).unwrap();
                }
            },
        }
    }
    (client, sent)
}

proptest! {
    #[test]
    fn every_send_owns_exactly_one_entry(ops in prop::collection::vec(op(), 1..60)) {
        let (client, sent) = run(&ops);
        let stream = client.active_stream().unwrap();

        prop_assert_eq!(stream.len(), sent.len());
        for send in &sent {
            let owners = stream
                .entries()
                .iter()
                .filter(|entry| entry.local_id.as_ref() == Some(&send.local_id))
                .count();
            prop_assert_eq!(owners, 1, "{} has {} entries", send.local_id, owners);
        }

        let server_ids: Vec<_> =
            stream.entries().iter().filter_map(|entry| entry.server_id.clone()).collect();
        let unique: BTreeSet<_> = server_ids.iter().collect();
        prop_assert_eq!(unique.len(), server_ids.len());
    }

    #[test]
    fn acked_sends_are_never_pending(ops in prop::collection::vec(op(), 1..60)) {
        let (client, sent) = run(&ops);
        let stream = client.active_stream().unwrap();

        prop_assert!(stream.pending_count() <= sent.len());
        for entry in stream.entries() {
            if entry.server_id.is_some() {
                prop_assert_ne!(&entry.state, &DeliveryState::Pending);
            }
        }
    }
}
