//! Property tests for the frame envelope.

#![allow(clippy::unwrap_used)]

use hangspace_proto::{AckId, EventKind, Frame, InboundEvent, ProtocolError};
use proptest::prelude::*;
use serde_json::json;

proptest! {
    #[test]
    fn decode_never_panics(text in ".{0,256}") {
        let _ = Frame::decode(&text);
    }

    #[test]
    fn unknown_names_never_decode_as_events(name in "[a-z_]{1,24}") {
        prop_assume!(EventKind::from_name(&name).is_none());
        let frame = Frame::new(name.clone(), json!({}));
        prop_assert_eq!(InboundEvent::from_frame(&frame), Err(ProtocolError::UnknownEvent(name)));
    }

    #[test]
    fn ack_replies_keep_their_id(id in any::<u64>()) {
        let text = Frame::ack_reply(AckId(id), json!({ "error": null })).encode().unwrap();
        let frame = Frame::decode(&text).unwrap();
        prop_assert_eq!(frame.ack_reply_id(), Some(AckId(id)));
    }
}
