#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Wire-format tests for the chat protocol.
//!
//! The relay and its clients agree on exact JSON shapes: an
//! `{"event": ..., "data": ...}` envelope, with the `message` payload
//! discriminated by an inner `type` field. These tests pin the shapes with
//! fixtures so a refactor of the Rust types cannot silently change the wire.

use chat_relay::protocol::{
    trimmed_message, trimmed_username, ClientEvent, MessagePayload, ServerEvent,
    MAX_MESSAGE_CHARS, MAX_USERNAME_CHARS,
};

/// Serialize `val` to JSON, then deserialize back to `T` and return it.
fn round_trip<T: serde::Serialize + serde::de::DeserializeOwned>(val: &T) -> T {
    let json = serde_json::to_string(val).expect("serialize");
    serde_json::from_str(&json).expect("deserialize")
}

// ════════════════════════════════════════════════════════════════════
// Client → server shapes
// ════════════════════════════════════════════════════════════════════

#[test]
fn join_wire_shape() {
    let event = ClientEvent::Join {
        username: "alice".into(),
    };
    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(
        value,
        serde_json::json!({"event": "join", "data": {"username": "alice"}})
    );
}

#[test]
fn send_message_wire_shape() {
    let event = ClientEvent::SendMessage { text: "hi".into() };
    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(
        value,
        serde_json::json!({"event": "send_message", "data": {"text": "hi"}})
    );
}

#[test]
fn client_events_round_trip() {
    let join = ClientEvent::Join {
        username: "alice".into(),
    };
    assert_eq!(round_trip(&join), join);

    let send = ClientEvent::SendMessage {
        text: "hello world".into(),
    };
    assert_eq!(round_trip(&send), send);
}

#[test]
fn join_fixture_from_the_wire() {
    let event: ClientEvent =
        serde_json::from_str(r#"{"event":"join","data":{"username":"bob"}}"#).unwrap();
    assert_eq!(
        event,
        ClientEvent::Join {
            username: "bob".into()
        }
    );
}

// ════════════════════════════════════════════════════════════════════
// Server → client shapes
// ════════════════════════════════════════════════════════════════════

#[test]
fn chat_message_wire_shape() {
    let event = ServerEvent::Message(MessagePayload::Chat {
        username: "alice".into(),
        text: "hi".into(),
    });
    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(
        value,
        serde_json::json!({
            "event": "message",
            "data": {"type": "message", "username": "alice", "text": "hi"}
        })
    );
}

#[test]
fn join_notification_wire_shape() {
    let event = ServerEvent::Message(MessagePayload::Join {
        username: "alice".into(),
    });
    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(
        value,
        serde_json::json!({
            "event": "message",
            "data": {"type": "join", "username": "alice"}
        })
    );
}

#[test]
fn leave_notification_wire_shape() {
    let event = ServerEvent::Message(MessagePayload::Leave {
        username: "alice".into(),
    });
    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(
        value,
        serde_json::json!({
            "event": "message",
            "data": {"type": "leave", "username": "alice"}
        })
    );
}

#[test]
fn error_reply_wire_shape() {
    let event = ServerEvent::Message(MessagePayload::Error {
        text: "name already in use, choose another".into(),
    });
    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(
        value,
        serde_json::json!({
            "event": "message",
            "data": {"type": "error", "text": "name already in use, choose another"}
        })
    );
}

#[test]
fn user_list_wire_shape() {
    let event = ServerEvent::UserList {
        users: vec!["alice".into(), "bob".into()],
    };
    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(
        value,
        serde_json::json!({
            "event": "user_list",
            "data": {"users": ["alice", "bob"]}
        })
    );
}

#[test]
fn user_list_preserves_order() {
    let event: ServerEvent = serde_json::from_str(
        r#"{"event":"user_list","data":{"users":["carol","alice","bob"]}}"#,
    )
    .unwrap();
    assert_eq!(
        event,
        ServerEvent::UserList {
            users: vec!["carol".into(), "alice".into(), "bob".into()]
        }
    );
}

#[test]
fn server_events_round_trip() {
    let events = vec![
        ServerEvent::Message(MessagePayload::Chat {
            username: "alice".into(),
            text: "hi".into(),
        }),
        ServerEvent::Message(MessagePayload::Join {
            username: "bob".into(),
        }),
        ServerEvent::Message(MessagePayload::Leave {
            username: "bob".into(),
        }),
        ServerEvent::Message(MessagePayload::Error {
            text: "message must be non-empty and ≤ 1000 chars".into(),
        }),
        ServerEvent::UserList { users: vec![] },
    ];
    for event in events {
        assert_eq!(round_trip(&event), event);
    }
}

// ════════════════════════════════════════════════════════════════════
// Malformed input
// ════════════════════════════════════════════════════════════════════

#[test]
fn unknown_event_tag_fails_to_parse() {
    let result = serde_json::from_str::<ClientEvent>(r#"{"event":"hack","data":{}}"#);
    assert!(result.is_err());
}

#[test]
fn missing_payload_field_fails_to_parse() {
    let result = serde_json::from_str::<ClientEvent>(r#"{"event":"join","data":{}}"#);
    assert!(result.is_err());
}

#[test]
fn non_json_fails_to_parse() {
    let result = serde_json::from_str::<ClientEvent>("not json at all");
    assert!(result.is_err());
}

// ════════════════════════════════════════════════════════════════════
// Validation limits
// ════════════════════════════════════════════════════════════════════

#[test]
fn username_limits() {
    assert_eq!(trimmed_username(" carol "), Some("carol"));
    assert_eq!(trimmed_username("\t\n"), None);
    assert_eq!(
        trimmed_username(&"a".repeat(MAX_USERNAME_CHARS)).map(str::len),
        Some(MAX_USERNAME_CHARS)
    );
    assert_eq!(trimmed_username(&"a".repeat(MAX_USERNAME_CHARS + 1)), None);
}

#[test]
fn message_limits() {
    assert_eq!(trimmed_message("  hello  "), Some("hello"));
    assert_eq!(trimmed_message(""), None);
    assert_eq!(trimmed_message(&"b".repeat(MAX_MESSAGE_CHARS + 1)), None);
}
