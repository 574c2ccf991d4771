// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use crate::message::Message;
use yare::parameterized;

fn test_batch() -> Batch {
    let mut first = Message::with_payload("chat", "hi");
    first.time = Some(0);
    let mut second = Message::new("typing");
    second.time = Some(50);
    Batch {
        server_time_stamp: None,
        data: vec![first, second],
    }
}

#[parameterized(
    send_message = { ClientMessage::send_message(1, test_batch()) },
    store_context = { ClientMessage::store_context(2, "{\"board\":[]}") },
    fetch_context = { ClientMessage::fetch_context(3) },
    ping = { ClientMessage::ping(12345) },
)]
fn client_message_roundtrip(msg: ClientMessage) {
    let json = msg.to_json().unwrap();
    let parsed = ClientMessage::from_json(&json).unwrap();
    assert_eq!(msg, parsed);
}

#[parameterized(
    received = { ServerMessage::message_received(Batch::stamped(1000, vec![Message::new("x")])) },
    completed = { ServerMessage::completed(7) },
    completed_with = { ServerMessage::completed_with(8, "ctx") },
    failed = { ServerMessage::failed(9, "boom") },
    migrate = { ServerMessage::migrate("ws://relay-2/addins/s1") },
    pong = { ServerMessage::pong(12345) },
    error = { ServerMessage::error("Something went wrong") },
)]
fn server_message_roundtrip(msg: ServerMessage) {
    let json = msg.to_json().unwrap();
    let parsed = ServerMessage::from_json(&json).unwrap();
    assert_eq!(msg, parsed);
}

#[test]
fn invocation_ids() {
    assert_eq!(ClientMessage::send_message(4, Batch::new()).invocation_id(), Some(4));
    assert_eq!(ClientMessage::store_context(5, "").invocation_id(), Some(5));
    assert_eq!(ClientMessage::fetch_context(6).invocation_id(), Some(6));
    assert_eq!(ClientMessage::ping(7).invocation_id(), None);
}

#[test]
fn message_json_format() {
    let json = ClientMessage::send_message(1, test_batch()).to_json().unwrap();
    assert!(json.contains("\"type\":\"send_message\""));
    assert!(json.contains("\"batch\":{"));

    let json = ClientMessage::fetch_context(3).to_json().unwrap();
    assert_eq!(json, "{\"type\":\"fetch_context\",\"id\":3}");

    let json = ServerMessage::completed(7).to_json().unwrap();
    assert_eq!(json, "{\"type\":\"completion\",\"id\":7}");
}

#[test]
fn message_received_flattens_batch() {
    let json = ServerMessage::message_received(Batch::stamped(900, vec![Message::new("y")]))
        .to_json()
        .unwrap();
    assert!(json.contains("\"type\":\"message_received\""));
    assert!(json.contains("\"serverTimeStamp\":900"));
    assert!(json.contains("\"data\":[{\"type\":\"y\"}]"));
}

#[test]
fn server_message_from_relay_text() {
    let text = r#"{"type":"migrate","url":"wss://east.example/addins/abc"}"#;
    let parsed = ServerMessage::from_json(text).unwrap();
    assert_eq!(parsed, ServerMessage::migrate("wss://east.example/addins/abc"));
}
