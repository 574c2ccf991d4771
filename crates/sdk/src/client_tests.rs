// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Session behaviour through the public client, on a paused clock.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::time::Duration;

use addin_core::{Batch, ConnectionState, ErrorKind, InitContext, Message, ServerMessage, SyncConfig};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::Instant;

use crate::listener::{ChannelListener, SyncEvent};
use crate::telemetry::{HUB_DISCONNECTED, HUB_MESSAGE_SEND_FAILED, HUB_QUEUE_LIMIT, HUB_SIZE_LIMIT};
use crate::transport_tests::MockTransport;
use crate::{SyncClient, SyncError};

const HUB: &str = "ws://relay.test/addins/s1";

struct Harness {
    client: SyncClient,
    mock: MockTransport,
    events: UnboundedReceiver<SyncEvent>,
}

fn harness(config: SyncConfig) -> Harness {
    let mock = MockTransport::new();
    let (listener, events) = ChannelListener::new();
    let factory_mock = mock.clone();
    let client = SyncClient::with_transport(config, listener, move || factory_mock.clone());
    Harness {
        client,
        mock,
        events,
    }
}

fn context() -> InitContext {
    InitContext {
        token: "tok".to_string(),
        ..InitContext::development("s1", Some("ws://relay.test/".to_string()))
    }
}

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn config(attempts: u32) -> SyncConfig {
    SyncConfig {
        maximum_connection_attempts: attempts,
        connection_retry_delay_ms: 1_000,
        ..SyncConfig::default()
    }
}

async fn next_event(events: &mut UnboundedReceiver<SyncEvent>) -> SyncEvent {
    tokio::time::timeout(Duration::from_secs(600), events.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("listener channel closed")
}

/// Collects events up to and including the first that matches.
async fn events_until(
    events: &mut UnboundedReceiver<SyncEvent>,
    done: impl Fn(&SyncEvent) -> bool,
) -> Vec<SyncEvent> {
    let mut seen = Vec::new();
    loop {
        let event = next_event(events).await;
        let finished = done(&event);
        seen.push(event);
        if finished {
            return seen;
        }
    }
}

async fn next_error(events: &mut UnboundedReceiver<SyncEvent>) -> SyncError {
    loop {
        if let SyncEvent::Error(err) = next_event(events).await {
            return err;
        }
    }
}

async fn next_message(events: &mut UnboundedReceiver<SyncEvent>) -> Message {
    loop {
        if let SyncEvent::Message(message) = next_event(events).await {
            return message;
        }
    }
}

fn is_state(state: ConnectionState) -> impl Fn(&SyncEvent) -> bool {
    move |event| *event == SyncEvent::ConnectionState(state)
}

fn drain(events: &mut UnboundedReceiver<SyncEvent>) -> Vec<SyncEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

fn telemetry_names(events: &[SyncEvent]) -> Vec<&'static str> {
    events
        .iter()
        .filter_map(|e| match e {
            SyncEvent::Telemetry(t) => Some(t.name),
            _ => None,
        })
        .collect()
}

// Connection lifecycle

#[tokio::test(start_paused = true)]
async fn init_connects_with_token_and_reports_states() {
    let mut h = harness(SyncConfig::default());
    assert_eq!(h.client.connection_state(), ConnectionState::Undefined);

    h.client.init(context()).await.unwrap();

    assert_eq!(h.client.connection_state(), ConnectionState::Connected);
    let connects = h.mock.connects();
    assert_eq!(connects.len(), 1);
    assert_eq!(connects[0].url, HUB);
    assert_eq!(connects[0].token, "tok");
    assert_eq!(
        drain(&mut h.events),
        vec![
            SyncEvent::ConnectionState(ConnectionState::Connecting),
            SyncEvent::ConnectionState(ConnectionState::Connected),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn failed_attempt_retries_after_delay() {
    let h = harness(config(5));
    h.mock.fail_next_connects(1);

    h.client.init(context()).await.unwrap();

    let connects = h.mock.connects();
    assert_eq!(connects.len(), 2);
    assert_eq!(connects[1].at - connects[0].at, ms(1_000));
}

#[tokio::test(start_paused = true)]
async fn init_fails_after_max_attempts() {
    let mut h = harness(config(3));
    h.mock.set_connect_fail(true);

    let err = h.client.init(context()).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::ConnectionFailed);
    assert_eq!(h.client.connection_state(), ConnectionState::Disconnected);

    let connects = h.mock.connects();
    assert_eq!(connects.len(), 3);
    assert_eq!(connects[1].at - connects[0].at, ms(1_000));
    assert_eq!(connects[2].at - connects[1].at, ms(1_000));

    // Reported once to the error handler
    let errors: Vec<_> = drain(&mut h.events)
        .into_iter()
        .filter(|e| matches!(e, SyncEvent::Error(_)))
        .collect();
    assert_eq!(errors.len(), 1);

    // No further attempts once given up
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(h.mock.connects().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn unexpected_close_reconnects_to_same_endpoint() {
    let mut h = harness(config(5));
    h.client.init(context()).await.unwrap();
    drain(&mut h.events);

    h.mock.close();
    let seen = events_until(&mut h.events, is_state(ConnectionState::Connected)).await;

    assert_eq!(
        seen[0],
        SyncEvent::ConnectionState(ConnectionState::Disconnected)
    );
    assert_eq!(telemetry_names(&seen), vec![HUB_DISCONNECTED]);
    assert!(seen.contains(&SyncEvent::ConnectionState(ConnectionState::Connecting)));

    let connects = h.mock.connects();
    assert_eq!(connects.len(), 2);
    assert_eq!(connects[1].url, HUB);
}

#[tokio::test(start_paused = true)]
async fn reconnect_gives_up_after_max_attempts() {
    let mut h = harness(config(3));
    h.client.init(context()).await.unwrap();
    h.mock.set_connect_fail(true);

    h.mock.close();
    let err = next_error(&mut h.events).await;
    assert_eq!(err.kind, ErrorKind::ConnectionFailed);
    assert_eq!(h.client.connection_state(), ConnectionState::Disconnected);
    assert_eq!(h.mock.connects().len(), 1 + 3);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(h.mock.connects().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn migrate_reconnects_immediately_to_new_url() {
    let mut h = harness(config(5));
    h.client.init(context()).await.unwrap();
    drain(&mut h.events);

    let before = Instant::now();
    h.mock
        .push(ServerMessage::migrate("ws://relay-2.test/addins/s1"));
    events_until(&mut h.events, is_state(ConnectionState::Connected)).await;

    let connects = h.mock.connects();
    assert_eq!(connects.len(), 2);
    assert_eq!(connects[1].url, "ws://relay-2.test/addins/s1");
    assert_eq!(connects[1].token, "tok");
    assert!(connects[1].at - before < ms(1_000));
    assert!(h.mock.disconnects() >= 1);
}

#[tokio::test(start_paused = true)]
async fn failed_migration_falls_back_to_retry_loop() {
    let mut h = harness(config(2));
    h.client.init(context()).await.unwrap();
    drain(&mut h.events);
    h.mock.fail_next_connects(2);

    h.mock.push(ServerMessage::migrate("ws://relay-2.test/addins/s1"));
    events_until(&mut h.events, is_state(ConnectionState::Connected)).await;

    // Migration attempt plus one counted failure, then success
    let connects = h.mock.connects();
    assert_eq!(connects.len(), 4);
    assert!(connects[1..]
        .iter()
        .all(|c| c.url == "ws://relay-2.test/addins/s1"));
    assert_eq!(connects[2].at - connects[1].at, ms(1_000));
}

// Keepalive

#[tokio::test(start_paused = true)]
async fn silent_relay_is_detected_and_reconnected() {
    let mut h = harness(config(5));
    h.client.init(context()).await.unwrap();
    drain(&mut h.events);

    // The socket stays open but nothing comes back, not even pongs
    h.mock.go_silent();
    let seen = events_until(&mut h.events, is_state(ConnectionState::Connected)).await;

    assert_eq!(
        seen[0],
        SyncEvent::ConnectionState(ConnectionState::Disconnected)
    );
    assert_eq!(telemetry_names(&seen), vec![HUB_DISCONNECTED]);
    assert_eq!(h.mock.pings(), vec![1]);
    assert_eq!(h.mock.disconnects(), 1);

    // Ping after 30s of quiet, declared dead 10s later, reconnected at once
    let connects = h.mock.connects();
    assert_eq!(connects.len(), 2);
    assert_eq!(connects[1].url, HUB);
    let gap = connects[1].at - connects[0].at;
    assert!(gap >= Duration::from_secs(40) && gap < Duration::from_secs(41));
}

#[tokio::test(start_paused = true)]
async fn answered_pings_keep_connection_up() {
    let mut h = harness(SyncConfig::default());
    h.client.init(context()).await.unwrap();
    drain(&mut h.events);

    tokio::time::sleep(Duration::from_secs(305)).await;

    assert_eq!(h.mock.pings(), (1..=10).collect::<Vec<_>>());
    assert_eq!(h.client.connection_state(), ConnectionState::Connected);
    assert_eq!(h.mock.connects().len(), 1);
    assert!(drain(&mut h.events).is_empty());
}

#[tokio::test(start_paused = true)]
async fn inbound_traffic_postpones_ping() {
    let h = harness(SyncConfig::default());
    h.client.init(context()).await.unwrap();

    tokio::time::sleep(Duration::from_secs(20)).await;
    h.mock.push_batch(Batch::stamped(1_000, vec![Message::new("a")]));
    tokio::time::sleep(Duration::from_secs(20)).await;
    assert!(h.mock.pings().is_empty());

    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(h.mock.pings(), vec![1]);
}

#[tokio::test(start_paused = true)]
async fn disabled_heartbeat_never_pings() {
    let h = harness(SyncConfig {
        heartbeat_interval_ms: 0,
        ..SyncConfig::default()
    });
    h.client.init(context()).await.unwrap();
    h.mock.go_silent();

    tokio::time::sleep(Duration::from_secs(600)).await;

    assert!(h.mock.pings().is_empty());
    assert_eq!(h.client.connection_state(), ConnectionState::Connected);
}

// Outbound batching

#[tokio::test(start_paused = true)]
async fn messages_in_one_window_are_sent_as_one_batch() {
    let h = harness(SyncConfig::default());
    h.client.init(context()).await.unwrap();

    h.client.send_message(Message::with_payload("a", "1"));
    tokio::time::sleep(ms(50)).await;
    h.client.send_message(Message::with_payload("b", "2"));

    tokio::time::sleep(ms(100)).await;
    assert!(h.mock.sent_batches().is_empty());

    tokio::time::sleep(ms(200)).await;
    let batches = h.mock.sent_batches();
    assert_eq!(batches.len(), 1);
    let batch = &batches[0];
    assert_eq!(batch.server_time_stamp, None);
    let summary: Vec<_> = batch
        .data
        .iter()
        .map(|m| (m.kind.as_str(), m.time))
        .collect();
    assert_eq!(summary, vec![("a", Some(0)), ("b", Some(50))]);
}

#[tokio::test(start_paused = true)]
async fn next_window_starts_after_flush() {
    let h = harness(SyncConfig::default());
    h.client.init(context()).await.unwrap();

    h.client.send_message(Message::new("a"));
    tokio::time::sleep(ms(250)).await;
    h.client.send_message(Message::new("b"));
    tokio::time::sleep(ms(250)).await;

    let batches = h.mock.sent_batches();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[1].data[0].time, Some(0));
}

#[tokio::test(start_paused = true)]
async fn message_over_count_quota_is_rejected() {
    let mut h = harness(SyncConfig {
        maximum_messages: 2,
        ..SyncConfig::default()
    });
    h.client.init(context()).await.unwrap();
    drain(&mut h.events);

    for kind in ["a", "b", "c"] {
        h.client.send_message(Message::new(kind));
    }
    let seen = events_until(&mut h.events, |e| matches!(e, SyncEvent::Error(_))).await;
    assert_eq!(telemetry_names(&seen), vec![HUB_QUEUE_LIMIT]);
    assert_eq!(
        seen.last(),
        Some(&SyncEvent::Error(ErrorKind::MessageRateLimitExceeded.into()))
    );

    tokio::time::sleep(ms(300)).await;
    let batches = h.mock.sent_batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 2);
}

#[tokio::test(start_paused = true)]
async fn message_over_size_quota_is_rejected() {
    let mut h = harness(SyncConfig {
        maximum_size: 100,
        ..SyncConfig::default()
    });
    h.client.init(context()).await.unwrap();
    drain(&mut h.events);

    h.client.send_message(Message::with_payload("a", "x".repeat(60)));
    h.client.send_message(Message::with_payload("b", "y".repeat(10)));

    let seen = events_until(&mut h.events, |e| matches!(e, SyncEvent::Error(_))).await;
    let size_event = seen
        .iter()
        .find_map(|e| match e {
            SyncEvent::Telemetry(t) if t.name == HUB_SIZE_LIMIT => Some(t.clone()),
            _ => None,
        })
        .expect("size telemetry");
    assert_eq!(size_event.value("size"), Some("134"));
    assert_eq!(
        seen.last(),
        Some(&SyncEvent::Error(ErrorKind::MessagesSizeLimitExceeded.into()))
    );

    tokio::time::sleep(ms(300)).await;
    assert_eq!(h.mock.sent_batches()[0].len(), 1);
}

#[tokio::test(start_paused = true)]
async fn send_before_init_is_not_initialized() {
    let mut h = harness(SyncConfig::default());

    h.client.send_message(Message::new("a"));
    let err = next_error(&mut h.events).await;
    assert_eq!(err.kind, ErrorKind::NotInitialized);

    let err = h.client.store_context("{}").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotInitialized);

    tokio::time::sleep(ms(500)).await;
    assert!(h.mock.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn failed_batch_reports_send_failure() {
    let mut h = harness(SyncConfig::default());
    h.client.init(context()).await.unwrap();
    drain(&mut h.events);
    h.mock.set_send_fail(true);

    h.client.send_message(Message::new("a"));
    let seen = events_until(&mut h.events, |e| matches!(e, SyncEvent::Error(_))).await;
    assert_eq!(telemetry_names(&seen), vec![HUB_MESSAGE_SEND_FAILED]);
    let Some(SyncEvent::Error(err)) = seen.last() else {
        unreachable!();
    };
    assert_eq!(err.kind, ErrorKind::MessageSentFailed);

    // The batch is not retried
    h.mock.set_send_fail(false);
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(h.mock.sent_batches().is_empty());
}

#[tokio::test(start_paused = true)]
async fn due_flush_goes_out_before_simultaneous_close() {
    let mut h = harness(config(5));
    h.client.init(context()).await.unwrap();
    drain(&mut h.events);

    // The window closes at the very instant the connection drops
    let t0 = Instant::now();
    h.mock.close_at(t0 + ms(200));
    h.client.send_message(Message::new("a"));

    let seen = events_until(&mut h.events, is_state(ConnectionState::Connected)).await;
    assert!(!seen.iter().any(|e| matches!(e, SyncEvent::Error(_))));
    assert_eq!(h.mock.sent_batches().len(), 1);
    assert_eq!(h.mock.connects().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn relay_rejection_reports_send_failure() {
    let mut h = harness(SyncConfig::default());
    h.client.init(context()).await.unwrap();
    h.mock.fail_invocations("quota");

    h.client.send_message(Message::new("a"));
    let err = next_error(&mut h.events).await;
    assert_eq!(err, SyncError::new(ErrorKind::MessageSentFailed, "quota"));
}

#[tokio::test(start_paused = true)]
async fn send_while_disconnected_fails_at_flush() {
    let mut h = harness(config(1));
    h.client.init(context()).await.unwrap();
    h.mock.set_connect_fail(true);
    h.mock.close();
    assert_eq!(
        next_error(&mut h.events).await.kind,
        ErrorKind::ConnectionFailed
    );

    h.client.send_message(Message::new("a"));
    assert_eq!(
        next_error(&mut h.events).await.kind,
        ErrorKind::MessageSentFailed
    );
}

// Inbound playback

#[tokio::test(start_paused = true)]
async fn inbound_messages_play_in_timeline_order_with_spacing() {
    let mut h = harness(SyncConfig::default());
    h.mock
        .push_batch(Batch::stamped(1_000, vec![Message::new("x")]));
    h.mock
        .push_batch(Batch::stamped(900, vec![Message::new("y")]));
    h.client.init(context()).await.unwrap();

    let first = next_message(&mut h.events).await;
    let first_at = Instant::now();
    let second = next_message(&mut h.events).await;
    let second_at = Instant::now();

    assert_eq!(first.kind, "y");
    assert_eq!(second.kind, "x");
    assert_eq!(second_at - first_at, ms(100));
}

#[tokio::test(start_paused = true)]
async fn batch_offsets_are_replayed() {
    let mut h = harness(SyncConfig::default());
    h.client.init(context()).await.unwrap();

    let mut a = Message::with_payload("a", "1");
    a.time = Some(0);
    let mut b = Message::with_payload("b", "2");
    b.time = Some(40);
    h.mock.push_batch(Batch::stamped(5_000, vec![a, b]));

    let first = next_message(&mut h.events).await;
    let first_at = Instant::now();
    let second = next_message(&mut h.events).await;

    assert_eq!(first, Message::with_payload("a", "1"));
    assert_eq!(second, Message::with_payload("b", "2"));
    assert_eq!(Instant::now() - first_at, ms(40));
}

#[tokio::test(start_paused = true)]
async fn batch_travels_between_clients() {
    let sender = harness(SyncConfig::default());
    let mut receiver = harness(SyncConfig::default());
    sender.client.init(context()).await.unwrap();
    receiver.client.init(context()).await.unwrap();

    sender
        .client
        .send_message(Message::with_payload("stroke", "{\"x\":3}"));
    tokio::time::sleep(ms(250)).await;

    // Play the relay: stamp and forward
    let mut batch = sender.mock.sent_batches().remove(0);
    batch.server_time_stamp = Some(1_700_000_000_000);
    receiver.mock.push_batch(batch);

    let delivered = next_message(&mut receiver.events).await;
    assert_eq!(delivered, Message::with_payload("stroke", "{\"x\":3}"));
}

// Context persistence

#[tokio::test(start_paused = true)]
async fn context_round_trip() {
    let h = harness(SyncConfig::default());
    h.client.init(context()).await.unwrap();

    assert_eq!(h.client.fetch_context().await.unwrap(), "");
    h.client.store_context("{\"slide\":4}").await.unwrap();
    assert_eq!(h.client.fetch_context().await.unwrap(), "{\"slide\":4}");
}

#[tokio::test(start_paused = true)]
async fn context_failures_use_their_own_codes() {
    let mut h = harness(SyncConfig::default());
    h.client.init(context()).await.unwrap();
    drain(&mut h.events);
    h.mock.fail_invocations("storage offline");

    let err = h.client.store_context("{}").await.unwrap_err();
    assert_eq!(
        err,
        SyncError::new(ErrorKind::PersistContentStoreFailed, "storage offline")
    );
    let err = h.client.fetch_context().await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::PersistContentFetchFailed);

    let errors: Vec<_> = drain(&mut h.events)
        .into_iter()
        .filter(|e| matches!(e, SyncEvent::Error(_)))
        .collect();
    assert_eq!(errors.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn pending_call_fails_when_connection_drops() {
    let h = harness(config(5));
    h.client.init(context()).await.unwrap();
    h.mock.hold_completions();

    let (result, ()) = tokio::join!(h.client.store_context("{}"), async {
        tokio::time::sleep(ms(10)).await;
        h.mock.close();
    });

    assert_eq!(
        result.unwrap_err().kind,
        ErrorKind::PersistContentStoreFailed
    );
}

// Local mode and shutdown

#[tokio::test(start_paused = true)]
async fn local_mode_without_relay_host() {
    let mut h = harness(SyncConfig::default());

    h.client
        .init(InitContext::development("s1", None))
        .await
        .unwrap();
    assert_eq!(h.client.connection_state(), ConnectionState::Connected);

    h.client.send_message(Message::new("a"));
    h.client.store_context("{}").await.unwrap();
    assert_eq!(h.client.fetch_context().await.unwrap(), "");
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert!(h.mock.connects().is_empty());
    let seen = drain(&mut h.events);
    assert!(seen
        .iter()
        .all(|e| matches!(e, SyncEvent::ConnectionState(_))));
}

#[tokio::test(start_paused = true)]
async fn shutdown_disconnects() {
    let mut h = harness(SyncConfig::default());
    h.client.init(context()).await.unwrap();
    drain(&mut h.events);

    h.client.shutdown().await;

    assert_eq!(h.mock.disconnects(), 1);
    assert_eq!(
        drain(&mut h.events),
        vec![SyncEvent::ConnectionState(ConnectionState::Disconnected)]
    );
}

#[tokio::test(start_paused = true)]
async fn dropping_client_ends_session() {
    let mut h = harness(SyncConfig::default());
    h.client.init(context()).await.unwrap();
    drain(&mut h.events);

    drop(h.client);
    let seen = events_until(&mut h.events, is_state(ConnectionState::Disconnected)).await;

    assert_eq!(seen.len(), 1);
    assert_eq!(h.mock.disconnects(), 1);
}
