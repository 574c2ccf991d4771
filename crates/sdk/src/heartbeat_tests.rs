// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use addin_core::SyncConfig;
use tokio::time::Instant;
use yare::parameterized;

use super::*;

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn heartbeat(interval_ms: u64, timeout_ms: u64) -> Heartbeat {
    Heartbeat::new(&SyncConfig {
        heartbeat_interval_ms: interval_ms,
        heartbeat_timeout_ms: timeout_ms,
        ..SyncConfig::default()
    })
}

#[test]
fn stopped_until_started() {
    let mut hb = heartbeat(1_000, 500);
    assert_eq!(hb.deadline(), None);
    assert_eq!(hb.poll(Instant::now() + ms(60_000)), None);
}

#[test]
fn pings_after_quiet_interval() {
    let mut hb = heartbeat(1_000, 500);
    let t0 = Instant::now();
    hb.start(t0);

    assert_eq!(hb.deadline(), Some(t0 + ms(1_000)));
    assert_eq!(hb.poll(t0 + ms(999)), None);
    assert_eq!(hb.poll(t0 + ms(1_000)), Some(Beat::Ping(1)));
    assert_eq!(hb.outstanding(), Some(1));
    assert_eq!(hb.deadline(), Some(t0 + ms(1_500)));
}

#[test]
fn pong_restarts_the_interval() {
    let mut hb = heartbeat(1_000, 500);
    let t0 = Instant::now();
    hb.start(t0);
    hb.poll(t0 + ms(1_000));

    hb.on_pong(1, t0 + ms(1_100));
    assert_eq!(hb.outstanding(), None);
    assert_eq!(hb.deadline(), Some(t0 + ms(2_100)));
    assert_eq!(hb.poll(t0 + ms(2_100)), Some(Beat::Ping(2)));
}

#[test]
fn unanswered_ping_times_out_once() {
    let mut hb = heartbeat(1_000, 500);
    let t0 = Instant::now();
    hb.start(t0);
    hb.poll(t0 + ms(1_000));

    assert_eq!(hb.poll(t0 + ms(1_499)), None);
    assert_eq!(
        hb.poll(t0 + ms(1_500)),
        Some(Beat::TimedOut {
            ping_id: 1,
            waited: ms(500)
        })
    );
    assert_eq!(hb.deadline(), None);
    assert_eq!(hb.poll(t0 + ms(10_000)), None);
}

#[test]
fn stale_pong_does_not_count() {
    let mut hb = heartbeat(1_000, 500);
    let t0 = Instant::now();
    hb.start(t0);
    hb.poll(t0 + ms(1_000));

    hb.on_pong(99, t0 + ms(1_100));
    assert_eq!(hb.outstanding(), Some(1));
    assert!(matches!(
        hb.poll(t0 + ms(1_500)),
        Some(Beat::TimedOut { ping_id: 1, .. })
    ));
}

#[parameterized(
    while_quiet = { false },
    while_awaiting_pong = { true },
)]
fn traffic_proves_liveness(pinged: bool) {
    let mut hb = heartbeat(1_000, 500);
    let t0 = Instant::now();
    hb.start(t0);
    if pinged {
        hb.poll(t0 + ms(1_000));
    }

    hb.on_traffic(t0 + ms(1_200));
    assert_eq!(hb.outstanding(), None);
    assert_eq!(hb.deadline(), Some(t0 + ms(2_200)));
}

#[test]
fn traffic_does_not_start_a_stopped_heartbeat() {
    let mut hb = heartbeat(1_000, 500);
    hb.on_traffic(Instant::now());
    assert_eq!(hb.deadline(), None);
}

#[test]
fn zero_interval_disables() {
    let mut hb = heartbeat(0, 500);
    hb.start(Instant::now());
    assert_eq!(hb.deadline(), None);
}

#[test]
fn stop_clears_outstanding_ping() {
    let mut hb = heartbeat(1_000, 500);
    let t0 = Instant::now();
    hb.start(t0);
    hb.poll(t0 + ms(1_000));

    hb.stop();
    assert_eq!(hb.outstanding(), None);
    assert_eq!(hb.deadline(), None);
}
