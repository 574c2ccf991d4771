// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Connection keepalive.
//!
//! A relay that vanishes without a close frame (network drop, NAT timeout)
//! leaves the socket looking healthy. While connected, a ping goes out once
//! the relay has been quiet for the heartbeat interval; if nothing answers
//! within the timeout the connection is treated as lost.
//!
//! Any frame from the relay proves the connection is alive, except a pong
//! for a ping other than the outstanding one.

use std::time::Duration;

use addin_core::SyncConfig;
use tokio::time::Instant;

/// What the session must do once the heartbeat deadline has passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Beat {
    /// Send a ping with this id.
    Ping(u64),
    /// The ping went unanswered; the connection is dead.
    TimedOut { ping_id: u64, waited: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Stopped,
    Quiet { ping_at: Instant },
    AwaitingPong { id: u64, sent_at: Instant },
}

/// Ping/pong timing for one connection at a time.
#[derive(Debug)]
pub struct Heartbeat {
    interval: Option<Duration>,
    timeout: Duration,
    phase: Phase,
    next_id: u64,
}

impl Heartbeat {
    pub fn new(config: &SyncConfig) -> Self {
        Heartbeat {
            interval: config.heartbeat_interval(),
            timeout: config.heartbeat_timeout(),
            phase: Phase::Stopped,
            next_id: 1,
        }
    }

    /// Starts watching a freshly established connection.
    pub fn start(&mut self, now: Instant) {
        self.phase = match self.interval {
            Some(interval) => Phase::Quiet {
                ping_at: now + interval,
            },
            None => Phase::Stopped,
        };
    }

    pub fn stop(&mut self) {
        self.phase = Phase::Stopped;
    }

    /// Id of the ping waiting for its pong.
    pub fn outstanding(&self) -> Option<u64> {
        match self.phase {
            Phase::AwaitingPong { id, .. } => Some(id),
            _ => None,
        }
    }

    /// Records a frame other than a pong.
    pub fn on_traffic(&mut self, now: Instant) {
        if self.phase != Phase::Stopped {
            self.start(now);
        }
    }

    /// Records a pong. Only the answer to the outstanding ping counts.
    pub fn on_pong(&mut self, id: u64, now: Instant) {
        if self.outstanding() == Some(id) {
            self.start(now);
        }
    }

    /// When [`poll`](Self::poll) next has something to do.
    pub fn deadline(&self) -> Option<Instant> {
        match self.phase {
            Phase::Stopped => None,
            Phase::Quiet { ping_at } => Some(ping_at),
            Phase::AwaitingPong { sent_at, .. } => Some(sent_at + self.timeout),
        }
    }

    /// Advances past a deadline that is due at `now`.
    ///
    /// A ping is assumed sent as soon as it is returned. A timeout stops the
    /// heartbeat until the next [`start`](Self::start).
    pub fn poll(&mut self, now: Instant) -> Option<Beat> {
        match self.phase {
            Phase::Quiet { ping_at } if ping_at <= now => {
                let id = self.next_id;
                self.next_id += 1;
                self.phase = Phase::AwaitingPong { id, sent_at: now };
                Some(Beat::Ping(id))
            }
            Phase::AwaitingPong { id, sent_at } if sent_at + self.timeout <= now => {
                self.phase = Phase::Stopped;
                Some(Beat::TimedOut {
                    ping_id: id,
                    waited: now - sent_at,
                })
            }
            _ => None,
        }
    }
}

#[cfg(test)]
#[path = "heartbeat_tests.rs"]
mod tests;
