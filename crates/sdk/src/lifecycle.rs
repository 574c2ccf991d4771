// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Connection lifecycle with bounded retry.
//!
//! State machine:
//! ```text
//! Undefined -> Connecting -> Connected -> Disconnected -> Connecting -> ...
//!                  |                                          |
//!                  +-- retries exhausted --> Disconnected <---+
//! ```
//!
//! This type only decides; the session task performs the connects and
//! timers it asks for. Every attempt carries a sequence number so results
//! from attempts that were superseded (by a new init, a migration, or
//! shutdown) are recognised and discarded.

use std::time::Duration;

use addin_core::{ConnectionState, SyncConfig};
use tokio::time::Instant;

/// Relay address and credentials for a connect episode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub url: String,
    pub token: String,
}

/// A connect attempt the caller must start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub seq: u64,
    pub endpoint: Endpoint,
    /// Failed attempts so far in this episode.
    pub failures: u32,
    /// Migration attempts do not count against the retry budget.
    pub forced: bool,
}

/// What to do after an attempt finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The connection is up.
    Connected,
    /// Call [`ConnectionLifecycle::retry_due`] at this instant.
    RetryAt(Instant),
    /// The retry budget is spent; the lifecycle is now `Disconnected`.
    Exhausted { attempts: u32 },
    /// The attempt was superseded and its result must be ignored.
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Attempting { seq: u64, forced: bool },
    Waiting { until: Instant },
}

/// Tracks connection state and the retry budget of the current episode.
#[derive(Debug)]
pub struct ConnectionLifecycle {
    max_attempts: u32,
    retry_delay: Duration,
    state: ConnectionState,
    endpoint: Option<Endpoint>,
    failures: u32,
    phase: Phase,
    next_seq: u64,
}

impl ConnectionLifecycle {
    pub fn new(config: &SyncConfig) -> Self {
        ConnectionLifecycle {
            max_attempts: config.maximum_connection_attempts.max(1),
            retry_delay: config.connection_retry_delay(),
            state: ConnectionState::Undefined,
            endpoint: None,
            failures: 0,
            phase: Phase::Idle,
            next_seq: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }

    /// Failed attempts in the current episode.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// True while an attempt is in flight or a retry is pending.
    pub fn is_busy(&self) -> bool {
        self.phase != Phase::Idle
    }

    /// When the pending retry is due.
    pub fn retry_deadline(&self) -> Option<Instant> {
        match self.phase {
            Phase::Waiting { until } => Some(until),
            _ => None,
        }
    }

    /// Starts a new connect episode, superseding anything in progress.
    pub fn connect(&mut self, endpoint: Endpoint) -> Attempt {
        self.endpoint = Some(endpoint.clone());
        self.failures = 0;
        self.start(endpoint, false)
    }

    /// Records the outcome of an attempt.
    pub fn on_attempt_result(&mut self, seq: u64, succeeded: bool, now: Instant) -> Outcome {
        let forced = match self.phase {
            Phase::Attempting { seq: current, forced } if current == seq => forced,
            _ => return Outcome::Stale,
        };

        if succeeded {
            self.state = ConnectionState::Connected;
            self.failures = 0;
            self.phase = Phase::Idle;
            return Outcome::Connected;
        }

        if !forced {
            self.failures += 1;
        }
        if self.failures >= self.max_attempts {
            self.state = ConnectionState::Disconnected;
            self.phase = Phase::Idle;
            return Outcome::Exhausted {
                attempts: self.failures,
            };
        }

        let until = now + self.retry_delay;
        self.phase = Phase::Waiting { until };
        Outcome::RetryAt(until)
    }

    /// Starts the pending retry if it is due.
    pub fn retry_due(&mut self, now: Instant) -> Option<Attempt> {
        match self.phase {
            Phase::Waiting { until } if until <= now => {
                let endpoint = self.endpoint.clone()?;
                Some(self.start(endpoint, false))
            }
            _ => None,
        }
    }

    /// Records that an established connection was lost.
    ///
    /// Returns false if there was no established connection, in which case
    /// nothing changes.
    pub fn on_closed(&mut self) -> bool {
        if self.state != ConnectionState::Connected || self.is_busy() {
            return false;
        }
        self.state = ConnectionState::Disconnected;
        true
    }

    /// Starts a reconnect episode after [`on_closed`](Self::on_closed).
    ///
    /// Returns `None` if an episode is already running or there is nothing
    /// to reconnect to.
    pub fn reconnect(&mut self) -> Option<Attempt> {
        if self.state != ConnectionState::Disconnected || self.is_busy() {
            return None;
        }
        let endpoint = self.endpoint.clone()?;
        self.failures = 0;
        Some(self.start(endpoint, false))
    }

    /// Moves to a new relay address immediately.
    ///
    /// The migration attempt itself is not counted; if it fails, the
    /// ordinary retry loop takes over against the new address.
    pub fn migrate(&mut self, url: String) -> Option<Attempt> {
        let endpoint = self.endpoint.as_mut()?;
        endpoint.url = url;
        let endpoint = endpoint.clone();
        Some(self.start(endpoint, true))
    }

    /// Stops everything; in-flight attempts become stale.
    pub fn shutdown(&mut self) {
        self.phase = Phase::Idle;
        self.endpoint = None;
        if self.state != ConnectionState::Undefined {
            self.state = ConnectionState::Disconnected;
        }
    }

    fn start(&mut self, endpoint: Endpoint, forced: bool) -> Attempt {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.phase = Phase::Attempting { seq, forced };
        self.state = ConnectionState::Connecting;
        Attempt {
            seq,
            endpoint,
            failures: self.failures,
            forced,
        }
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
