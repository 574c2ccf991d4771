// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Inbound playback scheduling.
//!
//! Each received message is placed on the sender's timeline at
//! `serverTimeStamp + time` and held in a buffer ordered by that absolute
//! time. Playback releases messages in order, reproducing the original
//! gaps between them relative to the moment delivery happens rather than
//! the wall clock of the sender.

use std::collections::BTreeMap;
use std::time::Duration;

use addin_core::{Batch, Message};
use tokio::time::Instant;

/// A received message positioned on the sender's timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledIncoming {
    /// Absolute time in milliseconds since Unix epoch.
    pub time: i64,
    pub message: Message,
}

/// Time-ordered buffer that replays inbound messages with their original
/// spacing.
pub struct InboundScheduler {
    // Keyed by (absolute time, arrival sequence) so equal times keep arrival order.
    buffer: BTreeMap<(i64, u64), Message>,
    arrivals: u64,
    last_anchor: Option<i64>,
    wake_at: Option<Instant>,
    catch_up: Option<Duration>,
}

impl InboundScheduler {
    pub fn new(catch_up: Option<Duration>) -> Self {
        InboundScheduler {
            buffer: BTreeMap::new(),
            arrivals: 0,
            last_anchor: None,
            wake_at: None,
            catch_up,
        }
    }

    /// Buffers every message of a received batch.
    ///
    /// A batch without a stamp is placed relative to the most recent anchor
    /// seen (or the epoch if none has been seen). If playback was idle it is
    /// scheduled to start immediately.
    pub fn receive(&mut self, batch: Batch, now: Instant) {
        let was_idle = self.buffer.is_empty();
        if let Some(stamp) = batch.server_time_stamp {
            self.last_anchor = Some(stamp);
        }
        let anchor = self.last_anchor.unwrap_or(0);

        for message in batch.data {
            let offset = message.time.map_or(0, |t| i64::try_from(t).unwrap_or(i64::MAX));
            let key = (anchor.saturating_add(offset), self.arrivals);
            self.arrivals += 1;
            self.buffer.insert(key, message);
        }

        if was_idle && !self.buffer.is_empty() {
            self.wake_at = Some(now);
        }
    }

    /// When playback next needs to run.
    pub fn next_wake(&self) -> Option<Instant> {
        self.wake_at
    }

    /// Number of buffered messages.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Delivers every message that is due at `now`.
    ///
    /// After each delivery the gap to the next buffered message decides
    /// whether it follows immediately (gap of zero or less) or is scheduled
    /// that many milliseconds after `now`. Returns how many were delivered.
    pub fn deliver_due(&mut self, now: Instant, mut deliver: impl FnMut(Message)) -> usize {
        let mut delivered = 0;
        while self.wake_at.is_some_and(|at| at <= now) {
            let Some(next) = self.pop() else {
                self.wake_at = None;
                break;
            };
            let mut message = next.message;
            // Offsets are meaningless once the anchor is gone.
            message.time = None;
            deliver(message);
            delivered += 1;
            self.wake_at = self.wake_after(next.time, now);
        }
        delivered
    }

    fn pop(&mut self) -> Option<ScheduledIncoming> {
        self.buffer
            .pop_first()
            .map(|((time, _), message)| ScheduledIncoming { time, message })
    }

    fn wake_after(&self, delivered: i64, now: Instant) -> Option<Instant> {
        let (&(next, _), _) = self.buffer.first_key_value()?;

        if let (Some(bound), Some((&(newest, _), _))) = (self.catch_up, self.buffer.last_key_value())
        {
            let backlog = newest.saturating_sub(delivered);
            if backlog > 0 && backlog as u128 > bound.as_millis() {
                return Some(now);
            }
        }

        let gap = next.saturating_sub(delivered);
        if gap <= 0 {
            Some(now)
        } else {
            Some(now + Duration::from_millis(gap as u64))
        }
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
