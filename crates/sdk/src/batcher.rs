// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Outbound message batching.
//!
//! Messages are coalesced into send windows. The first message accepted
//! while no window is open starts one; the window is flushed as a single
//! batch `message_send_rate` later. Each window admits at most
//! `maximum_messages` messages and `maximum_size` bytes; anything beyond
//! that is rejected, never deferred to the next window.

use std::time::Duration;

use addin_core::{Batch, ErrorKind, Message, SyncConfig};
use tokio::time::Instant;

/// A message rejected because the current window's quota is used up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: window would hold {size} bytes after {since_window_start:?}")]
pub struct QuotaExceeded {
    /// Either `MessagesSizeLimitExceeded` or `MessageRateLimitExceeded`.
    pub kind: ErrorKind,
    /// Window size in bytes had the message been accepted.
    pub size: usize,
    /// Time since the window opened.
    pub since_window_start: Duration,
}

struct Window {
    opened_at: Instant,
    batch: Batch,
    size: usize,
}

/// Accumulates outbound messages into rate- and size-limited batches.
pub struct OutboundBatcher {
    maximum_messages: usize,
    maximum_size: usize,
    send_rate: Duration,
    window: Option<Window>,
}

impl OutboundBatcher {
    pub fn new(config: &SyncConfig) -> Self {
        OutboundBatcher {
            maximum_messages: config.maximum_messages,
            maximum_size: config.maximum_size,
            send_rate: config.message_send_rate(),
            window: None,
        }
    }

    /// Adds a message to the current window, opening one if needed.
    ///
    /// The message's `time` is overwritten with its offset from the window
    /// start. A window opened by a rejected message stays open and is
    /// flushed (empty) on schedule.
    pub fn enqueue(&mut self, mut message: Message, now: Instant) -> Result<(), QuotaExceeded> {
        let window = self.window.get_or_insert_with(|| Window {
            opened_at: now,
            batch: Batch::new(),
            size: 0,
        });
        let since_window_start = now.saturating_duration_since(window.opened_at);
        let size = window.size + message.wire_size();

        if size > self.maximum_size {
            return Err(QuotaExceeded {
                kind: ErrorKind::MessagesSizeLimitExceeded,
                size,
                since_window_start,
            });
        }
        if window.batch.len() >= self.maximum_messages {
            return Err(QuotaExceeded {
                kind: ErrorKind::MessageRateLimitExceeded,
                size,
                since_window_start,
            });
        }

        message.time = Some(since_window_start.as_millis() as u64);
        window.batch.data.push(message);
        window.size = size;
        Ok(())
    }

    /// When the open window is due to be flushed.
    pub fn flush_deadline(&self) -> Option<Instant> {
        self.window.as_ref().map(|w| w.opened_at + self.send_rate)
    }

    /// Closes the current window and returns its batch.
    pub fn take_batch(&mut self) -> Option<Batch> {
        self.window.take().map(|w| w.batch)
    }

    /// Messages accepted into the open window.
    pub fn pending_len(&self) -> usize {
        self.window.as_ref().map_or(0, |w| w.batch.len())
    }

    /// Bytes accepted into the open window.
    pub fn pending_size(&self) -> usize {
        self.window.as_ref().map_or(0, |w| w.size)
    }
}

#[cfg(test)]
#[path = "batcher_tests.rs"]
mod tests;
