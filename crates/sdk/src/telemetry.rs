// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Telemetry events.
//!
//! Events are logged under the `addin_sdk::telemetry` target and handed to
//! [`SyncListener::on_telemetry`](crate::SyncListener::on_telemetry) so the
//! host can forward them to its own telemetry pipeline.

use std::time::Duration;

/// Name of the event emitted when the relay connection drops unexpectedly.
pub const HUB_DISCONNECTED: &str = "sync_hub_disconnected";
/// Name of the event emitted on a window byte-quota breach.
pub const HUB_SIZE_LIMIT: &str = "sync_hub_size_limit";
/// Name of the event emitted on a window message-count breach.
pub const HUB_QUEUE_LIMIT: &str = "sync_hub_queue_limit";
/// Name of the event emitted when a flushed batch fails to send.
pub const HUB_MESSAGE_SEND_FAILED: &str = "sync_hub_message_send_failed";

/// A named telemetry event with string-valued data points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryEvent {
    pub name: &'static str,
    pub data: Vec<(String, String)>,
}

impl TelemetryEvent {
    /// Creates an event without data.
    pub fn new(name: &'static str) -> Self {
        TelemetryEvent {
            name,
            data: Vec::new(),
        }
    }

    /// Appends a data point.
    pub fn with(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.data.push((name.into(), value.to_string()));
        self
    }

    /// Looks up a data point by name.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.data
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn hub_disconnected(url: &str) -> Self {
        TelemetryEvent::new(HUB_DISCONNECTED).with("url", url)
    }

    pub fn size_limit(size: usize, since_last_send: Duration) -> Self {
        TelemetryEvent::new(HUB_SIZE_LIMIT)
            .with("size", size)
            .with("since_last_send", since_last_send.as_millis())
    }

    pub fn queue_limit(since_last_send: Duration) -> Self {
        TelemetryEvent::new(HUB_QUEUE_LIMIT).with("since_last_send", since_last_send.as_millis())
    }

    pub fn message_send_failed(exception: &str) -> Self {
        TelemetryEvent::new(HUB_MESSAGE_SEND_FAILED).with("exception", exception)
    }

    pub(crate) fn log(&self) {
        tracing::info!(target: "addin_sdk::telemetry", event = self.name, data = ?self.data);
    }
}

#[cfg(test)]
#[path = "telemetry_tests.rs"]
mod tests;
