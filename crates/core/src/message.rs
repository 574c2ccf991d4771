// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Messages, batches, and connection state.
//!
//! A [`Message`] is the unit the host sends and receives. Outbound messages
//! are coalesced into a [`Batch`] per send window; the relay stamps each
//! batch with a single `serverTimeStamp` anchor, and every message `time`
//! is an offset from that anchor.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Fixed envelope cost charged per message against the window byte quota.
pub const MESSAGE_OVERHEAD: usize = 32;

/// A single addin message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Application-defined message type.
    #[serde(rename = "type")]
    pub kind: String,
    /// Opaque application payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    /// Offset in milliseconds from the start of the send window.
    ///
    /// Only meaningful relative to the `serverTimeStamp` of the batch that
    /// carried it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<u64>,
}

impl Message {
    /// Creates a message without a payload.
    pub fn new(kind: impl Into<String>) -> Self {
        Message {
            kind: kind.into(),
            payload: None,
            time: None,
        }
    }

    /// Creates a message carrying a payload.
    pub fn with_payload(kind: impl Into<String>, payload: impl Into<String>) -> Self {
        Message {
            kind: kind.into(),
            payload: Some(payload.into()),
            time: None,
        }
    }

    /// Size this message contributes to a window's byte quota.
    ///
    /// The payload is measured as its URI percent-encoded length with each
    /// escaped octet counted once, which is its UTF-8 byte length.
    pub fn wire_size(&self) -> usize {
        MESSAGE_OVERHEAD + self.payload.as_ref().map_or(0, |p| p.len())
    }
}

/// A group of messages sent in one relay call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    /// Relay receipt time in milliseconds since Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_time_stamp: Option<i64>,
    /// Messages in enqueue order.
    #[serde(default)]
    pub data: Vec<Message>,
}

impl Batch {
    /// Creates an empty, unstamped batch.
    pub fn new() -> Self {
        Batch::default()
    }

    /// Creates a batch stamped with the given anchor.
    pub fn stamped(server_time_stamp: i64, data: Vec<Message>) -> Self {
        Batch {
            server_time_stamp: Some(server_time_stamp),
            data,
        }
    }

    /// Number of messages in the batch.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the batch holds no messages.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Connection state reported to the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    #[default]
    Undefined,
    Connecting,
    Connected,
    Disconnected,
}

impl ConnectionState {
    /// Returns true if messages can currently reach the relay.
    pub fn is_connected(&self) -> bool {
        *self == ConnectionState::Connected
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Undefined => "undefined",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
