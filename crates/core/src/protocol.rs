// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket protocol messages for SDK-relay communication.
//!
//! The protocol is simple:
//! - Client invokes remote calls, each tagged with an invocation id
//! - Relay answers every invocation with exactly one completion
//! - Relay pushes batches from other session members and migration requests

use serde::{Deserialize, Serialize};

use crate::message::Batch;

/// Messages sent from client to relay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Deliver a batch to the other members of the session.
    SendMessage {
        /// Invocation id echoed in the completion.
        id: u64,
        batch: Batch,
    },

    /// Persist the session context, replacing any previous value.
    StoreContext {
        /// Invocation id echoed in the completion.
        id: u64,
        context: String,
    },

    /// Fetch the persisted session context.
    FetchContext {
        /// Invocation id echoed in the completion.
        id: u64,
    },

    /// Ping message for keepalive.
    Ping {
        /// Client-chosen ID echoed in Pong.
        id: u64,
    },
}

/// Messages sent from relay to client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A stamped batch from another member of the session.
    MessageReceived(Batch),

    /// Outcome of an invocation.
    Completion {
        /// Id of the invocation this completes.
        id: u64,
        /// Return value, if the call has one.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<String>,
        /// Failure description; absent on success.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Reconnect to another relay endpoint.
    Migrate {
        /// Endpoint the client should connect to instead.
        url: String,
    },

    /// Pong response to client Ping.
    Pong {
        /// Echoed from the Ping message.
        id: u64,
    },

    /// Error message.
    Error {
        /// Human-readable error description.
        message: String,
    },
}

impl ClientMessage {
    /// Creates a SendMessage invocation.
    pub fn send_message(id: u64, batch: Batch) -> Self {
        ClientMessage::SendMessage { id, batch }
    }

    /// Creates a StoreContext invocation.
    pub fn store_context(id: u64, context: impl Into<String>) -> Self {
        ClientMessage::StoreContext {
            id,
            context: context.into(),
        }
    }

    /// Creates a FetchContext invocation.
    pub fn fetch_context(id: u64) -> Self {
        ClientMessage::FetchContext { id }
    }

    /// Creates a Ping message.
    pub fn ping(id: u64) -> Self {
        ClientMessage::Ping { id }
    }

    /// Returns the invocation id, if this message expects a completion.
    pub fn invocation_id(&self) -> Option<u64> {
        match self {
            ClientMessage::SendMessage { id, .. }
            | ClientMessage::StoreContext { id, .. }
            | ClientMessage::FetchContext { id } => Some(*id),
            ClientMessage::Ping { .. } => None,
        }
    }

    /// Serializes the message to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes the message from JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Creates a MessageReceived message.
    pub fn message_received(batch: Batch) -> Self {
        ServerMessage::MessageReceived(batch)
    }

    /// Creates a successful Completion without a return value.
    pub fn completed(id: u64) -> Self {
        ServerMessage::Completion {
            id,
            result: None,
            error: None,
        }
    }

    /// Creates a successful Completion carrying a return value.
    pub fn completed_with(id: u64, result: impl Into<String>) -> Self {
        ServerMessage::Completion {
            id,
            result: Some(result.into()),
            error: None,
        }
    }

    /// Creates a failed Completion.
    pub fn failed(id: u64, error: impl Into<String>) -> Self {
        ServerMessage::Completion {
            id,
            result: None,
            error: Some(error.into()),
        }
    }

    /// Creates a Migrate message.
    pub fn migrate(url: impl Into<String>) -> Self {
        ServerMessage::Migrate { url: url.into() }
    }

    /// Creates a Pong message.
    pub fn pong(id: u64) -> Self {
        ServerMessage::Pong { id }
    }

    /// Creates an Error message.
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    /// Serializes the message to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes the message from JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
