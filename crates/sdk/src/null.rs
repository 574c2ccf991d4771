// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Transport used when no relay host is configured.

use std::collections::VecDeque;

use addin_core::{ClientMessage, ServerMessage};
use tracing::debug;

use crate::transport::{Transport, TransportFuture};

/// A transport that never leaves the process.
///
/// Connecting always succeeds, every invocation completes successfully,
/// fetched context is empty, and nothing is ever received from peers. It
/// lets an addin run outside a hosted session with the same client API.
#[derive(Debug, Default)]
pub struct NullTransport {
    connected: bool,
    completions: VecDeque<ServerMessage>,
}

impl NullTransport {
    pub fn new() -> Self {
        NullTransport::default()
    }
}

impl Transport for NullTransport {
    fn connect(&mut self, url: &str, _token: &str) -> TransportFuture<'_, ()> {
        debug!(url, "local mode: connect");
        self.connected = true;
        Box::pin(async { Ok(()) })
    }

    fn disconnect(&mut self) -> TransportFuture<'_, ()> {
        self.connected = false;
        self.completions.clear();
        Box::pin(async { Ok(()) })
    }

    fn send(&mut self, msg: ClientMessage) -> TransportFuture<'_, ()> {
        let completion = match msg {
            ClientMessage::SendMessage { id, batch } => {
                debug!(count = batch.len(), "local mode: batch dropped");
                Some(ServerMessage::completed(id))
            }
            ClientMessage::StoreContext { id, .. } => Some(ServerMessage::completed(id)),
            ClientMessage::FetchContext { id } => Some(ServerMessage::completed_with(id, "")),
            ClientMessage::Ping { id } => Some(ServerMessage::pong(id)),
        };
        self.completions.extend(completion);
        Box::pin(async { Ok(()) })
    }

    fn recv(&mut self) -> TransportFuture<'_, Option<ServerMessage>> {
        Box::pin(async move {
            match self.completions.pop_front() {
                Some(msg) => Ok(Some(msg)),
                None => std::future::pending().await,
            }
        })
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

#[cfg(test)]
#[path = "null_tests.rs"]
mod tests;
