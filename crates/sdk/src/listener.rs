// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Host callbacks.

use addin_core::{ConnectionState, Message};
use tokio::sync::mpsc;

use crate::error::SyncError;
use crate::telemetry::TelemetryEvent;

/// Receives messages, state changes, errors, and telemetry from a
/// [`SyncClient`](crate::SyncClient).
///
/// All callbacks run on the session task, one at a time, in the order the
/// events happened. They should return quickly.
pub trait SyncListener: Send + 'static {
    /// A peer message whose playback time has come.
    fn on_message(&mut self, _message: Message) {}

    /// The connection state changed.
    fn on_connection_state(&mut self, _state: ConnectionState) {}

    fn on_error(&mut self, _error: &SyncError) {}

    fn on_telemetry(&mut self, _event: &TelemetryEvent) {}
}

/// Listener that ignores everything.
#[derive(Debug, Default)]
pub struct NoopListener;

impl SyncListener for NoopListener {}

/// One callback, as forwarded by [`ChannelListener`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    Message(Message),
    ConnectionState(ConnectionState),
    Error(SyncError),
    Telemetry(TelemetryEvent),
}

/// Forwards every callback over an unbounded channel.
///
/// Useful for hosts that prefer to consume events from their own task.
#[derive(Debug)]
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<SyncEvent>,
}

impl ChannelListener {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SyncEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ChannelListener { tx }, rx)
    }

    fn forward(&self, event: SyncEvent) {
        // Receiver gone means the host stopped listening
        let _ = self.tx.send(event);
    }
}

impl SyncListener for ChannelListener {
    fn on_message(&mut self, message: Message) {
        self.forward(SyncEvent::Message(message));
    }

    fn on_connection_state(&mut self, state: ConnectionState) {
        self.forward(SyncEvent::ConnectionState(state));
    }

    fn on_error(&mut self, error: &SyncError) {
        self.forward(SyncEvent::Error(error.clone()));
    }

    fn on_telemetry(&mut self, event: &TelemetryEvent) {
        self.forward(SyncEvent::Telemetry(event.clone()));
    }
}

/// Fans each callback out to several listeners in registration order.
#[derive(Default)]
pub struct Listeners {
    listeners: Vec<Box<dyn SyncListener>>,
}

impl Listeners {
    pub fn new() -> Self {
        Listeners::default()
    }

    /// Adds a listener after the existing ones.
    pub fn push(&mut self, listener: impl SyncListener) {
        self.listeners.push(Box::new(listener));
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl SyncListener for Listeners {
    fn on_message(&mut self, message: Message) {
        if let Some((last, rest)) = self.listeners.split_last_mut() {
            for listener in rest {
                listener.on_message(message.clone());
            }
            last.on_message(message);
        }
    }

    fn on_connection_state(&mut self, state: ConnectionState) {
        for listener in &mut self.listeners {
            listener.on_connection_state(state);
        }
    }

    fn on_error(&mut self, error: &SyncError) {
        for listener in &mut self.listeners {
            listener.on_error(error);
        }
    }

    fn on_telemetry(&mut self, event: &TelemetryEvent) {
        for listener in &mut self.listeners {
            listener.on_telemetry(event);
        }
    }
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;
