// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! addin-sdk: real-time message sync for collaborative addins.
//!
//! Every participant of an addin session runs a [`SyncClient`]. Messages
//! the host sends are coalesced into rate-limited batches and delivered to
//! the other participants through a relay; received messages are replayed
//! with the spacing they were originally sent with.
//!
//! ```text
//!  host ── send_message ──► OutboundBatcher ── batch per window ──┐
//!                                                                 ▼
//!  host ◄── on_message ──── InboundScheduler ◄── stamped batches ─ relay
//!                                                                 ▲
//!                 ConnectionLifecycle (connect, retry, migrate) ──┘
//! ```

pub mod batcher;
mod client;
mod error;
mod heartbeat;
pub mod lifecycle;
mod listener;
mod null;
pub mod scheduler;
mod session;
pub mod telemetry;
mod transport;

pub use addin_core::{
    Batch, ConfigurationValue, ConnectionState, ErrorKind, InitContext, Message, SyncConfig,
};
pub use batcher::{OutboundBatcher, QuotaExceeded};
pub use client::SyncClient;
pub use error::{SyncError, SyncResult};
pub use lifecycle::ConnectionLifecycle;
pub use listener::{ChannelListener, Listeners, NoopListener, SyncEvent, SyncListener};
pub use null::NullTransport;
pub use scheduler::{InboundScheduler, ScheduledIncoming};
pub use telemetry::TelemetryEvent;
pub use transport::{
    Transport, TransportError, TransportFuture, TransportResult, WebSocketTransport,
};

#[cfg(test)]
mod client_tests;
