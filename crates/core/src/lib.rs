// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! addin-core: Shared library for the addin synchronization SDK
//!
//! This crate provides the message data model, the relay wire protocol,
//! configuration, and error codes used by both the SDK and the relay.

pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod message;
pub mod protocol;

pub use clock::{ClockSource, ManualClock, SystemClock};
pub use config::SyncConfig;
pub use context::{ConfigurationValue, InitContext};
pub use error::{Error, ErrorKind, Result};
pub use message::{Batch, ConnectionState, Message, MESSAGE_OVERHEAD};
pub use protocol::{ClientMessage, ServerMessage};
