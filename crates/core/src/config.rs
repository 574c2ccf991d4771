// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Synchronization tunables.
//!
//! Configuration can be built in code or loaded from a TOML file. Every
//! field is optional in the file and falls back to its default:
//! - `maximum_messages`: messages accepted per send window (default: 200)
//! - `maximum_size`: bytes accepted per send window (default: 128 KiB)
//! - `message_send_rate_ms`: send window length (default: 200)
//! - `maximum_connection_attempts`: attempts per connect episode (default: 5)
//! - `connection_retry_delay_ms`: wait between attempts (default: 1000)
//! - `playback_catch_up_ms`: optional playback lag bound (default: off)
//! - `heartbeat_interval_ms`: quiet time before a keepalive ping (default: 30000, 0 = disabled)
//! - `heartbeat_timeout_ms`: wait for the relay to answer a ping (default: 10000)

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

/// Synchronization configuration shared by the batcher, scheduler, and
/// connection lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Maximum number of messages accepted in one send window.
    #[serde(default = "default_maximum_messages")]
    pub maximum_messages: usize,
    /// Maximum accumulated message size in bytes per send window.
    #[serde(default = "default_maximum_size")]
    pub maximum_size: usize,
    /// Send window length and flush interval in milliseconds.
    #[serde(default = "default_message_send_rate_ms")]
    pub message_send_rate_ms: u64,
    /// Connect attempts before a connect episode fails.
    #[serde(default = "default_maximum_connection_attempts")]
    pub maximum_connection_attempts: u32,
    /// Delay between failed connect attempts in milliseconds.
    #[serde(default = "default_connection_retry_delay_ms")]
    pub connection_retry_delay_ms: u64,
    /// When set, playback stops pacing once the buffered backlog spans more
    /// than this many milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playback_catch_up_ms: Option<u64>,
    /// Heartbeat ping interval in milliseconds. 0 = disabled.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Max time to wait for a pong in milliseconds before the connection is
    /// treated as lost.
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,
}

fn default_maximum_messages() -> usize {
    200
}

fn default_maximum_size() -> usize {
    128 * 1024
}

fn default_message_send_rate_ms() -> u64 {
    200
}

fn default_maximum_connection_attempts() -> u32 {
    5
}

fn default_connection_retry_delay_ms() -> u64 {
    1000
}

fn default_heartbeat_interval_ms() -> u64 {
    30_000
}

fn default_heartbeat_timeout_ms() -> u64 {
    10_000
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            maximum_messages: default_maximum_messages(),
            maximum_size: default_maximum_size(),
            message_send_rate_ms: default_message_send_rate_ms(),
            maximum_connection_attempts: default_maximum_connection_attempts(),
            connection_retry_delay_ms: default_connection_retry_delay_ms(),
            playback_catch_up_ms: None,
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
        }
    }
}

impl SyncConfig {
    /// Loads and validates configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parses and validates configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: SyncConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings that would make the SDK unable to send or connect.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.maximum_messages == 0 {
            return Err(Error::InvalidConfig(
                "maximum_messages must be at least 1".to_string(),
            ));
        }
        if self.maximum_size == 0 {
            return Err(Error::InvalidConfig(
                "maximum_size must be at least 1".to_string(),
            ));
        }
        if self.message_send_rate_ms == 0 {
            return Err(Error::InvalidConfig(
                "message_send_rate_ms must be at least 1".to_string(),
            ));
        }
        if self.maximum_connection_attempts == 0 {
            return Err(Error::InvalidConfig(
                "maximum_connection_attempts must be at least 1".to_string(),
            ));
        }
        if self.heartbeat_interval_ms > 0 && self.heartbeat_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "heartbeat_timeout_ms must be at least 1 when heartbeats are enabled".to_string(),
            ));
        }
        Ok(())
    }

    /// Send window length.
    pub fn message_send_rate(&self) -> Duration {
        Duration::from_millis(self.message_send_rate_ms)
    }

    /// Delay between failed connect attempts.
    pub fn connection_retry_delay(&self) -> Duration {
        Duration::from_millis(self.connection_retry_delay_ms)
    }

    /// Playback lag bound, if enabled.
    pub fn playback_catch_up(&self) -> Option<Duration> {
        self.playback_catch_up_ms.map(Duration::from_millis)
    }

    /// Keepalive ping interval, or `None` when heartbeats are disabled.
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        (self.heartbeat_interval_ms > 0).then(|| Duration::from_millis(self.heartbeat_interval_ms))
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
