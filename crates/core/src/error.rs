// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for addin-core operations.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error codes reported to the host application through its error handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// An API was used before a session was established.
    NotInitialized,
    /// The retry budget was exhausted while connecting or reconnecting.
    ConnectionFailed,
    /// The outbound window has no room left for the message's bytes.
    MessagesSizeLimitExceeded,
    /// The outbound window already holds the maximum number of messages.
    MessageRateLimitExceeded,
    /// The remote call carrying a flushed batch failed.
    MessageSentFailed,
    /// Persisting the session context failed.
    PersistContentStoreFailed,
    /// Fetching the persisted session context failed.
    PersistContentFetchFailed,
}

impl ErrorKind {
    /// Returns the code name as exposed to hosts.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotInitialized => "NotInitialized",
            ErrorKind::ConnectionFailed => "ConnectionFailed",
            ErrorKind::MessagesSizeLimitExceeded => "MessagesSizeLimitExceeded",
            ErrorKind::MessageRateLimitExceeded => "MessageRateLimitExceeded",
            ErrorKind::MessageSentFailed => "MessageSentFailed",
            ErrorKind::PersistContentStoreFailed => "PersistContentStoreFailed",
            ErrorKind::PersistContentFetchFailed => "PersistContentFetchFailed",
        }
    }

    /// Returns true for quota breaches, which drop a single message.
    pub fn is_quota(&self) -> bool {
        matches!(
            self,
            ErrorKind::MessagesSizeLimitExceeded | ErrorKind::MessageRateLimitExceeded
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// All possible errors that can occur in addin-core operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized Result type for addin-core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
