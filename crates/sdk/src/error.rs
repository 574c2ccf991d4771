// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Errors reported to the host application.

use std::fmt;

use addin_core::ErrorKind;

/// An error code plus optional detail, as delivered to the host's error
/// handler and returned from fallible client calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncError {
    /// Host-facing error code.
    pub kind: ErrorKind,
    /// Underlying cause, when there is one.
    pub detail: Option<String>,
}

impl SyncError {
    /// Creates an error carrying detail text.
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        SyncError {
            kind,
            detail: Some(detail.into()),
        }
    }

    /// Creates an error with only a code.
    pub fn bare(kind: ErrorKind) -> Self {
        SyncError { kind, detail: None }
    }
}

impl From<ErrorKind> for SyncError {
    fn from(kind: ErrorKind) -> Self {
        SyncError::bare(kind)
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{}: {}", self.kind, detail),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for SyncError {}

/// Result type for sync client operations.
pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
