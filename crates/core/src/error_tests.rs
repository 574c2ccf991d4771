// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use yare::parameterized;

#[parameterized(
    not_initialized = { ErrorKind::NotInitialized, "NotInitialized" },
    connection_failed = { ErrorKind::ConnectionFailed, "ConnectionFailed" },
    size_limit = { ErrorKind::MessagesSizeLimitExceeded, "MessagesSizeLimitExceeded" },
    rate_limit = { ErrorKind::MessageRateLimitExceeded, "MessageRateLimitExceeded" },
    sent_failed = { ErrorKind::MessageSentFailed, "MessageSentFailed" },
    store_failed = { ErrorKind::PersistContentStoreFailed, "PersistContentStoreFailed" },
    fetch_failed = { ErrorKind::PersistContentFetchFailed, "PersistContentFetchFailed" },
)]
fn error_kind_name(kind: ErrorKind, expected: &str) {
    assert_eq!(kind.to_string(), expected);
    let json = serde_json::to_string(&kind).unwrap();
    assert_eq!(json, format!("\"{expected}\""));
}

#[test]
fn quota_kinds() {
    assert!(ErrorKind::MessagesSizeLimitExceeded.is_quota());
    assert!(ErrorKind::MessageRateLimitExceeded.is_quota());
    assert!(!ErrorKind::MessageSentFailed.is_quota());
    assert!(!ErrorKind::ConnectionFailed.is_quota());
}

#[test]
fn error_invalid_config_display() {
    let err = Error::InvalidConfig("maximum_messages must be at least 1".into());
    assert!(err.to_string().contains("maximum_messages"));
}

#[test]
fn error_from_io() {
    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
    let err: Error = io_err.into();
    assert!(matches!(err, Error::Io(_)));
}

#[test]
fn error_from_json() {
    let json_err = serde_json::from_str::<()>("invalid").unwrap_err();
    let err: Error = json_err.into();
    assert!(matches!(err, Error::Json(_)));
}
