// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Session initialization context.
//!
//! The host negotiates these values with the addin before any messages
//! flow. When `api_host` is absent the SDK runs in local development mode
//! with no relay.

use serde::{Deserialize, Serialize};

/// Path segment under which the relay serves addin sessions.
pub const HUB_PATH: &str = "addins";

/// A named configuration or setting value supplied by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationValue {
    pub name: String,
    pub value: String,
}

/// Everything the SDK needs to join an addin session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitContext {
    /// Base URL of the relay (e.g. `wss://relay.example`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_host: Option<String>,
    /// Authorization token presented to the relay.
    #[serde(default)]
    pub token: String,
    /// Session shared by every user collaborating in the addin.
    pub addin_session_id: String,
    /// Hashed id of this user within the addin session.
    #[serde(default)]
    pub addin_session_user_id: String,
    /// Meeting under which the addin is running.
    #[serde(default)]
    pub session_id: String,
    /// Origin whose frame messages are accepted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    /// Per-meeting configuration values.
    #[serde(default)]
    pub configuration: Vec<ConfigurationValue>,
    /// Tenant-level settings.
    #[serde(default)]
    pub settings: Vec<ConfigurationValue>,
}

impl InitContext {
    /// Creates a context suitable for local addin development.
    ///
    /// Not for production use: real hosts supply the token and ids.
    pub fn development(addin_session_id: impl Into<String>, api_host: Option<String>) -> Self {
        InitContext {
            api_host,
            addin_session_id: addin_session_id.into(),
            ..InitContext::default()
        }
    }

    /// URL of the relay hub for this session, or `None` in local mode.
    pub fn hub_url(&self) -> Option<String> {
        self.api_host.as_deref().map(|host| {
            format!(
                "{}/{}/{}",
                host.trim_end_matches('/'),
                HUB_PATH,
                self.addin_session_id
            )
        })
    }

    /// Looks up a per-meeting configuration value by name.
    pub fn configuration_value(&self, name: &str) -> Option<&str> {
        find_value(&self.configuration, name)
    }

    /// Looks up a tenant setting by name.
    pub fn setting(&self, name: &str) -> Option<&str> {
        find_value(&self.settings, name)
    }
}

fn find_value<'a>(values: &'a [ConfigurationValue], name: &str) -> Option<&'a str> {
    values
        .iter()
        .find(|v| v.name == name)
        .map(|v| v.value.as_str())
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
