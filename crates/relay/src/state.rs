// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Relay state management.
//!
//! Connections are grouped by addin session. Each group has its own
//! broadcast channel and persisted context.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};

use addin_core::{Batch, ClockSource, ServerMessage};

/// Group used when the request path names none.
pub const DEFAULT_GROUP: &str = "default";

/// Startup options for the relay.
#[derive(Debug, Clone, Default)]
pub struct RelayOptions {
    /// Bearer token clients must present; any client is accepted when unset.
    pub token: Option<String>,
    /// Relay base URL every new connection is migrated to.
    pub redirect_to: Option<String>,
}

/// A message fanned out within a group, tagged with its sender.
#[derive(Debug, Clone)]
pub struct Relayed {
    pub from: u64,
    pub message: ServerMessage,
}

/// A connection's membership in a group.
pub struct Member {
    pub id: u64,
    pub group: String,
    pub rx: broadcast::Receiver<Relayed>,
}

struct Group {
    broadcast_tx: broadcast::Sender<Relayed>,
    context: Option<String>,
    members: usize,
}

impl Group {
    fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Group {
            broadcast_tx,
            context: None,
            members: 0,
        }
    }
}

/// Shared relay state.
#[derive(Clone)]
pub struct RelayState {
    inner: Arc<RelayStateInner>,
}

struct RelayStateInner {
    options: RelayOptions,
    clock: Arc<dyn ClockSource>,
    /// A group outlives its last member only while it holds context.
    groups: Mutex<HashMap<String, Group>>,
    next_id: AtomicU64,
}

impl RelayState {
    pub fn new(options: RelayOptions, clock: Arc<dyn ClockSource>) -> Self {
        RelayState {
            inner: Arc::new(RelayStateInner {
                options,
                clock,
                groups: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn options(&self) -> &RelayOptions {
        &self.inner.options
    }

    /// Checks an `Authorization` header value against the configured token.
    pub fn authorize(&self, header: Option<&str>) -> bool {
        match &self.inner.options.token {
            None => true,
            Some(token) => header.and_then(|h| h.strip_prefix("Bearer ")) == Some(token.as_str()),
        }
    }

    /// Adds a connection to a group, creating the group if needed.
    pub async fn join(&self, group: &str) -> Member {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let mut groups = self.inner.groups.lock().await;
        let entry = groups.entry(group.to_string()).or_insert_with(Group::new);
        entry.members += 1;
        Member {
            id,
            group: group.to_string(),
            rx: entry.broadcast_tx.subscribe(),
        }
    }

    /// Removes a connection, dropping its group once nothing is left in it.
    pub async fn leave(&self, member: &Member) {
        let mut groups = self.inner.groups.lock().await;
        let Some(group) = groups.get_mut(&member.group) else {
            return;
        };
        group.members = group.members.saturating_sub(1);
        if group.members == 0 && group.context.is_none() {
            groups.remove(&member.group);
        }
    }

    /// Stamps a batch with the relay clock and forwards it to the other
    /// members of the group.
    ///
    /// Returns the number of members it was forwarded to.
    pub async fn publish(&self, member: &Member, mut batch: Batch) -> usize {
        batch.server_time_stamp = Some(self.inner.clock.now_ms());
        let groups = self.inner.groups.lock().await;
        let Some(group) = groups.get(&member.group) else {
            return 0;
        };
        let relayed = Relayed {
            from: member.id,
            message: ServerMessage::message_received(batch),
        };
        // Err means no subscribers, which cannot include the sender's own
        match group.broadcast_tx.send(relayed) {
            Ok(receivers) => receivers.saturating_sub(1),
            Err(_) => 0,
        }
    }

    pub async fn store_context(&self, group: &str, context: String) {
        let mut groups = self.inner.groups.lock().await;
        groups
            .entry(group.to_string())
            .or_insert_with(Group::new)
            .context = Some(context);
    }

    /// The group's context, empty if none was stored.
    pub async fn fetch_context(&self, group: &str) -> String {
        let groups = self.inner.groups.lock().await;
        groups
            .get(group)
            .and_then(|g| g.context.clone())
            .unwrap_or_default()
    }

    /// Groups currently held in memory.
    pub async fn group_count(&self) -> usize {
        self.inner.groups.lock().await.len()
    }

    /// Connections currently in a group.
    pub async fn member_count(&self, group: &str) -> usize {
        let groups = self.inner.groups.lock().await;
        groups.get(group).map_or(0, |g| g.members)
    }
}

/// Derives the group name from a request path: its last non-empty segment.
pub fn group_name(path: &str) -> &str {
    path.rsplit('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or(DEFAULT_GROUP)
}
