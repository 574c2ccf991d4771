// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Public client facade.

use std::sync::Arc;

use addin_core::{ConnectionState, ErrorKind, InitContext, Message, SyncConfig};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::warn;

use crate::error::{SyncError, SyncResult};
use crate::listener::SyncListener;
use crate::session::{Command, Session};
use crate::transport::{Transport, TransportFactory, WebSocketTransport};

/// Handle to a running sync session.
///
/// Creating a client spawns the session task on the current Tokio runtime.
/// Nothing connects until [`init`](Self::init). Dropping the client ends the
/// session; [`shutdown`](Self::shutdown) does the same and waits for it.
pub struct SyncClient {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    task: JoinHandle<()>,
}

impl SyncClient {
    /// Creates a client that talks to the relay over WebSocket.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn new(config: SyncConfig, listener: impl SyncListener) -> Self {
        Self::with_transport(config, listener, WebSocketTransport::new)
    }

    /// Creates a client whose connect attempts each use a transport from
    /// `factory`.
    pub fn with_transport<F, T>(config: SyncConfig, listener: impl SyncListener, factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
        T: Transport + 'static,
    {
        let factory: TransportFactory = Arc::new(move || Box::new(factory()) as Box<dyn Transport>);
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(ConnectionState::Undefined);
        let session = Session::new(&config, factory, Box::new(listener), commands_rx, state_tx);
        let task = tokio::spawn(session.run());

        SyncClient {
            commands,
            state,
            task,
        }
    }

    /// Joins the session described by `context`.
    ///
    /// Resolves once connected, or with `ConnectionFailed` once every
    /// attempt has failed. Without an `api_host` the client runs locally.
    pub async fn init(&self, context: InitContext) -> SyncResult<()> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::Init { context, reply }, rx).await?
    }

    /// Queues a message for the current send window.
    ///
    /// Never blocks. Quota breaches and send failures are reported through
    /// [`SyncListener::on_error`].
    pub fn send_message(&self, message: Message) {
        if self.commands.send(Command::Send(message)).is_err() {
            warn!("send_message after session ended");
        }
    }

    /// Persists the session context, replacing any earlier value.
    pub async fn store_context(&self, context: impl Into<String>) -> SyncResult<()> {
        let (reply, rx) = oneshot::channel();
        let command = Command::StoreContext {
            context: context.into(),
            reply,
        };
        self.request(command, rx).await?
    }

    /// Fetches the persisted session context; empty if none was stored.
    pub async fn fetch_context(&self) -> SyncResult<String> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::FetchContext { reply }, rx).await?
    }

    /// Current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Waits until the connection reaches `state`.
    ///
    /// Returns immediately if it is already there.
    pub async fn wait_for_state(&self, state: ConnectionState) -> SyncResult<()> {
        let mut rx = self.state.clone();
        rx.wait_for(|s| *s == state)
            .await
            .map(|_| ())
            .map_err(|_| session_ended())
    }

    /// Stops the session and waits for it to finish.
    pub async fn shutdown(self) {
        let (reply, rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown { reply }).is_ok() {
            let _ = rx.await;
        }
        let _ = self.task.await;
    }

    async fn request<T>(&self, command: Command, rx: oneshot::Receiver<T>) -> SyncResult<T> {
        self.commands.send(command).map_err(|_| session_ended())?;
        rx.await.map_err(|_| session_ended())
    }
}

fn session_ended() -> SyncError {
    SyncError::new(ErrorKind::NotInitialized, "sync session has ended")
}
