// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The session task.
//!
//! One task owns the batcher, the playback scheduler, the connection
//! lifecycle, and the live transport. Everything that touches them arrives
//! as an event on a single `select!` loop:
//! - host commands from [`SyncClient`](crate::SyncClient)
//! - results of connect attempts, which run in their own tasks so the loop
//!   stays responsive while connecting
//! - frames from the relay
//! - the flush, playback, heartbeat, and retry timers
//!
//! Timers are polled ahead of relay frames so a burst of inbound traffic
//! cannot hold back flushes or playback.
//!
//! Serialising on one task is what keeps the state machines free of locks.

use std::collections::HashMap;
use std::ops::ControlFlow;

use addin_core::{
    ClientMessage, ConnectionState, ErrorKind, InitContext, Message, ServerMessage, SyncConfig,
};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::batcher::OutboundBatcher;
use crate::error::{SyncError, SyncResult};
use crate::heartbeat::{Beat, Heartbeat};
use crate::lifecycle::{Attempt, ConnectionLifecycle, Endpoint, Outcome};
use crate::listener::SyncListener;
use crate::null::NullTransport;
use crate::scheduler::InboundScheduler;
use crate::telemetry::TelemetryEvent;
use crate::transport::{Transport, TransportError, TransportFactory, TransportResult};

/// Endpoint name used when running without a relay.
const LOCAL_URL: &str = "local";

/// Requests from the client handle.
pub(crate) enum Command {
    Init {
        context: InitContext,
        reply: oneshot::Sender<SyncResult<()>>,
    },
    Send(Message),
    StoreContext {
        context: String,
        reply: oneshot::Sender<SyncResult<()>>,
    },
    FetchContext {
        reply: oneshot::Sender<SyncResult<String>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Sent by a connect task when its attempt finishes.
struct AttemptResult {
    seq: u64,
    result: Result<Box<dyn Transport>, TransportError>,
}

/// An invocation waiting for its completion.
enum PendingCall {
    Send,
    Store(oneshot::Sender<SyncResult<()>>),
    Fetch(oneshot::Sender<SyncResult<String>>),
}

pub(crate) struct Session {
    factory: TransportFactory,
    listener: Box<dyn SyncListener>,
    commands: mpsc::UnboundedReceiver<Command>,
    attempts_tx: mpsc::UnboundedSender<AttemptResult>,
    attempts_rx: mpsc::UnboundedReceiver<AttemptResult>,
    state_tx: watch::Sender<ConnectionState>,
    cancel: CancellationToken,

    batcher: OutboundBatcher,
    scheduler: InboundScheduler,
    lifecycle: ConnectionLifecycle,
    heartbeat: Heartbeat,
    transport: Option<Box<dyn Transport>>,

    /// No relay host was given; attempts use [`NullTransport`].
    local: bool,
    /// A connection has been established since the last init.
    established: bool,
    init_reply: Option<oneshot::Sender<SyncResult<()>>>,
    pending: HashMap<u64, PendingCall>,
    next_invocation: u64,
    reported: ConnectionState,
}

impl Session {
    pub(crate) fn new(
        config: &SyncConfig,
        factory: TransportFactory,
        listener: Box<dyn SyncListener>,
        commands: mpsc::UnboundedReceiver<Command>,
        state_tx: watch::Sender<ConnectionState>,
    ) -> Self {
        let (attempts_tx, attempts_rx) = mpsc::unbounded_channel();
        Session {
            factory,
            listener,
            commands,
            attempts_tx,
            attempts_rx,
            state_tx,
            cancel: CancellationToken::new(),
            batcher: OutboundBatcher::new(config),
            scheduler: InboundScheduler::new(config.playback_catch_up()),
            lifecycle: ConnectionLifecycle::new(config),
            heartbeat: Heartbeat::new(config),
            transport: None,
            local: false,
            established: false,
            init_reply: None,
            pending: HashMap::new(),
            next_invocation: 1,
            reported: ConnectionState::Undefined,
        }
    }

    /// Runs until shutdown or until every client handle is dropped.
    pub(crate) async fn run(mut self) {
        let mut shutdown_reply = None;
        loop {
            let flush_at = self.batcher.flush_deadline();
            let playback_at = self.scheduler.next_wake();
            let retry_at = self.lifecycle.retry_deadline();
            let heartbeat_at = self.heartbeat.deadline();

            tokio::select! {
                biased;

                Some(attempt) = self.attempts_rx.recv() => {
                    self.on_attempt_result(attempt).await;
                }

                _ = sleep_until(playback_at) => self.play_due(),

                _ = sleep_until(flush_at) => self.flush().await,

                _ = sleep_until(heartbeat_at) => self.heartbeat_due().await,

                _ = sleep_until(retry_at) => self.retry_due(),

                inbound = recv_next(&mut self.transport) => {
                    self.on_inbound(inbound).await;
                }

                command = self.commands.recv() => {
                    let Some(command) = command else { break };
                    if let ControlFlow::Break(reply) = self.on_command(command).await {
                        shutdown_reply = reply;
                        break;
                    }
                }
            }
        }

        self.close().await;
        if let Some(reply) = shutdown_reply {
            let _ = reply.send(());
        }
    }

    async fn on_command(&mut self, command: Command) -> ControlFlow<Option<oneshot::Sender<()>>> {
        match command {
            Command::Init { context, reply } => self.init(context, reply).await,
            Command::Send(message) => self.enqueue(message),
            Command::StoreContext { context, reply } => self.store_context(context, reply).await,
            Command::FetchContext { reply } => self.fetch_context(reply).await,
            Command::Shutdown { reply } => return ControlFlow::Break(Some(reply)),
        }
        ControlFlow::Continue(())
    }

    async fn init(&mut self, context: InitContext, reply: oneshot::Sender<SyncResult<()>>) {
        if let Some(previous) = self.init_reply.take() {
            let _ = previous.send(Err(SyncError::new(
                ErrorKind::ConnectionFailed,
                "superseded by a later init",
            )));
        }
        self.drop_transport("session re-initialised").await;
        self.established = false;

        let endpoint = match context.hub_url() {
            Some(url) => {
                self.local = false;
                Endpoint {
                    url,
                    token: context.token,
                }
            }
            None => {
                info!(
                    session = %context.addin_session_id,
                    "no relay host configured, running locally"
                );
                self.local = true;
                Endpoint {
                    url: LOCAL_URL.to_string(),
                    token: String::new(),
                }
            }
        };

        self.init_reply = Some(reply);
        let attempt = self.lifecycle.connect(endpoint);
        self.publish_state();
        self.start_attempt(attempt);
    }

    fn start_attempt(&mut self, attempt: Attempt) {
        info!(
            url = %attempt.endpoint.url,
            failures = attempt.failures,
            forced = attempt.forced,
            "connecting to relay"
        );

        let mut transport: Box<dyn Transport> = if self.local {
            Box::new(NullTransport::new())
        } else {
            (self.factory)()
        };
        let tx = self.attempts_tx.clone();
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            let Attempt { seq, endpoint, .. } = attempt;
            let result = tokio::select! {
                _ = cancel.cancelled() => return,
                result = transport.connect(&endpoint.url, &endpoint.token) => result,
            };
            let _ = tx.send(AttemptResult {
                seq,
                result: result.map(|()| transport),
            });
        });
    }

    async fn on_attempt_result(&mut self, attempt: AttemptResult) {
        let outcome = self
            .lifecycle
            .on_attempt_result(attempt.seq, attempt.result.is_ok(), Instant::now());

        match attempt.result {
            Ok(mut transport) => {
                if outcome != Outcome::Connected {
                    debug!(seq = attempt.seq, "discarding superseded connection");
                    let _ = transport.disconnect().await;
                    return;
                }
                info!(url = ?self.lifecycle.endpoint().map(|e| &e.url), "connected to relay");
                self.transport = Some(transport);
                self.heartbeat.start(Instant::now());
                self.established = true;
                self.publish_state();
                if let Some(reply) = self.init_reply.take() {
                    let _ = reply.send(Ok(()));
                }
            }
            Err(e) => match outcome {
                Outcome::RetryAt(at) => {
                    warn!(
                        error = %e,
                        failures = self.lifecycle.failures(),
                        retry_in_ms = at.saturating_duration_since(Instant::now()).as_millis() as u64,
                        "connect attempt failed"
                    );
                }
                Outcome::Exhausted { attempts } => {
                    error!(error = %e, attempts, "giving up on relay connection");
                    self.publish_state();
                    let err = SyncError::new(
                        ErrorKind::ConnectionFailed,
                        format!("failed after {attempts} attempts: {e}"),
                    );
                    self.report(&err);
                    if let Some(reply) = self.init_reply.take() {
                        let _ = reply.send(Err(err));
                    }
                }
                Outcome::Connected | Outcome::Stale => {
                    debug!(seq = attempt.seq, error = %e, "ignoring superseded attempt");
                }
            },
        }
    }

    fn retry_due(&mut self) {
        if let Some(attempt) = self.lifecycle.retry_due(Instant::now()) {
            self.publish_state();
            self.start_attempt(attempt);
        }
    }

    async fn on_inbound(&mut self, inbound: TransportResult<Option<ServerMessage>>) {
        match inbound {
            Ok(Some(msg)) => self.on_server_message(msg).await,
            Ok(None) => self.on_closed(None),
            Err(e) => self.on_closed(Some(e)),
        }
    }

    async fn on_server_message(&mut self, msg: ServerMessage) {
        match &msg {
            ServerMessage::Pong { id } => self.heartbeat.on_pong(*id, Instant::now()),
            _ => self.heartbeat.on_traffic(Instant::now()),
        }

        match msg {
            ServerMessage::MessageReceived(batch) => {
                debug!(
                    count = batch.len(),
                    stamp = ?batch.server_time_stamp,
                    "batch received"
                );
                self.scheduler.receive(batch, Instant::now());
            }
            ServerMessage::Completion { id, result, error } => self.complete(id, result, error),
            ServerMessage::Migrate { url } => self.migrate(url).await,
            ServerMessage::Pong { id } => debug!(id, "pong"),
            ServerMessage::Error { message } => warn!(%message, "relay reported an error"),
        }
    }

    async fn heartbeat_due(&mut self) {
        match self.heartbeat.poll(Instant::now()) {
            Some(Beat::Ping(id)) => {
                debug!(id, "sending keepalive ping");
                if let Err(e) = self.invoke(ClientMessage::ping(id)).await {
                    self.lose_connection(e).await;
                }
            }
            Some(Beat::TimedOut { ping_id, waited }) => {
                let e = TransportError::Timeout(format!(
                    "no pong for ping {ping_id} after {}ms",
                    waited.as_millis()
                ));
                self.lose_connection(e).await;
            }
            None => {}
        }
    }

    /// Abandons a connection that is still open but no longer usable.
    async fn lose_connection(&mut self, error: TransportError) {
        if let Some(mut transport) = self.transport.take() {
            let _ = transport.disconnect().await;
        }
        self.on_closed(Some(error));
    }

    fn on_closed(&mut self, error: Option<TransportError>) {
        self.transport = None;
        self.heartbeat.stop();
        self.fail_pending("connection closed");
        if !self.lifecycle.on_closed() {
            return;
        }

        let url = self
            .lifecycle
            .endpoint()
            .map(|e| e.url.clone())
            .unwrap_or_default();
        match &error {
            Some(e) => warn!(%url, error = %e, "relay connection lost"),
            None => warn!(%url, "relay closed the connection"),
        }
        self.publish_state();
        self.telemetry(TelemetryEvent::hub_disconnected(&url));

        if let Some(attempt) = self.lifecycle.reconnect() {
            self.publish_state();
            self.start_attempt(attempt);
        }
    }

    async fn migrate(&mut self, url: String) {
        info!(%url, "relay requested migration");
        self.drop_transport("connection migrated").await;
        if let Some(attempt) = self.lifecycle.migrate(url) {
            self.publish_state();
            self.start_attempt(attempt);
        }
    }

    fn enqueue(&mut self, message: Message) {
        if !self.established {
            self.report(&SyncError::new(
                ErrorKind::NotInitialized,
                "send_message called before init completed",
            ));
            return;
        }

        if let Err(exceeded) = self.batcher.enqueue(message, Instant::now()) {
            warn!(
                kind = %exceeded.kind,
                size = exceeded.size,
                since_window_start_ms = exceeded.since_window_start.as_millis() as u64,
                "message rejected"
            );
            let event = if exceeded.kind == ErrorKind::MessagesSizeLimitExceeded {
                TelemetryEvent::size_limit(exceeded.size, exceeded.since_window_start)
            } else {
                TelemetryEvent::queue_limit(exceeded.since_window_start)
            };
            self.telemetry(event);
            self.report(&SyncError::bare(exceeded.kind));
        }
    }

    async fn flush(&mut self) {
        let Some(batch) = self.batcher.take_batch() else {
            return;
        };
        if batch.is_empty() {
            return;
        }

        let count = batch.len();
        let id = self.next_id();
        match self.invoke(ClientMessage::send_message(id, batch)).await {
            Ok(()) => {
                debug!(id, count, "batch sent");
                self.pending.insert(id, PendingCall::Send);
            }
            Err(e) => self.send_failed(&e.to_string()),
        }
    }

    async fn store_context(&mut self, context: String, reply: oneshot::Sender<SyncResult<()>>) {
        if !self.established {
            let err = SyncError::new(ErrorKind::NotInitialized, "store_context called before init");
            self.report(&err);
            let _ = reply.send(Err(err));
            return;
        }

        let id = self.next_id();
        match self.invoke(ClientMessage::store_context(id, context)).await {
            Ok(()) => {
                self.pending.insert(id, PendingCall::Store(reply));
            }
            Err(e) => {
                let err = SyncError::new(ErrorKind::PersistContentStoreFailed, e.to_string());
                self.report(&err);
                let _ = reply.send(Err(err));
            }
        }
    }

    async fn fetch_context(&mut self, reply: oneshot::Sender<SyncResult<String>>) {
        if !self.established {
            let err = SyncError::new(ErrorKind::NotInitialized, "fetch_context called before init");
            self.report(&err);
            let _ = reply.send(Err(err));
            return;
        }

        let id = self.next_id();
        match self.invoke(ClientMessage::fetch_context(id)).await {
            Ok(()) => {
                self.pending.insert(id, PendingCall::Fetch(reply));
            }
            Err(e) => {
                let err = SyncError::new(ErrorKind::PersistContentFetchFailed, e.to_string());
                self.report(&err);
                let _ = reply.send(Err(err));
            }
        }
    }

    /// Sends an invocation over the live connection.
    async fn invoke(&mut self, msg: ClientMessage) -> TransportResult<()> {
        match self.transport.as_mut() {
            Some(transport) if self.lifecycle.state().is_connected() => transport.send(msg).await,
            _ => Err(TransportError::ConnectionClosed),
        }
    }

    fn complete(&mut self, id: u64, result: Option<String>, error: Option<String>) {
        let Some(call) = self.pending.remove(&id) else {
            debug!(id, "completion for unknown invocation");
            return;
        };

        match (call, error) {
            (PendingCall::Send, None) => debug!(id, "batch delivered"),
            (PendingCall::Send, Some(e)) => self.send_failed(&e),
            (PendingCall::Store(reply), None) => {
                let _ = reply.send(Ok(()));
            }
            (PendingCall::Store(reply), Some(e)) => {
                let err = SyncError::new(ErrorKind::PersistContentStoreFailed, e);
                self.report(&err);
                let _ = reply.send(Err(err));
            }
            (PendingCall::Fetch(reply), None) => {
                let _ = reply.send(Ok(result.unwrap_or_default()));
            }
            (PendingCall::Fetch(reply), Some(e)) => {
                let err = SyncError::new(ErrorKind::PersistContentFetchFailed, e);
                self.report(&err);
                let _ = reply.send(Err(err));
            }
        }
    }

    /// Fails every outstanding invocation; their completions can no
    /// longer arrive.
    fn fail_pending(&mut self, reason: &str) {
        let mut pending: Vec<_> = self.pending.drain().collect();
        pending.sort_by_key(|(id, _)| *id);
        for (_, call) in pending {
            match call {
                PendingCall::Send => self.send_failed(reason),
                PendingCall::Store(reply) => {
                    let err = SyncError::new(ErrorKind::PersistContentStoreFailed, reason);
                    self.report(&err);
                    let _ = reply.send(Err(err));
                }
                PendingCall::Fetch(reply) => {
                    let err = SyncError::new(ErrorKind::PersistContentFetchFailed, reason);
                    self.report(&err);
                    let _ = reply.send(Err(err));
                }
            }
        }
    }

    fn send_failed(&mut self, reason: &str) {
        warn!(reason, "batch send failed");
        self.telemetry(TelemetryEvent::message_send_failed(reason));
        self.report(&SyncError::new(ErrorKind::MessageSentFailed, reason));
    }

    fn play_due(&mut self) {
        let listener = &mut self.listener;
        let delivered = self
            .scheduler
            .deliver_due(Instant::now(), |message| listener.on_message(message));
        if delivered > 0 {
            debug!(delivered, buffered = self.scheduler.len(), "played back messages");
        }
    }

    async fn drop_transport(&mut self, reason: &str) {
        self.heartbeat.stop();
        if let Some(mut transport) = self.transport.take() {
            let _ = transport.disconnect().await;
        }
        self.fail_pending(reason);
    }

    async fn close(&mut self) {
        info!(
            unsent = self.batcher.pending_len(),
            "shutting down sync session"
        );
        self.cancel.cancel();
        self.drop_transport("session shut down").await;
        self.lifecycle.shutdown();
        if let Some(reply) = self.init_reply.take() {
            let _ = reply.send(Err(SyncError::new(
                ErrorKind::ConnectionFailed,
                "session shut down",
            )));
        }
        self.publish_state();
    }

    /// Notifies the host when the state actually changed.
    fn publish_state(&mut self) {
        let state = self.lifecycle.state();
        if state == self.reported {
            return;
        }
        self.reported = state;
        debug!(%state, "connection state changed");
        self.state_tx.send_replace(state);
        self.listener.on_connection_state(state);
    }

    fn report(&mut self, err: &SyncError) {
        debug!(error = %err, "reporting error to host");
        self.listener.on_error(err);
    }

    fn telemetry(&mut self, event: TelemetryEvent) {
        event.log();
        self.listener.on_telemetry(&event);
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_invocation;
        self.next_invocation += 1;
        id
    }
}

async fn recv_next(
    transport: &mut Option<Box<dyn Transport>>,
) -> TransportResult<Option<ServerMessage>> {
    match transport {
        Some(transport) => transport.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
