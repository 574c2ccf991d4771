// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Transport abstraction for the relay connection.
//!
//! Provides a trait-based transport layer that enables:
//! - Real WebSocket connections for production
//! - An in-process [`NullTransport`](crate::NullTransport) for local mode
//! - Mock transports for unit testing

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use addin_core::{ClientMessage, ServerMessage};

/// Error type for transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection closed unexpectedly.
    #[error("connection closed")]
    ConnectionClosed,

    /// Send failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Receive failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// The relay stopped answering keepalive pings.
    #[error("timed out: {0}")]
    Timeout(String),
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Boxed future returned by [`Transport`] methods.
pub type TransportFuture<'a, T> = Pin<Box<dyn Future<Output = TransportResult<T>> + Send + 'a>>;

/// Transport trait for WebSocket-like communication with the relay.
///
/// Implementations are driven by a single session task, so methods take
/// `&mut self` and are never called concurrently.
pub trait Transport: Send + Sync {
    /// Connect to the relay, authenticating with `token`.
    fn connect(&mut self, url: &str, token: &str) -> TransportFuture<'_, ()>;

    /// Disconnect from the relay.
    fn disconnect(&mut self) -> TransportFuture<'_, ()>;

    /// Send a message to the relay.
    fn send(&mut self, msg: ClientMessage) -> TransportFuture<'_, ()>;

    /// Receive a message from the relay.
    ///
    /// Returns `None` if the connection is closed.
    fn recv(&mut self) -> TransportFuture<'_, Option<ServerMessage>>;

    /// Check if connected.
    fn is_connected(&self) -> bool;
}

/// Creates a fresh transport for each connect attempt.
pub(crate) type TransportFactory = Arc<dyn Fn() -> Box<dyn Transport> + Send + Sync>;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// WebSocket transport implementation using tokio-tungstenite.
pub struct WebSocketTransport {
    /// The WebSocket connection, if connected.
    ws: Option<WebSocketConnection>,
}

struct WebSocketConnection {
    sink: futures_util::stream::SplitSink<WsStream, tokio_tungstenite::tungstenite::Message>,
    stream: futures_util::stream::SplitStream<WsStream>,
}

impl WebSocketTransport {
    /// Create a new WebSocket transport.
    pub fn new() -> Self {
        WebSocketTransport { ws: None }
    }
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for WebSocketTransport {
    fn connect(&mut self, url: &str, token: &str) -> TransportFuture<'_, ()> {
        let url = url.to_string();
        let token = token.to_string();
        Box::pin(async move {
            use futures_util::StreamExt;
            use tokio_tungstenite::tungstenite::client::IntoClientRequest;
            use tokio_tungstenite::tungstenite::http::{header, HeaderValue};

            let mut request = url
                .as_str()
                .into_client_request()
                .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
            if !token.is_empty() {
                let value = HeaderValue::from_str(&format!("Bearer {token}"))
                    .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
                request.headers_mut().insert(header::AUTHORIZATION, value);
            }

            let (ws_stream, _) = tokio_tungstenite::connect_async(request)
                .await
                .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

            let (sink, stream) = ws_stream.split();
            self.ws = Some(WebSocketConnection { sink, stream });
            Ok(())
        })
    }

    fn disconnect(&mut self) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            if let Some(mut ws) = self.ws.take() {
                use futures_util::SinkExt;
                let _ = ws.sink.close().await;
            }
            Ok(())
        })
    }

    fn send(&mut self, msg: ClientMessage) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            use futures_util::SinkExt;
            use tokio_tungstenite::tungstenite::Message;

            let ws = self.ws.as_mut().ok_or(TransportError::ConnectionClosed)?;

            let json = msg
                .to_json()
                .map_err(|e| TransportError::SerializationError(e.to_string()))?;

            if let Err(e) = ws.sink.send(Message::Text(json.into())).await {
                self.ws = None;
                return Err(TransportError::SendFailed(e.to_string()));
            }

            Ok(())
        })
    }

    fn recv(&mut self) -> TransportFuture<'_, Option<ServerMessage>> {
        Box::pin(async move {
            use futures_util::StreamExt;
            use tokio_tungstenite::tungstenite::Message;

            let ws = self.ws.as_mut().ok_or(TransportError::ConnectionClosed)?;

            loop {
                match ws.stream.next().await {
                    Some(Ok(Message::Text(text))) => {
                        let msg = ServerMessage::from_json(&text)
                            .map_err(|e| TransportError::SerializationError(e.to_string()))?;
                        return Ok(Some(msg));
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        self.ws = None;
                        return Ok(None);
                    }
                    // Ping/pong are answered by tungstenite; binary frames are not part
                    // of the protocol.
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        self.ws = None;
                        return Err(TransportError::ReceiveFailed(e.to_string()));
                    }
                }
            }
        })
    }

    fn is_connected(&self) -> bool {
        self.ws.is_some()
    }
}
