// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket server implementation.
//!
//! Handles client connections, invocation completions, and fanout of
//! stamped batches within a group.

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{header, StatusCode};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use addin_core::{ClientMessage, ServerMessage};

use crate::state::{group_name, Member, RelayState};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Run the WebSocket server on the given address.
pub async fn run(addr: SocketAddr, state: RelayState) -> Result<(), BoxError> {
    let listener = TcpListener::bind(addr).await?;
    info!("Listening on: {}", addr);
    serve(listener, state).await
}

/// Accepts connections from an already bound listener.
pub(crate) async fn serve(listener: TcpListener, state: RelayState) -> Result<(), BoxError> {
    loop {
        let (stream, peer_addr) = listener.accept().await?;
        let state = state.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, peer_addr, state).await {
                error!("Connection error from {}: {}", peer_addr, e);
            }
        });
    }
}

/// Handle a single WebSocket connection.
pub(crate) async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    state: RelayState,
) -> Result<(), BoxError> {
    let mut path = String::new();
    let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        path = req.uri().path().to_string();
        let auth = req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        if state.authorize(auth) {
            Ok(resp)
        } else {
            let mut reject = ErrorResponse::new(Some("unauthorized".to_string()));
            *reject.status_mut() = StatusCode::UNAUTHORIZED;
            Err(reject)
        }
    };

    let ws_stream = match tokio_tungstenite::accept_hdr_async(stream, callback).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("Handshake with {} rejected: {}", peer_addr, e);
            return Ok(());
        }
    };
    let (mut ws_sink, mut ws_stream) = ws_stream.split();

    if let Some(base) = &state.options().redirect_to {
        let url = format!("{}{}", base.trim_end_matches('/'), path);
        info!("Migrating {} to {}", peer_addr, url);
        let json = ServerMessage::migrate(url).to_json()?;
        ws_sink.send(Message::Text(json.into())).await?;
        ws_sink.close().await?;
        return Ok(());
    }

    let mut member = state.join(group_name(&path)).await;
    info!(
        "New WebSocket connection from {} in group {} (member {})",
        peer_addr, member.group, member.id
    );

    loop {
        tokio::select! {
            msg = ws_stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let response = match handle_client_message(&text, &state, &member).await {
                            Ok(response) => response,
                            Err(e) => ServerMessage::error(e.to_string()),
                        };
                        let json = response.to_json()?;
                        ws_sink.send(Message::Text(json.into())).await?;
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("Client {} disconnected", peer_addr);
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        ws_sink.send(Message::Pong(data)).await?;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!("WebSocket error from {}: {}", peer_addr, e);
                        break;
                    }
                    None => {
                        info!("Client {} stream ended", peer_addr);
                        break;
                    }
                }
            }

            relayed = member.rx.recv() => {
                match relayed {
                    Ok(relayed) if relayed.from == member.id => {}
                    Ok(relayed) => {
                        let json = relayed.message.to_json()?;
                        if let Err(e) = ws_sink.send(Message::Text(json.into())).await {
                            warn!("Failed to forward batch to {}: {}", peer_addr, e);
                            break;
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        warn!("Client {} lagged by {} batches", peer_addr, n);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    state.leave(&member).await;
    info!(
        "Connection closed: {} ({} members left in {})",
        peer_addr,
        state.member_count(&member.group).await,
        member.group
    );
    Ok(())
}

/// Process an invocation and return its completion.
async fn handle_client_message(
    text: &str,
    state: &RelayState,
    member: &Member,
) -> Result<ServerMessage, BoxError> {
    let msg = ClientMessage::from_json(text)?;

    match msg {
        ClientMessage::SendMessage { id, batch } => {
            let count = batch.len();
            let peers = state.publish(member, batch).await;
            debug!(
                "Batch of {} from member {} forwarded to {} peers",
                count, member.id, peers
            );
            Ok(ServerMessage::completed(id))
        }

        ClientMessage::StoreContext { id, context } => {
            debug!("Storing {} bytes of context for {}", context.len(), member.group);
            state.store_context(&member.group, context).await;
            Ok(ServerMessage::completed(id))
        }

        ClientMessage::FetchContext { id } => {
            let context = state.fetch_context(&member.group).await;
            Ok(ServerMessage::completed_with(id, context))
        }

        ClientMessage::Ping { id } => {
            debug!("Ping received: {}", id);
            Ok(ServerMessage::pong(id))
        }
    }
}
