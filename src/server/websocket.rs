//! WebSocket status publication
//!
//! Clients authenticate with the admin key, then subscribe to
//! `systemStatus` to receive the live status record.

use crate::auth::AdminKey;
use crate::config::OUTBOUND_QUEUE_DEPTH;
use crate::server::connections::AdminConnection;
use crate::server::messages::{ClientMessage, ServerMessage};
use crate::server::AppState;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

pub(crate) async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    // Wait for auth message and authenticate
    let auth_result = match receiver.next().await {
        Some(Ok(Message::Text(text))) => authenticate(serde_json::from_str(&text), state.admin_key.as_ref()),
        Some(Ok(Message::Binary(data))) => {
            authenticate(serde_json::from_slice(&data), state.admin_key.as_ref())
        }
        _ => return,
    };

    if let Err(message) = auth_result {
        debug!(reason = %message, "WebSocket authentication refused");
        let _ = send_json(&mut sender, &ServerMessage::AuthError { message }).await;
        return;
    }

    if send_json(&mut sender, &ServerMessage::AuthOk).await.is_err() {
        return;
    }

    // Create connection with channel for outbound messages
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(OUTBOUND_QUEUE_DEPTH);
    let conn = Arc::new(AdminConnection::new(tx));

    let conn_id = conn.id;
    state.connections.add(conn.clone());

    info!(conn_id = %conn_id, "Admin WebSocket client authenticated");

    // Spawn task to forward outbound messages to WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if send_json(&mut sender, &msg).await.is_err() {
                break;
            }
        }
    });

    // Process incoming messages
    while let Some(msg_result) = receiver.next().await {
        let parsed = match msg_result {
            Ok(Message::Text(text)) => serde_json::from_str::<ClientMessage>(&text),
            Ok(Message::Binary(data)) => serde_json::from_slice::<ClientMessage>(&data),
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                // Handled automatically by axum
                continue;
            }
            Ok(Message::Close(_)) => break,
            Err(e) => {
                warn!(conn_id = %conn_id, error = %e, "WebSocket error");
                break;
            }
        };

        match parsed {
            Ok(msg) => handle_client_message(msg, &conn, &state),
            Err(e) => reply(
                &conn,
                ServerMessage::Error {
                    message: format!("Invalid message: {}", e),
                },
            ),
        }
    }

    // Cleanup
    debug!(conn_id = %conn_id, "WebSocket client disconnected");
    state.connections.remove(conn_id);
    send_task.abort();
}

/// Check the first client message; the error is sent back as `auth_error`
fn authenticate(msg: serde_json::Result<ClientMessage>, admin_key: Option<&AdminKey>) -> Result<(), String> {
    match msg {
        Ok(ClientMessage::Auth { token }) => match admin_key {
            Some(key) if key.matches(&token) => Ok(()),
            _ => Err("User must be admin to view system status.".to_string()),
        },
        Ok(_) => Err("Must authenticate first".to_string()),
        Err(e) => Err(format!("Invalid message: {}", e)),
    }
}

fn handle_client_message(msg: ClientMessage, conn: &AdminConnection, state: &AppState) {
    let response = match msg {
        ClientMessage::Auth { .. } => {
            // Already authenticated, ignore
            return;
        }
        ClientMessage::Subscribe { name } => {
            match conn.subscribe(&name, &*state.sessions) {
                Ok(()) => {
                    debug!(conn_id = %conn.id, publication = %name, "Status feed started");
                    return;
                }
                Err(e) => ServerMessage::SubscribeError {
                    name,
                    message: e.to_string(),
                },
            }
        }
        ClientMessage::Unsubscribe { name } => {
            conn.unsubscribe(&name);
            ServerMessage::Unsubscribed { name }
        }
        ClientMessage::Ping { seq } => ServerMessage::Pong { seq },
    };

    reply(conn, response);
}

/// Queue a reply; the read loop never waits on a backed-up client
fn reply(conn: &AdminConnection, msg: ServerMessage) {
    if let Err(TrySendError::Full(msg)) = conn.try_send(msg) {
        warn!(conn_id = %conn.id, reply = ?msg, "Outbound queue full, dropping reply");
    }
}

async fn send_json<S>(sender: &mut S, msg: &ServerMessage) -> Result<(), ()>
where
    S: futures::Sink<Message> + Unpin,
{
    let text = serde_json::to_string(msg).map_err(|e| {
        warn!(error = %e, "Failed to encode server message");
    })?;
    sender.send(Message::Text(text.into())).await.map_err(|_| ())
}
