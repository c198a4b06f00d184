// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-user live notification socket.
//!
//! `GET /ws?user_id=<id>&token=<bearer>` upgrades to a socket that only
//! pushes. Server -> client (JSON):
//! ```json
//! {"type": "hello", "unread_count": 3}
//! {"type": "notification", "notification": {...}}
//! ```
//! Nothing is replayed on reconnect; clients reconcile through
//! `GET /v1/notifications?unread_only=true`.

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use twinlink_core::types::Notification;

use crate::server::GatewayState;

/// Server -> client frame types.
pub mod message_types {
    pub const HELLO: &str = "hello";
    pub const NOTIFICATION: &str = "notification";
}

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub user_id: String,
    #[serde(default)]
    pub token: Option<String>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<GatewayState>,
    Query(query): Query<WsQuery>,
) -> Response {
    if !state.auth.accepts(query.token.as_deref()) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if query.user_id.trim().is_empty() {
        return StatusCode::BAD_REQUEST.into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, state, query.user_id))
}

pub fn hello_frame(unread_count: i64) -> String {
    json!({ "type": message_types::HELLO, "unread_count": unread_count }).to_string()
}

pub fn notification_frame(notification: &Notification) -> String {
    json!({ "type": message_types::NOTIFICATION, "notification": notification }).to_string()
}

async fn handle_socket(socket: WebSocket, state: GatewayState, user_id: String) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let mut subscription = state.notifications.connect(&user_id);

    let unread = match state.notifications.unread_count(&user_id).await {
        Ok(count) => count,
        Err(e) => {
            tracing::warn!(
                user_id = %user_id,
                error = %e,
                "unread count unavailable for hello frame"
            );
            0
        }
    };
    if ws_sender
        .send(Message::Text(hello_frame(unread).into()))
        .await
        .is_ok()
    {
        loop {
            tokio::select! {
                pushed = subscription.receiver.recv() => {
                    let Some(notification) = pushed else { break };
                    let frame = notification_frame(&notification);
                    if ws_sender.send(Message::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                incoming = ws_receiver.next() => {
                    match incoming {
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                        // Pings are answered by the protocol layer; clients send nothing else.
                        Some(Ok(_)) => {}
                    }
                }
            }
        }
    }

    state.notifications.disconnect(&user_id, subscription.id);
    tracing::debug!(user_id = %user_id, "live socket closed");
}
