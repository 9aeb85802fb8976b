//! Per-session WebSocket endpoint.
//!
//! Clients send `{"content": "..."}` frames. Each completed turn is
//! broadcast to every connection registered for the session as
//! `{"type": "message", "data": {"user_message", "assistant_message"}}`;
//! a failed frame gets `{"type": "error", "data": "..."}` on the
//! offending socket only. A socket for a session the caller does not own
//! is closed with the policy-violation code before any frame is read.

use axum::extract::ws::{CloseFrame, Message as WsMessage, WebSocket, close_code};
use axum::extract::{Path as PathExtract, State, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::api::{MessageResponse, WsEvent, WsInbound};
use crate::auth::Principal;
use crate::server::AppState;

/// GET /api/v1/sessions/{session_id}/ws
pub async fn session_ws(
    State(state): State<AppState>,
    principal: Principal,
    PathExtract(session_id): PathExtract<Uuid>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(state, principal, session_id, socket))
}

async fn handle_socket(
    state: AppState,
    principal: Principal,
    session_id: Uuid,
    mut socket: WebSocket,
) {
    let owned = state
        .chat
        .owns_session(&principal, session_id)
        .await
        .unwrap_or(false);
    if !owned {
        let _ = socket
            .send(WsMessage::Close(Some(CloseFrame {
                code: close_code::POLICY,
                reason: "session not found".into(),
            })))
            .await;
        return;
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let connection_id = state.connections.register(session_id, tx.clone());
    debug!(session_id = %session_id, connection_id, "websocket connected");

    let (mut sink, mut stream) = socket.split();

    // Forward broadcast frames to this socket until its channel closes.
    let mut forward = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sink.send(WsMessage::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            _ = &mut forward => break,
            inbound = stream.next() => {
                let Some(Ok(message)) = inbound else { break };
                match message {
                    WsMessage::Text(text) => {
                        handle_frame(&state, &principal, session_id, &tx, text.as_str()).await;
                    }
                    WsMessage::Close(_) => break,
                    // Pings are answered by axum; ignore the rest.
                    _ => {}
                }
            }
        }
    }

    state.connections.unregister(session_id, connection_id);
    forward.abort();
    debug!(session_id = %session_id, connection_id, "websocket disconnected");
}

async fn handle_frame(
    state: &AppState,
    principal: &Principal,
    session_id: Uuid,
    own_tx: &mpsc::UnboundedSender<String>,
    text: &str,
) {
    let inbound: WsInbound = match serde_json::from_str(text) {
        Ok(inbound) => inbound,
        Err(e) => {
            send_error(own_tx, format!("invalid frame: {e}"));
            return;
        }
    };

    match state.chat.turn(principal, session_id, &inbound.content).await {
        Ok((user, assistant)) => {
            let event = WsEvent::Message {
                user_message: MessageResponse::from(&user),
                assistant_message: MessageResponse::from(&assistant),
            };
            match serde_json::to_string(&event) {
                Ok(frame) => {
                    let delivered = state.connections.broadcast(session_id, &frame);
                    debug!(session_id = %session_id, delivered, "turn broadcast");
                }
                Err(e) => warn!(error = %e, "failed to serialize broadcast frame"),
            }
        }
        Err(e) => {
            warn!(session_id = %session_id, error = %e, "websocket turn failed");
            send_error(own_tx, e.to_string());
        }
    }
}

fn send_error(tx: &mpsc::UnboundedSender<String>, detail: String) {
    if let Ok(frame) = serde_json::to_string(&WsEvent::Error(detail)) {
        let _ = tx.send(frame);
    }
}
