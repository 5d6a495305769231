//! WebSocket handler — live chat relay.
//!
//! DESIGN
//! ======
//! The upgrade reads the same `session_token` cookie the HTTP routes use and
//! hands it to the connection lifecycle, which resolves identity once and
//! subscribes to the bus. The connection task then runs a `select!` loop:
//! - Incoming client frames → parse + dispatch by event name
//! - Frames from the bus (including this client's own echo) → forward
//!
//! Inbound frames are handled one at a time. While one is in flight the
//! task keeps forwarding bus frames so its bounded queue keeps draining.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → `Connection::open` (Connecting → Open)
//! 2. `chat:message` frames → append, then publish to every open connection
//! 3. Client close, socket error, or bus drain → `Connection::close`

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use axum_extra::extract::cookie::CookieJar;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::frame::{EVENT_CHAT_MESSAGE, ErrorCode, Frame};
use crate::routes::auth;
use crate::services::chat::{ChatError, ChatMessage};
use crate::services::connection::Connection;
use crate::state::AppState;

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(State(state): State<AppState>, jar: CookieJar, ws: WebSocketUpgrade) -> Response {
    let token = auth::session_token(&jar);
    ws.on_upgrade(move |socket| run_ws(socket, state, token))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState, token: Option<String>) {
    let mut conn = Connection::new();
    let Some(mut outbound) = conn.open(&state, token.as_deref()).await else {
        let _ = socket.send(Message::Close(None)).await;
        return;
    };

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Text(text) => {
                        let open = dispatch_while_forwarding(
                            &mut socket,
                            &mut outbound,
                            &state,
                            &conn,
                            text.as_str(),
                        )
                        .await;
                        if !open {
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            frame = outbound.recv() => {
                if !forward_outbound(&mut socket, frame).await {
                    break;
                }
            }
        }
    }

    conn.close(&state).await;
}

/// Handle one inbound frame to completion while still forwarding bus frames.
///
/// The next inbound frame is not read until this one is done, so a
/// connection's own messages stay in order, but a slow append does not let
/// the outbound queue fill up. Returns `false` once the socket should close.
async fn dispatch_while_forwarding(
    socket: &mut WebSocket,
    outbound: &mut mpsc::Receiver<Frame>,
    state: &AppState,
    conn: &Connection,
    text: &str,
) -> bool {
    let dispatch = process_inbound_text(state, conn, text);
    tokio::pin!(dispatch);

    loop {
        tokio::select! {
            _ = &mut dispatch => return true,
            frame = outbound.recv() => {
                // Dropping `dispatch` here is fine: the append runs on its own task.
                if !forward_outbound(socket, frame).await {
                    return false;
                }
            }
        }
    }
}

/// Send one bus frame to the client. `None` means the bus was drained for
/// shutdown. Returns `false` once the socket should close.
async fn forward_outbound(socket: &mut WebSocket, frame: Option<Frame>) -> bool {
    let Some(frame) = frame else {
        let _ = socket.send(Message::Close(None)).await;
        return false;
    };
    send_frame(socket, &frame).await.is_ok()
}

// =============================================================================
// FRAME DISPATCH
// =============================================================================

/// Parse and dispatch one inbound text frame. Returns the persisted message
/// when the frame was a chat message that got broadcast.
///
/// Kept separate from the socket loop so tests can drive dispatch directly.
async fn process_inbound_text(state: &AppState, conn: &Connection, text: &str) -> Option<ChatMessage> {
    let frame: Frame = match serde_json::from_str(text) {
        Ok(f) => f,
        Err(e) => {
            warn!(connection_id = %conn.id(), error = %e, "ws: invalid inbound frame");
            return None;
        }
    };

    match frame.prefix() {
        "chat" => dispatch_chat(state, conn, &frame).await,
        other => {
            warn!(connection_id = %conn.id(), prefix = other, "ws: unknown event prefix");
            None
        }
    }
}

async fn dispatch_chat(state: &AppState, conn: &Connection, frame: &Frame) -> Option<ChatMessage> {
    match frame.event.as_str() {
        EVENT_CHAT_MESSAGE => handle_chat_message(state, conn, frame).await,
        other => {
            warn!(connection_id = %conn.id(), event = other, "ws: unknown chat event");
            None
        }
    }
}

// =============================================================================
// CHAT HANDLER
// =============================================================================

async fn handle_chat_message(state: &AppState, conn: &Connection, frame: &Frame) -> Option<ChatMessage> {
    let raw = frame.text_payload();
    match conn.submit(state, &raw).await {
        Ok(message) => {
            debug!(
                connection_id = %conn.id(),
                user_id = ?conn.context().and_then(|c| c.identity().user_id),
                message_id = message.id,
                "chat: message broadcast"
            );
            Some(message)
        }
        Err(e @ (ChatError::Rejected | ChatError::NotOpen)) => {
            debug!(connection_id = %conn.id(), state = ?conn.state(), code = e.error_code(), "chat: message dropped");
            None
        }
        Err(e) => {
            error!(
                connection_id = %conn.id(),
                code = e.error_code(),
                retryable = e.retryable(),
                error = %e,
                "chat: message not delivered"
            );
            None
        }
    }
}

// =============================================================================
// HELPERS
// =============================================================================

async fn send_frame(socket: &mut WebSocket, frame: &Frame) -> Result<(), ()> {
    let json = match serde_json::to_string(frame) {
        Ok(j) => j,
        Err(e) => {
            warn!(error = %e, "ws: failed to serialize frame");
            return Err(());
        }
    };
    socket.send(Message::Text(json.into())).await.map_err(|_| ())
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
