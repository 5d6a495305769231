//! Connection lifecycle — Connecting → Open → Closed for one chat socket.
//!
//! DESIGN
//! ======
//! A `Connection` is owned by its websocket task. `open` resolves identity
//! exactly once, freezes it in a `ConnectionContext`, and subscribes to the
//! bus. `close` unsubscribes and drops the context. Submissions are accepted
//! only while Open.
//!
//! CONCURRENCY
//! ===========
//! The websocket task awaits each submission before reading the next frame,
//! so one connection's messages are handled in order while other connections
//! interleave freely. The append + publish pair runs on its own spawned task:
//! if the socket goes away mid-write the row is still recorded, and because
//! the closed connection has already left the bus it gets no echo.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;

use crate::frame::Frame;
use crate::services::chat::{self, ChatBroadcast, ChatError, ChatMessage};
use crate::services::identity::{self, Identity};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

/// Identity snapshot taken when the connection opened. Never re-resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionContext {
    identity: Identity,
}

impl ConnectionContext {
    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }
}

pub struct Connection {
    id: Uuid,
    state: ConnectionState,
    context: Option<ConnectionContext>,
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}

impl Connection {
    #[must_use]
    pub fn new() -> Self {
        Self { id: Uuid::new_v4(), state: ConnectionState::Connecting, context: None }
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    #[must_use]
    pub fn context(&self) -> Option<&ConnectionContext> {
        self.context.as_ref()
    }

    /// Connecting → Open. Returns the receiver for this connection's outbound
    /// frames, or `None` if the connection was not Connecting or the bus is
    /// draining (in which case the connection moves straight to Closed).
    pub async fn open(&mut self, state: &AppState, token: Option<&str>) -> Option<mpsc::Receiver<Frame>> {
        if self.state != ConnectionState::Connecting {
            return None;
        }

        let identity = identity::resolve(state.sessions.as_ref(), state.users.as_ref(), token).await;

        let (tx, rx) = mpsc::channel::<Frame>(state.config.client_queue_capacity);
        if !state.bus.register(self.id, tx).await {
            self.state = ConnectionState::Closed;
            return None;
        }

        // Await outside the macro: its temporaries are not Send.
        let subscribers = state.bus.subscriber_count().await;
        info!(
            connection_id = %self.id,
            user_id = ?identity.user_id,
            anonymous = identity.is_anonymous(),
            subscribers,
            "chat: connection open"
        );
        self.context = Some(ConnectionContext { identity });
        self.state = ConnectionState::Open;
        Some(rx)
    }

    /// Submit raw chat text on behalf of this connection.
    ///
    /// # Errors
    ///
    /// [`ChatError::NotOpen`] unless Open; otherwise whatever
    /// [`append_and_publish`] returns.
    pub async fn submit(&self, state: &AppState, raw: &str) -> Result<ChatMessage, ChatError> {
        let (ConnectionState::Open, Some(context)) = (self.state, &self.context) else {
            return Err(ChatError::NotOpen);
        };
        spawn_append_and_publish(state.clone(), context.identity.clone(), raw.to_owned()).await?
    }

    /// Open → Closed (or Connecting → Closed). Idempotent.
    pub async fn close(&mut self, state: &AppState) {
        if self.state == ConnectionState::Closed {
            return;
        }
        state.bus.unregister(self.id).await;
        self.context = None;
        self.state = ConnectionState::Closed;
        info!(connection_id = %self.id, "chat: connection closed");
    }
}

// =============================================================================
// APPEND THEN PUBLISH
// =============================================================================

/// Run [`append_and_publish`] on a detached task so it outlives the caller.
pub fn spawn_append_and_publish(
    state: AppState,
    identity: Identity,
    raw: String,
) -> JoinHandle<Result<ChatMessage, ChatError>> {
    tokio::spawn(async move { append_and_publish(&state, &identity, &raw).await })
}

/// Persist a message, then broadcast it. Publishing starts only after the
/// write has succeeded; any error means nothing was published.
///
/// # Errors
///
/// [`ChatError::Rejected`], [`ChatError::Persistence`], or
/// [`ChatError::Encode`] (the row exists but was not broadcast).
pub async fn append_and_publish(state: &AppState, identity: &Identity, raw: &str) -> Result<ChatMessage, ChatError> {
    let message = chat::append(state.messages.as_ref(), identity, raw).await?;
    let frame = ChatBroadcast::from_message(&message)?.to_frame()?;
    state.bus.publish(&frame).await;
    Ok(message)
}

#[cfg(test)]
#[path = "connection_test.rs"]
mod tests;
