//! Chat message persistence — validate, then append to the durable log.
//!
//! DESIGN
//! ======
//! `append` is the only write path. It trims the raw text and rejects
//! empty results before touching the store, so a rejected message leaves no
//! row and never reaches the bus. The author's display name is copied into
//! `username_snapshot` at write time and never re-derived, so history
//! survives renames and user deletion.
//!
//! ERROR HANDLING
//! ==============
//! Store failures surface as `ChatError::Persistence`. Callers must branch on
//! the result and only publish on `Ok`. There is no retry: a failed message
//! is lost (at-most-once).

use serde::Serialize;
use sqlx::PgPool;
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, UtcOffset};

use crate::frame::{EVENT_CHAT_MESSAGE, ErrorCode, Frame};
use crate::services::identity::Identity;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("message is empty")]
    Rejected,
    #[error("connection is not open")]
    NotOpen,
    #[error("persistence error: {0}")]
    Persistence(#[from] sqlx::Error),
    #[error("failed to encode broadcast: {0}")]
    Encode(String),
    #[error("chat task aborted: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ErrorCode for ChatError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Rejected => "E_CHAT_EMPTY",
            Self::NotOpen => "E_CHAT_NOT_OPEN",
            Self::Persistence(_) => "E_PERSISTENCE",
            Self::Encode(_) => "E_CHAT_ENCODE",
            Self::Task(_) => "E_CHAT_TASK",
        }
    }
}

/// Row of the `chat_messages` table.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ChatMessage {
    pub id: i64,
    pub user_id: Option<i64>,
    pub username_snapshot: String,
    pub message: String,
    pub created_at: OffsetDateTime,
}

/// Server → client `chat:message` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatBroadcast {
    pub username: String,
    pub message: String,
    /// RFC 3339 timestamp in UTC.
    pub created_at: String,
}

impl ChatBroadcast {
    /// # Errors
    ///
    /// Returns [`ChatError::Encode`] if `created_at` cannot be rendered as RFC 3339.
    pub fn from_message(msg: &ChatMessage) -> Result<Self, ChatError> {
        let created_at = msg
            .created_at
            .to_offset(UtcOffset::UTC)
            .format(&Rfc3339)
            .map_err(|e| ChatError::Encode(e.to_string()))?;
        Ok(Self { username: msg.username_snapshot.clone(), message: msg.message.clone(), created_at })
    }

    /// # Errors
    ///
    /// Returns [`ChatError::Encode`] if the payload cannot be serialized.
    pub fn to_frame(&self) -> Result<Frame, ChatError> {
        Frame::with_payload(EVENT_CHAT_MESSAGE, self).map_err(|e| ChatError::Encode(e.to_string()))
    }
}

/// Append-only chat log.
#[async_trait::async_trait]
pub trait MessageStore: Send + Sync {
    /// Insert one message; the store assigns `id` and `created_at`.
    async fn insert(&self, user_id: Option<i64>, username_snapshot: &str, message: &str)
    -> Result<ChatMessage, sqlx::Error>;
}

// =============================================================================
// APPEND
// =============================================================================

/// Trim `raw`, rejecting empty results.
///
/// # Errors
///
/// Returns [`ChatError::Rejected`] for empty or whitespace-only input.
pub fn validate(raw: &str) -> Result<&str, ChatError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ChatError::Rejected);
    }
    Ok(trimmed)
}

/// Validate and durably append a message authored by `identity`.
///
/// # Errors
///
/// [`ChatError::Rejected`] for empty input (nothing written), or
/// [`ChatError::Persistence`] if the store write fails.
pub async fn append(store: &dyn MessageStore, identity: &Identity, raw: &str) -> Result<ChatMessage, ChatError> {
    let message = validate(raw)?;
    let row = store
        .insert(identity.user_id, &identity.username, message)
        .await?;
    Ok(row)
}

// =============================================================================
// POSTGRES STORE
// =============================================================================

pub struct PgMessageStore {
    pool: PgPool,
}

impl PgMessageStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl MessageStore for PgMessageStore {
    async fn insert(
        &self,
        user_id: Option<i64>,
        username_snapshot: &str,
        message: &str,
    ) -> Result<ChatMessage, sqlx::Error> {
        sqlx::query_as::<_, ChatMessage>(
            r"INSERT INTO chat_messages (user_id, username_snapshot, message)
              VALUES ($1, $2, $3)
              RETURNING id, user_id, username_snapshot, message, created_at",
        )
        .bind(user_id)
        .bind(username_snapshot)
        .bind(message)
        .fetch_one(&self.pool)
        .await
    }
}

#[cfg(test)]
#[path = "chat_test.rs"]
mod tests;
