//! Session store — durable token → session mapping shared by HTTP and WS.
//!
//! ARCHITECTURE
//! ============
//! The HTTP layer writes sessions (dev login, logout) and the websocket
//! handshake reads them through the same `SessionStore` trait object held in
//! `AppState`. The production implementation is `PgSessionStore`; tests swap
//! in an in-memory store.
//!
//! EXPIRY
//! ======
//! A record is dead once `now >= expires_at`. `get` never returns a dead
//! record: it deletes it on the spot and reports absence. A background sweep
//! also deletes dead rows in bulk so abandoned tokens do not accumulate.

use std::fmt::Write;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use sqlx::PgPool;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::frame::ErrorCode;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ErrorCode for SessionError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Database(_) => "E_SESSION_STORE",
        }
    }

    fn retryable(&self) -> bool {
        true
    }
}

/// One row of the `sessions` table.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct SessionRecord {
    pub token: String,
    /// Owning user; `None` for an anonymous session.
    pub user_id: Option<i64>,
    pub expires_at: OffsetDateTime,
}

impl SessionRecord {
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }
}

/// Durable session storage.
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetch the live record for `token`. Expired records are deleted and
    /// reported as `None`.
    async fn get(&self, token: &str) -> Result<Option<SessionRecord>, SessionError>;

    /// Create or replace the record for `token`, expiring `ttl` from now.
    async fn put(&self, token: &str, user_id: Option<i64>, ttl: Duration) -> Result<SessionRecord, SessionError>;

    /// Delete the record for `token`. Deleting an unknown token is not an error.
    async fn destroy(&self, token: &str) -> Result<(), SessionError>;

    /// Delete every expired record, returning how many were removed.
    async fn sweep_expired(&self) -> Result<u64, SessionError>;
}

// =============================================================================
// TOKENS
// =============================================================================

pub(crate) fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

/// Generate a cryptographically random 32-byte hex token.
#[must_use]
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    bytes_to_hex(&bytes)
}

/// Create a session for `user_id` under a fresh token and return the record.
///
/// # Errors
///
/// Returns the store error if the write fails.
pub async fn create_session(
    store: &dyn SessionStore,
    user_id: Option<i64>,
    ttl: Duration,
) -> Result<SessionRecord, SessionError> {
    let token = generate_token();
    store.put(&token, user_id, ttl).await
}

// =============================================================================
// POSTGRES STORE
// =============================================================================

pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl SessionStore for PgSessionStore {
    async fn get(&self, token: &str) -> Result<Option<SessionRecord>, SessionError> {
        let record = sqlx::query_as::<_, SessionRecord>(
            "SELECT token, user_id, expires_at FROM sessions WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        match record {
            Some(record) if record.is_expired_at(OffsetDateTime::now_utc()) => {
                // Guard on expires_at so a concurrent refresh is not clobbered.
                sqlx::query("DELETE FROM sessions WHERE token = $1 AND expires_at <= now()")
                    .bind(token)
                    .execute(&self.pool)
                    .await?;
                Ok(None)
            }
            other => Ok(other),
        }
    }

    async fn put(&self, token: &str, user_id: Option<i64>, ttl: Duration) -> Result<SessionRecord, SessionError> {
        let expires_at = OffsetDateTime::now_utc() + ttl;
        let record = sqlx::query_as::<_, SessionRecord>(
            r"INSERT INTO sessions (token, user_id, expires_at)
              VALUES ($1, $2, $3)
              ON CONFLICT (token) DO UPDATE SET user_id = EXCLUDED.user_id, expires_at = EXCLUDED.expires_at
              RETURNING token, user_id, expires_at",
        )
        .bind(token)
        .bind(user_id)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(record)
    }

    async fn destroy(&self, token: &str) -> Result<(), SessionError> {
        sqlx::query("DELETE FROM sessions WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn sweep_expired(&self) -> Result<u64, SessionError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= now()")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

// =============================================================================
// SWEEP TASK
// =============================================================================

/// Spawn the background expired-session sweep. Returns a handle for shutdown.
pub fn spawn_session_sweeper(store: Arc<dyn SessionStore>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            match store.sweep_expired().await {
                Ok(0) => {}
                Ok(removed) => debug!(removed, "expired sessions swept"),
                Err(e) => warn!(code = e.error_code(), error = %e, "session sweep failed"),
            }
        }
    })
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
