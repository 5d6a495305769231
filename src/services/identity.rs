//! Identity resolution — session token → who is speaking.
//!
//! DESIGN
//! ======
//! Resolution never fails. A missing cookie, an unknown or expired token, a
//! session without a user, a deleted user, or a store error all yield the
//! anonymous `Guest` identity. Errors are logged and otherwise swallowed so
//! a flaky store never prevents anyone from joining the chat.

use serde::Serialize;
use sqlx::PgPool;
use tracing::warn;

use crate::frame::ErrorCode;
use crate::services::session::SessionStore;

/// Display name given to anyone without an authenticated session.
pub const ANONYMOUS_USERNAME: &str = "Guest";

// =============================================================================
// TYPES
// =============================================================================

/// Resolved speaker: an authenticated user or the anonymous default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub user_id: Option<i64>,
    pub username: String,
}

impl Identity {
    #[must_use]
    pub fn anonymous() -> Self {
        Self { user_id: None, username: ANONYMOUS_USERNAME.to_owned() }
    }

    #[must_use]
    pub fn user(user_id: i64, username: impl Into<String>) -> Self {
        Self { user_id: Some(user_id), username: username.into() }
    }

    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.user_id.is_none()
    }
}

/// Row from the `users` table. Read-only to this service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub is_admin: bool,
}

/// Read-only user lookup.
#[async_trait::async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_user(&self, id: i64) -> Result<Option<User>, sqlx::Error>;
}

pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl UserDirectory for PgUserDirectory {
    async fn get_user(&self, id: i64) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT id, username, is_admin FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }
}

// =============================================================================
// RESOLVE
// =============================================================================

/// Resolve the identity behind an optional session token.
pub async fn resolve(sessions: &dyn SessionStore, users: &dyn UserDirectory, token: Option<&str>) -> Identity {
    let Some(token) = token.filter(|t| !t.is_empty()) else {
        return Identity::anonymous();
    };

    let record = match sessions.get(token).await {
        Ok(Some(record)) => record,
        Ok(None) => return Identity::anonymous(),
        Err(e) => {
            warn!(code = e.error_code(), error = %e, "identity: session lookup failed; using anonymous");
            return Identity::anonymous();
        }
    };

    let Some(user_id) = record.user_id else {
        return Identity::anonymous();
    };

    match users.get_user(user_id).await {
        Ok(Some(user)) => Identity::user(user.id, user.username),
        Ok(None) => {
            warn!(user_id, "identity: session references missing user; using anonymous");
            Identity::anonymous()
        }
        Err(e) => {
            warn!(user_id, error = %e, "identity: user lookup failed; using anonymous");
            Identity::anonymous()
        }
    }
}

#[cfg(test)]
#[path = "identity_test.rs"]
mod tests;
