//! Session routes — cookie plumbing around the shared session store.

use std::convert::Infallible;

use axum::extract::{FromRef, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use time::Duration;
use tracing::{error, info};

use crate::frame::ErrorCode;
use crate::services::identity::{self, Identity};
use crate::services::session;
use crate::state::AppState;

pub const COOKIE_NAME: &str = "session_token";

/// Session token carried by the request's cookies, if any.
#[must_use]
pub fn session_token(jar: &CookieJar) -> Option<String> {
    jar.get(COOKIE_NAME)
        .map(Cookie::value)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

fn session_cookie(token: String, secure: bool, max_age: Duration) -> Cookie<'static> {
    Cookie::build((COOKIE_NAME, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(max_age)
        .build()
}

// =============================================================================
// IDENTITY EXTRACTOR
// =============================================================================

/// Identity behind the request's session cookie. Never rejects: requests
/// without a live session resolve to the anonymous identity.
pub struct SessionIdentity {
    pub identity: Identity,
}

impl<S> axum::extract::FromRequestParts<S> for SessionIdentity
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut axum::http::request::Parts, state: &S) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let token = session_token(&jar);
        let app_state = AppState::from_ref(state);
        let identity = identity::resolve(app_state.sessions.as_ref(), app_state.users.as_ref(), token.as_deref()).await;
        Ok(Self { identity })
    }
}

// =============================================================================
// HANDLERS
// =============================================================================

/// `GET /api/auth/me` — identity for the current cookie (anonymous when absent).
pub async fn me(session: SessionIdentity) -> Json<Identity> {
    Json(session.identity)
}

/// `POST /api/auth/logout` — destroy the session and clear the cookie.
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> Response {
    if let Some(token) = session_token(&jar) {
        if let Err(e) = state.sessions.destroy(&token).await {
            error!(code = e.error_code(), error = %e, "logout: session destroy failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "failed to destroy session").into_response();
        }
    }

    let jar = jar.add(session_cookie(String::new(), state.config.cookie_secure, Duration::ZERO));
    (jar, StatusCode::NO_CONTENT).into_response()
}

#[derive(Debug, Deserialize)]
pub struct DevSessionRequest {
    pub user_id: i64,
}

/// `POST /api/dev/session` — start a session for an existing user without a
/// password. Enabled only when `DEV_SESSION_BYPASS=true`.
pub async fn dev_session(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<DevSessionRequest>,
) -> Response {
    if !state.config.dev_session_bypass {
        return StatusCode::NOT_FOUND.into_response();
    }

    let user = match state.users.get_user(req.user_id).await {
        Ok(Some(user)) => user,
        Ok(None) => return (StatusCode::NOT_FOUND, "user not found").into_response(),
        Err(e) => {
            error!(error = %e, user_id = req.user_id, "dev session: user lookup failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "user lookup failed").into_response();
        }
    };

    let ttl = state.config.session_ttl;
    let record = match session::create_session(state.sessions.as_ref(), Some(user.id), ttl).await {
        Ok(record) => record,
        Err(e) => {
            error!(code = e.error_code(), error = %e, "dev session: session creation failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "failed to create session").into_response();
        }
    };

    info!(user_id = user.id, "dev session created");
    let max_age = Duration::try_from(ttl).unwrap_or(Duration::MAX);
    let jar = jar.add(session_cookie(record.token, state.config.cookie_secure, max_age));
    (jar, Json(Identity::user(user.id, user.username))).into_response()
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
