//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! This module binds the chat websocket, the session endpoints, and the small
//! JSON API under a single Axum router. The websocket upgrade and the HTTP
//! handlers share one cookie (`session_token`) and one session store.

pub mod api;
pub mod auth;
pub mod ws;

use axum::Router;
use axum::response::Json;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the full application router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/api/ws", get(ws::handle_ws))
        .route("/api/auth/me", get(auth::me))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/dev/session", post(auth::dev_session))
        .route("/api/search", get(api::search))
        .route("/api/weather", get(api::weather))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
