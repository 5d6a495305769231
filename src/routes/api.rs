//! JSON API — document search and the weather proxy.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use tracing::error;

use crate::frame::ErrorCode;
use crate::services::search as search_svc;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct QueryParams {
    #[serde(default)]
    pub q: String,
}

fn error_body(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

/// `GET /api/search?q=` — published documents matching `q`.
pub async fn search(State(state): State<AppState>, Query(params): Query<QueryParams>) -> Response {
    match search_svc::search_documents(&state.pool, &params.q).await {
        Ok(results) => Json(serde_json::json!({ "results": results })).into_response(),
        Err(e) => {
            error!(error = %e, "search failed");
            error_body(StatusCode::INTERNAL_SERVER_ERROR, "Search failed")
        }
    }
}

/// `GET /api/weather?q=` — current weather for a Philippine city.
pub async fn weather(State(state): State<AppState>, Query(params): Query<QueryParams>) -> Response {
    let q = params.q.trim();
    if q.is_empty() {
        return error_body(StatusCode::BAD_REQUEST, "Missing q");
    }

    let Some(client) = &state.weather else {
        return error_body(StatusCode::SERVICE_UNAVAILABLE, "Weather not configured");
    };

    match client.current(q).await {
        Ok(body) => Json(body).into_response(),
        Err(e) => {
            error!(code = e.error_code(), error = %e, "weather fetch failed");
            error_body(StatusCode::INTERNAL_SERVER_ERROR, "Weather fetch failed")
        }
    }
}

