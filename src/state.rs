//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor. It
//! holds the database pool, the store trait objects used by the chat core,
//! and the broadcast bus. HTTP handlers and the websocket handshake read
//! sessions through the same `sessions` store.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::services::bus::BroadcastBus;
use crate::services::chat::{MessageStore, PgMessageStore};
use crate::services::identity::{PgUserDirectory, UserDirectory};
use crate::services::session::{PgSessionStore, SessionStore};
use crate::services::weather::WeatherClient;

/// Shared application state, injected into Axum handlers via State extractor.
/// Clone is required by Axum; all inner fields are Arc-wrapped or Clone.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub sessions: Arc<dyn SessionStore>,
    pub users: Arc<dyn UserDirectory>,
    pub messages: Arc<dyn MessageStore>,
    pub bus: BroadcastBus,
    /// `None` when `OPENWEATHER_API_KEY` is not configured.
    pub weather: Option<WeatherClient>,
}

impl AppState {
    /// Postgres-backed state for production.
    #[must_use]
    pub fn new(pool: PgPool, config: Config) -> Self {
        let weather = config.weather_api_key.as_deref().map(WeatherClient::new);
        Self {
            sessions: Arc::new(PgSessionStore::new(pool.clone())),
            users: Arc::new(PgUserDirectory::new(pool.clone())),
            messages: Arc::new(PgMessageStore::new(pool.clone())),
            pool,
            config: Arc::new(config),
            bus: BroadcastBus::new(),
            weather,
        }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================
