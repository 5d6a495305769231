//! Runtime configuration loaded from the environment.
//!
//! DESIGN
//! ======
//! `main` loads `.env` (if present) and then builds one `Config` from process
//! environment variables. Numeric and boolean knobs fall back to defaults when
//! unset or unparseable; only the database URL is mandatory.

use std::time::Duration;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_SESSION_TTL_SECS: u64 = 60 * 60 * 24 * 7;
const DEFAULT_SESSION_SWEEP_INTERVAL_SECS: u64 = 300;
const DEFAULT_CLIENT_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),
}

/// Process-wide settings, shared read-only through `AppState`.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub db_max_connections: u32,
    /// Lifetime of a freshly created session.
    pub session_ttl: Duration,
    /// Period of the expired-session sweep.
    pub session_sweep_interval: Duration,
    /// Bound on each connection's outbound event queue.
    pub client_queue_capacity: usize,
    pub cookie_secure: bool,
    /// Enables `POST /api/dev/session`.
    pub dev_session_bypass: bool,
    pub weather_api_key: Option<String>,
}

impl Config {
    /// Build the configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] when neither `DATABASE_PUBLIC_URL` nor
    /// `DATABASE_URL` is set.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = env_string("DATABASE_PUBLIC_URL")
            .or_else(|| env_string("DATABASE_URL"))
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;

        Ok(Self {
            database_url,
            port: env_parse("PORT", DEFAULT_PORT),
            db_max_connections: env_parse("DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS),
            session_ttl: Duration::from_secs(env_parse("SESSION_TTL_SECS", DEFAULT_SESSION_TTL_SECS)),
            session_sweep_interval: Duration::from_secs(
                env_parse("SESSION_SWEEP_INTERVAL_SECS", DEFAULT_SESSION_SWEEP_INTERVAL_SECS).max(1),
            ),
            client_queue_capacity: env_parse("CLIENT_QUEUE_CAPACITY", DEFAULT_CLIENT_QUEUE_CAPACITY).max(1),
            cookie_secure: env_bool("COOKIE_SECURE").unwrap_or(false),
            dev_session_bypass: env_bool("DEV_SESSION_BYPASS").unwrap_or(false),
            weather_api_key: env_string("OPENWEATHER_API_KEY"),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            port: DEFAULT_PORT,
            db_max_connections: DEFAULT_DB_MAX_CONNECTIONS,
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
            session_sweep_interval: Duration::from_secs(DEFAULT_SESSION_SWEEP_INTERVAL_SECS),
            client_queue_capacity: DEFAULT_CLIENT_QUEUE_CAPACITY,
            cookie_secure: false,
            dev_session_bypass: false,
            weather_api_key: None,
        }
    }
}

// =============================================================================
// ENV HELPERS
// =============================================================================

/// Non-empty string value of `key`, trimmed.
fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

pub(crate) fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .and_then(|raw| match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        })
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
