mod config;
mod db;
mod frame;
mod routes;
mod services;
mod state;

use tracing::{info, warn};

#[tokio::main]
async fn main() {
    // A missing .env is fine; the process environment is authoritative.
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt::init();

    let config = config::Config::from_env().expect("invalid configuration");
    let port = config.port;

    let pool = db::init_pool(&config.database_url, config.db_max_connections)
        .await
        .expect("database init failed");

    if config.weather_api_key.is_none() {
        warn!("OPENWEATHER_API_KEY not set; weather proxy disabled");
    }

    let state = state::AppState::new(pool, config);

    let sweeper =
        services::session::spawn_session_sweeper(state.sessions.clone(), state.config.session_sweep_interval);

    let bus = state.bus.clone();
    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    info!(%port, "aletheia chat listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            let dropped = bus.drain().await;
            info!(connections = dropped, "shutdown: chat bus drained");
        })
        .await
        .expect("server failed");

    sweeper.abort();
    info!("shutdown complete");
}
