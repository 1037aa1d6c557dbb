pub mod api;
pub mod config;
pub mod health;
pub mod registry;
pub mod room;
pub mod session;
pub mod state;
pub mod store;
pub mod ws;

use std::time::Duration;

use axum::Router;
use tower_http::cors::CorsLayer;

use config::ServerConfig;
use state::AppState;

/// Build the Axum router and application state from a config.
pub fn build_app(config: ServerConfig) -> (Router<()>, AppState) {
    let state = AppState::new(config);

    let app = Router::new()
        .route("/ws", axum::routing::get(ws::ws_handler))
        .route("/health", axum::routing::get(health::health_check))
        .route("/rooms/{room_id}", axum::routing::get(api::room_info))
        .layer(CorsLayer::permissive())
        .with_state(state.clone());

    (app, state)
}

/// Background task that expires idle rooms on a fixed interval.
pub fn spawn_idle_reaper(state: AppState) {
    tokio::spawn(async move {
        let period = Duration::from_secs(state.config.rooms.idle_check_interval_secs);
        let max_idle = Duration::from_secs(state.config.rooms.idle_timeout_secs);
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await; // the first tick completes immediately
        loop {
            ticker.tick().await;
            let reaped = state.sessions.reap_idle(max_idle);
            if reaped > 0 {
                tracing::info!(reaped, "Idle room sweep finished");
            }
        }
    });
}
