use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use questboard::{anticheat, api, broadcast, state::AppState, ws};

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist, only log if it's a different issue
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "questboard=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting questboard...");

    let anticheat_config = anticheat::AntiCheatConfig::from_env();
    let state = Arc::new(AppState::with_config(anticheat_config));

    // Background task: recompute staled boards and push them to the live feed
    broadcast::spawn_leaderboard_refresher(state.clone());

    let app = Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/api/action", post(api::submit_action))
        .route("/api/leaderboard", get(api::get_leaderboard))
        .route("/api/rank", get(api::get_user_rank))
        .route("/api/progress/{user_id}", get(api::get_user_progress))
        .route("/api/flags", get(api::get_flags))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8970u16);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
