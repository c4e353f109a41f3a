//! Route Definitions

use super::handlers::*;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Build the API router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        // Game endpoints
        .route("/api/game/config", get(game_config_handler))
        .route("/api/game/start", post(start_game_handler))
        .route("/api/game/collect-coin", post(collect_coin_handler))
        .route("/api/game/cashout", post(cashout_handler))
        .route("/api/game/game-over", post(game_over_handler))
        .route("/api/game/stats", get(stats_handler))
        .with_state(state)
}
