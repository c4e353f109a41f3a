//! Request Handlers
//!
//! Thin adapters: authenticate, check request shape, call the orchestrator,
//! and render the server-computed outcome. The session token is the
//! capability for in-game calls.

use super::{
    errors::ApiError,
    middleware::{authenticate, RequestId},
    models::*,
};
use crate::{
    common::SessionToken,
    metrics::ArbiterMetrics,
    orchestrator::{GameStats, SessionOrchestrator},
    wallet::WalletService,
};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap},
    response::IntoResponse,
    Extension, Json,
};
use chrono::Utc;
use std::sync::Arc;

/// Shared application state
pub struct AppState {
    pub orchestrator: Arc<SessionOrchestrator>,
    pub wallet: Arc<dyn WalletService>,
    pub metrics: Arc<ArbiterMetrics>,
    pub version: String,
}

impl AppState {
    pub fn new(orchestrator: Arc<SessionOrchestrator>, wallet: Arc<dyn WalletService>) -> Self {
        Self {
            metrics: orchestrator.metrics().clone(),
            orchestrator,
            wallet,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

fn body<T>(request_id: &RequestId, payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::invalid_body(request_id.0.clone(), rejection))
}

fn shape_error(request_id: &RequestId, message: String) -> ApiError {
    ApiError::bad_request(request_id.0.clone(), message).with_code("invalid_request")
}

/// GET /
pub async fn root_handler(State(state): State<Arc<AppState>>) -> Json<ServiceInfo> {
    Json(ServiceInfo {
        service: "Snake Game Arbiter".to_string(),
        version: state.version.clone(),
        status: "running".to_string(),
    })
}

/// GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now(),
    })
}

/// GET /api/game/config
pub async fn game_config_handler(State(state): State<Arc<AppState>>) -> Json<GameConfigResponse> {
    Json(GameConfigResponse::from(&state.orchestrator.config().game))
}

/// POST /api/game/start
pub async fn start_game_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<StartGameRequest>, JsonRejection>,
) -> Result<Json<StartGameResponse>, ApiError> {
    let caller = authenticate(&headers, state.wallet.as_ref(), &request_id.0).await?;
    let request = body(&request_id, payload)?;
    let bet = request.bet().map_err(|m| shape_error(&request_id, m))?;

    let session = state
        .orchestrator
        .start_session(&caller, bet)
        .await
        .map_err(|e| ApiError::from_game(request_id.0.clone(), e))?;

    Ok(Json(StartGameResponse {
        session_token: session.session_token,
        status: session.status.to_string(),
        start_time: session.start_time,
        message: "Game started successfully".to_string(),
    }))
}

/// POST /api/game/collect-coin
pub async fn collect_coin_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CoinCollectRequest>, JsonRejection>,
) -> Result<Json<CoinCollectResponse>, ApiError> {
    let request = body(&request_id, payload)?;
    request
        .validate(&state.orchestrator.config().game)
        .map_err(|m| shape_error(&request_id, m))?;

    let effect = state
        .orchestrator
        .collect_coin(
            &SessionToken::from(request.session_token),
            request.coin_position,
            request.snake_head,
            Some(request.timestamp),
        )
        .await
        .map_err(|e| ApiError::from_game(request_id.0.clone(), e))?;

    Ok(Json(CoinCollectResponse {
        coins_collected: effect.coins_collected,
        total_amount: effect.win_amount,
        message: "Coin collected successfully".to_string(),
    }))
}

/// POST /api/game/cashout
pub async fn cashout_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CashOutRequest>, JsonRejection>,
) -> Result<Json<CashOutResponse>, ApiError> {
    let request = body(&request_id, payload)?;
    let claim = request.claim().map_err(|m| shape_error(&request_id, m))?;

    let effect = state
        .orchestrator
        .cash_out(
            &SessionToken::from(request.session_token),
            claim.claimed_coins,
            claim.claimed_duration_ms,
        )
        .await
        .map_err(|e| ApiError::from_game(request_id.0.clone(), e))?;

    Ok(Json(CashOutResponse {
        win_amount: effect.win_amount,
        coins_collected: effect.coins_collected,
        status: "COMPLETED".to_string(),
        message: format!("Successfully cashed out ${}", effect.win_amount),
    }))
}

/// POST /api/game/game-over
pub async fn game_over_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    payload: Result<Json<GameOverRequest>, JsonRejection>,
) -> Result<Json<GameOverResponse>, ApiError> {
    let request = body(&request_id, payload)?;
    let claim = request.claim().map_err(|m| shape_error(&request_id, m))?;

    let effect = state
        .orchestrator
        .game_over(&SessionToken::from(request.session_token), claim)
        .await
        .map_err(|e| ApiError::from_game(request_id.0.clone(), e))?;

    Ok(Json(GameOverResponse {
        coins_lost: effect.coins_lost,
        amount_lost: effect.amount_lost,
        status: "COMPLETED".to_string(),
        message: format!("Game over! You lost ${}", effect.amount_lost),
    }))
}

/// GET /api/game/stats
pub async fn stats_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<GameStats>, ApiError> {
    let caller = authenticate(&headers, state.wallet.as_ref(), &request_id.0).await?;
    let stats = state
        .orchestrator
        .get_stats(caller.account_id)
        .map_err(|e| ApiError::from_game(request_id.0.clone(), e))?;
    Ok(Json(stats))
}

/// GET /metrics
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.to_prometheus_format(),
    )
}
