//! API Request and Response Models
//!
//! Request types check their own shape (bounds, enums, positivity) before
//! anything reaches the orchestrator. Shape failures never produce fraud
//! records.

use crate::{
    common::{Amount, GridPosition, SessionToken},
    config::GameRules,
    validation::{CashoutClaim, CollisionType, GameOverClaim},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Service banner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub service: String,
    pub version: String,
    pub status: String,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

/// Public game parameters for the client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfigResponse {
    pub bet_amount: Amount,
    pub coin_value: Amount,
    pub max_win_amount: Amount,
    pub initial_speed: f64,
    pub speed_multiplier: f64,
    pub min_speed: f64,
}

impl From<&GameRules> for GameConfigResponse {
    fn from(rules: &GameRules) -> Self {
        Self {
            bet_amount: rules.bet_amount,
            coin_value: rules.coin_value,
            max_win_amount: rules.max_win_amount,
            initial_speed: rules.initial_speed,
            speed_multiplier: rules.speed_multiplier,
            min_speed: rules.min_speed,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StartGameRequest {
    pub bet_amount: f64,
}

impl StartGameRequest {
    pub fn bet(&self) -> Result<Amount, String> {
        if !(self.bet_amount > 0.0) {
            return Err("Bet amount must be positive".to_string());
        }
        Amount::from_major_exact(self.bet_amount)
            .ok_or_else(|| "Bet amount must be a whole number of cents".to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartGameResponse {
    pub session_token: SessionToken,
    pub status: String,
    pub start_time: DateTime<Utc>,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CoinCollectRequest {
    pub session_token: String,
    pub coin_position: GridPosition,
    pub snake_head: GridPosition,
    /// Client clock, milliseconds; recorded, never trusted
    pub timestamp: i64,
}

impl CoinCollectRequest {
    pub fn validate(&self, rules: &GameRules) -> Result<(), String> {
        require_token(&self.session_token)?;
        for position in [self.coin_position, self.snake_head] {
            if !position.within(rules.grid_size) {
                return Err(format!(
                    "Position must be within grid bounds (0-{})",
                    rules.grid_size - 1
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoinCollectResponse {
    pub coins_collected: u32,
    pub total_amount: Amount,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CashOutRequest {
    pub session_token: String,
    pub coins_collected: i64,
    pub final_speed: f64,
    /// Milliseconds
    pub game_duration: i64,
}

impl CashOutRequest {
    /// Over-large coin claims pass through so the engine records the mismatch
    pub fn claim(&self) -> Result<CashoutClaim, String> {
        require_token(&self.session_token)?;
        let claimed_coins = u32::try_from(self.coins_collected)
            .map_err(|_| "Coins collected must be non-negative".to_string())?;
        if !(self.final_speed > 0.0) {
            return Err("Final speed must be positive".to_string());
        }
        if self.game_duration <= 0 {
            return Err("Game duration must be positive".to_string());
        }
        Ok(CashoutClaim {
            claimed_coins,
            claimed_duration_ms: self.game_duration as u64,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashOutResponse {
    pub win_amount: Amount,
    pub coins_collected: u32,
    pub status: String,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GameOverRequest {
    pub session_token: String,
    pub coins_collected: i64,
    pub game_duration: i64,
    pub collision_type: String,
}

impl GameOverRequest {
    pub fn claim(&self) -> Result<GameOverClaim, String> {
        require_token(&self.session_token)?;
        let claimed_coins = u32::try_from(self.coins_collected)
            .map_err(|_| "Coins collected must be non-negative".to_string())?;
        if self.game_duration <= 0 {
            return Err("Game duration must be positive".to_string());
        }
        let collision = self.collision_type.parse::<CollisionType>()?;
        Ok(GameOverClaim {
            claimed_coins,
            claimed_duration_ms: self.game_duration as u64,
            collision,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameOverResponse {
    pub coins_lost: u32,
    pub amount_lost: Amount,
    pub status: String,
    pub message: String,
}

fn require_token(token: &str) -> Result<(), String> {
    if token.trim().is_empty() {
        return Err("Session token is required".to_string());
    }
    Ok(())
}
