//! Validation engine
//!
//! Pure decision functions over a session snapshot and a client claim. No
//! I/O and no mutation: each call returns a `Verdict` holding either the
//! authoritative effect or the rejection, plus the fraud findings the
//! orchestrator must append to the ledger either way.
//!
//! Money is derived only from the server's `coins_collected`. Numbers the
//! client reports are consistency checks, never payment inputs.

use crate::{
    common::{Amount, GridPosition},
    config::{ArbiterConfig, FraudConfig, GameRules},
    errors::{GameError, GameResult},
    session::{FraudRecord, FraudType, GameSession, Severity},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{fmt, str::FromStr};

/// A rule violation detected while judging a claim
#[derive(Debug, Clone, PartialEq)]
pub struct FraudFinding {
    pub fraud_type: FraudType,
    pub severity: Severity,
    pub description: String,
    pub data: Option<serde_json::Value>,
    /// Whether the session gets its sticky suspicious flag
    pub flags_session: bool,
}

impl FraudFinding {
    fn new(fraud_type: FraudType, severity: Severity, description: String) -> Self {
        Self {
            fraud_type,
            severity,
            description,
            data: None,
            flags_session: false,
        }
    }

    fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    fn flagging(mut self) -> Self {
        self.flags_session = true;
        self
    }

    pub fn into_record(self, session: &GameSession, now: DateTime<Utc>) -> FraudRecord {
        FraudRecord::new(
            session.user_id,
            Some(session.session_token.clone()),
            self.fraud_type,
            self.severity,
            self.description,
            self.data,
            now,
        )
    }
}

/// Engine decision for one claim
#[derive(Debug)]
pub struct Verdict<T> {
    pub outcome: GameResult<T>,
    pub findings: Vec<FraudFinding>,
}

impl<T> Verdict<T> {
    fn accept(effect: T, findings: Vec<FraudFinding>) -> Self {
        Self {
            outcome: Ok(effect),
            findings,
        }
    }

    fn reject(error: GameError, findings: Vec<FraudFinding>) -> Self {
        Self {
            outcome: Err(error),
            findings,
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.outcome.is_ok()
    }

    /// First finding that flags the session, if any
    pub fn session_flag(&self) -> Option<FraudType> {
        self.findings
            .iter()
            .find(|f| f.flags_session)
            .map(|f| f.fraud_type)
    }
}

/// A claimed coin pickup plus the server-side rate count
#[derive(Debug, Clone, Copy)]
pub struct CoinClaim {
    pub coin_position: GridPosition,
    pub snake_head: GridPosition,
    /// Accepted collections already in the trailing window
    pub recent_collections: usize,
}

/// Accepted coin pickup: the session's new totals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoinEffect {
    pub coins_collected: u32,
    pub win_amount: Amount,
}

#[derive(Debug, Clone, Copy)]
pub struct CashoutClaim {
    pub claimed_coins: u32,
    pub claimed_duration_ms: u64,
}

/// Accepted cash-out: terminal transition with the server-computed win
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CashoutEffect {
    pub coins_collected: u32,
    pub win_amount: Amount,
}

/// How the snake died
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CollisionType {
    #[serde(rename = "wall")]
    Wall,
    #[serde(rename = "self")]
    SelfCollision,
}

impl fmt::Display for CollisionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollisionType::Wall => write!(f, "wall"),
            CollisionType::SelfCollision => write!(f, "self"),
        }
    }
}

impl FromStr for CollisionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wall" => Ok(CollisionType::Wall),
            "self" => Ok(CollisionType::SelfCollision),
            other => Err(format!("Collision type must be wall or self, got '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GameOverClaim {
    pub claimed_coins: u32,
    pub claimed_duration_ms: u64,
    pub collision: CollisionType,
}

/// Accepted game-over: the player forfeits everything
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameOverEffect {
    pub coins_lost: u32,
    pub amount_lost: Amount,
}

/// Stateless rule set built from the injected configuration
#[derive(Debug, Clone)]
pub struct ValidationEngine {
    rules: GameRules,
    fraud: FraudConfig,
}

impl ValidationEngine {
    pub fn new(rules: GameRules, fraud: FraudConfig) -> Self {
        Self { rules, fraud }
    }

    pub fn from_config(config: &ArbiterConfig) -> Self {
        Self::new(config.game.clone(), config.fraud.clone())
    }

    pub fn rules(&self) -> &GameRules {
        &self.rules
    }

    /// Only the configured stake is playable
    pub fn validate_start(&self, bet_amount: Amount) -> GameResult<()> {
        if bet_amount != self.rules.bet_amount {
            return Err(GameError::InvalidBetAmount {
                expected: self.rules.bet_amount.to_string(),
            });
        }
        Ok(())
    }

    pub fn validate_coin_collection(
        &self,
        session: &GameSession,
        claim: &CoinClaim,
    ) -> Verdict<CoinEffect> {
        if !session.is_active() {
            return Verdict::reject(GameError::SessionNotActive, Vec::new());
        }

        if claim.coin_position != claim.snake_head {
            let finding = FraudFinding::new(
                FraudType::PositionMismatch,
                Severity::High,
                "Snake head position doesn't match coin position".to_string(),
            )
            .with_data(json!({
                "coin_position": claim.coin_position,
                "snake_head": claim.snake_head,
            }));
            return Verdict::reject(GameError::PositionMismatch, vec![finding]);
        }

        if session.coins_collected >= self.rules.max_coins_per_game {
            let finding = FraudFinding::new(
                FraudType::MaxCoinsExceeded,
                Severity::Critical,
                format!(
                    "Exceeded maximum coins per game ({})",
                    self.rules.max_coins_per_game
                ),
            )
            .flagging();
            return Verdict::reject(GameError::MaxCoinsExceeded, vec![finding]);
        }

        // Accepting one more must not push the window past the limit
        let limit = self.fraud.max_collections_per_window as usize;
        if claim.recent_collections >= limit {
            let finding = FraudFinding::new(
                FraudType::TooFastCollection,
                Severity::High,
                format!(
                    "Collecting coins too fast (>{} per {}ms)",
                    limit, self.fraud.collection_window_ms
                ),
            )
            .with_data(json!({ "recent_collections": claim.recent_collections }))
            .flagging();
            return Verdict::reject(GameError::TooFastCollection, vec![finding]);
        }

        let coins_collected = session.coins_collected + 1;
        Verdict::accept(
            CoinEffect {
                coins_collected,
                win_amount: self.rules.win_amount_for(coins_collected),
            },
            Vec::new(),
        )
    }

    pub fn validate_cashout(
        &self,
        session: &GameSession,
        claim: &CashoutClaim,
        now: DateTime<Utc>,
    ) -> Verdict<CashoutEffect> {
        if !session.is_active() {
            return Verdict::reject(GameError::SessionNotActive, Vec::new());
        }

        if claim.claimed_coins != session.coins_collected {
            let finding = coin_mismatch(session, claim.claimed_coins, Severity::Critical).flagging();
            return Verdict::reject(GameError::CoinMismatch, vec![finding]);
        }

        let win_amount = self.rules.win_amount_for(session.coins_collected);

        if claim.claimed_duration_ms < self.rules.min_game_duration_ms {
            let finding = too_short(claim.claimed_duration_ms, Severity::High).flagging();
            return Verdict::reject(GameError::TooShortGame, vec![finding]);
        }

        let mut findings = Vec::new();
        let actual_ms = session.elapsed_ms(now);
        let tolerated_ms = actual_ms.saturating_mul(self.rules.duration_tolerance_factor as i64);
        if claim.claimed_duration_ms as i64 > tolerated_ms {
            findings.push(
                FraudFinding::new(
                    FraudType::InvalidDuration,
                    Severity::Medium,
                    format!(
                        "Reported duration {}ms, actual {}ms",
                        claim.claimed_duration_ms, actual_ms
                    ),
                )
                .with_data(json!({
                    "reported_ms": claim.claimed_duration_ms,
                    "actual_ms": actual_ms,
                })),
            );
        }

        Verdict::accept(
            CashoutEffect {
                coins_collected: session.coins_collected,
                win_amount,
            },
            findings,
        )
    }

    pub fn validate_game_over(
        &self,
        session: &GameSession,
        claim: &GameOverClaim,
    ) -> Verdict<GameOverEffect> {
        if !session.is_active() {
            return Verdict::reject(GameError::SessionNotActive, Vec::new());
        }

        let mut findings = Vec::new();
        if claim.claimed_coins != session.coins_collected {
            findings.push(coin_mismatch(session, claim.claimed_coins, Severity::High));
        }
        if claim.claimed_duration_ms < self.rules.min_game_duration_ms {
            findings.push(too_short(claim.claimed_duration_ms, Severity::Medium));
        }

        Verdict::accept(
            GameOverEffect {
                coins_lost: session.coins_collected,
                amount_lost: session.bet_amount,
            },
            findings,
        )
    }
}

fn coin_mismatch(session: &GameSession, claimed: u32, severity: Severity) -> FraudFinding {
    FraudFinding::new(
        FraudType::CoinMismatch,
        severity,
        format!(
            "Client reported {} coins, server has {}",
            claimed, session.coins_collected
        ),
    )
    .with_data(json!({
        "client_coins": claimed,
        "server_coins": session.coins_collected,
    }))
}

fn too_short(duration_ms: u64, severity: Severity) -> FraudFinding {
    FraudFinding::new(
        FraudType::TooShortGame,
        severity,
        format!("Game duration too short: {}ms", duration_ms),
    )
}
