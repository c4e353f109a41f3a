//! Session, event and fraud record types
//!
//! `GameSession` is the mutable, server-owned record of one play. `GameEvent`
//! and `FraudRecord` are immutable facts appended to the ledger.

use crate::common::{AccountId, Amount, SessionToken};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Session lifecycle state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Active,
    Completed,
    Cancelled,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, SessionStatus::Active)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Active => write!(f, "ACTIVE"),
            SessionStatus::Completed => write!(f, "COMPLETED"),
            SessionStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// One play from stake to cash-out or loss
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameSession {
    pub session_token: SessionToken,
    pub user_id: AccountId,
    /// Bearer token the wallet backend accepts for this account
    pub account_token: String,
    pub bet_amount: Amount,
    pub coins_collected: u32,
    pub win_amount: Amount,
    pub status: SessionStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub is_suspicious: bool,
    pub fraud_reason: Option<String>,
    /// Bumped on every committed mutation
    pub version: u64,
}

impl GameSession {
    pub fn new(
        session_token: SessionToken,
        user_id: AccountId,
        account_token: String,
        bet_amount: Amount,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            session_token,
            user_id,
            account_token,
            bet_amount,
            coins_collected: 0,
            win_amount: Amount::ZERO,
            status: SessionStatus::Active,
            start_time,
            end_time: None,
            is_suspicious: false,
            fraud_reason: None,
            version: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// Flag the session; the first reason sticks.
    pub fn flag_suspicious(&mut self, reason: FraudType) {
        if !self.is_suspicious {
            self.is_suspicious = true;
            self.fraud_reason = Some(reason.as_str().to_string());
        }
    }

    /// Milliseconds of server time since the session started
    pub fn elapsed_ms(&self, now: DateTime<Utc>) -> i64 {
        (now - self.start_time).num_milliseconds().max(0)
    }
}

/// Gameplay event kinds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    #[serde(rename = "GAME_START")]
    Start,
    CoinCollected,
    GameOver,
    CashOut,
}

/// Immutable gameplay fact
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameEvent {
    pub id: Uuid,
    pub session_token: SessionToken,
    pub user_id: AccountId,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub data: serde_json::Value,
}

impl GameEvent {
    pub fn new(
        session: &GameSession,
        event_type: EventType,
        timestamp: DateTime<Utc>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_token: session.session_token.clone(),
            user_id: session.user_id,
            event_type,
            timestamp,
            data,
        }
    }
}

/// Internal fraud taxonomy, never shown to players
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FraudType {
    PositionMismatch,
    MaxCoinsExceeded,
    TooFastCollection,
    CoinMismatch,
    TooShortGame,
    InvalidDuration,
    BalanceUpdateFailed,
}

impl FraudType {
    pub fn as_str(self) -> &'static str {
        match self {
            FraudType::PositionMismatch => "POSITION_MISMATCH",
            FraudType::MaxCoinsExceeded => "MAX_COINS_EXCEEDED",
            FraudType::TooFastCollection => "TOO_FAST_COLLECTION",
            FraudType::CoinMismatch => "COIN_MISMATCH",
            FraudType::TooShortGame => "TOO_SHORT_GAME",
            FraudType::InvalidDuration => "INVALID_DURATION",
            FraudType::BalanceUpdateFailed => "BALANCE_UPDATE_FAILED",
        }
    }
}

impl fmt::Display for FraudType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Immutable record of a detected rule violation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FraudRecord {
    pub id: Uuid,
    pub user_id: AccountId,
    pub session_token: Option<SessionToken>,
    pub fraud_type: FraudType,
    pub description: String,
    pub severity: Severity,
    pub data: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl FraudRecord {
    pub fn new(
        user_id: AccountId,
        session_token: Option<SessionToken>,
        fraud_type: FraudType,
        severity: Severity,
        description: String,
        data: Option<serde_json::Value>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            session_token,
            fraud_type,
            description,
            severity,
            data,
            created_at,
        }
    }
}
