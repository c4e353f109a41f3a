//! Error types for the snake arbiter
//!
//! `GameError` is what callers see: every variant carries a stable reason
//! string that is independent of the internal fraud taxonomy. Storage and
//! wallet failures have their own enums and convert into `GameError`.

use thiserror::Error;

/// Outcome errors for session operations
#[derive(Debug, Error)]
pub enum GameError {
    #[error("game session not found")]
    SessionNotFound,

    #[error("game session is not active")]
    SessionNotActive,

    #[error("bet amount must be exactly {expected}")]
    InvalidBetAmount { expected: String },

    #[error("you already have an active game session")]
    ActiveSessionExists,

    #[error("account flagged for suspicious activity")]
    AccountSuspicious,

    #[error("snake head position does not match coin position")]
    PositionMismatch,

    #[error("maximum coins per game exceeded")]
    MaxCoinsExceeded,

    #[error("collecting coins too fast")]
    TooFastCollection,

    #[error("coin count mismatch")]
    CoinMismatch,

    #[error("game duration too short")]
    TooShortGame,

    #[error("invalid or expired token")]
    InvalidToken,

    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("wallet service unavailable: {0}")]
    WalletUnavailable(String),

    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),
}

impl GameError {
    /// Stable, machine-checkable reason returned to clients
    pub fn reason(&self) -> &'static str {
        match self {
            GameError::SessionNotFound => "session_not_found",
            GameError::SessionNotActive => "session_not_active",
            GameError::InvalidBetAmount { .. } => "invalid_bet_amount",
            GameError::ActiveSessionExists => "active_session_exists",
            GameError::AccountSuspicious => "account_suspicious",
            GameError::PositionMismatch => "invalid_position",
            GameError::MaxCoinsExceeded => "max_coins_exceeded",
            GameError::TooFastCollection => "collecting_too_fast",
            GameError::CoinMismatch => "coin_count_mismatch",
            GameError::TooShortGame => "game_too_short",
            GameError::InvalidToken => "unauthorized",
            GameError::InsufficientFunds(_) => "insufficient_funds",
            GameError::WalletUnavailable(_) => "wallet_unavailable",
            GameError::Storage(_) => "internal_error",
        }
    }

    /// Rejections produced by the anti-cheat rules
    pub fn is_validation_failure(&self) -> bool {
        matches!(
            self,
            GameError::PositionMismatch
                | GameError::MaxCoinsExceeded
                | GameError::TooFastCollection
                | GameError::CoinMismatch
                | GameError::TooShortGame
        )
    }
}

/// Storage system errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("account {0} already has an active session")]
    ActiveSessionExists(u64),

    #[error("session {0} not found")]
    SessionNotFound(String),

    #[error("session {0} is terminal and cannot be modified")]
    SessionTerminal(String),

    #[error("version conflict on session {token}: expected {expected}, found {found}")]
    VersionConflict {
        token: String,
        expected: u64,
        found: u64,
    },

    #[error("database open failed: {0}")]
    DatabaseOpenFailed(String),

    #[error("read failed: {0}")]
    ReadFailed(String),

    #[error("write failed: {0}")]
    WriteFailed(String),

    #[error("corrupted data: {0}")]
    CorruptedData(String),
}

impl From<rocksdb::Error> for StoreError {
    fn from(e: rocksdb::Error) -> Self {
        StoreError::WriteFailed(e.to_string())
    }
}

/// Wallet / identity collaborator errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WalletError {
    #[error("invalid or expired token")]
    InvalidToken,

    #[error("insufficient balance: {0}")]
    InsufficientFunds(String),

    #[error("wallet backend unavailable: {0}")]
    Unavailable(String),

    #[error("wallet backend timeout")]
    Timeout,

    #[error("wallet backend rejected request: {0}")]
    Rejected(String),
}

impl From<WalletError> for GameError {
    fn from(e: WalletError) -> Self {
        match e {
            WalletError::InsufficientFunds(msg) => GameError::InsufficientFunds(msg),
            WalletError::InvalidToken => GameError::InvalidToken,
            other => GameError::WalletUnavailable(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for WalletError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            WalletError::Timeout
        } else {
            WalletError::Unavailable(e.to_string())
        }
    }
}

/// Result alias for session operations
pub type GameResult<T> = Result<T, GameError>;

/// Result alias for storage operations
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as StdError;

    #[test]
    fn test_reasons_are_stable_and_distinct() {
        let errors = vec![
            GameError::SessionNotFound,
            GameError::SessionNotActive,
            GameError::InvalidBetAmount { expected: "5.00".into() },
            GameError::ActiveSessionExists,
            GameError::AccountSuspicious,
            GameError::PositionMismatch,
            GameError::MaxCoinsExceeded,
            GameError::TooFastCollection,
            GameError::CoinMismatch,
            GameError::TooShortGame,
            GameError::InvalidToken,
            GameError::InsufficientFunds("low".into()),
            GameError::WalletUnavailable("down".into()),
        ];
        let mut reasons: Vec<_> = errors.iter().map(|e| e.reason()).collect();
        reasons.sort();
        reasons.dedup();
        assert_eq!(reasons.len(), errors.len());
        // Client-facing reasons never leak the internal fraud type names
        assert!(reasons.iter().all(|r| !r.contains("MISMATCH")));
    }

    #[test]
    fn test_wallet_error_conversion() {
        let insufficient: GameError = WalletError::InsufficientFunds("balance 1.00".into()).into();
        assert_eq!(insufficient.reason(), "insufficient_funds");

        let timeout: GameError = WalletError::Timeout.into();
        assert_eq!(timeout.reason(), "wallet_unavailable");

        let revoked: GameError = WalletError::InvalidToken.into();
        assert!(matches!(revoked, GameError::InvalidToken));
        assert_eq!(revoked.reason(), "unauthorized");
    }

    #[test]
    fn test_storage_error_source() {
        let err: GameError = StoreError::WriteFailed("disk".into()).into();
        assert_eq!(err.reason(), "internal_error");
        assert!(err.source().is_some());
    }

    #[test]
    fn test_validation_failure_classification() {
        assert!(GameError::CoinMismatch.is_validation_failure());
        assert!(!GameError::SessionNotActive.is_validation_failure());
        assert!(!GameError::ActiveSessionExists.is_validation_failure());
    }
}
