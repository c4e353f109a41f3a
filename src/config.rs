//! Configuration management with validation and defaults
//!
//! One immutable `ArbiterConfig` is built at startup (defaults, then an
//! optional TOML file, then CLI overrides) and injected everywhere.

use crate::common::Amount;
use chrono::Duration as ChronoDuration;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Complete arbiter configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArbiterConfig {
    pub game: GameRules,
    pub fraud: FraudConfig,
    pub wallet: WalletConfig,
    pub session: SessionConfig,
    pub storage: StorageConfig,
    pub server: ServerConfig,
}

/// Stake, payout and gameplay limits
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GameRules {
    /// The single accepted stake
    pub bet_amount: Amount,
    pub coin_value: Amount,
    pub max_win_amount: Amount,
    pub max_coins_per_game: u32,
    pub min_game_duration_ms: u64,
    /// Reported durations above `factor × actual elapsed` are recorded
    pub duration_tolerance_factor: u32,
    /// Cells per side of the square board
    pub grid_size: u32,
    /// Tag sent to the wallet backend with every money movement
    pub game_tag: String,
    // Client hints published by the config endpoint
    pub initial_speed: f64,
    pub speed_multiplier: f64,
    pub min_speed: f64,
}

impl Default for GameRules {
    fn default() -> Self {
        Self {
            bet_amount: Amount::from_minor(500),
            coin_value: Amount::from_minor(10),
            max_win_amount: Amount::from_minor(10_000),
            max_coins_per_game: 1000,
            min_game_duration_ms: 100,
            duration_tolerance_factor: 2,
            grid_size: 20,
            game_tag: "SNAKE".to_string(),
            initial_speed: 180.0,
            speed_multiplier: 0.95,
            min_speed: 30.0,
        }
    }
}

impl GameRules {
    /// Authoritative winnings for a coin count
    pub fn win_amount_for(&self, coins: u32) -> Amount {
        self.coin_value
            .saturating_mul(coins as u64)
            .min(self.max_win_amount)
    }
}

/// Anti-cheat thresholds
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FraudConfig {
    /// Accepted collections allowed inside one window
    pub max_collections_per_window: u32,
    pub collection_window_ms: u64,
    /// Fraud records inside the suspicion window that block new sessions
    pub suspicion_threshold: u32,
    pub suspicion_window_hours: u32,
}

impl Default for FraudConfig {
    fn default() -> Self {
        Self {
            max_collections_per_window: 20,
            collection_window_ms: 1000,
            suspicion_threshold: 3,
            suspicion_window_hours: 24,
        }
    }
}

impl FraudConfig {
    pub fn collection_window(&self) -> ChronoDuration {
        ChronoDuration::milliseconds(self.collection_window_ms as i64)
    }

    pub fn suspicion_window(&self) -> ChronoDuration {
        ChronoDuration::hours(self.suspicion_window_hours as i64)
    }
}

/// Wallet backend connection
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout_secs: 10,
        }
    }
}

impl WalletConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Session expiry
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Active sessions older than this are cancelled by the sweeper
    pub max_session_age_secs: u64,
    pub expiry_sweep_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_session_age_secs: 3600,
            expiry_sweep_interval_secs: 60,
        }
    }
}

impl SessionConfig {
    pub fn max_session_age(&self) -> ChronoDuration {
        ChronoDuration::seconds(self.max_session_age_secs as i64)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.expiry_sweep_interval_secs)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    RocksDb,
}

/// Storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub data_directory: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::RocksDb,
            data_directory: "./DB/snake_sessions".to_string(),
        }
    }
}

/// HTTP listener configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            allowed_origins: vec![
                "http://localhost:8888".to_string(),
                "http://localhost:3000".to_string(),
                "http://localhost:3001".to_string(),
            ],
            request_timeout_secs: 30,
        }
    }
}

impl ArbiterConfig {
    /// In-memory storage and short timeouts for tests and local runs
    pub fn testing() -> Self {
        Self {
            wallet: WalletConfig {
                timeout_secs: 1,
                ..Default::default()
            },
            storage: StorageConfig {
                backend: StorageBackend::Memory,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Load from a TOML file; missing keys fall back to defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigValidationError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ConfigValidationError::LoadFailed(format!("{}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigValidationError> {
        let config: Self =
            toml::from_str(raw).map_err(|e| ConfigValidationError::LoadFailed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration for logical consistency
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        let game = &self.game;
        if game.bet_amount.is_zero() {
            return Err(ConfigValidationError::InvalidValue(
                "game.bet_amount must be > 0".to_string(),
            ));
        }
        if game.coin_value.is_zero() {
            return Err(ConfigValidationError::InvalidValue(
                "game.coin_value must be > 0".to_string(),
            ));
        }
        if game.max_coins_per_game == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "game.max_coins_per_game must be > 0".to_string(),
            ));
        }
        if game.grid_size == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "game.grid_size must be > 0".to_string(),
            ));
        }
        if game.duration_tolerance_factor == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "game.duration_tolerance_factor must be > 0".to_string(),
            ));
        }
        if game.max_win_amount < game.coin_value {
            return Err(ConfigValidationError::LogicalInconsistency(
                "game.max_win_amount is below a single coin".to_string(),
            ));
        }

        if self.fraud.max_collections_per_window == 0 || self.fraud.collection_window_ms == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "fraud collection window and threshold must be > 0".to_string(),
            ));
        }
        if self.fraud.suspicion_threshold == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "fraud.suspicion_threshold must be > 0".to_string(),
            ));
        }

        if self.wallet.timeout_secs == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "wallet.timeout_secs must be > 0".to_string(),
            ));
        }
        if self.wallet.base_url.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "wallet.base_url".to_string(),
            ));
        }

        if self.session.max_session_age_secs == 0 || self.session.expiry_sweep_interval_secs == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "session ages and sweep interval must be > 0".to_string(),
            ));
        }

        if self.storage.backend == StorageBackend::RocksDb && self.storage.data_directory.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "storage.data_directory".to_string(),
            ));
        }

        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, Error)]
pub enum ConfigValidationError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
    #[error("Configuration logical inconsistency: {0}")]
    LogicalInconsistency(String),
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
    #[error("Failed to load configuration: {0}")]
    LoadFailed(String),
}
