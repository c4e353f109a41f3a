//! Snake Arbiter
//!
//! Server-authoritative anti-cheat arbiter for a real-money snake game. The
//! client renders and reports; the server owns the coin count, decides
//! every payout and keeps an append-only ledger of gameplay events and
//! detected fraud.
//!
//! - `validation`: pure rules over a session snapshot and a client claim
//! - `orchestrator`: per-session serialization, store writes, wallet calls
//! - `game_store`: sessions, events and fraud records (memory or RocksDB)
//! - `suspicion`: rolling fraud count gating new sessions
//! - `api`: axum transport

pub mod api;
pub mod common;
pub mod config;
pub mod errors;
pub mod game_store;
pub mod metrics;
pub mod orchestrator;
pub mod session;
pub mod storage;
pub mod suspicion;
pub mod validation;
pub mod wallet;

pub use config::ArbiterConfig;
pub use errors::{GameError, GameResult};
pub use orchestrator::{Caller, SessionOrchestrator};
