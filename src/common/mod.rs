//! Common utilities and shared functionality
//!
//! Money, grid coordinates, identifiers and the server clock used across the arbiter.

pub mod clock;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use types::{AccountId, Amount, GridPosition, SessionToken};
