//! Shared type definitions for the snake arbiter
//!
//! Canonical money, coordinate and identifier types. Amounts are integer
//! minor units internally and decimal major units on the wire.

use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Account identifier assigned by the wallet backend
pub type AccountId = u64;

/// Minor units per major unit (cents)
const MINOR_UNITS: u64 = 100;
// Float noise allowed when checking that a decimal amount is whole cents
const SUB_CENT_TOLERANCE: f64 = 1e-6;

/// Session tokens carry 32 random bytes (256 bits)
const SESSION_TOKEN_BYTES: usize = 32;

/// Monetary amount in minor units (cents)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(u64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn from_minor(minor: u64) -> Self {
        Self(minor)
    }

    /// Convert a decimal major-unit value, rounding to the nearest cent.
    /// Negative and non-finite inputs yield `None`.
    pub fn from_major(major: f64) -> Option<Self> {
        if !major.is_finite() || major < 0.0 {
            return None;
        }
        let minor = (major * MINOR_UNITS as f64).round();
        if minor > u64::MAX as f64 {
            return None;
        }
        Some(Self(minor as u64))
    }

    /// Like `from_major`, but refuses values with a fraction of a cent
    pub fn from_major_exact(major: f64) -> Option<Self> {
        let amount = Self::from_major(major)?;
        let scaled = major * MINOR_UNITS as f64;
        if (scaled - amount.0 as f64).abs() > SUB_CENT_TOLERANCE {
            return None;
        }
        Some(amount)
    }

    pub const fn minor(self) -> u64 {
        self.0
    }

    pub fn to_major(self) -> f64 {
        self.0 as f64 / MINOR_UNITS as f64
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn saturating_mul(self, factor: u64) -> Self {
        Self(self.0.saturating_mul(factor))
    }

    pub fn saturating_add(self, other: Amount) -> Self {
        Self(self.0.saturating_add(other.0))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / MINOR_UNITS, self.0 % MINOR_UNITS)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.to_major())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let major = f64::deserialize(deserializer)?;
        Amount::from_major(major)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid amount: {}", major)))
    }
}

/// Cell on the game grid
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridPosition {
    pub x: i32,
    pub y: i32,
}

impl GridPosition {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Whether the cell lies inside a square grid of `size` cells per side
    pub fn within(&self, size: u32) -> bool {
        let size = size as i64;
        (0..size).contains(&(self.x as i64)) && (0..size).contains(&(self.y as i64))
    }
}

impl fmt::Display for GridPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Opaque, unguessable session identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    /// Generate a fresh token from the OS random source
    pub fn generate() -> Self {
        let mut bytes = [0u8; SESSION_TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SessionToken {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_major_conversion() {
        assert_eq!(Amount::from_major(5.0), Some(Amount::from_minor(500)));
        assert_eq!(Amount::from_major(0.1), Some(Amount::from_minor(10)));
        assert_eq!(Amount::from_minor(50).to_major(), 0.5);
        assert_eq!(Amount::from_major(-1.0), None);
        assert_eq!(Amount::from_major(f64::NAN), None);
    }

    #[test]
    fn test_exact_amount_rejects_fractional_cents() {
        assert_eq!(Amount::from_major_exact(5.0), Some(Amount::from_minor(500)));
        assert_eq!(Amount::from_major_exact(0.1), Some(Amount::from_minor(10)));
        assert_eq!(Amount::from_major_exact(19.99), Some(Amount::from_minor(1999)));
        assert_eq!(Amount::from_major_exact(5.004), None);
        assert_eq!(Amount::from_major_exact(4.996), None);
        assert_eq!(Amount::from_major_exact(-5.0), None);
    }

    #[test]
    fn test_amount_display() {
        assert_eq!(Amount::from_minor(500).to_string(), "5.00");
        assert_eq!(Amount::from_minor(7).to_string(), "0.07");
    }

    #[test]
    fn test_amount_serializes_as_major_units() {
        let json = serde_json::to_string(&Amount::from_minor(250)).unwrap();
        assert_eq!(json, "2.5");
        let back: Amount = serde_json::from_str("0.3").unwrap();
        assert_eq!(back, Amount::from_minor(30));
        assert!(serde_json::from_str::<Amount>("-2.0").is_err());
    }

    #[test]
    fn test_grid_bounds() {
        assert!(GridPosition::new(0, 19).within(20));
        assert!(!GridPosition::new(20, 0).within(20));
        assert!(!GridPosition::new(-1, 3).within(20));
    }

    #[test]
    fn test_session_tokens_are_long_and_unique() {
        let a = SessionToken::generate();
        let b = SessionToken::generate();
        assert_eq!(a.as_str().len(), 64);
        assert_ne!(a, b);
    }
}
