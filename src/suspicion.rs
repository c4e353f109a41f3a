//! Suspicion gate
//!
//! Rolling count of fraud records per account. Consulted only when a new
//! session starts; never cached, never decayed.

use crate::{
    common::AccountId,
    config::FraudConfig,
    errors::StoreResult,
    game_store::GameStore,
    session::FraudType,
};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Summary of an account's recent fraud records
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FraudHistory {
    pub count: usize,
    /// Distinct fraud types in first-seen order
    pub fraud_types: Vec<FraudType>,
}

pub struct SuspicionGate {
    store: Arc<dyn GameStore>,
    config: FraudConfig,
}

impl SuspicionGate {
    pub fn new(store: Arc<dyn GameStore>, config: FraudConfig) -> Self {
        Self { store, config }
    }

    /// True once the trailing window holds `suspicion_threshold` records
    pub fn is_suspicious(&self, account: AccountId, now: DateTime<Utc>) -> StoreResult<bool> {
        let since = now - self.config.suspicion_window();
        let count = self.store.count_fraud_since(account, since)?;
        Ok(count >= self.config.suspicion_threshold as usize)
    }

    pub fn fraud_history(
        &self,
        account: AccountId,
        hours: u32,
        now: DateTime<Utc>,
    ) -> StoreResult<FraudHistory> {
        let records = self
            .store
            .fraud_for_account(account, now - Duration::hours(hours as i64))?;

        let mut fraud_types = Vec::new();
        for record in &records {
            if !fraud_types.contains(&record.fraud_type) {
                fraud_types.push(record.fraud_type);
            }
        }

        Ok(FraudHistory {
            count: records.len(),
            fraud_types,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        game_store::MemoryGameStore,
        session::{FraudRecord, Severity},
    };

    fn record(account: AccountId, kind: FraudType, at: DateTime<Utc>) -> FraudRecord {
        FraudRecord::new(account, None, kind, Severity::High, "test".into(), None, at)
    }

    fn gate(store: Arc<MemoryGameStore>) -> SuspicionGate {
        SuspicionGate::new(store, FraudConfig::default())
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let store = Arc::new(MemoryGameStore::new());
        let gate = gate(store.clone());
        let now = Utc::now();

        store
            .append_fraud(&[
                record(1, FraudType::PositionMismatch, now - Duration::minutes(5)),
                record(1, FraudType::PositionMismatch, now - Duration::minutes(4)),
            ])
            .unwrap();
        assert!(!gate.is_suspicious(1, now).unwrap());

        store
            .append_fraud(&[record(1, FraudType::CoinMismatch, now - Duration::minutes(1))])
            .unwrap();
        assert!(gate.is_suspicious(1, now).unwrap());
        assert!(!gate.is_suspicious(2, now).unwrap());
    }

    #[test]
    fn test_old_records_roll_off() {
        let store = Arc::new(MemoryGameStore::new());
        let gate = gate(store.clone());
        let now = Utc::now();

        store
            .append_fraud(&[
                record(1, FraudType::TooShortGame, now - Duration::hours(25)),
                record(1, FraudType::TooShortGame, now - Duration::hours(23)),
                record(1, FraudType::TooShortGame, now - Duration::hours(22)),
            ])
            .unwrap();
        assert!(!gate.is_suspicious(1, now).unwrap());
        assert!(gate.is_suspicious(1, now - Duration::hours(2)).unwrap());
    }

    #[test]
    fn test_fraud_history_lists_distinct_types() {
        let store = Arc::new(MemoryGameStore::new());
        let gate = gate(store.clone());
        let now = Utc::now();

        store
            .append_fraud(&[
                record(5, FraudType::TooFastCollection, now - Duration::minutes(3)),
                record(5, FraudType::PositionMismatch, now - Duration::minutes(2)),
                record(5, FraudType::TooFastCollection, now - Duration::minutes(1)),
            ])
            .unwrap();

        let history = gate.fraud_history(5, 24, now).unwrap();
        assert_eq!(history.count, 3);
        assert_eq!(
            history.fraud_types,
            vec![FraudType::TooFastCollection, FraudType::PositionMismatch]
        );
        assert_eq!(gate.fraud_history(5, 0, now).unwrap().count, 0);
    }
}
