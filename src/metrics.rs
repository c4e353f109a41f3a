//! Arbiter metrics with Prometheus text export

use dashmap::DashMap;
use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Instant,
};

/// Counters shared by the orchestrator and the HTTP layer
pub struct ArbiterMetrics {
    start_time: Instant,
    pub sessions_started: AtomicU64,
    pub coins_accepted: AtomicU64,
    pub cashouts: AtomicU64,
    pub game_overs: AtomicU64,
    pub sessions_cancelled: AtomicU64,
    pub fraud_records: AtomicU64,
    pub wallet_failures: AtomicU64,
    /// Minor units
    pub total_wagered: AtomicU64,
    /// Minor units
    pub total_paid_out: AtomicU64,
    rejections: DashMap<&'static str, u64>,
}

impl Default for ArbiterMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ArbiterMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            sessions_started: AtomicU64::new(0),
            coins_accepted: AtomicU64::new(0),
            cashouts: AtomicU64::new(0),
            game_overs: AtomicU64::new(0),
            sessions_cancelled: AtomicU64::new(0),
            fraud_records: AtomicU64::new(0),
            wallet_failures: AtomicU64::new(0),
            total_wagered: AtomicU64::new(0),
            total_paid_out: AtomicU64::new(0),
            rejections: DashMap::new(),
        }
    }

    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, value: u64) {
        counter.fetch_add(value, Ordering::Relaxed);
    }

    pub fn record_rejection(&self, reason: &'static str) {
        *self.rejections.entry(reason).or_insert(0) += 1;
    }

    pub fn rejections(&self, reason: &str) -> u64 {
        self.rejections.get(reason).map(|c| *c).unwrap_or(0)
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn to_prometheus_format(&self) -> String {
        let mut output = String::new();

        let counters: [(&str, &str, u64); 7] = [
            ("sessions_started_total", "Sessions created after a successful stake debit", self.sessions_started.load(Ordering::Relaxed)),
            ("coins_accepted_total", "Coin collections accepted", self.coins_accepted.load(Ordering::Relaxed)),
            ("cashouts_total", "Sessions completed by cash-out", self.cashouts.load(Ordering::Relaxed)),
            ("game_overs_total", "Sessions completed by collision", self.game_overs.load(Ordering::Relaxed)),
            ("sessions_cancelled_total", "Sessions cancelled by expiry or operator", self.sessions_cancelled.load(Ordering::Relaxed)),
            ("fraud_records_total", "Fraud records appended", self.fraud_records.load(Ordering::Relaxed)),
            ("wallet_failures_total", "Failed wallet calls", self.wallet_failures.load(Ordering::Relaxed)),
        ];
        for (name, help, value) in counters {
            output.push_str(&format!(
                "# HELP snake_arbiter_{name} {help}\n\
                 # TYPE snake_arbiter_{name} counter\n\
                 snake_arbiter_{name} {value}\n\n"
            ));
        }

        output.push_str(&format!(
            "# HELP snake_arbiter_wagered_total Total stakes debited\n\
             # TYPE snake_arbiter_wagered_total counter\n\
             snake_arbiter_wagered_total {:.2}\n\n",
            self.total_wagered.load(Ordering::Relaxed) as f64 / 100.0
        ));
        output.push_str(&format!(
            "# HELP snake_arbiter_paid_out_total Total winnings credited\n\
             # TYPE snake_arbiter_paid_out_total counter\n\
             snake_arbiter_paid_out_total {:.2}\n\n",
            self.total_paid_out.load(Ordering::Relaxed) as f64 / 100.0
        ));

        output.push_str(
            "# HELP snake_arbiter_rejections_total Rejected requests by reason\n\
             # TYPE snake_arbiter_rejections_total counter\n",
        );
        let mut reasons: Vec<(&'static str, u64)> =
            self.rejections.iter().map(|e| (*e.key(), *e.value())).collect();
        reasons.sort();
        for (reason, count) in reasons {
            output.push_str(&format!(
                "snake_arbiter_rejections_total{{reason=\"{}\"}} {}\n",
                reason, count
            ));
        }
        output.push('\n');

        output.push_str(&format!(
            "# HELP snake_arbiter_uptime_seconds Process uptime\n\
             # TYPE snake_arbiter_uptime_seconds gauge\n\
             snake_arbiter_uptime_seconds {}\n",
            self.uptime_seconds()
        ));

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prometheus_export() {
        let metrics = ArbiterMetrics::new();
        ArbiterMetrics::incr(&metrics.sessions_started);
        ArbiterMetrics::add(&metrics.total_wagered, 500);
        metrics.record_rejection("invalid_position");
        metrics.record_rejection("invalid_position");
        metrics.record_rejection("collecting_too_fast");

        let text = metrics.to_prometheus_format();
        assert!(text.contains("snake_arbiter_sessions_started_total 1"));
        assert!(text.contains("snake_arbiter_wagered_total 5.00"));
        assert!(text.contains("snake_arbiter_rejections_total{reason=\"invalid_position\"} 2"));
        assert!(text.contains("snake_arbiter_rejections_total{reason=\"collecting_too_fast\"} 1"));
        assert_eq!(metrics.rejections("invalid_position"), 2);
        assert_eq!(metrics.rejections("unknown"), 0);
    }
}
