//! Session orchestrator
//!
//! Sequences validation verdicts against the store and the wallet. Every
//! operation on one session runs inside that session's async lock, so the
//! load, validate, mutate and append steps see a consistent snapshot and
//! the collection-rate count cannot race the append that follows it. Starts
//! are serialized per account for the one-active-session rule.
//!
//! Money ordering:
//! - start: debit first; no session exists unless the stake was taken
//! - cash-out: commit the validated win first, then credit; a failed credit
//!   is recorded for reconciliation, never rolled back

use crate::{
    common::{AccountId, Amount, Clock, GridPosition, SessionToken},
    config::ArbiterConfig,
    errors::{GameError, GameResult, StoreError, WalletError},
    game_store::{GameStore, SessionCommit},
    metrics::ArbiterMetrics,
    session::{EventType, FraudRecord, FraudType, GameEvent, GameSession, SessionStatus, Severity},
    suspicion::{FraudHistory, SuspicionGate},
    validation::{
        CashoutClaim, CashoutEffect, CoinClaim, CoinEffect, FraudFinding, GameOverClaim,
        GameOverEffect, ValidationEngine,
    },
    wallet::{SessionReport, WalletService},
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::json;
use std::{future::Future, sync::Arc};
use tokio::{sync::Mutex, task::JoinHandle};
use tracing::{debug, error, info, warn};

/// Authenticated account making a request
#[derive(Debug, Clone)]
pub struct Caller {
    pub account_id: AccountId,
    /// Bearer token forwarded to the wallet backend
    pub token: String,
}

/// Aggregates over an account's completed sessions
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GameStats {
    pub total_games: usize,
    pub total_wins: usize,
    pub total_losses: usize,
    pub total_wagered: Amount,
    pub total_won: Amount,
    pub biggest_win: Amount,
    pub average_coins: f64,
}

impl GameStats {
    pub fn from_sessions<'a>(sessions: impl IntoIterator<Item = &'a GameSession>) -> Self {
        let completed: Vec<&GameSession> = sessions
            .into_iter()
            .filter(|s| s.status == SessionStatus::Completed)
            .collect();

        let total_games = completed.len();
        let total_wins = completed.iter().filter(|s| !s.win_amount.is_zero()).count();
        let total_wagered = completed
            .iter()
            .fold(Amount::ZERO, |acc, s| acc.saturating_add(s.bet_amount));
        let total_won = completed
            .iter()
            .fold(Amount::ZERO, |acc, s| acc.saturating_add(s.win_amount));
        let biggest_win = completed
            .iter()
            .map(|s| s.win_amount)
            .max()
            .unwrap_or(Amount::ZERO);
        let average_coins = if total_games > 0 {
            let coins: u64 = completed.iter().map(|s| s.coins_collected as u64).sum();
            (coins as f64 / total_games as f64 * 100.0).round() / 100.0
        } else {
            0.0
        };

        Self {
            total_games,
            total_wins,
            total_losses: total_games - total_wins,
            total_wagered,
            total_won,
            biggest_win,
            average_coins,
        }
    }
}

pub struct SessionOrchestrator {
    config: ArbiterConfig,
    engine: ValidationEngine,
    store: Arc<dyn GameStore>,
    wallet: Arc<dyn WalletService>,
    clock: Arc<dyn Clock>,
    metrics: Arc<ArbiterMetrics>,
    gate: SuspicionGate,
    session_locks: DashMap<SessionToken, Arc<Mutex<()>>>,
    account_locks: DashMap<AccountId, Arc<Mutex<()>>>,
}

/// Map store failures onto caller-facing outcomes
fn store_error(e: StoreError) -> GameError {
    match e {
        StoreError::SessionNotFound(_) => GameError::SessionNotFound,
        StoreError::SessionTerminal(_) => GameError::SessionNotActive,
        StoreError::ActiveSessionExists(_) => GameError::ActiveSessionExists,
        other => GameError::Storage(other),
    }
}

impl SessionOrchestrator {
    pub fn new(
        config: ArbiterConfig,
        store: Arc<dyn GameStore>,
        wallet: Arc<dyn WalletService>,
        clock: Arc<dyn Clock>,
        metrics: Arc<ArbiterMetrics>,
    ) -> Self {
        Self {
            engine: ValidationEngine::from_config(&config),
            gate: SuspicionGate::new(store.clone(), config.fraud.clone()),
            config,
            store,
            wallet,
            clock,
            metrics,
            session_locks: DashMap::new(),
            account_locks: DashMap::new(),
        }
    }

    pub fn config(&self) -> &ArbiterConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<ArbiterMetrics> {
        &self.metrics
    }

    // The Arc is cloned out so no map guard is held across an await
    fn session_lock(&self, token: &SessionToken) -> Arc<Mutex<()>> {
        self.session_locks.entry(token.clone()).or_default().clone()
    }

    fn account_lock(&self, account: AccountId) -> Arc<Mutex<()>> {
        self.account_locks.entry(account).or_default().clone()
    }

    fn release_session_lock(&self, token: &SessionToken) {
        self.session_locks.remove(token);
    }

    /// Drop the account's lock entry once no caller holds or awaits it
    fn prune_account_lock(&self, account: AccountId) {
        self.account_locks
            .remove_if(&account, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Load a session under its lock. Unknown or finished sessions leave no
    /// lock entry behind.
    fn load(&self, token: &SessionToken) -> GameResult<GameSession> {
        match self.store.load_session(token)? {
            Some(session) => {
                if session.status.is_terminal() {
                    self.release_session_lock(token);
                }
                Ok(session)
            }
            None => {
                self.release_session_lock(token);
                Err(GameError::SessionNotFound)
            }
        }
    }

    fn reject<T>(&self, error: GameError) -> GameResult<T> {
        if error.is_validation_failure() {
            debug!(reason = error.reason(), "Client claim rejected");
        }
        self.metrics.record_rejection(error.reason());
        Err(error)
    }

    async fn wallet_call<T, F>(&self, op: &'static str, call: F) -> Result<T, WalletError>
    where
        F: Future<Output = Result<T, WalletError>>,
    {
        let result = match tokio::time::timeout(self.config.wallet.timeout(), call).await {
            Ok(result) => result,
            Err(_) => Err(WalletError::Timeout),
        };
        if let Err(e) = &result {
            if !matches!(e, WalletError::InsufficientFunds(_)) {
                ArbiterMetrics::incr(&self.metrics.wallet_failures);
                warn!(op, error = %e, "Wallet call failed");
            }
        }
        result
    }

    /// Turn findings into ledger records, logging each one
    fn fraud_records(
        &self,
        session: &GameSession,
        findings: Vec<FraudFinding>,
        now: DateTime<Utc>,
    ) -> Vec<FraudRecord> {
        findings
            .into_iter()
            .map(|finding| {
                warn!(
                    session = %session.session_token,
                    account_id = session.user_id,
                    fraud_type = %finding.fraud_type,
                    severity = ?finding.severity,
                    "{}",
                    finding.description
                );
                finding.into_record(session, now)
            })
            .collect()
    }

    /// Persist the findings of a rejected claim, flagging the session when
    /// any finding demands it
    fn record_rejection(
        &self,
        session: &GameSession,
        flag: Option<FraudType>,
        findings: Vec<FraudFinding>,
        now: DateTime<Utc>,
    ) -> GameResult<()> {
        if findings.is_empty() {
            return Ok(());
        }
        let records = self.fraud_records(session, findings, now);
        ArbiterMetrics::add(&self.metrics.fraud_records, records.len() as u64);

        match flag {
            Some(reason) if session.is_active() => {
                let mut flagged = session.clone();
                flagged.flag_suspicious(reason);
                let commit = SessionCommit::new(flagged).with_fraud(records.clone());
                if let Err(e) = self.store.commit(commit) {
                    // The flag is lost but the records must still land
                    error!(session = %session.session_token, error = %e, "Failed to flag session");
                    self.store.append_fraud(&records)?;
                    return Err(store_error(e));
                }
            }
            _ => self.store.append_fraud(&records)?,
        }
        Ok(())
    }

    /// Best-effort history write after a session ends
    async fn report_session(&self, session: &GameSession) {
        let report = SessionReport {
            game_type: self.config.game.game_tag.clone(),
            bet_amount: session.bet_amount,
            win_amount: session.win_amount,
            session_token: session.session_token.clone(),
        };
        if let Err(e) = self
            .wallet_call(
                "record_session",
                self.wallet.record_session(&session.account_token, &report),
            )
            .await
        {
            debug!(session = %session.session_token, error = %e, "Session recording skipped");
        }
    }

    /// Stake the configured bet and open a session
    pub async fn start_session(&self, caller: &Caller, bet_amount: Amount) -> GameResult<GameSession> {
        if let Err(e) = self.engine.validate_start(bet_amount) {
            return self.reject(e);
        }

        let lock = self.account_lock(caller.account_id);
        let result = {
            let _guard = lock.lock().await;
            self.open_session(caller, bet_amount).await
        };
        drop(lock);
        self.prune_account_lock(caller.account_id);
        result
    }

    /// Start sequence; runs under the account lock
    async fn open_session(&self, caller: &Caller, bet_amount: Amount) -> GameResult<GameSession> {
        let now = self.clock.now();
        if self.gate.is_suspicious(caller.account_id, now)? {
            warn!(account_id = caller.account_id, "Start refused for suspicious account");
            return self.reject(GameError::AccountSuspicious);
        }
        if self.store.active_session_for(caller.account_id)?.is_some() {
            return self.reject(GameError::ActiveSessionExists);
        }

        let tag = self.config.game.game_tag.as_str();
        if let Err(e) = self
            .wallet_call("debit", self.wallet.debit(&caller.token, bet_amount, tag))
            .await
        {
            return self.reject(e.into());
        }

        let start_time = self.clock.now();
        let session = GameSession::new(
            SessionToken::generate(),
            caller.account_id,
            caller.token.clone(),
            bet_amount,
            start_time,
        );
        let event = GameEvent::new(
            &session,
            EventType::Start,
            start_time,
            json!({ "bet_amount": bet_amount }),
        );

        if let Err(e) = self.store.insert_session(&session, &event) {
            error!(account_id = caller.account_id, error = %e, "Session insert failed after debit, refunding stake");
            if let Err(refund) = self
                .wallet_call("refund", self.wallet.credit(&caller.token, bet_amount, tag))
                .await
            {
                error!(
                    account_id = caller.account_id,
                    amount = %bet_amount,
                    error = %refund,
                    "Stake refund failed"
                );
            }
            return self.reject(store_error(e));
        }

        ArbiterMetrics::incr(&self.metrics.sessions_started);
        ArbiterMetrics::add(&self.metrics.total_wagered, bet_amount.minor());
        info!(
            session = %session.session_token,
            account_id = caller.account_id,
            bet = %bet_amount,
            "Game session started"
        );
        Ok(session)
    }

    pub async fn collect_coin(
        &self,
        token: &SessionToken,
        coin_position: GridPosition,
        snake_head: GridPosition,
        client_timestamp: Option<i64>,
    ) -> GameResult<CoinEffect> {
        let lock = self.session_lock(token);
        let _guard = lock.lock().await;

        let session = self.load(token)?;
        let now = self.clock.now();
        let window_start = now - self.config.fraud.collection_window();
        let recent_collections =
            self.store
                .count_events_since(token, EventType::CoinCollected, window_start)?;

        let claim = CoinClaim {
            coin_position,
            snake_head,
            recent_collections,
        };
        let verdict = self.engine.validate_coin_collection(&session, &claim);
        let flag = verdict.session_flag();
        let effect = match verdict.outcome {
            Ok(effect) => effect,
            Err(e) => {
                self.record_rejection(&session, flag, verdict.findings, now)?;
                return self.reject(e);
            }
        };

        let mut updated = session.clone();
        updated.coins_collected = effect.coins_collected;
        updated.win_amount = effect.win_amount;
        let event = GameEvent::new(
            &updated,
            EventType::CoinCollected,
            now,
            json!({
                "coin_position": coin_position,
                "snake_head": snake_head,
                "client_timestamp": client_timestamp,
                "coins_collected": effect.coins_collected,
            }),
        );
        self.store
            .commit(SessionCommit::new(updated).with_event(event))
            .map_err(store_error)?;

        ArbiterMetrics::incr(&self.metrics.coins_accepted);
        debug!(
            session = %token,
            coins = effect.coins_collected,
            total = %effect.win_amount,
            "Coin collected"
        );
        Ok(effect)
    }

    pub async fn cash_out(
        &self,
        token: &SessionToken,
        claimed_coins: u32,
        claimed_duration_ms: u64,
    ) -> GameResult<CashoutEffect> {
        let lock = self.session_lock(token);
        let _guard = lock.lock().await;

        let session = self.load(token)?;
        let now = self.clock.now();
        let claim = CashoutClaim {
            claimed_coins,
            claimed_duration_ms,
        };
        let verdict = self.engine.validate_cashout(&session, &claim, now);
        let flag = verdict.session_flag();
        let effect = match verdict.outcome {
            Ok(effect) => effect,
            Err(e) => {
                self.record_rejection(&session, flag, verdict.findings, now)?;
                return self.reject(e);
            }
        };

        let mut updated = session.clone();
        updated.status = SessionStatus::Completed;
        updated.end_time = Some(now);
        updated.win_amount = effect.win_amount;
        let event = GameEvent::new(
            &updated,
            EventType::CashOut,
            now,
            json!({
                "claimed_coins": claimed_coins,
                "win_amount": effect.win_amount,
                "claimed_duration_ms": claimed_duration_ms,
                "actual_duration_ms": session.elapsed_ms(now),
            }),
        );
        let records = self.fraud_records(&session, verdict.findings, now);
        ArbiterMetrics::add(&self.metrics.fraud_records, records.len() as u64);
        let completed = self
            .store
            .commit(SessionCommit::new(updated).with_event(event).with_fraud(records))
            .map_err(store_error)?;
        self.release_session_lock(token);

        ArbiterMetrics::incr(&self.metrics.cashouts);
        info!(
            session = %token,
            account_id = completed.user_id,
            coins = effect.coins_collected,
            win = %effect.win_amount,
            "Session cashed out"
        );

        if !effect.win_amount.is_zero() {
            let credit = self
                .wallet_call(
                    "credit",
                    self.wallet.credit(
                        &completed.account_token,
                        effect.win_amount,
                        &self.config.game.game_tag,
                    ),
                )
                .await;
            match credit {
                Ok(()) => ArbiterMetrics::add(&self.metrics.total_paid_out, effect.win_amount.minor()),
                Err(e) => self.record_failed_credit(&completed, effect.win_amount, &e, now),
            }
        }

        self.report_session(&completed).await;
        Ok(effect)
    }

    /// Winnings are owed but unpaid: leave a High record for reconciliation
    fn record_failed_credit(
        &self,
        session: &GameSession,
        amount: Amount,
        cause: &WalletError,
        now: DateTime<Utc>,
    ) {
        error!(
            session = %session.session_token,
            account_id = session.user_id,
            amount = %amount,
            error = %cause,
            "Failed to credit winnings"
        );
        let record = FraudRecord::new(
            session.user_id,
            Some(session.session_token.clone()),
            FraudType::BalanceUpdateFailed,
            Severity::High,
            format!("Failed to credit winnings of {}: {}", amount, cause),
            Some(json!({ "win_amount": amount, "error": cause.to_string() })),
            now,
        );
        ArbiterMetrics::incr(&self.metrics.fraud_records);
        if let Err(e) = self.store.append_fraud(&[record]) {
            error!(session = %session.session_token, error = %e, "Failed to record unpaid winnings");
        }
    }

    pub async fn game_over(
        &self,
        token: &SessionToken,
        claim: GameOverClaim,
    ) -> GameResult<GameOverEffect> {
        let lock = self.session_lock(token);
        let _guard = lock.lock().await;

        let session = self.load(token)?;
        let now = self.clock.now();
        let verdict = self.engine.validate_game_over(&session, &claim);
        let effect = match verdict.outcome {
            Ok(effect) => effect,
            Err(e) => return self.reject(e),
        };

        let mut updated = session.clone();
        updated.status = SessionStatus::Completed;
        updated.end_time = Some(now);
        updated.win_amount = Amount::ZERO;
        let event = GameEvent::new(
            &updated,
            EventType::GameOver,
            now,
            json!({
                "claimed_coins": claim.claimed_coins,
                "collision_type": claim.collision,
                "claimed_duration_ms": claim.claimed_duration_ms,
                "coins_lost": effect.coins_lost,
            }),
        );
        let records = self.fraud_records(&session, verdict.findings, now);
        ArbiterMetrics::add(&self.metrics.fraud_records, records.len() as u64);
        let completed = self
            .store
            .commit(SessionCommit::new(updated).with_event(event).with_fraud(records))
            .map_err(store_error)?;
        self.release_session_lock(token);

        ArbiterMetrics::incr(&self.metrics.game_overs);
        info!(
            session = %token,
            account_id = completed.user_id,
            coins_lost = effect.coins_lost,
            collision = %claim.collision,
            "Game over"
        );

        self.report_session(&completed).await;
        Ok(effect)
    }

    /// Abandon an active session: the stake is forfeited and nothing is paid
    pub async fn cancel_session(&self, token: &SessionToken, reason: &str) -> GameResult<GameSession> {
        let lock = self.session_lock(token);
        let _guard = lock.lock().await;

        let session = self.load(token)?;
        if !session.is_active() {
            return Err(GameError::SessionNotActive);
        }

        let mut updated = session;
        updated.status = SessionStatus::Cancelled;
        updated.end_time = Some(self.clock.now());
        updated.win_amount = Amount::ZERO;
        let cancelled = self
            .store
            .commit(SessionCommit::new(updated))
            .map_err(store_error)?;
        self.release_session_lock(token);

        ArbiterMetrics::incr(&self.metrics.sessions_cancelled);
        info!(
            session = %token,
            account_id = cancelled.user_id,
            coins = cancelled.coins_collected,
            reason,
            "Session cancelled"
        );

        self.report_session(&cancelled).await;
        Ok(cancelled)
    }

    /// Cancel every active session older than the configured age
    pub async fn expire_stale_sessions(&self) -> GameResult<usize> {
        let cutoff = self.clock.now() - self.config.session.max_session_age();
        let stale: Vec<SessionToken> = self
            .store
            .active_sessions()?
            .into_iter()
            .filter(|s| s.start_time < cutoff)
            .map(|s| s.session_token)
            .collect();

        let mut expired = 0;
        for token in stale {
            match self.cancel_session(&token, "expired").await {
                Ok(_) => expired += 1,
                // Finished between the scan and the lock
                Err(GameError::SessionNotActive) | Err(GameError::SessionNotFound) => {}
                Err(e) => warn!(session = %token, error = %e, "Failed to expire session"),
            }
        }
        Ok(expired)
    }

    /// Periodically expire stale sessions until the task is aborted
    pub fn spawn_expiry_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let orchestrator = Arc::clone(self);
        let period = self.config.session.sweep_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match orchestrator.expire_stale_sessions().await {
                    Ok(0) => {}
                    Ok(n) => info!(expired = n, "Expired stale sessions"),
                    Err(e) => error!(error = %e, "Session expiry sweep failed"),
                }
            }
        })
    }

    pub fn session(&self, token: &SessionToken) -> GameResult<Option<GameSession>> {
        Ok(self.store.load_session(token)?)
    }

    pub fn session_events(&self, token: &SessionToken) -> GameResult<Vec<GameEvent>> {
        Ok(self.store.events_for_session(token)?)
    }

    pub fn get_stats(&self, account: AccountId) -> GameResult<GameStats> {
        let sessions = self.store.sessions_for_account(account)?;
        Ok(GameStats::from_sessions(&sessions))
    }

    pub fn fraud_history(&self, account: AccountId, hours: u32) -> GameResult<FraudHistory> {
        Ok(self.gate.fraud_history(account, hours, self.clock.now())?)
    }

    pub fn is_suspicious(&self, account: AccountId) -> GameResult<bool> {
        Ok(self.gate.is_suspicious(account, self.clock.now())?)
    }
}
