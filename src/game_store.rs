//! Session store and event ledger
//!
//! `GameStore` is the persistence boundary for sessions, gameplay events and
//! fraud records. Two implementations share the same contract:
//!
//! - `MemoryGameStore`: dashmap-backed, for tests and `--memory` runs
//! - `RocksGameStore`: RocksDB with JSON values and prefix-keyed indexes
//!
//! Both enforce the cross-entity rules at the write boundary: one active
//! session per account on insert, and optimistic versioning plus terminal
//! immutability on commit. Events and fraud records are append-only.

use crate::{
    common::{AccountId, SessionToken},
    errors::{StoreError, StoreResult},
    session::{EventType, FraudRecord, GameEvent, GameSession},
    storage::OptimizedStorage,
};
use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use std::sync::Mutex;

/// One atomic write against an existing session
#[derive(Debug, Clone)]
pub struct SessionCommit {
    /// Updated snapshot; its `version` must equal the stored version
    pub session: GameSession,
    pub events: Vec<GameEvent>,
    pub fraud: Vec<FraudRecord>,
}

impl SessionCommit {
    pub fn new(session: GameSession) -> Self {
        Self {
            session,
            events: Vec::new(),
            fraud: Vec::new(),
        }
    }

    pub fn with_event(mut self, event: GameEvent) -> Self {
        self.events.push(event);
        self
    }

    pub fn with_fraud(mut self, records: impl IntoIterator<Item = FraudRecord>) -> Self {
        self.fraud.extend(records);
        self
    }
}

pub trait GameStore: Send + Sync {
    /// Create a session with its start event. Fails when the account
    /// already owns an active session.
    fn insert_session(&self, session: &GameSession, start_event: &GameEvent) -> StoreResult<()>;

    fn load_session(&self, token: &SessionToken) -> StoreResult<Option<GameSession>>;

    fn active_session_for(&self, account: AccountId) -> StoreResult<Option<GameSession>>;

    fn sessions_for_account(&self, account: AccountId) -> StoreResult<Vec<GameSession>>;

    fn active_sessions(&self) -> StoreResult<Vec<GameSession>>;

    /// Persist a mutation with its events and fraud records. Returns the
    /// stored snapshot with the bumped version.
    fn commit(&self, commit: SessionCommit) -> StoreResult<GameSession>;

    /// Append fraud records without touching the session
    fn append_fraud(&self, records: &[FraudRecord]) -> StoreResult<()>;

    /// Events for one session in timestamp order
    fn events_for_session(&self, token: &SessionToken) -> StoreResult<Vec<GameEvent>>;

    /// Events of one type strictly after `since`
    fn count_events_since(
        &self,
        token: &SessionToken,
        event_type: EventType,
        since: DateTime<Utc>,
    ) -> StoreResult<usize>;

    /// Fraud records for an account strictly after `since`, oldest first
    fn fraud_for_account(
        &self,
        account: AccountId,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<FraudRecord>>;

    fn count_fraud_since(&self, account: AccountId, since: DateTime<Utc>) -> StoreResult<usize> {
        Ok(self.fraud_for_account(account, since)?.len())
    }
}

/// Shared commit precondition: stored copy must be live and unchanged
fn check_commit(stored: &GameSession, proposed: &GameSession) -> StoreResult<()> {
    if stored.status.is_terminal() {
        return Err(StoreError::SessionTerminal(stored.session_token.to_string()));
    }
    if stored.version != proposed.version {
        return Err(StoreError::VersionConflict {
            token: stored.session_token.to_string(),
            expected: proposed.version,
            found: stored.version,
        });
    }
    Ok(())
}

// ============================================================================
// In-memory store
// ============================================================================

/// Concurrent in-memory store
#[derive(Default)]
pub struct MemoryGameStore {
    sessions: DashMap<SessionToken, GameSession>,
    active_by_account: DashMap<AccountId, SessionToken>,
    events: DashMap<SessionToken, Vec<GameEvent>>,
    fraud: DashMap<AccountId, Vec<FraudRecord>>,
}

impl MemoryGameStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn push_events(&self, events: &[GameEvent]) {
        for event in events {
            self.events
                .entry(event.session_token.clone())
                .or_default()
                .push(event.clone());
        }
    }

    fn push_fraud(&self, records: &[FraudRecord]) {
        for record in records {
            self.fraud
                .entry(record.user_id)
                .or_default()
                .push(record.clone());
        }
    }
}

impl GameStore for MemoryGameStore {
    fn insert_session(&self, session: &GameSession, start_event: &GameEvent) -> StoreResult<()> {
        // The entry guard makes check-then-insert atomic per account
        match self.active_by_account.entry(session.user_id) {
            Entry::Occupied(_) => Err(StoreError::ActiveSessionExists(session.user_id)),
            Entry::Vacant(slot) => {
                self.sessions
                    .insert(session.session_token.clone(), session.clone());
                slot.insert(session.session_token.clone());
                self.push_events(std::slice::from_ref(start_event));
                Ok(())
            }
        }
    }

    fn load_session(&self, token: &SessionToken) -> StoreResult<Option<GameSession>> {
        Ok(self.sessions.get(token).map(|s| s.value().clone()))
    }

    fn active_session_for(&self, account: AccountId) -> StoreResult<Option<GameSession>> {
        let Some(token) = self.active_by_account.get(&account).map(|t| t.value().clone()) else {
            return Ok(None);
        };
        self.load_session(&token)
    }

    fn sessions_for_account(&self, account: AccountId) -> StoreResult<Vec<GameSession>> {
        let mut sessions: Vec<GameSession> = self
            .sessions
            .iter()
            .filter(|s| s.user_id == account)
            .map(|s| s.value().clone())
            .collect();
        sessions.sort_by_key(|s| s.start_time);
        Ok(sessions)
    }

    fn active_sessions(&self) -> StoreResult<Vec<GameSession>> {
        Ok(self
            .sessions
            .iter()
            .filter(|s| s.is_active())
            .map(|s| s.value().clone())
            .collect())
    }

    fn commit(&self, commit: SessionCommit) -> StoreResult<GameSession> {
        let token = commit.session.session_token.clone();
        let stored = {
            let mut slot = self
                .sessions
                .get_mut(&token)
                .ok_or_else(|| StoreError::SessionNotFound(token.to_string()))?;
            check_commit(&slot, &commit.session)?;

            let mut next = commit.session;
            next.version += 1;
            *slot = next.clone();
            self.push_events(&commit.events);
            self.push_fraud(&commit.fraud);
            next
        };

        // Session guard is released before touching the account index
        if stored.status.is_terminal() {
            self.active_by_account
                .remove_if(&stored.user_id, |_, active| *active == token);
        }
        Ok(stored)
    }

    fn append_fraud(&self, records: &[FraudRecord]) -> StoreResult<()> {
        self.push_fraud(records);
        Ok(())
    }

    fn events_for_session(&self, token: &SessionToken) -> StoreResult<Vec<GameEvent>> {
        let mut events = self
            .events
            .get(token)
            .map(|e| e.value().clone())
            .unwrap_or_default();
        events.sort_by_key(|e| e.timestamp);
        Ok(events)
    }

    fn count_events_since(
        &self,
        token: &SessionToken,
        event_type: EventType,
        since: DateTime<Utc>,
    ) -> StoreResult<usize> {
        Ok(self
            .events
            .get(token)
            .map(|events| {
                events
                    .iter()
                    .filter(|e| e.event_type == event_type && e.timestamp > since)
                    .count()
            })
            .unwrap_or(0))
    }

    fn fraud_for_account(
        &self,
        account: AccountId,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<FraudRecord>> {
        let mut records: Vec<FraudRecord> = self
            .fraud
            .get(&account)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| r.created_at > since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }
}

// ============================================================================
// RocksDB store
// ============================================================================

const SESSION_PREFIX: &str = "session:data:";
const ACTIVE_PREFIX: &str = "session:active:";
const ACCOUNT_INDEX_PREFIX: &str = "session:account:";
const EVENT_PREFIX: &str = "event:";
const FRAUD_PREFIX: &str = "fraud:";

fn session_key(token: &SessionToken) -> Vec<u8> {
    format!("{}{}", SESSION_PREFIX, token).into_bytes()
}

// Fixed-width decimal keeps lexical order equal to numeric order
fn active_key(account: AccountId) -> Vec<u8> {
    format!("{}{:020}", ACTIVE_PREFIX, account).into_bytes()
}

fn account_index_prefix(account: AccountId) -> String {
    format!("{}{:020}:", ACCOUNT_INDEX_PREFIX, account)
}

fn account_index_key(account: AccountId, token: &SessionToken) -> Vec<u8> {
    format!("{}{}", account_index_prefix(account), token).into_bytes()
}

fn event_prefix(token: &SessionToken) -> String {
    format!("{}{}:", EVENT_PREFIX, token)
}

fn millis_key(ts: DateTime<Utc>) -> String {
    format!("{:020}", ts.timestamp_millis().max(0))
}

fn event_key(event: &GameEvent) -> Vec<u8> {
    format!(
        "{}{}:{}",
        event_prefix(&event.session_token),
        millis_key(event.timestamp),
        event.id
    )
    .into_bytes()
}

fn fraud_prefix(account: AccountId) -> String {
    format!("{}{:020}:", FRAUD_PREFIX, account)
}

fn fraud_key(record: &FraudRecord) -> Vec<u8> {
    format!(
        "{}{}:{}",
        fraud_prefix(record.user_id),
        millis_key(record.created_at),
        record.id
    )
    .into_bytes()
}

fn encode<T: serde::Serialize>(value: &T, what: &str) -> StoreResult<Vec<u8>> {
    serde_json::to_vec(value)
        .map_err(|e| StoreError::WriteFailed(format!("Failed to encode {}: {}", what, e)))
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8], what: &str) -> StoreResult<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| StoreError::CorruptedData(format!("Failed to decode {}: {}", what, e)))
}

/// Durable store over RocksDB
///
/// Key layout:
/// - `session:data:{token}` -> session JSON
/// - `session:active:{account}` -> token of the live session
/// - `session:account:{account}:{token}` -> empty (history index)
/// - `event:{token}:{millis}:{id}` -> event JSON
/// - `fraud:{account}:{millis}:{id}` -> fraud record JSON
pub struct RocksGameStore {
    storage: OptimizedStorage,
    // Serializes read-check-write sequences; reads stay lock-free
    write_lock: Mutex<()>,
}

impl RocksGameStore {
    pub fn new(storage: OptimizedStorage) -> Self {
        Self {
            storage,
            write_lock: Mutex::new(()),
        }
    }

    pub fn open<P: AsRef<std::path::Path>>(path: P) -> StoreResult<Self> {
        Ok(Self::new(OptimizedStorage::new(path)?))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn put_records(
        &self,
        items: &mut Vec<(Vec<u8>, Vec<u8>)>,
        events: &[GameEvent],
        fraud: &[FraudRecord],
    ) -> StoreResult<()> {
        for event in events {
            items.push((event_key(event), encode(event, "game event")?));
        }
        for record in fraud {
            items.push((fraud_key(record), encode(record, "fraud record")?));
        }
        Ok(())
    }

    fn scan_all(&self, prefix: &str) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>> {
        self.storage.scan_prefix(prefix.as_bytes(), None, usize::MAX)
    }

    fn scan_after(&self, prefix: &str, since: DateTime<Utc>) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>> {
        // Millisecond keys are a lower bound only; callers filter exactly
        let start = format!("{}{}", prefix, millis_key(since));
        self.storage
            .scan_prefix(prefix.as_bytes(), Some(start.as_bytes()), usize::MAX)
    }
}

impl GameStore for RocksGameStore {
    fn insert_session(&self, session: &GameSession, start_event: &GameEvent) -> StoreResult<()> {
        let _guard = self.lock();
        if self.storage.get(&active_key(session.user_id))?.is_some() {
            return Err(StoreError::ActiveSessionExists(session.user_id));
        }

        let mut items = vec![
            (session_key(&session.session_token), encode(session, "session")?),
            (
                active_key(session.user_id),
                session.session_token.as_str().as_bytes().to_vec(),
            ),
            (
                account_index_key(session.user_id, &session.session_token),
                Vec::new(),
            ),
        ];
        self.put_records(&mut items, std::slice::from_ref(start_event), &[])?;
        self.storage.batch_write(&items, &[])
    }

    fn load_session(&self, token: &SessionToken) -> StoreResult<Option<GameSession>> {
        match self.storage.get(&session_key(token))? {
            Some(bytes) => Ok(Some(decode(&bytes, "session")?)),
            None => Ok(None),
        }
    }

    fn active_session_for(&self, account: AccountId) -> StoreResult<Option<GameSession>> {
        let Some(raw) = self.storage.get(&active_key(account))? else {
            return Ok(None);
        };
        let token = String::from_utf8(raw)
            .map_err(|e| StoreError::CorruptedData(format!("active index: {}", e)))?;
        self.load_session(&SessionToken::from(token))
    }

    fn sessions_for_account(&self, account: AccountId) -> StoreResult<Vec<GameSession>> {
        let prefix = account_index_prefix(account);
        let mut sessions = Vec::new();
        for (key, _) in self.scan_all(&prefix)? {
            let token = std::str::from_utf8(&key[prefix.len()..])
                .map_err(|e| StoreError::CorruptedData(format!("account index: {}", e)))?;
            match self.load_session(&SessionToken::from(token))? {
                Some(session) => sessions.push(session),
                None => tracing::warn!(account_id = account, token, "Account index points at missing session"),
            }
        }
        sessions.sort_by_key(|s| s.start_time);
        Ok(sessions)
    }

    fn active_sessions(&self) -> StoreResult<Vec<GameSession>> {
        let mut sessions = Vec::new();
        for (_, raw) in self.scan_all(ACTIVE_PREFIX)? {
            let token = String::from_utf8(raw)
                .map_err(|e| StoreError::CorruptedData(format!("active index: {}", e)))?;
            if let Some(session) = self.load_session(&SessionToken::from(token))? {
                sessions.push(session);
            }
        }
        Ok(sessions)
    }

    fn commit(&self, commit: SessionCommit) -> StoreResult<GameSession> {
        let _guard = self.lock();
        let token = commit.session.session_token.clone();
        let stored = self
            .load_session(&token)?
            .ok_or_else(|| StoreError::SessionNotFound(token.to_string()))?;
        check_commit(&stored, &commit.session)?;

        let mut next = commit.session;
        next.version += 1;

        let mut items = vec![(session_key(&token), encode(&next, "session")?)];
        self.put_records(&mut items, &commit.events, &commit.fraud)?;
        let deletes = if next.status.is_terminal() {
            vec![active_key(next.user_id)]
        } else {
            Vec::new()
        };
        self.storage.batch_write(&items, &deletes)?;
        Ok(next)
    }

    fn append_fraud(&self, records: &[FraudRecord]) -> StoreResult<()> {
        let mut items = Vec::with_capacity(records.len());
        self.put_records(&mut items, &[], records)?;
        self.storage.batch_write(&items, &[])
    }

    fn events_for_session(&self, token: &SessionToken) -> StoreResult<Vec<GameEvent>> {
        self.scan_all(&event_prefix(token))?
            .iter()
            .map(|(_, value)| decode(value, "game event"))
            .collect()
    }

    fn count_events_since(
        &self,
        token: &SessionToken,
        event_type: EventType,
        since: DateTime<Utc>,
    ) -> StoreResult<usize> {
        let mut count = 0;
        for (_, value) in self.scan_after(&event_prefix(token), since)? {
            let event: GameEvent = decode(&value, "game event")?;
            if event.event_type == event_type && event.timestamp > since {
                count += 1;
            }
        }
        Ok(count)
    }

    fn fraud_for_account(
        &self,
        account: AccountId,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<FraudRecord>> {
        let mut records = Vec::new();
        for (_, value) in self.scan_after(&fraud_prefix(account), since)? {
            let record: FraudRecord = decode(&value, "fraud record")?;
            if record.created_at > since {
                records.push(record);
            }
        }
        Ok(records)
    }
}
