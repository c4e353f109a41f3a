//! Test to verify session persistence across restarts
//! This validates that sessions, the event ledger and fraud records survive reopening the database

use snake_arbiter::{
    common::{Amount, Clock, GridPosition, ManualClock},
    config::ArbiterConfig,
    game_store::{GameStore, RocksGameStore},
    metrics::ArbiterMetrics,
    session::{EventType, FraudType, SessionStatus},
    wallet::InMemoryWallet,
    Caller, SessionOrchestrator,
};
use std::sync::Arc;

const TOKEN: &str = "persistent-player";

fn orchestrator(
    store: Arc<RocksGameStore>,
    wallet: Arc<InMemoryWallet>,
    clock: Arc<ManualClock>,
) -> SessionOrchestrator {
    SessionOrchestrator::new(
        ArbiterConfig::testing(),
        store,
        wallet,
        clock,
        Arc::new(ArbiterMetrics::new()),
    )
}

#[tokio::test]
async fn test_db_persistence_across_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let wallet = Arc::new(InMemoryWallet::new());
    wallet.add_account(TOKEN, 3, "p@example.com", Amount::from_minor(5_000));
    let clock = Arc::new(ManualClock::default());
    let caller = Caller {
        account_id: 3,
        token: TOKEN.to_string(),
    };

    // === PHASE 1: play part of a session, then stop ===
    println!("\n=== PHASE 1: Initial session ===");
    let (active_token, finished_token) = {
        let store = Arc::new(RocksGameStore::open(dir.path()).unwrap());
        let arbiter = orchestrator(store, wallet.clone(), clock.clone());

        let finished = arbiter
            .start_session(&caller, Amount::from_minor(500))
            .await
            .unwrap()
            .session_token;
        for i in 0..2 {
            clock.advance_ms(300);
            arbiter
                .collect_coin(&finished, GridPosition::new(i, 0), GridPosition::new(i, 0), None)
                .await
                .unwrap();
        }
        clock.advance_ms(300);
        arbiter.cash_out(&finished, 2, 900).await.unwrap();

        let active = arbiter
            .start_session(&caller, Amount::from_minor(500))
            .await
            .unwrap()
            .session_token;
        clock.advance_ms(250);
        arbiter
            .collect_coin(&active, GridPosition::new(9, 9), GridPosition::new(9, 9), None)
            .await
            .unwrap();
        // One recorded violation
        let _ = arbiter
            .collect_coin(&active, GridPosition::new(1, 1), GridPosition::new(2, 1), None)
            .await;

        println!("📊 Before shutdown: active={} finished={}", active, finished);
        (active, finished)
    };

    // === PHASE 2: reopen and verify state ===
    println!("\n=== PHASE 2: Restart ===");
    let store = Arc::new(RocksGameStore::open(dir.path()).unwrap());

    let finished = store.load_session(&finished_token).unwrap().unwrap();
    assert_eq!(finished.status, SessionStatus::Completed);
    assert_eq!(finished.win_amount, Amount::from_minor(20));

    let active = store.active_session_for(3).unwrap().unwrap();
    assert_eq!(active.session_token, active_token);
    assert_eq!(active.coins_collected, 1);

    let events = store.events_for_session(&active_token).unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].event_type, EventType::Start);
    assert_eq!(events[1].event_type, EventType::CoinCollected);

    let fraud = store
        .fraud_for_account(3, clock.now() - chrono::Duration::hours(1))
        .unwrap();
    assert_eq!(fraud.len(), 1);
    assert_eq!(fraud[0].fraud_type, FraudType::PositionMismatch);

    // === PHASE 3: the reopened arbiter continues the live session ===
    println!("\n=== PHASE 3: Resume ===");
    let arbiter = orchestrator(store.clone(), wallet.clone(), clock.clone());
    clock.advance_ms(300);
    let effect = arbiter
        .collect_coin(&active_token, GridPosition::new(4, 4), GridPosition::new(4, 4), None)
        .await
        .unwrap();
    assert_eq!(effect.coins_collected, 2);
    clock.advance_ms(300);
    arbiter.cash_out(&active_token, 2, 850).await.unwrap();

    let stats = arbiter.get_stats(3).unwrap();
    assert_eq!(stats.total_games, 2);
    assert_eq!(stats.total_won, Amount::from_minor(40));
    assert_eq!(wallet.balance(TOKEN), Some(Amount::from_minor(4_040)));
    println!("✅ Sessions persisted across restart");
}
