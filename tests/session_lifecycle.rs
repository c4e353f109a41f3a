//! End-to-end session flows through the orchestrator
//! Validates payouts, fraud recording and suspicion gating against an in-memory wallet

use chrono::Duration;
use snake_arbiter::{
    common::{Amount, Clock, GridPosition, ManualClock, SessionToken},
    config::ArbiterConfig,
    errors::GameError,
    game_store::{GameStore, MemoryGameStore},
    metrics::ArbiterMetrics,
    session::{EventType, FraudType, SessionStatus, Severity},
    validation::{CollisionType, GameOverClaim},
    wallet::InMemoryWallet,
    Caller, SessionOrchestrator,
};
use std::sync::Arc;

const ALICE: &str = "alice-token";

struct World {
    orchestrator: Arc<SessionOrchestrator>,
    store: Arc<MemoryGameStore>,
    wallet: Arc<InMemoryWallet>,
    clock: Arc<ManualClock>,
}

fn world_with(config: ArbiterConfig) -> World {
    let store = Arc::new(MemoryGameStore::new());
    let wallet = Arc::new(InMemoryWallet::new());
    wallet.add_account(ALICE, 7, "alice@example.com", Amount::from_minor(10_000));
    let clock = Arc::new(ManualClock::default());
    let orchestrator = Arc::new(SessionOrchestrator::new(
        config,
        store.clone(),
        wallet.clone(),
        clock.clone(),
        Arc::new(ArbiterMetrics::new()),
    ));
    World {
        orchestrator,
        store,
        wallet,
        clock,
    }
}

fn world() -> World {
    world_with(ArbiterConfig::testing())
}

fn alice() -> Caller {
    Caller {
        account_id: 7,
        token: ALICE.to_string(),
    }
}

fn stake() -> Amount {
    Amount::from_minor(500)
}

async fn start(w: &World) -> SessionToken {
    w.orchestrator
        .start_session(&alice(), stake())
        .await
        .expect("start should succeed")
        .session_token
}

async fn collect_at(w: &World, token: &SessionToken, x: i32, y: i32) -> Result<u32, GameError> {
    w.orchestrator
        .collect_coin(token, GridPosition::new(x, y), GridPosition::new(x, y), None)
        .await
        .map(|effect| effect.coins_collected)
}

#[tokio::test]
async fn test_honest_game_cashes_out() {
    let w = world();
    let token = start(&w).await;

    for i in 0..5 {
        w.clock.advance_ms(400);
        assert_eq!(collect_at(&w, &token, i, i).await.unwrap(), i as u32 + 1);
    }
    w.clock.advance_ms(1000);

    let effect = w.orchestrator.cash_out(&token, 5, 3000).await.unwrap();
    assert_eq!(effect.coins_collected, 5);
    assert_eq!(effect.win_amount, Amount::from_minor(50));

    // 100.00 - 5.00 stake + 0.50 winnings
    assert_eq!(w.wallet.balance(ALICE), Some(Amount::from_minor(9_550)));

    let session = w.orchestrator.session(&token).unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert!(session.end_time.is_some());
    assert!(!session.is_suspicious);

    let events = w.orchestrator.session_events(&token).unwrap();
    let kinds: Vec<EventType> = events.iter().map(|e| e.event_type).collect();
    assert_eq!(kinds.first(), Some(&EventType::Start));
    assert_eq!(kinds.last(), Some(&EventType::CashOut));
    assert_eq!(
        kinds.iter().filter(|k| **k == EventType::CoinCollected).count(),
        5
    );

    let recorded = w.wallet.recorded_sessions();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].win_amount, Amount::from_minor(50));
    assert_eq!(recorded[0].bet_amount, stake());
}

#[tokio::test]
async fn test_position_mismatch_is_recorded_not_flagged() {
    let w = world();
    let token = start(&w).await;
    w.clock.advance_ms(300);

    let err = w
        .orchestrator
        .collect_coin(&token, GridPosition::new(5, 5), GridPosition::new(6, 5), Some(42))
        .await
        .unwrap_err();
    assert!(matches!(err, GameError::PositionMismatch));

    let session = w.orchestrator.session(&token).unwrap().unwrap();
    assert_eq!(session.coins_collected, 0);
    assert!(session.is_active());
    assert!(!session.is_suspicious);

    let records = w.store.fraud_for_account(7, w.clock.now() - Duration::hours(1)).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].fraud_type, FraudType::PositionMismatch);
    assert_eq!(records[0].severity, Severity::High);
    assert_eq!(records[0].session_token.as_ref(), Some(&token));

    // The session is still playable
    assert_eq!(collect_at(&w, &token, 5, 5).await.unwrap(), 1);
}

#[tokio::test]
async fn test_rapid_collection_is_throttled_and_flagged() {
    let w = world();
    let token = start(&w).await;

    let mut accepted = 0;
    let mut rejected = 0;
    // 25 claims spread over 900ms
    for i in 0..25 {
        w.clock.advance_ms(36);
        match collect_at(&w, &token, i % 20, i / 20).await {
            Ok(_) => accepted += 1,
            Err(GameError::TooFastCollection) => {
                assert!(i >= 20, "call {} should have been accepted", i + 1);
                rejected += 1;
            }
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
    assert_eq!(accepted, 20);
    assert_eq!(rejected, 5);

    let session = w.orchestrator.session(&token).unwrap().unwrap();
    assert_eq!(session.coins_collected, 20);
    assert!(session.is_suspicious);
    assert_eq!(session.fraud_reason.as_deref(), Some("TOO_FAST_COLLECTION"));

    let history = w.orchestrator.fraud_history(7, 24).unwrap();
    assert_eq!(history.count, 5);
    assert!(history
        .fraud_types
        .iter()
        .all(|t| *t == FraudType::TooFastCollection));

    // Once the window slides past, collection resumes
    w.clock.advance_ms(1100);
    assert_eq!(collect_at(&w, &token, 3, 3).await.unwrap(), 21);
}

#[tokio::test]
async fn test_cashout_with_inflated_coins_is_rejected() {
    let w = world();
    let token = start(&w).await;
    for i in 0..3 {
        w.clock.advance_ms(250);
        collect_at(&w, &token, i, 0).await.unwrap();
    }
    w.clock.advance_ms(1000);

    let err = w.orchestrator.cash_out(&token, 10, 1750).await.unwrap_err();
    assert!(matches!(err, GameError::CoinMismatch));

    let session = w.orchestrator.session(&token).unwrap().unwrap();
    assert!(session.is_active());
    assert!(session.is_suspicious);
    assert_eq!(session.fraud_reason.as_deref(), Some("COIN_MISMATCH"));
    // No winnings paid
    assert_eq!(w.wallet.balance(ALICE), Some(Amount::from_minor(9_500)));

    let records = w.store.fraud_for_account(7, w.clock.now() - Duration::hours(1)).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].severity, Severity::Critical);

    // The honest claim still goes through
    let effect = w.orchestrator.cash_out(&token, 3, 1750).await.unwrap();
    assert_eq!(effect.win_amount, Amount::from_minor(30));
}

#[tokio::test]
async fn test_instant_cashout_is_too_short() {
    let w = world();
    let token = start(&w).await;
    w.clock.advance_ms(20);

    let err = w.orchestrator.cash_out(&token, 0, 20).await.unwrap_err();
    assert!(matches!(err, GameError::TooShortGame));
    assert!(w.orchestrator.session(&token).unwrap().unwrap().is_suspicious);
}

#[tokio::test]
async fn test_game_over_pays_nothing() {
    let w = world();
    let token = start(&w).await;
    for i in 0..4 {
        w.clock.advance_ms(300);
        collect_at(&w, &token, 0, i).await.unwrap();
    }
    w.clock.advance_ms(500);

    let effect = w
        .orchestrator
        .game_over(
            &token,
            GameOverClaim {
                claimed_coins: 4,
                claimed_duration_ms: 1700,
                collision: CollisionType::SelfCollision,
            },
        )
        .await
        .unwrap();
    assert_eq!(effect.coins_lost, 4);
    assert_eq!(effect.amount_lost, stake());

    let session = w.orchestrator.session(&token).unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.win_amount, Amount::ZERO);
    assert_eq!(w.wallet.balance(ALICE), Some(Amount::from_minor(9_500)));

    // Terminal sessions refuse every further operation
    assert!(matches!(
        collect_at(&w, &token, 1, 1).await,
        Err(GameError::SessionNotActive)
    ));
    assert!(matches!(
        w.orchestrator.cash_out(&token, 4, 1700).await,
        Err(GameError::SessionNotActive)
    ));
}

#[tokio::test]
async fn test_one_active_session_per_account() {
    let w = world();
    let first = start(&w).await;

    let err = w.orchestrator.start_session(&alice(), stake()).await.unwrap_err();
    assert!(matches!(err, GameError::ActiveSessionExists));
    // The second stake was never taken
    assert_eq!(w.wallet.balance(ALICE), Some(Amount::from_minor(9_500)));

    w.clock.advance_ms(500);
    w.orchestrator.cash_out(&first, 0, 500).await.unwrap();

    let second = start(&w).await;
    assert_ne!(first, second);
    assert_eq!(w.wallet.balance(ALICE), Some(Amount::from_minor(9_000)));
}

#[tokio::test]
async fn test_suspicious_account_cannot_start() {
    let w = world();
    let token = start(&w).await;
    w.clock.advance_ms(200);

    for _ in 0..3 {
        let _ = w
            .orchestrator
            .collect_coin(&token, GridPosition::new(1, 1), GridPosition::new(2, 2), None)
            .await;
    }
    assert!(w.orchestrator.is_suspicious(7).unwrap());

    // The running session is unaffected
    assert_eq!(collect_at(&w, &token, 4, 4).await.unwrap(), 1);
    w.clock.advance_ms(500);
    w.orchestrator.cash_out(&token, 1, 700).await.unwrap();

    let err = w.orchestrator.start_session(&alice(), stake()).await.unwrap_err();
    assert!(matches!(err, GameError::AccountSuspicious));
    assert_eq!(w.wallet.balance(ALICE), Some(Amount::from_minor(9_510)));

    // Records age out of the rolling window
    w.clock.advance(Duration::hours(25));
    assert!(!w.orchestrator.is_suspicious(7).unwrap());
    start(&w).await;
}

#[tokio::test]
async fn test_stats_cover_completed_sessions() {
    let w = world();

    let won = start(&w).await;
    for i in 0..2 {
        w.clock.advance_ms(300);
        collect_at(&w, &won, i, 0).await.unwrap();
    }
    w.clock.advance_ms(300);
    w.orchestrator.cash_out(&won, 2, 900).await.unwrap();

    let lost = start(&w).await;
    w.clock.advance_ms(800);
    w.orchestrator
        .game_over(
            &lost,
            GameOverClaim {
                claimed_coins: 0,
                claimed_duration_ms: 800,
                collision: CollisionType::Wall,
            },
        )
        .await
        .unwrap();

    let stats = w.orchestrator.get_stats(7).unwrap();
    assert_eq!(stats.total_games, 2);
    assert_eq!(stats.total_wins, 1);
    assert_eq!(stats.total_losses, 1);
    assert_eq!(stats.total_wagered, Amount::from_minor(1_000));
    assert_eq!(stats.total_won, Amount::from_minor(20));
    assert_eq!(stats.biggest_win, Amount::from_minor(20));
    assert_eq!(stats.average_coins, 1.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_collections_are_serialized() {
    let mut config = ArbiterConfig::testing();
    config.fraud.max_collections_per_window = 1_000;
    let w = world_with(config);
    let token = start(&w).await;
    w.clock.advance_ms(100);

    let tasks: Vec<_> = (0..50)
        .map(|i| {
            let orchestrator = w.orchestrator.clone();
            let token = token.clone();
            tokio::spawn(async move {
                let cell = GridPosition::new(i % 20, i / 20);
                orchestrator.collect_coin(&token, cell, cell, None).await
            })
        })
        .collect();

    let mut counts: Vec<u32> = Vec::new();
    for result in futures::future::join_all(tasks).await {
        counts.push(result.unwrap().unwrap().coins_collected);
    }
    counts.sort_unstable();
    assert_eq!(counts, (1..=50).collect::<Vec<u32>>());

    let session = w.orchestrator.session(&token).unwrap().unwrap();
    assert_eq!(session.coins_collected, 50);
    assert_eq!(session.win_amount, Amount::from_minor(500));
    assert_eq!(
        w.store
            .count_events_since(&token, EventType::CoinCollected, w.clock.now() - Duration::hours(1))
            .unwrap(),
        50
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_starts_take_one_stake() {
    let w = world();

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let orchestrator = w.orchestrator.clone();
            tokio::spawn(async move { orchestrator.start_session(&alice(), stake()).await })
        })
        .collect();

    let results = futures::future::join_all(tasks).await;
    let started = results
        .iter()
        .filter(|r| matches!(r, Ok(Ok(_))))
        .count();
    let refused = results
        .iter()
        .filter(|r| matches!(r, Ok(Err(GameError::ActiveSessionExists))))
        .count();
    assert_eq!(started, 1);
    assert_eq!(refused, 7);
    assert_eq!(w.wallet.balance(ALICE), Some(Amount::from_minor(9_500)));
    assert!(w.store.active_session_for(7).unwrap().is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_cashout_and_game_over_settle_once() {
    let w = world();
    let token = start(&w).await;
    for i in 0..3 {
        w.clock.advance_ms(300);
        collect_at(&w, &token, i, 1).await.unwrap();
    }
    w.clock.advance_ms(300);

    let cash = {
        let orchestrator = w.orchestrator.clone();
        let token = token.clone();
        tokio::spawn(async move { orchestrator.cash_out(&token, 3, 1200).await.is_ok() })
    };
    let over = {
        let orchestrator = w.orchestrator.clone();
        let token = token.clone();
        tokio::spawn(async move {
            orchestrator
                .game_over(
                    &token,
                    GameOverClaim {
                        claimed_coins: 3,
                        claimed_duration_ms: 1200,
                        collision: CollisionType::Wall,
                    },
                )
                .await
                .is_ok()
        })
    };

    let (cashed, ended) = (cash.await.unwrap(), over.await.unwrap());
    assert!(cashed ^ ended, "exactly one terminal operation may win");

    let expected = if cashed { 9_530 } else { 9_500 };
    assert_eq!(w.wallet.balance(ALICE), Some(Amount::from_minor(expected)));
    assert_eq!(w.wallet.recorded_sessions().len(), 1);
}
