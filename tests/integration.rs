//! Integration tests for the status feed and the token broker

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Barrier};
use std::time::Duration;
use system_status::auth::{TokenBroker, Verdict};
use system_status::sessions::{MemorySessionStore, Session, SessionEvent};
use system_status::status::{subscribe, AggregationState, StatusDelta, StatusFields, StatusSubscription};
use tokio::time::timeout;

async fn next(sub: &mut StatusSubscription) -> StatusDelta {
    timeout(Duration::from_secs(1), sub.next_delta())
        .await
        .expect("timed out waiting for delta")
        .expect("subscription ended")
}

/// Let the processing task drain, then collect whatever is queued
async fn settle(sub: &mut StatusSubscription) -> Vec<StatusDelta> {
    tokio::time::sleep(Duration::from_millis(50)).await;
    let mut deltas = vec![];
    while let Some(delta) = sub.try_next_delta() {
        deltas.push(delta);
    }
    deltas
}

#[tokio::test]
async fn test_feed_scenario_shared_user() {
    let store = MemorySessionStore::new();
    let mut sub = subscribe(&store);
    let mut status = sub.snapshot();
    assert_eq!(status, StatusFields::default());

    store.insert(Session::new("s1", "g1").with_user("u1"));
    status.apply(&next(&mut sub).await);
    store.insert(Session::new("s2", "g2").with_user("u1"));
    status.apply(&next(&mut sub).await);

    assert_eq!(status, StatusFields { active_users: 1, active_grains: 2 });

    store.remove("s1");
    let delta = next(&mut sub).await;
    assert_eq!(
        delta,
        StatusDelta {
            active_users: None,
            active_grains: Some(1),
        }
    );
    status.apply(&delta);
    assert_eq!(status, StatusFields { active_users: 1, active_grains: 1 });
}

#[tokio::test]
async fn test_feed_replays_existing_sessions() {
    let store = MemorySessionStore::new();
    for i in 0..5 {
        store.insert(Session::new(format!("s{}", i), format!("g{}", i % 2)).with_user(format!("u{}", i)));
    }

    let mut sub = subscribe(&store);
    let mut status = sub.snapshot();
    for delta in settle(&mut sub).await {
        status.apply(&delta);
    }

    assert_eq!(status, StatusFields { active_users: 5, active_grains: 2 });
}

#[tokio::test]
async fn test_subscriptions_are_independent() {
    let store = MemorySessionStore::new();
    store.insert(Session::new("s1", "g1").with_user("u1"));

    let mut first = subscribe(&store);
    let _ = next(&mut first).await;

    store.insert(Session::new("s2", "g2"));
    let mut second = subscribe(&store);

    // Late subscriber sees both sessions replayed from an empty start
    let mut status = second.snapshot();
    for delta in settle(&mut second).await {
        status.apply(&delta);
    }
    assert_eq!(status, StatusFields { active_users: 1, active_grains: 2 });

    first.unsubscribe();
    store.remove("s2");
    let delta = next(&mut second).await;
    assert_eq!(delta.active_grains, Some(1));
}

#[tokio::test]
async fn test_no_delta_for_redundant_sessions() {
    let store = MemorySessionStore::new();
    let mut sub = subscribe(&store);

    store.insert(Session::new("s1", "g1").with_user("u1"));
    let _ = next(&mut sub).await;

    // Same user, same grain: nothing changes
    store.insert(Session::new("s2", "g1").with_user("u1"));
    store.remove("s2");
    assert!(settle(&mut sub).await.is_empty());
}

/// Random add/remove interleavings checked against a brute-force count
#[test]
fn test_random_interleavings_match_model() {
    let mut rng = StdRng::seed_from_u64(0x5eed);

    for _round in 0..50 {
        let mut state = AggregationState::new();
        let mut live: HashMap<String, Session> = HashMap::new();
        let mut next_id = 0u32;

        for _step in 0..300 {
            let add = live.is_empty() || rng.random_bool(0.55);
            let event = if add {
                // Occasionally redeliver a live session
                if !live.is_empty() && rng.random_bool(0.1) {
                    let key = live.keys().nth(rng.random_range(0..live.len())).cloned().unwrap();
                    SessionEvent::Added(live[&key].clone())
                } else {
                    next_id += 1;
                    let mut session = Session::new(
                        format!("session-{}", next_id),
                        format!("grain-{}", rng.random_range(0..8)),
                    );
                    if rng.random_bool(0.8) {
                        session = session.with_user(format!("user-{}", rng.random_range(0..6)));
                    }
                    live.insert(session.session_id.clone(), session.clone());
                    SessionEvent::Added(session)
                }
            } else {
                let key = live.keys().nth(rng.random_range(0..live.len())).cloned().unwrap();
                SessionEvent::Removed(live.remove(&key).unwrap())
            };

            let before = state.snapshot();
            let delta = state.apply(&event);
            let after = state.snapshot();

            let users: HashSet<_> = live.values().filter_map(|s| s.user_id.clone()).collect();
            let grains: HashSet<_> = live.values().map(|s| s.grain_id.clone()).collect();
            assert_eq!(after.active_users, users.len() as u64);
            assert_eq!(after.active_grains, grains.len() as u64);

            // A delta is emitted exactly when a count moved, and only for that count
            assert_eq!(delta.is_some(), before != after);
            if let Some(delta) = delta {
                assert_eq!(delta.active_users.is_some(), before.active_users != after.active_users);
                assert_eq!(delta.active_grains.is_some(), before.active_grains != after.active_grains);
            }
        }

        for session in live.values() {
            state.on_removed(session);
        }
        assert!(state.is_empty());
    }
}

#[test]
fn test_concurrent_consume_single_winner() {
    let broker = Arc::new(TokenBroker::default());

    for _ in 0..20 {
        let token = broker.issue().into_string();
        let threads = 16;
        let barrier = Arc::new(Barrier::new(threads));

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let broker = broker.clone();
                let barrier = barrier.clone();
                let token = token.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    broker.consume(&token)
                })
            })
            .collect();

        let authorized = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|v| *v == Verdict::Authorized)
            .count();

        assert_eq!(authorized, 1);
    }

    assert_eq!(broker.outstanding(), 0);
}

#[test]
fn test_concurrent_issue_and_consume() {
    let broker = Arc::new(TokenBroker::default());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let broker = broker.clone();
            std::thread::spawn(move || {
                let mut ok = 0;
                for _ in 0..500 {
                    let token = broker.issue();
                    if broker.consume(token.as_str()).is_authorized() {
                        ok += 1;
                    }
                    assert_eq!(broker.consume(token.as_str()), Verdict::Rejected);
                }
                ok
            })
        })
        .collect();

    let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(total, 8 * 500);
    assert_eq!(broker.outstanding(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_token_scenario_with_clock() {
    let broker = TokenBroker::default();

    let token = broker.issue();
    tokio::time::advance(Duration::from_secs(10)).await;
    assert_eq!(broker.consume(token.as_str()), Verdict::Authorized);
    assert_eq!(broker.consume(token.as_str()), Verdict::Rejected);

    let late = broker.issue();
    tokio::time::advance(Duration::from_secs(61)).await;
    assert_eq!(broker.consume(late.as_str()), Verdict::Rejected);
}
