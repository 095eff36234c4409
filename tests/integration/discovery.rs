use std::time::Duration;

use scout_core::DiscoveryFilter;
use scout_relay::{subscribe, ConnectionState, RelayPool};
use scout_services::{DiscoverySession, SessionState, StartOutcome, StateEvent, StateNotifier};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::*;

#[tokio::test]
async fn keeps_newest_announcement_per_coordinator() {
    let relay = MockRelay::start().await.unwrap();
    relay.store(announcement("aaaa", 10, "main", "https://a1.example/")).await;
    relay.store(announcement("aaaa", 30, "MainNet", "https://a3.example/")).await;
    relay.store(announcement("aaaa", 20, "main", "https://a2.example/")).await;
    relay.store(announcement("bbbb", 5, "main", "https://b.example/")).await;

    let wallet = TempWallet::new("newest", Some(MAINNET_WALLET));
    let ctx = context(&[&relay.url], &wallet);
    ctx.detect_wallet().await;

    assert_eq!(
        ctx.start_discovery().await.unwrap(),
        StartOutcome::Active { relays: 1 }
    );
    assert_eq!(ctx.session_state().await, SessionState::Active);
    assert!(!ctx.relays_editable().await);

    let ctx = &ctx;
    eventually("two candidates", || async move { ctx.candidates().await.len() == 2 }).await;

    let candidates = ctx.candidates().await;
    assert_eq!(candidates[0].pubkey, pubkey("aaaa"));
    assert_eq!(candidates[0].created_at, 30);
    assert_eq!(candidates[0].endpoint(), Some("https://a3.example/"));
    assert_eq!(candidates[1].pubkey, pubkey("bbbb"));

    ctx.stop_discovery().await;
}

#[tokio::test]
async fn events_failing_the_filter_never_reach_candidates() {
    let relay = MockRelay::start().await.unwrap();
    relay.store(announcement("wrong-net", 10, "testnet", "https://x.example/")).await;
    relay
        .store(event("wrong-type", 10, 15750, json!([["type", "other"], ["network", "main"]])))
        .await;
    relay.store(event("no-type", 10, 15750, json!([["network", "main"]]))).await;
    relay
        .store(event("wrong-kind", 10, 1, json!([["type", "wabisabi"], ["network", "main"]])))
        .await;
    relay
        .store(event("shouty", 10, 15750, json!([["type", "WABISABI"], ["network", "MAIN"]])))
        .await;
    // marks the end of the stored batch
    relay.store(announcement("zzzz", 10, "main", "https://z.example/")).await;

    let wallet = TempWallet::new("filter", Some(MAINNET_WALLET));
    let ctx = context(&[&relay.url], &wallet);
    ctx.detect_wallet().await;
    ctx.start_discovery().await.unwrap();

    let ctx = &ctx;
    eventually("last announcement", || async move {
        ctx.find_candidates(&pubkey("zzzz")).await.len() == 1
    })
    .await;

    let mut seen: Vec<String> = ctx.candidates().await.into_iter().map(|c| c.pubkey).collect();
    seen.sort();
    let mut expected = vec![pubkey("shouty"), pubkey("zzzz")];
    expected.sort();
    assert_eq!(seen, expected);
    ctx.stop_discovery().await;
}

#[tokio::test]
async fn live_announcement_replaces_older_one() {
    let relay = MockRelay::start().await.unwrap();
    relay.store(announcement("aaaa", 10, "main", "https://old.example/")).await;

    let wallet = TempWallet::new("live", Some(MAINNET_WALLET));
    let ctx = context(&[&relay.url], &wallet);
    ctx.detect_wallet().await;
    ctx.start_discovery().await.unwrap();

    let ctx = &ctx;
    eventually("first candidate", || async move { ctx.candidates().await.len() == 1 }).await;

    relay.store(announcement("aaaa", 5, "main", "https://older.example/")).await;
    relay.store(announcement("aaaa", 50, "main", "https://new.example/")).await;

    eventually("replacement", || async move {
        ctx.candidates().await[0].endpoint() == Some("https://new.example/")
    })
    .await;
    assert_eq!(ctx.candidates().await.len(), 1);
    ctx.stop_discovery().await;
}

#[tokio::test]
async fn forged_announcements_cannot_replace_a_signed_one() {
    let relay = MockRelay::start().await.unwrap();
    relay.store(announcement("aaaa", 10, "main", "https://genuine.example/")).await;

    let wallet = TempWallet::new("forged", Some(MAINNET_WALLET));
    let ctx = context(&[&relay.url], &wallet);
    ctx.detect_wallet().await;
    ctx.start_discovery().await.unwrap();

    let ctx = &ctx;
    eventually("genuine candidate", || async move { ctx.candidates().await.len() == 1 }).await;

    // newer copy with the endpoint swapped, id and sig untouched
    let mut tampered = announcement("aaaa", 10, "main", "https://genuine.example/");
    tampered["created_at"] = json!(90);
    tampered["tags"][2][1] = json!("https://evil.example/");
    relay.store(tampered).await;

    // newer event under the same pubkey with no signature
    let mut unsigned = announcement("aaaa", 100, "main", "https://evil.example/");
    unsigned["sig"] = json!("");
    relay.store(unsigned).await;

    // signed by another key but claiming this pubkey
    let mut impostor = announcement("mallory", 110, "main", "https://evil.example/");
    impostor["pubkey"] = json!(pubkey("aaaa"));
    relay.store(impostor).await;

    // arrives after the forgeries on the same subscription
    relay.store(announcement("bbbb", 10, "main", "https://b.example/")).await;
    eventually("marker candidate", || async move { ctx.candidates().await.len() == 2 }).await;

    let genuine = ctx.find_candidates(&pubkey("aaaa")).await;
    assert_eq!(genuine.len(), 1);
    assert_eq!(genuine[0].created_at, 10);
    assert_eq!(genuine[0].endpoint(), Some("https://genuine.example/"));
    ctx.stop_discovery().await;
}

#[tokio::test]
async fn second_start_supersedes_the_first() {
    let relay = MockRelay::start().await.unwrap();
    relay.store(announcement("aaaa", 10, "main", "https://a.example/")).await;

    let wallet = TempWallet::new("supersede", Some(MAINNET_WALLET));
    let ctx = context(&[&relay.url], &wallet);
    ctx.detect_wallet().await;

    let (first, second) = tokio::join!(ctx.start_discovery(), ctx.start_discovery());
    let outcomes = [first.unwrap(), second.unwrap()];
    let active = outcomes
        .iter()
        .filter(|o| matches!(o, StartOutcome::Active { .. }))
        .count();
    assert_eq!(active, 1, "outcomes: {outcomes:?}");
    assert!(outcomes.contains(&StartOutcome::Superseded));
    assert_eq!(ctx.session_state().await, SessionState::Active);

    let ctx = &ctx;
    eventually("candidate", || async move { ctx.candidates().await.len() == 1 }).await;
    ctx.stop_discovery().await;
    assert_eq!(ctx.session_state().await, SessionState::Idle);
    assert!(ctx.candidates().await.is_empty());
}

#[tokio::test]
async fn cancelled_session_stops_mutating() {
    let relay = MockRelay::start().await.unwrap();
    let notifier = StateNotifier::new();
    let session = DiscoverySession::new(
        "main",
        vec![relay.url.clone()],
        Duration::from_millis(100),
        notifier.clone(),
    );
    session.connect(Duration::from_secs(5), &notifier).await.unwrap();
    session.spawn_ingest(DiscoveryFilter::coordinators("main"));

    relay.store(announcement("aaaa", 10, "main", "https://a.example/")).await;
    let registry = session.registry().clone();
    let watched = registry.clone();
    eventually("first event", || {
        let watched = watched.clone();
        async move { watched.len() == 1 }
    })
    .await;

    session.cancel();
    relay.store(announcement("aaaa", 20, "main", "https://a.example/")).await;
    relay.store(announcement("bbbb", 20, "main", "https://b.example/")).await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(registry.len(), 1);
    assert_eq!(registry.get(&pubkey("aaaa")).unwrap().created_at, 10);
}

#[tokio::test]
async fn dropped_relay_is_reconnected_and_resubscribed() {
    let relay = MockRelay::start().await.unwrap();
    let wallet = TempWallet::new("reconnect", Some(MAINNET_WALLET));
    let ctx = context(&[&relay.url], &wallet);
    let mut events = ctx.subscribe_events();
    ctx.detect_wallet().await;
    ctx.start_discovery().await.unwrap();

    let relay_ref = &relay;
    eventually("first REQ", || async move { relay_ref.reqs() == 1 }).await;

    relay.disconnect_all();
    eventually("replayed REQ", || async move { relay_ref.reqs() >= 2 }).await;
    assert!(relay.connections() >= 2);

    relay.store(announcement("aaaa", 10, "main", "https://a.example/")).await;
    let ctx = &ctx;
    eventually("candidate after reconnect", || async move {
        ctx.candidates().await.len() == 1
    })
    .await;

    let mut states = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let StateEvent::RelayStateChanged { state, .. } = event {
            states.push(state);
        }
    }
    assert!(states.contains(&ConnectionState::Closed), "states: {states:?}");
    assert!(states.iter().filter(|s| **s == ConnectionState::Open).count() >= 2);
    ctx.stop_discovery().await;
}

#[tokio::test]
async fn network_change_restarts_discovery() {
    let relay = MockRelay::start().await.unwrap();
    relay.store(announcement("main-coord", 10, "main", "https://m.example/")).await;
    relay.store(announcement("test-coord", 10, "testnet", "https://t.example/")).await;

    let wallet = TempWallet::new("network-change", Some(MAINNET_WALLET));
    let ctx = context(&[&relay.url], &wallet);
    ctx.detect_wallet().await;
    ctx.start_discovery().await.unwrap();

    let ctx = &ctx;
    eventually("mainnet candidate", || async move {
        ctx.find_candidates(&pubkey("main-coord")).await.len() == 1
    })
    .await;

    wallet.write(r#"{"Network": "TestNet", "TestNetCoordinatorUri": "https://t.example/"}"#);
    let status = ctx.detect_wallet().await;
    assert_eq!(status.network.as_deref(), Some("TestNet"));
    assert!(ctx.is_discovering().await);

    eventually("testnet candidate", || async move {
        ctx.find_candidates(&pubkey("test-coord")).await.len() == 1
    })
    .await;
    assert!(ctx.find_candidates(&pubkey("main-coord")).await.is_empty());
    ctx.stop_discovery().await;
}

#[tokio::test]
async fn changing_relays_restarts_active_session() {
    let first = MockRelay::start().await.unwrap();
    let second = MockRelay::start().await.unwrap();
    second.store(announcement("bbbb", 10, "main", "https://b.example/")).await;

    let wallet = TempWallet::new("set-relays", Some(MAINNET_WALLET));
    let ctx = context(&[&first.url], &wallet);
    ctx.detect_wallet().await;
    ctx.start_discovery().await.unwrap();

    let outcome = ctx.set_relays(&[second.url.to_string()]).await.unwrap();
    assert_eq!(outcome, Some(StartOutcome::Active { relays: 1 }));
    assert_eq!(ctx.relays().await, vec![second.url.clone()]);

    let ctx = &ctx;
    eventually("candidate from new relay", || async move {
        ctx.candidates().await.len() == 1
    })
    .await;
    ctx.stop_discovery().await;
}

#[tokio::test]
async fn cancelling_a_subscription_sends_close() {
    let relay = MockRelay::start().await.unwrap();
    let pool = RelayPool::new(Duration::from_millis(100));
    pool.connect(&[relay.url.clone()], &CancellationToken::new())
        .await
        .unwrap();

    let token = CancellationToken::new();
    let mut sub = subscribe(&pool, DiscoveryFilter::coordinators("main"), token.clone());
    relay.store(announcement("aaaa", 10, "main", "https://a.example/")).await;

    let event = tokio::time::timeout(Duration::from_secs(5), sub.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.pubkey, pubkey("aaaa"));

    token.cancel();
    assert!(sub.next().await.is_none());

    let relay_ref = &relay;
    eventually("CLOSE frame", || async move { relay_ref.closes() == 1 }).await;
    pool.dispose();
}
