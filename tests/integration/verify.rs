use std::time::Duration;

use axum::http::StatusCode;
use scout_core::DiscoveryEvent;
use scout_services::{CoordinatorVerifier, StateEvent, VerificationError};
use serde_json::json;

use crate::*;

fn verifier() -> CoordinatorVerifier {
    CoordinatorVerifier::new(Duration::from_secs(5)).expect("http client")
}

fn candidate(endpoint: &str) -> DiscoveryEvent {
    serde_json::from_value(announcement("aa", 100, "main", endpoint)).expect("event")
}

#[tokio::test]
async fn server_error_is_could_not_connect() {
    let coordinator = spawn_coordinator("", StatusCode::INTERNAL_SERVER_ERROR, json!({}))
        .await
        .unwrap();

    let err = verifier()
        .verify(&candidate(&coordinator.endpoint))
        .await
        .unwrap_err();
    assert_eq!(err, VerificationError::EndpointUnreachable);
    assert_eq!(err.to_string(), "Could not connect");
}

#[tokio::test]
async fn empty_round_states_is_no_active_rounds() {
    let coordinator = spawn_coordinator("", StatusCode::OK, json!({"roundStates": []}))
        .await
        .unwrap();

    let err = verifier()
        .verify(&candidate(&coordinator.endpoint))
        .await
        .unwrap_err();
    assert_eq!(err, VerificationError::NoActiveRounds);
    assert_eq!(err.to_string(), "No active rounds");
}

#[tokio::test]
async fn round_without_created_event() {
    let body = json!({"roundStates": [{
        "inputRegistrationEnd": "2024-05-01T12:00:00+00:00",
        "coinjoinState": {"events": [{"Type": "InputAdded"}]}
    }]});
    let coordinator = spawn_coordinator("", StatusCode::OK, body).await.unwrap();

    let err = verifier()
        .verify(&candidate(&coordinator.endpoint))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "No round created event");
}

#[tokio::test]
async fn latest_round_wins_and_request_body_is_empty_checkpoints() {
    let body = json!({"roundStates": [
        round("2024-05-01T12:00:00+00:00", "earlier"),
        round("2024-05-01T13:00:00+00:00", "later"),
    ]});
    let coordinator = spawn_coordinator("", StatusCode::OK, body).await.unwrap();

    let resolved = verifier()
        .verify(&candidate(&coordinator.endpoint))
        .await
        .unwrap();
    assert_eq!(resolved.parameters.network, "later");
    assert_eq!(resolved.parameters.max_input_count_by_round, 400);
    assert_eq!(resolved.endpoint, coordinator.endpoint);

    let requests = coordinator.requests.lock().await;
    assert_eq!(requests.as_slice(), &[json!({"roundCheckpoints": []})]);
}

#[tokio::test]
async fn endpoint_path_is_kept() {
    let body = json!({"roundStates": [round("2024-05-01T12:00:00Z", "TestNet")]});
    let coordinator = spawn_coordinator("/plugins/wabisabi-coordinator", StatusCode::OK, body)
        .await
        .unwrap();

    // with and without trailing slash
    for endpoint in [coordinator.endpoint.clone(), format!("{}/", coordinator.endpoint)] {
        let resolved = verifier().verify(&candidate(&endpoint)).await.unwrap();
        assert_eq!(resolved.parameters.network, "TestNet");
    }
}

#[tokio::test]
async fn unreachable_endpoint_fails_verification() {
    let err = verifier()
        .verify(&candidate("http://127.0.0.1:1/"))
        .await
        .unwrap_err();
    assert!(matches!(err, VerificationError::VerificationFailed(_)));
    assert!(err.to_string().starts_with("Error fetching round: "));
}

#[tokio::test]
async fn context_tracks_expanded_coordinator() {
    let body = json!({"roundStates": [round("2024-05-01T12:00:00Z", "Main")]});
    let coordinator = spawn_coordinator("", StatusCode::OK, body).await.unwrap();
    let wallet = TempWallet::new("expanded", None);
    let ctx = context(&[], &wallet);
    let mut events = ctx.subscribe_events();

    let resolved = ctx
        .verify_candidate(&candidate(&coordinator.endpoint))
        .await
        .unwrap();
    assert_eq!(
        ctx.expanded_coordinator().await.map(|c| c.endpoint),
        Some(resolved.endpoint)
    );

    ctx.collapse().await;
    assert!(ctx.expanded_coordinator().await.is_none());

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert_eq!(seen.first(), Some(&StateEvent::BusyChanged { busy: true }));
    assert_eq!(
        seen.iter()
            .filter(|e| **e == StateEvent::ExpandedCoordinatorChanged)
            .count(),
        2
    );
    assert!(!ctx.is_busy());
}

#[tokio::test]
async fn failed_verification_leaves_expanded_coordinator_alone() {
    let coordinator = spawn_coordinator("", StatusCode::OK, json!({"roundStates": []}))
        .await
        .unwrap();
    let wallet = TempWallet::new("failed-verify", None);
    let ctx = context(&[], &wallet);

    let err = ctx
        .verify_candidate(&candidate(&coordinator.endpoint))
        .await
        .unwrap_err();
    assert_eq!(err, VerificationError::NoActiveRounds);
    assert!(ctx.expanded_coordinator().await.is_none());
}
