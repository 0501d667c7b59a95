//! Store failure tests.
//!
//! Store-class failures redirect to the configured error destination and
//! never admit; a single failed registration write is retried without
//! taking a second seat when the first write actually landed.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use room_gate::store::{InMemoryRoomStore, RoomStore};
use room_gate_test_utils::*;
use std::collections::HashMap;
use std::sync::Arc;

const STRATEGIES: [&str; 3] = ["atomic", "optimistic", "lease"];

fn flaky(store: &InMemoryRoomStore) -> Arc<FlakyRoomStore> {
    let inner: Arc<dyn RoomStore> = Arc::new(store.clone());
    Arc::new(FlakyRoomStore::new(inner))
}

#[tokio::test]
async fn test_single_write_failure_is_retried() -> Result<(), anyhow::Error> {
    for strategy in STRATEGIES {
        let store = InMemoryRoomStore::new().with_room("r1", &[], 0);
        let flaky = flaky(&store);
        flaky.fail_next_writes(1);
        let server =
            TestGateServer::spawn_with(flaky.clone(), &[("REGISTRATION_STRATEGY", strategy)])
                .await?;

        let response = gate_client()
            .get(server.room_url("r1"))
            .header("user-agent", BROWSER_USER_AGENT)
            .send()
            .await?;

        assert_eq!(response.status(), 200, "{strategy}");
        let token = credential_from(&response).unwrap();
        assert_eq!(store.connected("r1").unwrap(), vec![token], "{strategy}");
        assert_eq!(flaky.failed_count(), 1, "{strategy}");
    }
    Ok(())
}

#[tokio::test]
async fn test_retry_after_lost_write_reply_takes_one_seat() -> Result<(), anyhow::Error> {
    for strategy in STRATEGIES {
        let store = InMemoryRoomStore::new().with_room("r1", &[], 0);
        let flaky = flaky(&store);
        flaky.lose_next_write_replies(1);
        let server =
            TestGateServer::spawn_with(flaky.clone(), &[("REGISTRATION_STRATEGY", strategy)])
                .await?;

        let response = gate_client()
            .get(server.room_url("r1"))
            .header("user-agent", BROWSER_USER_AGENT)
            .send()
            .await?;

        assert_eq!(response.status(), 200, "{strategy}");
        let token = credential_from(&response).unwrap();
        let connected = store.connected("r1").unwrap();
        assert_eq!(connected.len(), 1, "{strategy}: {connected:?}");
        assert_eq!(connected, vec![token], "{strategy}");
        assert_eq!(store.write_count(), 1, "{strategy}");
        assert_eq!(flaky.failed_count(), 1, "{strategy}");
    }
    Ok(())
}

#[tokio::test]
async fn test_repeated_write_failure_redirects_to_error() -> Result<(), anyhow::Error> {
    for strategy in STRATEGIES {
        let store = InMemoryRoomStore::new().with_room("r1", &[], 0);
        let flaky = flaky(&store);
        flaky.fail_next_writes(2);
        let server =
            TestGateServer::spawn_with(flaky.clone(), &[("REGISTRATION_STRATEGY", strategy)])
                .await?;

        let response = gate_client()
            .get(server.room_url("r1"))
            .header("user-agent", BROWSER_USER_AGENT)
            .send()
            .await?;

        assert_eq!(response.status(), 307, "{strategy}");
        assert_eq!(
            redirect_location(&response).as_deref(),
            Some("/?error=unavailable"),
            "{strategy}"
        );
        assert!(credential_from(&response).is_none(), "{strategy}");
        assert!(store.connected("r1").unwrap().is_empty(), "{strategy}");
    }
    Ok(())
}

#[tokio::test]
async fn test_unreachable_store_redirects_to_configured_destination() -> Result<(), anyhow::Error>
{
    let store = InMemoryRoomStore::new().with_room("r1", &[], 0);
    let flaky = flaky(&store);
    flaky.set_unavailable(true);
    let server = TestGateServer::spawn_with(
        flaky.clone(),
        &[("STORE_ERROR_REDIRECT", "/maintenance")],
    )
    .await?;

    let response = gate_client()
        .get(server.room_url("r1"))
        .header("user-agent", BROWSER_USER_AGENT)
        .send()
        .await?;

    assert_eq!(response.status(), 307);
    assert_eq!(redirect_location(&response).as_deref(), Some("/maintenance"));

    Ok(())
}

#[tokio::test]
async fn test_bots_pass_while_store_is_down() -> Result<(), anyhow::Error> {
    let store = InMemoryRoomStore::new();
    let flaky = flaky(&store);
    flaky.set_unavailable(true);
    let server = TestGateServer::spawn_with(flaky.clone(), &[]).await?;

    let response = gate_client()
        .get(server.room_url("r1"))
        .header("user-agent", BOT_USER_AGENTS[0])
        .send()
        .await?;

    assert_eq!(response.status(), 200);
    assert_eq!(flaky.failed_count(), 0);

    Ok(())
}

#[tokio::test]
async fn test_malformed_room_redirects_to_error() -> Result<(), anyhow::Error> {
    let store = InMemoryRoomStore::new();
    store.insert_raw_fields(
        "r1",
        HashMap::from([("createdAt".to_string(), "1712000000000".to_string())]),
    );
    let server = TestGateServer::spawn(store.clone()).await?;

    let response = gate_client()
        .get(server.room_url("r1"))
        .header("user-agent", BROWSER_USER_AGENT)
        .send()
        .await?;

    assert_eq!(response.status(), 307);
    assert_eq!(
        redirect_location(&response).as_deref(),
        Some("/?error=unavailable")
    );
    assert_eq!(store.write_count(), 0);

    Ok(())
}

#[tokio::test]
async fn test_readiness_reports_unreachable_store() -> Result<(), anyhow::Error> {
    let flaky = flaky(&InMemoryRoomStore::new());
    let server = TestGateServer::spawn_with(flaky.clone(), &[]).await?;
    let client = gate_client();

    let ready = client.get(format!("{}/ready", server.url())).send().await?;
    assert_eq!(ready.status(), 200);

    flaky.set_unavailable(true);
    let not_ready = client.get(format!("{}/ready", server.url())).send().await?;
    assert_eq!(not_ready.status(), 503);
    let body: serde_json::Value = not_ready.json().await?;
    assert_eq!(body["status"], "not_ready");
    assert_eq!(body["store"], "unhealthy");

    // Liveness does not depend on the store
    let health = client.get(format!("{}/health", server.url())).send().await?;
    assert_eq!(health.status(), 200);

    Ok(())
}
