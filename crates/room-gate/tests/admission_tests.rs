//! Admission integration tests.
//!
//! Drives the gate over real HTTP using the `TestGateServer` harness.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use room_gate::store::InMemoryRoomStore;
use room_gate_test_utils::*;
use std::sync::Arc;

const CREATED_AT: i64 = 1_712_000_000_000;

#[tokio::test]
async fn test_first_visitor_is_admitted_with_credential() -> Result<(), anyhow::Error> {
    let store = InMemoryRoomStore::new().with_room("r1", &[], CREATED_AT);
    let server = TestGateServer::spawn(store.clone()).await?;

    let response = gate_client()
        .get(server.room_url("r1"))
        .header("user-agent", BROWSER_USER_AGENT)
        .send()
        .await?;

    assert_eq!(response.status(), 200);
    let token = credential_from(&response).expect("credential should be issued");
    assert_eq!(token.len(), 22);
    assert_eq!(store.connected("r1").unwrap(), vec![token]);

    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["room_id"], "r1");
    assert_eq!(body["admission"], "admitted");

    Ok(())
}

#[tokio::test]
async fn test_credential_cookie_attributes() -> Result<(), anyhow::Error> {
    let store = InMemoryRoomStore::new().with_room("r1", &[], CREATED_AT);
    let server = TestGateServer::spawn(store).await?;

    let response = gate_client()
        .get(server.room_url("r1"))
        .header("user-agent", BROWSER_USER_AGENT)
        .send()
        .await?;

    let cookie = response
        .headers()
        .get("set-cookie")
        .and_then(|v| v.to_str().ok())
        .unwrap();
    assert!(cookie.starts_with("x-auth-token="));
    assert!(cookie.contains("; Path=/"));
    assert!(cookie.contains("; HttpOnly"));
    assert!(cookie.contains("; SameSite=Strict"));
    assert!(!cookie.contains("Secure"));

    Ok(())
}

#[tokio::test]
async fn test_production_credential_is_secure() -> Result<(), anyhow::Error> {
    let store = InMemoryRoomStore::new().with_room("r1", &[], CREATED_AT);
    let server =
        TestGateServer::spawn_with(Arc::new(store), &[("ROOM_GATE_ENVIRONMENT", "production")])
            .await?;

    let response = gate_client()
        .get(server.room_url("r1"))
        .header("user-agent", BROWSER_USER_AGENT)
        .send()
        .await?;

    let cookie = response
        .headers()
        .get("set-cookie")
        .and_then(|v| v.to_str().ok())
        .unwrap();
    assert!(cookie.ends_with("; Secure"));

    Ok(())
}

#[tokio::test]
async fn test_returning_participant_keeps_seat_in_full_room() -> Result<(), anyhow::Error> {
    let store = InMemoryRoomStore::new().with_room("r1", &[], CREATED_AT);
    let server = TestGateServer::spawn(store.clone()).await?;
    let client = gate_client();

    let mut tokens = Vec::new();
    for _ in 0..3 {
        let response = client
            .get(server.room_url("r1"))
            .header("user-agent", BROWSER_USER_AGENT)
            .send()
            .await?;
        tokens.push(credential_from(&response).unwrap());
    }
    assert_eq!(store.connected("r1").unwrap(), tokens);

    // Room is full, but the first participant still gets in, repeatedly
    for _ in 0..3 {
        let response = client
            .get(server.room_url("r1"))
            .header("user-agent", BROWSER_USER_AGENT)
            .header("cookie", credential_cookie_header(&tokens[0]))
            .send()
            .await?;

        assert_eq!(response.status(), 200);
        assert!(credential_from(&response).is_none());
        let body: serde_json::Value = response.json().await?;
        assert_eq!(body["admission"], "already_member");
    }
    assert_eq!(store.connected("r1").unwrap(), tokens);

    Ok(())
}

#[tokio::test]
async fn test_full_room_redirects_without_mutation() -> Result<(), anyhow::Error> {
    let store = InMemoryRoomStore::new().with_room("r1", &["tok1", "tok2", "tok3"], CREATED_AT);
    let server = TestGateServer::spawn(store.clone()).await?;

    let response = gate_client()
        .get(server.room_url("r1"))
        .header("user-agent", BROWSER_USER_AGENT)
        .send()
        .await?;

    assert_eq!(response.status(), 307);
    assert_eq!(redirect_location(&response).as_deref(), Some("/?error=room-full"));
    assert!(credential_from(&response).is_none());
    assert_eq!(store.connected("r1").unwrap(), vec!["tok1", "tok2", "tok3"]);
    assert_eq!(store.write_count(), 0);

    Ok(())
}

#[tokio::test]
async fn test_stale_credential_does_not_bypass_capacity() -> Result<(), anyhow::Error> {
    let store = InMemoryRoomStore::new().with_room("r1", &["tok1", "tok2", "tok3"], CREATED_AT);
    let server = TestGateServer::spawn(store).await?;

    let response = gate_client()
        .get(server.room_url("r1"))
        .header("user-agent", BROWSER_USER_AGENT)
        .header("cookie", credential_cookie_header("from-another-room"))
        .send()
        .await?;

    assert_eq!(response.status(), 307);
    assert_eq!(redirect_location(&response).as_deref(), Some("/?error=room-full"));

    Ok(())
}

#[tokio::test]
async fn test_missing_room_redirects() -> Result<(), anyhow::Error> {
    let store = InMemoryRoomStore::new();
    let server = TestGateServer::spawn(store.clone()).await?;
    let client = gate_client();

    for cookie in [None, Some(credential_cookie_header("tok1"))] {
        let mut request = client
            .get(server.room_url("r2"))
            .header("user-agent", BROWSER_USER_AGENT);
        if let Some(cookie) = cookie {
            request = request.header("cookie", cookie);
        }
        let response = request.send().await?;

        assert_eq!(response.status(), 307);
        assert_eq!(
            redirect_location(&response).as_deref(),
            Some("/?error=room-not-found")
        );
    }
    assert_eq!(store.write_count(), 0);

    Ok(())
}

#[tokio::test]
async fn test_bots_are_skipped_without_store_access() -> Result<(), anyhow::Error> {
    // Would redirect to room-full if the store were consulted
    let store = InMemoryRoomStore::new().with_room("r1", &["tok1", "tok2", "tok3"], CREATED_AT);
    let server = TestGateServer::spawn(store.clone()).await?;
    let client = gate_client();

    for user_agent in BOT_USER_AGENTS {
        let response = client
            .get(server.room_url("r1"))
            .header("user-agent", *user_agent)
            .send()
            .await?;

        assert_eq!(response.status(), 200, "{user_agent}");
        assert!(credential_from(&response).is_none());
        let body: serde_json::Value = response.json().await?;
        assert_eq!(body["admission"], "skipped", "{user_agent}");
    }
    assert_eq!(store.read_count(), 0);

    Ok(())
}

#[tokio::test]
async fn test_prefetches_are_skipped_without_store_access() -> Result<(), anyhow::Error> {
    let store = InMemoryRoomStore::new().with_room("r1", &[], CREATED_AT);
    let server = TestGateServer::spawn(store.clone()).await?;
    let client = gate_client();

    for (name, value) in [
        ("purpose", "prefetch"),
        ("sec-purpose", "prefetch;prerender"),
        ("next-router-prefetch", "1"),
    ] {
        let response = client
            .get(server.room_url("r1"))
            .header("user-agent", BROWSER_USER_AGENT)
            .header(name, value)
            .send()
            .await?;

        assert_eq!(response.status(), 200, "{name}");
        assert!(credential_from(&response).is_none(), "{name}");
    }
    assert_eq!(store.read_count(), 0);
    assert!(store.connected("r1").unwrap().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_malformed_room_paths_redirect_home() -> Result<(), anyhow::Error> {
    let store = InMemoryRoomStore::new().with_room("r1", &[], CREATED_AT);
    let server = TestGateServer::spawn(store.clone()).await?;
    let client = gate_client();

    for path in ["/room", "/room/", "/room/r1/settings"] {
        let response = client
            .get(format!("{}{}", server.url(), path))
            .header("user-agent", BROWSER_USER_AGENT)
            .send()
            .await?;

        assert_eq!(response.status(), 307, "{path}");
        assert_eq!(redirect_location(&response).as_deref(), Some("/"), "{path}");
    }
    assert_eq!(store.read_count(), 0);

    Ok(())
}

#[tokio::test]
async fn test_capacity_is_configurable() -> Result<(), anyhow::Error> {
    let store = InMemoryRoomStore::new().with_room("r1", &["tok1"], CREATED_AT);
    let server =
        TestGateServer::spawn_with(Arc::new(store.clone()), &[("MAX_ROOM_PARTICIPANTS", "1")])
            .await?;

    let response = gate_client()
        .get(server.room_url("r1"))
        .header("user-agent", BROWSER_USER_AGENT)
        .send()
        .await?;

    assert_eq!(response.status(), 307);
    assert_eq!(redirect_location(&response).as_deref(), Some("/?error=room-full"));

    Ok(())
}

#[tokio::test]
async fn test_health_and_readiness_endpoints() -> Result<(), anyhow::Error> {
    let server = TestGateServer::spawn(InMemoryRoomStore::new()).await?;
    let client = gate_client();

    let health = client.get(format!("{}/health", server.url())).send().await?;
    assert_eq!(health.status(), 200);
    assert_eq!(health.text().await?, "OK");

    let ready = client.get(format!("{}/ready", server.url())).send().await?;
    assert_eq!(ready.status(), 200);
    let body: serde_json::Value = ready.json().await?;
    assert_eq!(body["status"], "ready");

    let metrics = client.get(format!("{}/metrics", server.url())).send().await?;
    assert_eq!(metrics.status(), 200);

    Ok(())
}
