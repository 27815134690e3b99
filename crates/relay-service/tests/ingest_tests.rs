//! Ingest WebSocket integration tests.
//!
//! Drives `/ws/ingest/{session}/{publisher}` with a real WebSocket client
//! against a mock engine.

use common::types::{PublisherId, SessionId};
use futures::SinkExt;
use relay_test_utils::{MockMediaEngine, TestRelayServer, TEST_INGEST_SECRET};
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::tungstenite::{self, Message};

/// Poll `check` until it holds or a few seconds pass.
async fn wait_for<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

async fn is_publishing(server: &TestRelayServer, session: &str, publisher: &str) -> bool {
    match server.hub().get(&SessionId::from(session)).await {
        Some(room) => room.has_publisher(&PublisherId::from(publisher)).await,
        None => false,
    }
}

fn rejection_status(result: Result<impl Sized, tungstenite::Error>) -> Option<u16> {
    match result {
        Err(tungstenite::Error::Http(response)) => Some(response.status().as_u16()),
        _ => None,
    }
}

/// A wrong token is rejected before any engine starts.
#[tokio::test]
async fn test_wrong_token_rejected() -> Result<(), anyhow::Error> {
    let engine = Arc::new(MockMediaEngine::accepting());
    let server = TestRelayServer::spawn(engine.clone()).await?;

    let result = tokio_tungstenite::connect_async(server.ingest_url("r1", "p1", "wrong")).await;

    assert_eq!(rejection_status(result), Some(401));
    assert_eq!(engine.launch_count(), 0);
    assert!(server.hub().get(&SessionId::from("r1")).await.is_none());

    Ok(())
}

/// A missing token is rejected with 401.
#[tokio::test]
async fn test_missing_token_rejected() -> Result<(), anyhow::Error> {
    let engine = Arc::new(MockMediaEngine::accepting());
    let server = TestRelayServer::spawn(engine.clone()).await?;
    let url = format!("ws://{}/ws/ingest/r1/p1", server.addr());

    let result = tokio_tungstenite::connect_async(url).await;

    assert_eq!(rejection_status(result), Some(401));
    assert_eq!(engine.launch_count(), 0);

    Ok(())
}

/// A plain HTTP request with a valid token is not an upgrade.
#[tokio::test]
async fn test_plain_request_is_bad_request() -> Result<(), anyhow::Error> {
    let engine = Arc::new(MockMediaEngine::accepting());
    let server = TestRelayServer::spawn(engine.clone()).await?;

    let response = reqwest::Client::new()
        .get(format!(
            "{}/ws/ingest/r1/p1?token={}",
            server.url(),
            TEST_INGEST_SECRET
        ))
        .send()
        .await?;

    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
    assert_eq!(engine.launch_count(), 0);

    Ok(())
}

/// Binary frames reach the engine in order; text and empty frames do not.
#[tokio::test]
async fn test_binary_frames_forwarded_to_engine() -> Result<(), anyhow::Error> {
    let dir = tempfile::tempdir()?;
    let capture = dir.path().join("ingest.ts");
    let engine = Arc::new(MockMediaEngine::capturing_ingest(&capture));
    let server = TestRelayServer::spawn(engine.clone()).await?;

    let (mut ws, _) =
        tokio_tungstenite::connect_async(server.ingest_url("r1", "p1", TEST_INGEST_SECRET))
            .await?;
    assert!(wait_for(|| is_publishing(&server, "r1", "p1")).await);

    ws.send(Message::Binary(b"first-".to_vec())).await?;
    ws.send(Message::Text("ignored".to_string())).await?;
    ws.send(Message::Binary(Vec::new())).await?;
    ws.send(Message::Binary(b"second".to_vec())).await?;
    ws.close(None).await?;

    assert!(wait_for(|| async { !is_publishing(&server, "r1", "p1").await }).await);

    // The engine has exited once the publisher is released
    let captured = tokio::fs::read(&capture).await?;
    assert_eq!(captured, b"first-second");

    let ingest = engine.launches_for(relay_service::engine::EnginePurpose::Ingest);
    assert_eq!(ingest.len(), 1);
    assert!(ingest
        .first()
        .is_some_and(|command| command.args.iter().any(|a| a == "pipe:0")));

    Ok(())
}

/// A second connection for a streaming publisher is refused.
#[tokio::test]
async fn test_duplicate_publisher_conflict() -> Result<(), anyhow::Error> {
    let engine = Arc::new(MockMediaEngine::accepting());
    let server = TestRelayServer::spawn(engine.clone()).await?;
    let url = server.ingest_url("r1", "p1", TEST_INGEST_SECRET);

    let (_first, _) = tokio_tungstenite::connect_async(url.clone()).await?;
    assert!(wait_for(|| is_publishing(&server, "r1", "p1")).await);

    let second = tokio_tungstenite::connect_async(url).await;

    assert_eq!(rejection_status(second), Some(409));
    assert_eq!(engine.launch_count(), 1);
    assert!(is_publishing(&server, "r1", "p1").await);

    Ok(())
}

/// Distinct publishers share a room.
#[tokio::test]
async fn test_two_publishers_in_one_room() -> Result<(), anyhow::Error> {
    let server = TestRelayServer::spawn(Arc::new(MockMediaEngine::accepting())).await?;

    let (_alice, _) =
        tokio_tungstenite::connect_async(server.ingest_url("r1", "alice", TEST_INGEST_SECRET))
            .await?;
    assert!(wait_for(|| is_publishing(&server, "r1", "alice")).await);
    let (_bob, _) =
        tokio_tungstenite::connect_async(server.ingest_url("r1", "bob", TEST_INGEST_SECRET))
            .await?;
    assert!(wait_for(|| is_publishing(&server, "r1", "bob")).await);

    let body: serde_json::Value = reqwest::Client::new()
        .get(format!("{}/api/video/room/r1/state", server.url()))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(body["publishers"], serde_json::json!(["alice", "bob"]));

    Ok(())
}

/// Cancelling sessions releases the publisher.
#[tokio::test]
async fn test_shutdown_releases_publisher() -> Result<(), anyhow::Error> {
    let server = TestRelayServer::spawn(Arc::new(MockMediaEngine::accepting())).await?;

    let (_ws, _) =
        tokio_tungstenite::connect_async(server.ingest_url("r1", "p1", TEST_INGEST_SECRET))
            .await?;
    assert!(wait_for(|| is_publishing(&server, "r1", "p1")).await);

    server.cancel_sessions();

    assert!(wait_for(|| async { !is_publishing(&server, "r1", "p1").await }).await);

    Ok(())
}

/// An engine that cannot start never registers the publisher.
#[tokio::test]
async fn test_engine_failure_does_not_register_publisher() -> Result<(), anyhow::Error> {
    let engine = Arc::new(MockMediaEngine::failing());
    let server = TestRelayServer::spawn(engine.clone()).await?;

    // The upgrade itself succeeds; the session ends once the launch fails
    let connected =
        tokio_tungstenite::connect_async(server.ingest_url("r1", "p1", TEST_INGEST_SECRET)).await;
    assert!(connected.is_ok());

    assert!(wait_for(|| async { engine.launch_count() == 1 }).await);
    assert!(!is_publishing(&server, "r1", "p1").await);
    assert!(server.hub().get(&SessionId::from("r1")).await.is_none());

    Ok(())
}

/// Shutdown returns only after every ingest session has torn down.
#[tokio::test]
async fn test_shutdown_waits_for_ingest_teardown() -> Result<(), anyhow::Error> {
    let engine = Arc::new(MockMediaEngine::accepting());
    let mut server = TestRelayServer::spawn(engine.clone()).await?;

    let (_ws, _) =
        tokio_tungstenite::connect_async(server.ingest_url("r1", "p1", TEST_INGEST_SECRET))
            .await?;
    assert!(wait_for(|| is_publishing(&server, "r1", "p1")).await);

    tokio::time::timeout(Duration::from_secs(10), server.shutdown()).await??;

    // No polling: teardown finished before shutdown returned
    assert!(!is_publishing(&server, "r1", "p1").await);

    Ok(())
}

/// An engine that dies mid-stream ends the session and releases the publisher.
#[tokio::test]
async fn test_engine_exit_releases_publisher() -> Result<(), anyhow::Error> {
    let engine = Arc::new(MockMediaEngine::crashing_ingest());
    let server = TestRelayServer::spawn(engine.clone()).await?;

    let (mut ws, _) =
        tokio_tungstenite::connect_async(server.ingest_url("r1", "p1", TEST_INGEST_SECRET))
            .await?;
    assert!(wait_for(|| is_publishing(&server, "r1", "p1")).await);

    // The write after the engine has gone fails and starts teardown
    let mut released = false;
    for _ in 0..100 {
        if ws.send(Message::Binary(b"frame".to_vec())).await.is_err() {
            break;
        }
        if !is_publishing(&server, "r1", "p1").await {
            released = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    if !released {
        released = wait_for(|| async { !is_publishing(&server, "r1", "p1").await }).await;
    }

    assert!(released);
    assert_eq!(engine.launches_for(relay_service::engine::EnginePurpose::Ingest).len(), 1);

    Ok(())
}

/// The ingest engine writes to a port inside the ingest window.
#[tokio::test]
async fn test_ingest_sink_in_ingest_window() -> Result<(), anyhow::Error> {
    let engine = Arc::new(MockMediaEngine::accepting());
    let server = TestRelayServer::spawn(engine.clone()).await?;

    let (_ws, _) =
        tokio_tungstenite::connect_async(server.ingest_url("r1", "p1", TEST_INGEST_SECRET))
            .await?;
    assert!(wait_for(|| async { engine.launch_count() == 1 }).await);

    let ingest = engine.launches_for(relay_service::engine::EnginePurpose::Ingest);
    let sink = ingest
        .first()
        .and_then(|command| command.args.last())
        .cloned()
        .unwrap_or_default();
    let port: u16 = sink
        .trim_start_matches("udp://127.0.0.1:")
        .split('?')
        .next()
        .unwrap_or_default()
        .parse()?;

    assert!(server.config().ingest_ports.contains(port));
    assert!(!server.config().mix_ports.contains(port));

    Ok(())
}
