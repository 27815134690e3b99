//! Test server harness for E2E testing
//!
//! Provides `TestRelayServer` for spawning real relay server instances in
//! tests, backed by a `MockMediaEngine`.

use crate::mock_engine::MockMediaEngine;
use metrics_exporter_prometheus::PrometheusBuilder;
use relay_service::config::Config;
use relay_service::hub::Hub;
use relay_service::routes::{self, AppState};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Ingest secret configured on every test server.
pub const TEST_INGEST_SECRET: &str = "test-ingest-secret";

/// Test harness for spawning the relay server in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_health_flow_e2e() -> Result<()> {
///     let server = TestRelayServer::spawn(Arc::new(MockMediaEngine::accepting())).await?;
///     let client = reqwest::Client::new();
///
///     let response = client
///         .get(&format!("{}/health", server.url()))
///         .send()
///         .await?;
///
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestRelayServer {
    addr: SocketAddr,
    config: Config,
    state: Arc<AppState>,
    shutdown: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl TestRelayServer {
    /// Spawn a new test server with default test configuration.
    pub async fn spawn(engine: Arc<MockMediaEngine>) -> Result<Self, anyhow::Error> {
        Self::spawn_with(engine, &[]).await
    }

    /// Spawn a new test server, overriding configuration variables.
    ///
    /// The server will:
    /// - Bind to a random available port (127.0.0.1:0)
    /// - Use `TEST_INGEST_SECRET` as the ingest credential
    /// - Start the HTTP server in the background
    pub async fn spawn_with(
        engine: Arc<MockMediaEngine>,
        overrides: &[(&str, &str)],
    ) -> Result<Self, anyhow::Error> {
        let mut vars = HashMap::from([
            ("RELAY_BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
            ("INGEST_SECRET".to_string(), TEST_INGEST_SECRET.to_string()),
            ("FFMPEG_PATH".to_string(), "mock-engine".to_string()),
            ("INGEST_STOP_GRACE_MS".to_string(), "500".to_string()),
        ]);
        for (key, value) in overrides {
            vars.insert((*key).to_string(), (*value).to_string());
        }

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let shutdown = CancellationToken::new();
        let state = Arc::new(
            AppState::new(config.clone(), engine, shutdown.clone())
                .map_err(|e| anyhow::anyhow!("Failed to create app state: {}", e))?,
        );

        // A recorder that is never installed globally, so many servers can
        // coexist in one test binary
        let metrics_handle = PrometheusBuilder::new().build_recorder().handle();

        let app = routes::build_routes(Arc::clone(&state), metrics_handle);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let stop = shutdown.clone();
        let handle = tokio::spawn(async move {
            let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, make_service)
                .with_graceful_shutdown(stop.cancelled_owned())
                .await
            {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            config,
            state,
            shutdown,
            handle: Some(handle),
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// WebSocket URL for an ingest connection.
    pub fn ingest_url(&self, session: &str, publisher: &str, token: &str) -> String {
        format!(
            "ws://{}/ws/ingest/{}/{}?token={}",
            self.addr, session, publisher, token
        )
    }

    /// Get the socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get reference to the server configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The server's room registry, for asserting on state directly.
    pub fn hub(&self) -> &Hub {
        &self.state.hub
    }

    /// Cancel every ingest session, as a shutdown signal would.
    pub fn cancel_sessions(&self) {
        self.shutdown.cancel();
    }

    /// Shut down the way the binary does: stop the listener, wait for ingest
    /// teardown, then stop mixers.
    pub async fn shutdown(&mut self) -> Result<(), anyhow::Error> {
        self.shutdown.cancel();
        if let Some(handle) = self.handle.take() {
            handle
                .await
                .map_err(|e| anyhow::anyhow!("Test server task failed: {}", e))?;
        }
        self.state.shutdown().await;
        Ok(())
    }
}

impl Drop for TestRelayServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
