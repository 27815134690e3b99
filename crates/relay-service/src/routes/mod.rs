//! HTTP routes for the relay service.
//!
//! Defines the Axum router and application state.

use crate::config::Config;
use crate::engine::MediaEngine;
use crate::errors::RelayError;
use crate::handlers;
use crate::hub::Hub;
use crate::middleware::http_metrics_middleware;
use crate::services::{IngestService, MixerOrchestrator};
use axum::{
    http::{HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use common::secret::SharedSecret;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

/// Application state shared across all handlers.
pub struct AppState {
    /// Service configuration.
    pub config: Config,

    /// Room registry.
    pub hub: Arc<Hub>,

    /// Verifier for the ingest credential.
    pub ingest_secret: SharedSecret,

    /// Runs upgraded ingest connections.
    pub ingest: Arc<IngestService>,

    /// Starts and stops room mixers.
    pub mixer: MixerOrchestrator,
}

impl AppState {
    /// Wire the services together.
    ///
    /// `shutdown` is the root token; every ingest session runs under a child
    /// of it.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::Internal` if the secret verifier cannot be built.
    pub fn new(
        config: Config,
        engine: Arc<dyn MediaEngine>,
        shutdown: CancellationToken,
    ) -> Result<Self, RelayError> {
        let ingest_secret = SharedSecret::new(&config.ingest_secret)
            .map_err(|_| RelayError::Internal("system random source unavailable".to_string()))?;

        let hub = Arc::new(Hub::new());
        let ingest = Arc::new(IngestService::new(
            &config,
            Arc::clone(&hub),
            Arc::clone(&engine),
            shutdown,
        ));
        let mixer = MixerOrchestrator::from_config(&config, Arc::clone(&hub), engine);

        Ok(Self {
            config,
            hub,
            ingest_secret,
            ingest,
            mixer,
        })
    }

    /// Finish every ingest session, then stop every mixer.
    ///
    /// The root token must already be cancelled, otherwise this waits for
    /// publishers to disconnect on their own.
    pub async fn shutdown(&self) {
        self.ingest.drain().await;
        self.hub.shutdown().await;
    }
}

/// CORS for the configured origin; `*` allows any.
fn cors_layer(allow_origin: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    if allow_origin == "*" {
        return layer.allow_origin(Any);
    }

    match HeaderValue::from_str(allow_origin) {
        Ok(origin) => layer.allow_origin(origin),
        Err(e) => {
            tracing::warn!(origin = %allow_origin, error = %e, "Invalid ALLOW_ORIGIN, CORS disabled");
            layer
        }
    }
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/health` - Liveness probe (simple "OK")
/// - `/metrics` - Prometheus metrics endpoint
/// - `/api/video/rooms` - Known rooms
/// - `/api/video/room/:session_id/state` - Room publishers and mixer status
/// - `/api/video/room/:session_id/mix/start` - Start or restart the mixer
/// - `/api/video/room/:session_id/mix/stop` - Stop the mixer
/// - `/ws/ingest/:session_id/:publisher_id` - Publisher WebSocket
/// - TraceLayer for request logging
/// - HTTP metrics middleware
/// - 30 second request timeout on control routes
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let cors = cors_layer(&state.config.allow_origin);

    // Control routes are short request/response calls
    let control_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/api/video/rooms", get(handlers::list_rooms))
        .route("/api/video/room/:session_id/state", get(handlers::room_state))
        .route(
            "/api/video/room/:session_id/mix/start",
            post(handlers::start_mixer),
        )
        .route(
            "/api/video/room/:session_id/mix/stop",
            post(handlers::stop_mixer),
        )
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .with_state(state.clone());

    // Metrics route with its own state
    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // Ingest connections are long-lived and must not be timed out
    let ingest_routes = Router::new()
        .route(
            "/ws/ingest/:session_id/:publisher_id",
            get(handlers::ingest_upgrade),
        )
        .with_state(state);

    // Layer order (bottom-to-top execution):
    // 1. CorsLayer
    // 2. TraceLayer - Log request details
    // 3. http_metrics_middleware - Record ALL responses (outermost)
    control_routes
        .merge(metrics_routes)
        .merge(ingest_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(http_metrics_middleware))
}
