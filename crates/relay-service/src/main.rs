//! Relay Service
//!
//! Control plane for the live-media relay: room registry, publisher ingest
//! over WebSockets, and per-room mixer orchestration. All media work is done
//! by ffmpeg subprocesses.
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Initialize tracing (text or JSON)
//! 3. Initialize Prometheus metrics recorder
//! 4. Build application state (hub, ingest service, mixer orchestrator)
//! 5. Serve HTTP/WebSocket until a shutdown signal
//! 6. Cancel ingest sessions, wait for their teardown, stop all mixers

#![warn(clippy::pedantic)]

use relay_service::config::{Config, LogFormat};
use relay_service::engine::FfmpegEngine;
use relay_service::observability::metrics::init_metrics_recorder;
use relay_service::routes::{self, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str = "relay_service=debug,tower_http=debug";

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());

    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Configuration decides the log format, so load it before tracing and
    // report a failure once the subscriber exists.
    let config = Config::from_env();
    init_tracing(
        config
            .as_ref()
            .map(|c| c.log_format)
            .unwrap_or_default(),
    );

    info!("Starting Relay Service");

    let config = config.map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        bind_address = %config.bind_address,
        engine_path = %config.engine_path,
        sink_mode = ?config.sink_mode,
        ingest_ports = %config.ingest_ports,
        mix_ports = %config.mix_ports,
        max_participants = config.max_participants,
        "Configuration loaded successfully"
    );

    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to initialize metrics recorder: {}", e);
        std::io::Error::other(e)
    })?;

    let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;
    let drain_seconds = config.drain_seconds;

    let shutdown = CancellationToken::new();
    let engine = Arc::new(FfmpegEngine::new(config.engine_path.clone()));
    let state = Arc::new(AppState::new(config, engine, shutdown.clone()).map_err(|e| {
        error!("Failed to build application state: {}", e);
        e
    })?);

    let app = routes::build_routes(Arc::clone(&state), metrics_handle);

    info!("Relay Service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown.clone(), drain_seconds))
    .await?;

    // The listener has stopped but upgraded ingest connections are still
    // tearing down; wait for them before stopping mixers.
    state.shutdown().await;

    info!("Relay Service shutdown complete");

    Ok(())
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
///
/// Cancels `shutdown` as soon as a signal arrives so ingest sessions begin
/// teardown, then returns after the drain period.
async fn shutdown_signal(shutdown: CancellationToken, drain_seconds: u64) {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    shutdown.cancel();

    if drain_seconds > 0 {
        warn!("Draining connections for {} seconds...", drain_seconds);
        tokio::time::sleep(Duration::from_secs(drain_seconds)).await;
        info!("Drain period complete");
    } else {
        info!("Skipping drain period (RELAY_DRAIN_SECONDS=0)");
    }
}
