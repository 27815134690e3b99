//! Metrics definitions for the relay service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `relay_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `method`: 7 values max (GET, POST, PATCH, DELETE, PUT, HEAD, OPTIONS)
//! - `endpoint`: parameterized paths, unknown paths collapse to `/other`
//! - `status`: success, error, timeout
//! - `purpose`: ingest, mixer
//! - `outcome` / `reason`: bounded by code
//!
//! Session and publisher ids are never used as labels.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("relay_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.200, 0.500, 1.000, 2.000, 5.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        // Ingest sessions live from seconds to hours
        .set_buckets_for_metric(
            Matcher::Prefix("relay_ingest_session_duration".to_string()),
            &[
                1.0, 5.0, 30.0, 60.0, 300.0, 900.0, 1800.0, 3600.0, 7200.0, 14400.0,
            ],
        )
        .map_err(|e| format!("Failed to set ingest session buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion
///
/// Metric: `relay_http_requests_total`, `relay_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status`
///
/// Captures every response including framework-level 404/405. The ingest
/// endpoint is recorded when the upgrade response is sent, not when the
/// WebSocket closes.
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let normalized_endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("relay_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint.clone(),
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("relay_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

/// Categorize HTTP status code into success/error/timeout
fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        101 | 200..=299 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Normalize endpoint path to prevent label cardinality explosion
///
/// Replaces session and publisher ids with placeholders.
fn normalize_endpoint(path: &str) -> String {
    match path {
        "/" => "/".to_string(),
        "/health" => "/health".to_string(),
        "/metrics" => "/metrics".to_string(),
        "/api/video/rooms" => "/api/video/rooms".to_string(),
        _ => normalize_dynamic_endpoint(path),
    }
}

fn normalize_dynamic_endpoint(path: &str) -> String {
    let parts: Vec<&str> = path.split('/').collect();

    // /api/video/room/{session}/state
    // /api/video/room/{session}/mix/start
    // /api/video/room/{session}/mix/stop
    if path.starts_with("/api/video/room/") {
        let tail: Vec<&str> = parts.iter().skip(5).copied().collect();
        match tail.as_slice() {
            ["state"] => return "/api/video/room/{session}/state".to_string(),
            ["mix", "start"] => return "/api/video/room/{session}/mix/start".to_string(),
            ["mix", "stop"] => return "/api/video/room/{session}/mix/stop".to_string(),
            _ => {}
        }
    }

    // /ws/ingest/{session}/{publisher}
    if path.starts_with("/ws/ingest/") && parts.len() == 5 {
        return "/ws/ingest/{session}/{publisher}".to_string();
    }

    "/other".to_string()
}

// ============================================================================
// Ingest Metrics
// ============================================================================

/// Record an ingest session entering streaming.
///
/// Metric: `relay_ingest_sessions_active` (gauge)
pub fn record_ingest_started() {
    gauge!("relay_ingest_sessions_active").increment(1.0);
}

/// Record an ingest session reaching `Closed`.
///
/// Metric: `relay_ingest_sessions_active`, `relay_ingest_sessions_total`,
/// `relay_ingest_session_duration_seconds`
/// Labels: `outcome`
///
/// `was_streaming` is false for sessions that closed during setup; those
/// never incremented the active gauge.
pub fn record_ingest_finished(outcome: &str, was_streaming: bool, duration: Duration) {
    if was_streaming {
        gauge!("relay_ingest_sessions_active").decrement(1.0);
    }

    counter!("relay_ingest_sessions_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);

    histogram!("relay_ingest_session_duration_seconds",
        "outcome" => outcome.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record an ingest connection refused before upgrade.
///
/// Metric: `relay_ingest_rejections_total`
/// Labels: `reason` (unauthorized, conflict, bad_request)
pub fn record_ingest_rejected(reason: &str) {
    counter!("relay_ingest_rejections_total",
        "reason" => reason.to_string()
    )
    .increment(1);
}

// ============================================================================
// Mixer Metrics
// ============================================================================

/// Record a mixer start request.
///
/// Metric: `relay_mixer_starts_total`, `relay_mixers_running`
/// Labels: `status` (success, error)
pub fn record_mixer_start(status: &str) {
    counter!("relay_mixer_starts_total",
        "status" => status.to_string()
    )
    .increment(1);

    if status == "success" {
        gauge!("relay_mixers_running").increment(1.0);
    }
}

/// Record a mixer process leaving a room.
///
/// Metric: `relay_mixer_stops_total`, `relay_mixers_running`
/// Labels: `reason` (stopped, replaced, crashed, shutdown)
pub fn record_mixer_stop(reason: &str) {
    counter!("relay_mixer_stops_total",
        "reason" => reason.to_string()
    )
    .increment(1);

    gauge!("relay_mixers_running").decrement(1.0);
}

// ============================================================================
// Engine Metrics
// ============================================================================

/// Record an engine process that failed to start.
///
/// Metric: `relay_engine_spawn_failures_total`
/// Labels: `purpose`
pub fn record_engine_spawn_failure(purpose: &str) {
    counter!("relay_engine_spawn_failures_total",
        "purpose" => purpose.to_string()
    )
    .increment(1);
}

/// Set the number of known rooms.
///
/// Metric: `relay_rooms` (gauge)
pub fn set_room_count(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("relay_rooms").set(count as f64);
}
