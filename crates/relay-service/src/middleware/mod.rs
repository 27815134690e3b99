//! Middleware for the relay service.
//!
//! - `http_metrics` - request counters and latency for every response

pub mod http_metrics;

pub use http_metrics::http_metrics_middleware;
