//! Relay Service Library
//!
//! Control plane for a multi-party live-media relay. Publishers push media
//! over WebSockets; each connection is transcoded by its own engine process
//! into a transport stream on a deterministic port, and on request a mixer
//! process composes up to N of those streams into one.
//!
//! # Architecture
//!
//! ```text
//! routes/mod.rs -> handlers/*.rs -> services/*.rs -> hub/, engine/
//! ```
//!
//! # Modules
//!
//! - `config` - Service configuration from environment
//! - `engine` - Engine process handles, ffmpeg invocations, mixer graph
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - HTTP and WebSocket request handlers
//! - `hub` - Room registry
//! - `middleware` - HTTP metrics
//! - `models` - API request/response types
//! - `observability` - Metrics definitions
//! - `ports` - Deterministic port allocation and sink addresses
//! - `routes` - Axum router setup
//! - `services` - Ingest pipeline and mixer orchestration

pub mod config;
pub mod engine;
pub mod errors;
pub mod handlers;
pub mod hub;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod ports;
pub mod routes;
pub mod services;
