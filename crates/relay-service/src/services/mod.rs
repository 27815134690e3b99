//! Relay services.
//!
//! - `ingest` - WebSocket to engine bridge for one publisher
//! - `mixer` - per-room mixer start/stop

pub mod ingest;
pub mod mixer;

pub use ingest::{IngestOutcome, IngestService, IngestState, StreamEnd};
pub use mixer::MixerOrchestrator;
