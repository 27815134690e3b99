//! HTTP request handlers for the relay service.

pub mod health;
pub mod ingest;
pub mod metrics;
pub mod mixer;
pub mod rooms;

pub use health::health_check;
pub use ingest::ingest_upgrade;
pub use metrics::metrics_handler;
pub use mixer::{start_mixer, stop_mixer};
pub use rooms::{list_rooms, room_state};
