//! # Relay Test Utilities
//!
//! Shared test utilities for the relay service.
//!
//! This crate provides:
//! - Mock media engine (`MockMediaEngine`) that records invocations and runs
//!   stand-in processes instead of ffmpeg
//! - Server test harness (`TestRelayServer` for E2E tests)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use relay_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> anyhow::Result<()> {
//!     let engine = Arc::new(MockMediaEngine::accepting());
//!     let server = TestRelayServer::spawn(engine.clone()).await?;
//!
//!     let response = reqwest::Client::new()
//!         .post(format!("{}/api/video/room/r1/mix/start", server.url()))
//!         .send()
//!         .await?;
//!
//!     assert_eq!(response.status(), 200);
//!     assert_eq!(engine.launch_count(), 1);
//!     Ok(())
//! }
//! ```

pub mod mock_engine;
pub mod server_harness;

// Re-export commonly used items
pub use mock_engine::*;
pub use server_harness::*;
