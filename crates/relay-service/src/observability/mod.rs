//! Observability for the relay service.
//!
//! Provides metrics definitions and recording helpers.

pub mod metrics;
