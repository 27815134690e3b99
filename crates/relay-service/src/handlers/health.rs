//! Liveness handler.

/// Liveness probe handler.
///
/// Returns "OK" while the process can serve requests. Does not check the
/// media engine or any room state.
pub async fn health_check() -> &'static str {
    "OK"
}
