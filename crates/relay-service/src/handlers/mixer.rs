//! Mixer control handlers.
//!
//! - `POST /api/video/room/{session}/mix/start` - start or restart the mixer
//! - `POST /api/video/room/{session}/mix/stop` - stop the mixer (idempotent)

use crate::errors::RelayError;
use crate::models::{MixStartedResponse, MixStoppedResponse};
use crate::routes::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use common::types::SessionId;
use std::sync::Arc;

/// Handler for POST /api/video/room/{session}/mix/start
///
/// # Errors
///
/// - 500 `SPAWN_FAILED` if the mixer process cannot be started
#[tracing::instrument(skip_all, name = "relay.mix.start", fields(session_id = %session_id))]
pub async fn start_mixer(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<SessionId>,
) -> Result<Json<MixStartedResponse>, RelayError> {
    let output = state.mixer.start(&session_id).await?;

    Ok(Json(MixStartedResponse {
        ok: true,
        ts_out: output.output_url(),
    }))
}

/// Handler for POST /api/video/room/{session}/mix/stop
///
/// Always succeeds, including for unknown rooms.
#[tracing::instrument(skip_all, name = "relay.mix.stop", fields(session_id = %session_id))]
pub async fn stop_mixer(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<SessionId>,
) -> Json<MixStoppedResponse> {
    state.mixer.stop(&session_id).await;
    Json(MixStoppedResponse { ok: true })
}
