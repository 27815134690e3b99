//! Room query handlers.
//!
//! - `GET /api/video/rooms` - all known rooms
//! - `GET /api/video/room/{session}/state` - one room's publishers and mixer
//!
//! Querying an unknown room returns an empty state and does not create it.

use crate::models::{RoomListResponse, RoomStateResponse};
use crate::routes::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use common::types::SessionId;
use std::sync::Arc;

/// Handler for GET /api/video/rooms
#[tracing::instrument(skip_all, name = "relay.rooms.list")]
pub async fn list_rooms(State(state): State<Arc<AppState>>) -> Json<RoomListResponse> {
    Json(RoomListResponse {
        rooms: state.hub.list().await,
    })
}

/// Handler for GET /api/video/room/{session}/state
#[tracing::instrument(skip_all, name = "relay.rooms.state", fields(session_id = %session_id))]
pub async fn room_state(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<SessionId>,
) -> Json<RoomStateResponse> {
    let Some(room) = state.hub.get(&session_id).await else {
        return Json(RoomStateResponse::empty(session_id));
    };

    let publishers = room.list_publishers().await;
    let mixer_running = room.mixer_running().await;

    Json(RoomStateResponse {
        session_id,
        publishers,
        mixer_running,
    })
}
