//! Relay API models.
//!
//! Response bodies for the control endpoints. Field names are camelCase on
//! the wire.

use common::types::{PublisherId, SessionId};
use serde::{Deserialize, Serialize};

/// Response body for `GET /api/video/rooms`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomListResponse {
    pub rooms: Vec<SessionId>,
}

/// Response body for `GET /api/video/room/{session}/state`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomStateResponse {
    pub session_id: SessionId,

    /// Active publishers, first joined first.
    pub publishers: Vec<PublisherId>,

    pub mixer_running: bool,
}

impl RoomStateResponse {
    /// State reported for a session the hub has never seen.
    pub fn empty(session_id: SessionId) -> Self {
        Self {
            session_id,
            publishers: Vec::new(),
            mixer_running: false,
        }
    }
}

/// Response body for `POST /api/video/room/{session}/mix/start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MixStartedResponse {
    pub ok: bool,

    /// Address the mixed transport stream is sent to.
    pub ts_out: String,
}

/// Response body for `POST /api/video/room/{session}/mix/stop`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MixStoppedResponse {
    pub ok: bool,
}

/// Query string of the ingest endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IngestQuery {
    /// Shared ingest credential.
    pub token: Option<String>,
}
