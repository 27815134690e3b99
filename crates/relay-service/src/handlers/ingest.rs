//! Ingest WebSocket handler.
//!
//! `GET /ws/ingest/{session}/{publisher}?token=...`
//!
//! Checks run before the upgrade is accepted, in this order:
//!
//! 1. The token must match the shared ingest secret (401 otherwise).
//! 2. The publisher must not already be streaming into the session (409).
//! 3. The request must be a WebSocket upgrade (400).
//!
//! A rejected request never touches room state or starts an engine.

use crate::errors::RelayError;
use crate::models::IngestQuery;
use crate::observability::metrics;
use crate::routes::AppState;
use crate::services::ingest::{transition, IngestState};
use axum::{
    extract::{ws::WebSocketUpgrade, Path, Query, State},
    response::Response,
};
use common::types::{PublisherId, SessionId};
use std::sync::Arc;

/// Handler for GET /ws/ingest/{session}/{publisher}
///
/// # Errors
///
/// - 401 `UNAUTHORIZED` - missing or wrong token
/// - 409 `CONFLICT` - publisher already active in this session
/// - 400 `BAD_REQUEST` - not a WebSocket upgrade request
#[tracing::instrument(
    skip_all,
    name = "relay.ingest.upgrade",
    fields(session_id = %session_id, publisher_id = %publisher_id)
)]
pub async fn ingest_upgrade(
    State(state): State<Arc<AppState>>,
    Path((session_id, publisher_id)): Path<(SessionId, PublisherId)>,
    Query(query): Query<IngestQuery>,
    upgrade: Option<WebSocketUpgrade>,
) -> Result<Response, RelayError> {
    let authorized = query
        .token
        .as_deref()
        .is_some_and(|token| state.ingest_secret.verify(token));

    if !authorized {
        transition(IngestState::Connecting, IngestState::Unauthorized);
        metrics::record_ingest_rejected("unauthorized");
        return Err(RelayError::AuthFailure);
    }

    if state.ingest.is_active(&session_id, &publisher_id).await {
        metrics::record_ingest_rejected("conflict");
        return Err(RelayError::PublisherConflict(publisher_id.to_string()));
    }

    let Some(upgrade) = upgrade else {
        metrics::record_ingest_rejected("bad_request");
        return Err(RelayError::BadRequest(
            "WebSocket upgrade required".to_string(),
        ));
    };

    let ingest = Arc::clone(&state.ingest);
    Ok(upgrade.on_upgrade(move |socket| {
        let sessions = ingest.sessions().clone();
        sessions.track_future(async move {
            ingest.run(session_id, publisher_id, socket).await;
        })
    }))
}
