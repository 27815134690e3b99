//! Ingest pipeline.
//!
//! One WebSocket connection feeds one engine process. The session walks
//! through these states:
//!
//! ```text
//! Connecting ──► Authorized ──► Streaming ──► Closing ──► Closed
//!     │               │                                    ▲
//!     ▼               └────────── spawn failure ───────────┘
//! Unauthorized
//! ```
//!
//! `Connecting` and `Unauthorized` happen in the HTTP handler before the
//! upgrade. Everything after `Authorized` runs here, on the upgraded
//! connection's task.
//!
//! While streaming, binary frames are written to the engine's stdin as they
//! arrive. There is no buffer between the two: a slow engine stalls reads
//! from the connection. A ping is sent on a fixed interval regardless of
//! traffic. The first of peer close, connection error, engine input error,
//! failed ping, or process shutdown ends the session, and teardown always
//! removes the publisher from its room.

use crate::config::Config;
use crate::engine::{ingest_command, EngineProcess, MediaEngine};
use crate::errors::RelayError;
use crate::hub::Hub;
use crate::observability::metrics;
use crate::ports::Addressing;
use axum::extract::ws::Message;
use common::types::{PublisherId, SessionId};
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Ingest session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestState {
    Connecting,
    Authorized,
    Streaming,
    Closing,
    Closed,
    Unauthorized,
}

impl IngestState {
    pub fn as_str(self) -> &'static str {
        match self {
            IngestState::Connecting => "connecting",
            IngestState::Authorized => "authorized",
            IngestState::Streaming => "streaming",
            IngestState::Closing => "closing",
            IngestState::Closed => "closed",
            IngestState::Unauthorized => "unauthorized",
        }
    }
}

impl fmt::Display for IngestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) fn transition(from: IngestState, to: IngestState) {
    debug!(target: "relay.ingest", from = %from, to = %to, "Ingest state change");
}

/// Why streaming stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEnd {
    /// The publisher closed the connection.
    PeerClosed,
    /// Reading from the connection failed.
    ConnectionError(String),
    /// Writing to the engine's stdin failed (the engine exited).
    EngineInputClosed(String),
    /// A liveness ping could not be sent.
    PingFailed(String),
    /// The process is shutting down.
    Shutdown,
}

impl StreamEnd {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamEnd::PeerClosed => "peer_closed",
            StreamEnd::ConnectionError(_) => "connection_error",
            StreamEnd::EngineInputClosed(_) => "engine_input_closed",
            StreamEnd::PingFailed(_) => "ping_failed",
            StreamEnd::Shutdown => "shutdown",
        }
    }

    /// The failure behind this end, if it was one.
    pub fn failure(&self) -> Option<RelayError> {
        match self {
            StreamEnd::ConnectionError(reason)
            | StreamEnd::EngineInputClosed(reason)
            | StreamEnd::PingFailed(reason) => Some(RelayError::StreamFailure(reason.clone())),
            StreamEnd::PeerClosed | StreamEnd::Shutdown => None,
        }
    }
}

/// Result of one ingest session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The engine could not be started; the publisher was never registered.
    SpawnFailed,
    /// Another connection registered the same publisher first.
    Conflict,
    /// The session streamed and then ended.
    Streamed(StreamEnd),
}

impl IngestOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            IngestOutcome::SpawnFailed => "spawn_failed",
            IngestOutcome::Conflict => "conflict",
            IngestOutcome::Streamed(end) => end.as_str(),
        }
    }
}

/// Runs ingest sessions.
pub struct IngestService {
    hub: Arc<Hub>,
    engine: Arc<dyn MediaEngine>,
    addressing: Addressing,
    ping_interval: Duration,
    stop_grace: Duration,
    shutdown: CancellationToken,
    sessions: TaskTracker,
}

impl IngestService {
    pub fn new(
        config: &Config,
        hub: Arc<Hub>,
        engine: Arc<dyn MediaEngine>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            hub,
            engine,
            addressing: Addressing::from_config(config),
            ping_interval: config.ingest_ping_interval(),
            stop_grace: config.ingest_stop_grace(),
            shutdown,
            sessions: TaskTracker::new(),
        }
    }

    /// Tracker for running sessions. Upgraded connections are not tracked by
    /// the HTTP server, so their tasks register here.
    pub fn sessions(&self) -> &TaskTracker {
        &self.sessions
    }

    /// Wait for every running session to finish its teardown.
    ///
    /// Call after the root token is cancelled. Sessions that start later are
    /// still waited for.
    pub async fn drain(&self) {
        self.sessions.close();
        let running = self.sessions.len();
        if running > 0 {
            info!(target: "relay.ingest", sessions = running, "Waiting for ingest sessions to close");
        }
        self.sessions.wait().await;
    }

    /// Whether `publisher_id` is currently streaming into `session_id`.
    /// Does not create the room.
    pub async fn is_active(&self, session_id: &SessionId, publisher_id: &PublisherId) -> bool {
        match self.hub.get(session_id).await {
            Some(room) => room.has_publisher(publisher_id).await,
            None => false,
        }
    }

    /// Run one authorized session to completion.
    ///
    /// `socket` is the upgraded connection. Returns once the session has
    /// reached `Closed` and the publisher is no longer registered.
    #[instrument(
        skip_all,
        name = "relay.ingest.session",
        fields(
            session_id = %session_id,
            publisher_id = %publisher_id,
            connection_id = %Uuid::new_v4(),
        )
    )]
    pub async fn run<S, E>(
        &self,
        session_id: SessionId,
        publisher_id: PublisherId,
        socket: S,
    ) -> IngestOutcome
    where
        S: Stream<Item = Result<Message, E>> + Sink<Message, Error = E> + Send + Unpin,
        E: fmt::Display,
    {
        let started = Instant::now();
        transition(IngestState::Connecting, IngestState::Authorized);

        let sink = self.addressing.publisher_sink(&session_id, &publisher_id);

        let mut process = match self.engine.launch(&ingest_command(&sink)) {
            Ok(process) => process,
            Err(e) => {
                warn!(target: "relay.ingest", error = %e, "Ingest engine failed to start");
                transition(IngestState::Authorized, IngestState::Closed);
                return finish(IngestOutcome::SpawnFailed, false, started);
            }
        };

        let room = self.hub.get_or_create(&session_id).await;
        if !room.add_publisher(publisher_id.clone()).await {
            warn!(target: "relay.ingest", "Publisher became active on another connection");
            process.terminate().await;
            transition(IngestState::Authorized, IngestState::Closed);
            return finish(IngestOutcome::Conflict, false, started);
        }

        transition(IngestState::Authorized, IngestState::Streaming);
        metrics::record_ingest_started();
        info!(target: "relay.ingest", pid = ?process.pid(), sink = %sink, "Ingest streaming");

        let cancel = self.shutdown.child_token();
        let end = self.stream(&mut process, socket, &cancel).await;

        transition(IngestState::Streaming, IngestState::Closing);
        match end.failure() {
            Some(failure) => {
                warn!(target: "relay.ingest", error = %failure, reason = end.as_str(), "Ingest stream ended");
            }
            None => {
                info!(target: "relay.ingest", reason = end.as_str(), "Ingest stream ended");
            }
        }

        cancel.cancel();
        process.shutdown(self.stop_grace).await;
        room.remove_publisher(&publisher_id).await;
        transition(IngestState::Closing, IngestState::Closed);

        finish(IngestOutcome::Streamed(end), true, started)
    }

    /// Forward frames and send pings until the first terminating event.
    /// The engine's stdin is closed before returning.
    async fn stream<S, E>(
        &self,
        process: &mut EngineProcess,
        socket: S,
        cancel: &CancellationToken,
    ) -> StreamEnd
    where
        S: Stream<Item = Result<Message, E>> + Sink<Message, Error = E> + Send + Unpin,
        E: fmt::Display,
    {
        let Some(mut stdin) = process.take_stdin() else {
            return StreamEnd::EngineInputClosed("engine stdin not available".to_string());
        };

        let (mut sender, receiver) = socket.split();

        let end = tokio::select! {
            end = forward_frames(receiver, &mut stdin) => end,
            end = keepalive(&mut sender, self.ping_interval) => end,
            () = cancel.cancelled() => StreamEnd::Shutdown,
        };

        drop(stdin);
        if let Err(e) = sender.close().await {
            debug!(target: "relay.ingest", error = %e, "Connection close failed");
        }
        end
    }
}

fn finish(outcome: IngestOutcome, was_streaming: bool, started: Instant) -> IngestOutcome {
    metrics::record_ingest_finished(outcome.as_str(), was_streaming, started.elapsed());
    outcome
}

/// Copy binary frames into `input` until the connection ends.
///
/// Non-binary frames are ignored and empty frames are skipped. Each frame is
/// written in full before the next one is read.
pub async fn forward_frames<R, W, E>(mut frames: R, input: &mut W) -> StreamEnd
where
    R: Stream<Item = Result<Message, E>> + Unpin,
    W: AsyncWrite + Unpin,
    E: fmt::Display,
{
    while let Some(frame) = frames.next().await {
        match frame {
            Ok(Message::Binary(data)) => {
                if data.is_empty() {
                    continue;
                }
                if let Err(e) = input.write_all(&data).await {
                    return StreamEnd::EngineInputClosed(e.to_string());
                }
            }
            Ok(Message::Close(_)) => return StreamEnd::PeerClosed,
            Ok(_) => {}
            Err(e) => return StreamEnd::ConnectionError(e.to_string()),
        }
    }
    StreamEnd::PeerClosed
}

/// Send a ping every `period` until one fails.
pub async fn keepalive<S>(sender: &mut S, period: Duration) -> StreamEnd
where
    S: Sink<Message> + Unpin,
    S::Error: fmt::Display,
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if let Err(e) = sender.send(Message::Ping(Vec::new())).await {
            return StreamEnd::PingFailed(e.to_string());
        }
    }
}
