//! Per-session room state.

use crate::engine::EngineProcess;
use crate::observability::metrics;
use common::types::{PublisherId, SessionId};
use std::collections::HashMap;
use tokio::sync::{Mutex, MutexGuard};
use tracing::warn;

/// Active publishers with their join sequence number.
#[derive(Debug, Default)]
struct Publishers {
    joined: HashMap<PublisherId, u64>,
    next_seq: u64,
}

/// One session's publishers and its mixer process.
///
/// Publishers and the mixer are guarded by separate locks. The mixer lock
/// may be held while the publisher lock is taken briefly, never the other
/// way around.
#[derive(Debug)]
pub struct Room {
    session_id: SessionId,
    publishers: Mutex<Publishers>,
    mixer: Mutex<Option<EngineProcess>>,
}

impl Room {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            publishers: Mutex::new(Publishers::default()),
            mixer: Mutex::new(None),
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Register a publisher. Returns `false` if the id is already active.
    pub async fn add_publisher(&self, publisher: PublisherId) -> bool {
        let mut publishers = self.publishers.lock().await;
        if publishers.joined.contains_key(&publisher) {
            return false;
        }
        let seq = publishers.next_seq;
        publishers.next_seq += 1;
        publishers.joined.insert(publisher, seq);
        true
    }

    /// Unregister a publisher. Returns `false` if it was not active.
    pub async fn remove_publisher(&self, publisher: &PublisherId) -> bool {
        self.publishers
            .lock()
            .await
            .joined
            .remove(publisher)
            .is_some()
    }

    pub async fn has_publisher(&self, publisher: &PublisherId) -> bool {
        self.publishers.lock().await.joined.contains_key(publisher)
    }

    /// Active publishers, first joined first.
    pub async fn list_publishers(&self) -> Vec<PublisherId> {
        let publishers = self.publishers.lock().await;
        let mut ordered: Vec<(&PublisherId, &u64)> = publishers.joined.iter().collect();
        ordered.sort_by_key(|(_, seq)| **seq);
        ordered.into_iter().map(|(id, _)| id.clone()).collect()
    }

    /// Lock the mixer slot.
    ///
    /// The slot stays locked until the returned guard is dropped, so a caller
    /// can stop, snapshot publishers, and start without another start
    /// interleaving.
    pub async fn mixer(&self) -> MixerSlot<'_> {
        MixerSlot {
            session_id: &self.session_id,
            process: self.mixer.lock().await,
        }
    }

    /// Whether a mixer process is alive. An exited mixer is reaped and
    /// cleared here.
    pub async fn mixer_running(&self) -> bool {
        self.mixer().await.is_running()
    }
}

/// Exclusive access to a room's mixer handle.
pub struct MixerSlot<'a> {
    session_id: &'a SessionId,
    process: MutexGuard<'a, Option<EngineProcess>>,
}

impl MixerSlot<'_> {
    /// Store a new mixer handle, returning the previous one.
    pub fn set(&mut self, process: EngineProcess) -> Option<EngineProcess> {
        self.process.replace(process)
    }

    /// Take the mixer handle out of the room.
    pub fn clear(&mut self) -> Option<EngineProcess> {
        self.process.take()
    }

    /// Pid of the stored mixer, if any.
    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().and_then(EngineProcess::pid)
    }

    pub fn is_running(&mut self) -> bool {
        let exited = match self.process.as_mut() {
            None => return false,
            Some(process) => process.has_exited(),
        };
        if exited {
            warn!(
                target: "relay.mixer",
                session_id = %self.session_id,
                "Mixer process exited unexpectedly, clearing handle"
            );
            self.process.take();
            metrics::record_mixer_stop("crashed");
        }
        !exited
    }
}
