//! Mixer orchestration.
//!
//! Starting a mixer always stops the room's current mixer first, under the
//! room's mixer lock, so a room never has more than one mixer process even
//! when start requests race.

use crate::config::Config;
use crate::engine::{Canvas, MediaEngine, MixPlan};
use crate::errors::RelayError;
use crate::hub::Hub;
use crate::observability::metrics;
use crate::ports::{Addressing, SinkAddress};
use common::types::{PublisherId, SessionId};
use std::sync::Arc;
use tracing::{info, instrument};

pub struct MixerOrchestrator {
    hub: Arc<Hub>,
    engine: Arc<dyn MediaEngine>,
    addressing: Addressing,
    canvas: Canvas,
    slots: usize,
}

impl MixerOrchestrator {
    pub fn new(
        hub: Arc<Hub>,
        engine: Arc<dyn MediaEngine>,
        addressing: Addressing,
        canvas: Canvas,
        slots: usize,
    ) -> Self {
        Self {
            hub,
            engine,
            addressing,
            canvas,
            slots,
        }
    }

    pub fn from_config(config: &Config, hub: Arc<Hub>, engine: Arc<dyn MediaEngine>) -> Self {
        Self::new(
            hub,
            engine,
            Addressing::from_config(config),
            Canvas {
                width: config.mix_width,
                height: config.mix_height,
                frame_rate: config.mix_frame_rate,
            },
            config.max_participants,
        )
    }

    /// Build the mixer plan for the room's current publishers.
    ///
    /// Publishers beyond the slot count are dropped, keeping the earliest
    /// joiners.
    fn plan(&self, session_id: &SessionId, publishers: &[PublisherId]) -> MixPlan {
        if publishers.len() > self.slots {
            info!(
                target: "relay.mixer",
                session_id = %session_id,
                publishers = publishers.len(),
                slots = self.slots,
                "More publishers than mixer slots, keeping earliest joiners"
            );
        }

        let inputs = publishers
            .iter()
            .take(self.slots)
            .map(|publisher| self.addressing.publisher_sink(session_id, publisher))
            .collect();

        MixPlan::new(
            self.canvas,
            self.slots,
            inputs,
            self.addressing.mix_sink(session_id),
        )
    }

    /// Start (or restart) the mixer for a room and return its output sink.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::SpawnFailure` if the engine cannot be started.
    /// The room is then left without a mixer.
    #[instrument(skip_all, name = "relay.mixer.start", fields(session_id = %session_id))]
    pub async fn start(&self, session_id: &SessionId) -> Result<SinkAddress, RelayError> {
        let room = self.hub.get_or_create(session_id).await;
        let mut slot = room.mixer().await;

        if let Some(mut previous) = slot.clear() {
            previous.terminate().await;
            metrics::record_mixer_stop("replaced");
            info!(target: "relay.mixer", pid = ?previous.pid(), "Previous mixer stopped");
        }

        let publishers = room.list_publishers().await;
        let plan = self.plan(session_id, &publishers);

        let process = match self.engine.launch(&plan.command()) {
            Ok(process) => process,
            Err(e) => {
                metrics::record_mixer_start("error");
                return Err(e);
            }
        };

        info!(
            target: "relay.mixer",
            pid = ?process.pid(),
            slots = plan.slot_count(),
            real_slots = plan.real_slots(),
            synthetic_slots = plan.synthetic_slots(),
            output = %plan.output(),
            "Mixer started"
        );

        slot.set(process);
        metrics::record_mixer_start("success");

        Ok(plan.output().clone())
    }

    /// Stop the room's mixer. Returns whether a mixer was running.
    ///
    /// Unknown rooms and rooms without a mixer are a no-op.
    #[instrument(skip_all, name = "relay.mixer.stop", fields(session_id = %session_id))]
    pub async fn stop(&self, session_id: &SessionId) -> bool {
        let Some(room) = self.hub.get(session_id).await else {
            return false;
        };

        let mut slot = room.mixer().await;
        let Some(mut process) = slot.clear() else {
            return false;
        };

        process.terminate().await;
        metrics::record_mixer_stop("stopped");
        info!(target: "relay.mixer", pid = ?process.pid(), "Mixer stopped");
        true
    }

    /// Whether the room has a live mixer. Unknown rooms report `false`.
    pub async fn running(&self, session_id: &SessionId) -> bool {
        match self.hub.get(session_id).await {
            Some(room) => room.mixer_running().await,
            None => false,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::engine::{EngineCommand, EngineProcess, EnginePurpose};
    use crate::ports::{PortWindow, SinkMode};
    use std::sync::Mutex;
    use tokio::process::Command;

    /// Records commands and runs a long sleep for each launch.
    #[derive(Default)]
    struct SleepEngine {
        launches: Mutex<Vec<EngineCommand>>,
    }

    impl MediaEngine for SleepEngine {
        fn launch(&self, command: &EngineCommand) -> Result<EngineProcess, RelayError> {
            self.launches.lock().unwrap().push(command.clone());
            let mut process = Command::new("sleep");
            process.arg("30");
            EngineProcess::spawn(command.purpose, command.pipe_stdin, &mut process)
        }
    }

    struct RefusingEngine;

    impl MediaEngine for RefusingEngine {
        fn launch(&self, command: &EngineCommand) -> Result<EngineProcess, RelayError> {
            Err(RelayError::SpawnFailure {
                purpose: command.purpose,
                reason: "refused".to_string(),
            })
        }
    }

    fn orchestrator(engine: Arc<dyn MediaEngine>) -> (Arc<Hub>, MixerOrchestrator) {
        let hub = Arc::new(Hub::new());
        let addressing = Addressing::new(
            PortWindow::new(5000, 2000).unwrap(),
            PortWindow::new(7000, 1000).unwrap(),
            SinkMode::Unicast,
            "239.10.10.1",
        );
        let canvas = Canvas {
            width: 640,
            height: 360,
            frame_rate: 30,
        };
        let mixer = MixerOrchestrator::new(Arc::clone(&hub), engine, addressing, canvas, 4);
        (hub, mixer)
    }

    #[tokio::test]
    async fn test_start_with_one_publisher() {
        let engine = Arc::new(SleepEngine::default());
        let (hub, mixer) = orchestrator(engine.clone());
        let session = SessionId::from("r1");

        hub.get_or_create(&session)
            .await
            .add_publisher(PublisherId::from("p1"))
            .await;

        let output = mixer.start(&session).await.unwrap();
        assert!(!output.output_url().is_empty());
        assert!(mixer.running(&session).await);

        let launches = engine.launches.lock().unwrap().clone();
        assert_eq!(launches.len(), 1);
        let command = launches.first().unwrap();
        assert_eq!(command.purpose, EnginePurpose::Mixer);
        assert_eq!(command.args.last().unwrap(), &output.output_url());

        assert!(mixer.stop(&session).await);
        assert!(!mixer.running(&session).await);
    }

    #[tokio::test]
    async fn test_start_creates_room() {
        let (hub, mixer) = orchestrator(Arc::new(SleepEngine::default()));
        let session = SessionId::from("fresh");

        mixer.start(&session).await.unwrap();

        assert!(hub.get(&session).await.is_some());
        mixer.stop(&session).await;
    }

    #[tokio::test]
    async fn test_restart_replaces_mixer() {
        let engine = Arc::new(SleepEngine::default());
        let (hub, mixer) = orchestrator(engine.clone());
        let session = SessionId::from("r1");

        mixer.start(&session).await.unwrap();
        let room = hub.get(&session).await.unwrap();
        let first_pid = room.mixer().await.pid();
        assert!(first_pid.is_some());

        mixer.start(&session).await.unwrap();
        let second_pid = room.mixer().await.pid();

        assert!(second_pid.is_some());
        assert_ne!(first_pid, second_pid);
        assert_eq!(engine.launches.lock().unwrap().len(), 2);

        assert!(mixer.stop(&session).await);
    }

    #[tokio::test]
    async fn test_concurrent_starts_leave_one_mixer() {
        let engine = Arc::new(SleepEngine::default());
        let (hub, mixer) = orchestrator(engine.clone());
        let mixer = Arc::new(mixer);
        let session = SessionId::from("race");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let mixer = Arc::clone(&mixer);
                let session = session.clone();
                tokio::spawn(async move { mixer.start(&session).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(engine.launches.lock().unwrap().len(), 8);
        assert!(mixer.running(&session).await);

        // Exactly one handle remains; clearing it leaves the room empty
        let room = hub.get(&session).await.unwrap();
        let mut slot = room.mixer().await;
        let mut survivor = slot.clear().unwrap();
        assert!(!survivor.has_exited());
        survivor.terminate().await;
        assert!(slot.clear().is_none());
    }

    #[tokio::test]
    async fn test_stop_is_noop_without_mixer() {
        let (hub, mixer) = orchestrator(Arc::new(SleepEngine::default()));

        // Unknown room
        assert!(!mixer.stop(&SessionId::from("ghost")).await);
        assert!(hub.get(&SessionId::from("ghost")).await.is_none());

        // Known room, no mixer
        hub.get_or_create(&SessionId::from("r1")).await;
        assert!(!mixer.stop(&SessionId::from("r1")).await);
        assert!(!mixer.stop(&SessionId::from("r1")).await);
    }

    #[tokio::test]
    async fn test_spawn_failure_leaves_no_mixer() {
        let (_hub, mixer) = orchestrator(Arc::new(RefusingEngine));
        let session = SessionId::from("r1");

        let result = mixer.start(&session).await;
        assert!(matches!(result, Err(RelayError::SpawnFailure { .. })));
        assert!(!mixer.running(&session).await);
    }

    #[tokio::test]
    async fn test_spawn_failure_after_running_mixer_clears_it() {
        let (hub, mixer) = orchestrator(Arc::new(RefusingEngine));
        let session = SessionId::from("r1");

        let room = hub.get_or_create(&session).await;
        let mut command = Command::new("sleep");
        command.arg("30");
        room.mixer()
            .await
            .set(EngineProcess::spawn(EnginePurpose::Mixer, false, &mut command).unwrap());
        assert!(mixer.running(&session).await);

        assert!(mixer.start(&session).await.is_err());
        assert!(!mixer.running(&session).await);
    }

    #[tokio::test]
    async fn test_truncation_keeps_earliest_joiners() {
        let engine = Arc::new(SleepEngine::default());
        let (hub, mixer) = orchestrator(engine.clone());
        let session = SessionId::from("crowded");
        let room = hub.get_or_create(&session).await;

        let names = ["p1", "p2", "p3", "p4", "p5", "p6"];
        for name in names {
            room.add_publisher(PublisherId::from(name)).await;
        }

        mixer.start(&session).await.unwrap();

        let launches = engine.launches.lock().unwrap().clone();
        let args = &launches.first().unwrap().args;
        let inputs = args.iter().filter(|a| *a == "-i").count();
        assert_eq!(inputs, 4, "six publishers, four real slots, no blanks");
        assert!(!args.iter().any(|a| a.starts_with("color=")));

        mixer.stop(&session).await;
    }
}
