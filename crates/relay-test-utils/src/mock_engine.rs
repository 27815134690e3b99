//! Mock media engine.
//!
//! Records every `EngineCommand` and, instead of ffmpeg, runs a small shell
//! process with the same stdin/stdout/stderr wiring:
//!
//! - ingest: `cat`, discarding or capturing whatever is written to stdin, or
//!   a shell that exits immediately
//! - mixer: `sleep`, staying alive until killed

use relay_service::engine::{EngineCommand, EngineProcess, EnginePurpose, MediaEngine};
use relay_service::errors::RelayError;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::process::Command;

#[derive(Debug, Clone)]
enum Behavior {
    /// Every launch succeeds.
    Accepting,
    /// Every launch fails with `SpawnFailure`.
    Failing,
    /// Ingest launches append stdin to a file; mixer launches succeed.
    CapturingIngest(PathBuf),
    /// Ingest launches succeed; mixer launches fail.
    FailingMixer,
    /// Ingest processes exit as soon as they start.
    CrashingIngest,
}

/// Mock engine for relay tests.
pub struct MockMediaEngine {
    behavior: Behavior,
    launches: Mutex<Vec<EngineCommand>>,
    call_count: AtomicUsize,
}

impl MockMediaEngine {
    fn with_behavior(behavior: Behavior) -> Self {
        Self {
            behavior,
            launches: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
        }
    }

    /// Create a mock where every launch succeeds.
    pub fn accepting() -> Self {
        Self::with_behavior(Behavior::Accepting)
    }

    /// Create a mock where every launch fails.
    pub fn failing() -> Self {
        Self::with_behavior(Behavior::Failing)
    }

    /// Create a mock whose ingest processes append their stdin to `path`.
    pub fn capturing_ingest(path: impl AsRef<Path>) -> Self {
        Self::with_behavior(Behavior::CapturingIngest(path.as_ref().to_path_buf()))
    }

    /// Create a mock where ingest works but the mixer cannot be started.
    pub fn failing_mixer() -> Self {
        Self::with_behavior(Behavior::FailingMixer)
    }

    /// Create a mock whose ingest processes start and then exit at once,
    /// closing their stdin.
    pub fn crashing_ingest() -> Self {
        Self::with_behavior(Behavior::CrashingIngest)
    }

    /// Number of launch attempts, including failed ones.
    pub fn launch_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Every command passed to `launch`, in order.
    pub fn launches(&self) -> Vec<EngineCommand> {
        self.launches
            .lock()
            .map(|launches| launches.clone())
            .unwrap_or_default()
    }

    /// Commands launched for one purpose.
    pub fn launches_for(&self, purpose: EnginePurpose) -> Vec<EngineCommand> {
        self.launches()
            .into_iter()
            .filter(|command| command.purpose == purpose)
            .collect()
    }

    /// The most recent mixer command.
    pub fn last_mixer_command(&self) -> Option<EngineCommand> {
        self.launches_for(EnginePurpose::Mixer).pop()
    }

    fn refuse(command: &EngineCommand) -> RelayError {
        RelayError::SpawnFailure {
            purpose: command.purpose,
            reason: "mock engine refused to start".to_string(),
        }
    }

    fn stand_in(&self, purpose: EnginePurpose) -> Command {
        let mut process = Command::new("sh");
        match (purpose, &self.behavior) {
            (EnginePurpose::Ingest, Behavior::CapturingIngest(path)) => {
                process.arg("-c").arg("cat >> \"$1\"").arg("sh").arg(path);
            }
            (EnginePurpose::Ingest, Behavior::CrashingIngest) => {
                process.arg("-c").arg("exit 1");
            }
            (EnginePurpose::Ingest, _) => {
                process.arg("-c").arg("cat > /dev/null");
            }
            (EnginePurpose::Mixer, _) => {
                process.arg("-c").arg("exec sleep 3600");
            }
        }
        process
    }
}

impl MediaEngine for MockMediaEngine {
    fn launch(&self, command: &EngineCommand) -> Result<EngineProcess, RelayError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut launches) = self.launches.lock() {
            launches.push(command.clone());
        }

        match (&self.behavior, command.purpose) {
            (Behavior::Failing, _) | (Behavior::FailingMixer, EnginePurpose::Mixer) => {
                Err(Self::refuse(command))
            }
            _ => {
                let mut process = self.stand_in(command.purpose);
                EngineProcess::spawn(command.purpose, command.pipe_stdin, &mut process)
            }
        }
    }
}
