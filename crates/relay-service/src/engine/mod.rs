//! Media engine process supervision.
//!
//! The relay never touches media itself. Every ingest session and every mixer
//! is an external engine process; this module owns spawning, stderr draining,
//! and termination of those processes.
//!
//! - [`MediaEngine`] is the seam between the relay and the engine binary.
//!   Production uses [`FfmpegEngine`]; tests substitute a mock.
//! - [`EngineProcess`] is the owned process handle. Dropping it kills the
//!   process.

pub mod ffmpeg;
pub mod graph;

pub use ffmpeg::{ingest_command, FfmpegEngine};
pub use graph::{Canvas, MixPlan};

use crate::errors::RelayError;
use crate::observability::metrics;
use std::fmt;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tracing::{debug, info, warn};

/// What an engine process is doing for the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnginePurpose {
    /// One publisher's connection transcoded to its ingest port.
    Ingest,
    /// N ingest streams composed onto the room's mix port.
    Mixer,
}

impl EnginePurpose {
    pub fn as_str(self) -> &'static str {
        match self {
            EnginePurpose::Ingest => "ingest",
            EnginePurpose::Mixer => "mixer",
        }
    }
}

impl fmt::Display for EnginePurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully built engine invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCommand {
    pub purpose: EnginePurpose,
    pub args: Vec<String>,
    /// Attach a pipe to the process's stdin (ingest feeds media bytes there).
    pub pipe_stdin: bool,
}

impl EngineCommand {
    pub fn ingest(args: Vec<String>) -> Self {
        Self {
            purpose: EnginePurpose::Ingest,
            args,
            pipe_stdin: true,
        }
    }

    pub fn mixer(args: Vec<String>) -> Self {
        Self {
            purpose: EnginePurpose::Mixer,
            args,
            pipe_stdin: false,
        }
    }
}

/// Launches engine processes.
///
/// Implementations must return a process that is already running. Launch is
/// synchronous; it must be called from within a tokio runtime because the
/// returned handle spawns a stderr drain task.
pub trait MediaEngine: Send + Sync {
    fn launch(&self, command: &EngineCommand) -> Result<EngineProcess, RelayError>;
}

/// An owned, running engine process.
///
/// Termination is idempotent: terminating an already-exited process only
/// reaps it. If the handle is dropped without termination the process is
/// killed by tokio (`kill_on_drop`).
#[derive(Debug)]
pub struct EngineProcess {
    purpose: EnginePurpose,
    pid: Option<u32>,
    child: Child,
    exited: bool,
}

impl EngineProcess {
    /// Spawn `command` as an engine process.
    ///
    /// Stdout is discarded and stderr is drained into `debug!` events.
    /// Stdin is piped when `pipe_stdin` is set, otherwise closed.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::SpawnFailure` if the OS refuses to start the
    /// process.
    pub fn spawn(
        purpose: EnginePurpose,
        pipe_stdin: bool,
        command: &mut Command,
    ) -> Result<Self, RelayError> {
        let stdin = if pipe_stdin {
            Stdio::piped()
        } else {
            Stdio::null()
        };

        let mut child = command
            .stdin(stdin)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                metrics::record_engine_spawn_failure(purpose.as_str());
                RelayError::SpawnFailure {
                    purpose,
                    reason: e.to_string(),
                }
            })?;

        let pid = child.id();

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(drain_stderr(purpose, pid, stderr));
        }

        info!(target: "relay.engine", purpose = %purpose, pid = ?pid, "Engine process started");

        Ok(Self {
            purpose,
            pid,
            child,
            exited: false,
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Take the process's stdin handle. Returns `None` after the first call
    /// or when stdin was not piped.
    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.child.stdin.take()
    }

    /// Non-blocking check whether the process has exited. Reaps it if so.
    pub fn has_exited(&mut self) -> bool {
        if self.exited {
            return true;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                debug!(target: "relay.engine", purpose = %self.purpose, pid = ?self.pid, status = %status, "Engine process exited");
                self.exited = true;
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!(target: "relay.engine", purpose = %self.purpose, pid = ?self.pid, error = %e, "Failed to poll engine process");
                false
            }
        }
    }

    /// Kill the process and wait for it to exit.
    pub async fn terminate(&mut self) {
        if self.has_exited() {
            return;
        }
        if let Err(e) = self.child.kill().await {
            warn!(target: "relay.engine", purpose = %self.purpose, pid = ?self.pid, error = %e, "Failed to kill engine process");
            return;
        }
        self.exited = true;
        debug!(target: "relay.engine", purpose = %self.purpose, pid = ?self.pid, "Engine process killed");
    }

    /// Wait up to `grace` for the process to exit on its own, then kill it.
    ///
    /// Callers close stdin first so an ingest engine sees end of input and
    /// flushes its output.
    pub async fn shutdown(&mut self, grace: Duration) {
        if self.exited {
            return;
        }
        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                self.exited = true;
                debug!(target: "relay.engine", purpose = %self.purpose, pid = ?self.pid, status = %status, "Engine process exited");
            }
            Ok(Err(e)) => {
                warn!(target: "relay.engine", purpose = %self.purpose, pid = ?self.pid, error = %e, "Failed to wait for engine process");
                self.terminate().await;
            }
            Err(_) => {
                warn!(target: "relay.engine", purpose = %self.purpose, pid = ?self.pid, grace_ms = grace.as_millis(), "Engine process did not exit in time, killing");
                self.terminate().await;
            }
        }
    }
}

async fn drain_stderr<R>(purpose: EnginePurpose, pid: Option<u32>, reader: R)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                debug!(target: "relay.engine", purpose = %purpose, pid = ?pid, "{}", line);
            }
            Ok(None) => break,
            Err(e) => {
                debug!(target: "relay.engine", purpose = %purpose, pid = ?pid, error = %e, "Engine stderr closed");
                break;
            }
        }
    }
}
