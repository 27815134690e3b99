//! ffmpeg as the media engine.

use super::{EngineCommand, EngineProcess, MediaEngine};
use crate::errors::RelayError;
use crate::ports::SinkAddress;
use tokio::process::Command;

/// H.264 / AAC in MPEG-TS, tuned for live latency. Shared by ingest and mixer
/// outputs so downstream packaging sees one stream shape.
pub(crate) const OUTPUT_CODEC_ARGS: &[&str] = &[
    "-c:v",
    "libx264",
    "-preset",
    "veryfast",
    "-tune",
    "zerolatency",
    "-pix_fmt",
    "yuv420p",
    "-c:a",
    "aac",
    "-ar",
    "48000",
    "-ac",
    "2",
    "-f",
    "mpegts",
];

/// Launches the configured ffmpeg executable.
#[derive(Debug, Clone)]
pub struct FfmpegEngine {
    path: String,
}

impl FfmpegEngine {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl MediaEngine for FfmpegEngine {
    fn launch(&self, command: &EngineCommand) -> Result<EngineProcess, RelayError> {
        tracing::debug!(
            target: "relay.engine",
            purpose = %command.purpose,
            path = %self.path,
            args = %command.args.join(" "),
            "Launching ffmpeg"
        );

        let mut process = Command::new(&self.path);
        process.args(&command.args);
        EngineProcess::spawn(command.purpose, command.pipe_stdin, &mut process)
    }
}

/// Arguments for an ingest engine: container bytes on stdin, one transport
/// stream out to `sink`.
pub fn ingest_args(sink: &SinkAddress) -> Vec<String> {
    let mut args: Vec<String> = ["-fflags", "+discardcorrupt", "-i", "pipe:0"]
        .iter()
        .map(ToString::to_string)
        .collect();
    args.extend(OUTPUT_CODEC_ARGS.iter().map(ToString::to_string));
    args.push(sink.output_url());
    args
}

pub fn ingest_command(sink: &SinkAddress) -> EngineCommand {
    EngineCommand::ingest(ingest_args(sink))
}
