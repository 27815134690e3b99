//! Relay service configuration.
//!
//! Configuration is loaded from environment variables. The ingest secret is
//! redacted in Debug output.

use crate::ports::{PortWindow, SinkMode};
use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default HTTP/WebSocket bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default CORS origin (the development frontend).
pub const DEFAULT_ALLOW_ORIGIN: &str = "http://localhost:5173";

/// Default media engine executable.
pub const DEFAULT_ENGINE_PATH: &str = "ffmpeg";

/// Default multicast group used when `TS_MODE=multicast`.
pub const DEFAULT_MULTICAST_GROUP: &str = "239.10.10.1";

/// Default ingest port window: 5000-6999.
pub const DEFAULT_INGEST_BASE_PORT: u16 = 5000;
pub const DEFAULT_INGEST_PORT_WINDOW: u16 = 2000;

/// Default mix port window: 7000-7999.
pub const DEFAULT_MIX_BASE_PORT: u16 = 7000;
pub const DEFAULT_MIX_PORT_WINDOW: u16 = 1000;

/// Default mixer slot count.
pub const DEFAULT_MAX_PARTICIPANTS: usize = 4;

/// Largest slot count with a defined layout.
pub const MAX_LAYOUT_SLOTS: usize = 4;

/// Default per-slot canvas.
pub const DEFAULT_MIX_WIDTH: u32 = 640;
pub const DEFAULT_MIX_HEIGHT: u32 = 360;
pub const DEFAULT_MIX_FRAME_RATE: u32 = 30;

/// Default interval between ingest liveness pings.
pub const DEFAULT_INGEST_PING_INTERVAL_SECONDS: u64 = 15;

/// Default time an ingest engine gets to exit on its own after EOF.
pub const DEFAULT_INGEST_STOP_GRACE_MS: u64 = 2000;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("expected 'text' or 'json', got '{other}'")),
        }
    }
}

/// Relay service configuration.
///
/// Loaded from environment variables with sensible defaults.
#[derive(Clone)]
pub struct Config {
    /// HTTP/WebSocket bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Shared secret every ingest connection must present.
    /// Protected by `SecretString` to prevent accidental logging.
    pub ingest_secret: SecretString,

    /// Allowed CORS origin, or `*` for any.
    pub allow_origin: String,

    /// Path to the media engine executable.
    pub engine_path: String,

    /// Unicast (loopback) or multicast transport-stream sinks.
    pub sink_mode: SinkMode,

    /// Multicast group address, used only in multicast mode.
    pub multicast_group: String,

    /// Port window for per-publisher transcoded streams.
    pub ingest_ports: PortWindow,

    /// Port window for per-room mixed streams.
    pub mix_ports: PortWindow,

    /// Fixed number of mixer slots (1..=4).
    pub max_participants: usize,

    /// Width of one mixer slot in pixels.
    pub mix_width: u32,

    /// Height of one mixer slot in pixels.
    pub mix_height: u32,

    /// Frame rate of synthetic blank sources.
    pub mix_frame_rate: u32,

    /// Seconds between liveness pings on an ingest connection.
    pub ingest_ping_interval_seconds: u64,

    /// Milliseconds an ingest engine may take to exit after its input closes.
    pub ingest_stop_grace_ms: u64,

    /// Seconds to wait after a shutdown signal before stopping the listener.
    pub drain_seconds: u64,

    /// Log output format.
    pub log_format: LogFormat,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("ingest_secret", &"[REDACTED]")
            .field("allow_origin", &self.allow_origin)
            .field("engine_path", &self.engine_path)
            .field("sink_mode", &self.sink_mode)
            .field("multicast_group", &self.multicast_group)
            .field("ingest_ports", &self.ingest_ports)
            .field("mix_ports", &self.mix_ports)
            .field("max_participants", &self.max_participants)
            .field("mix_width", &self.mix_width)
            .field("mix_height", &self.mix_height)
            .field("mix_frame_rate", &self.mix_frame_rate)
            .field(
                "ingest_ping_interval_seconds",
                &self.ingest_ping_interval_seconds,
            )
            .field("ingest_stop_grace_ms", &self.ingest_stop_grace_ms)
            .field("drain_seconds", &self.drain_seconds)
            .field("log_format", &self.log_format)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let ingest_secret = vars
            .get("INGEST_SECRET")
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("INGEST_SECRET".to_string()))?;
        let ingest_secret = SecretString::from(ingest_secret.clone());

        let bind_address = string_var(vars, "RELAY_BIND_ADDRESS", DEFAULT_BIND_ADDRESS);
        let allow_origin = string_var(vars, "ALLOW_ORIGIN", DEFAULT_ALLOW_ORIGIN);
        let engine_path = string_var(vars, "FFMPEG_PATH", DEFAULT_ENGINE_PATH);
        let multicast_group = string_var(vars, "TS_ADDR", DEFAULT_MULTICAST_GROUP);

        let sink_mode: SinkMode = parsed_var(vars, "TS_MODE", SinkMode::Unicast)?;

        let ingest_ports = port_window(
            vars,
            "TS_BASE_PORT",
            DEFAULT_INGEST_BASE_PORT,
            "TS_PORT_WINDOW",
            DEFAULT_INGEST_PORT_WINDOW,
        )?;
        let mix_ports = port_window(
            vars,
            "MIX_BASE_PORT",
            DEFAULT_MIX_BASE_PORT,
            "MIX_PORT_WINDOW",
            DEFAULT_MIX_PORT_WINDOW,
        )?;

        // Two engines bound to one port silently misroute packets.
        if ingest_ports.overlaps(&mix_ports) {
            return Err(ConfigError::InvalidValue(format!(
                "ingest ports {ingest_ports} overlap mix ports {mix_ports}"
            )));
        }

        let max_participants: usize =
            parsed_var(vars, "MAX_PARTICIPANTS", DEFAULT_MAX_PARTICIPANTS)?;
        if max_participants == 0 || max_participants > MAX_LAYOUT_SLOTS {
            return Err(ConfigError::InvalidValue(format!(
                "MAX_PARTICIPANTS must be between 1 and {MAX_LAYOUT_SLOTS}, got {max_participants}"
            )));
        }

        let mix_width = positive_var(vars, "MIX_WIDTH", DEFAULT_MIX_WIDTH)?;
        let mix_height = positive_var(vars, "MIX_HEIGHT", DEFAULT_MIX_HEIGHT)?;
        let mix_frame_rate = positive_var(vars, "MIX_FRAME_RATE", DEFAULT_MIX_FRAME_RATE)?;

        let ingest_ping_interval_seconds = positive_var(
            vars,
            "INGEST_PING_INTERVAL_SECONDS",
            DEFAULT_INGEST_PING_INTERVAL_SECONDS,
        )?;
        let ingest_stop_grace_ms =
            parsed_var(vars, "INGEST_STOP_GRACE_MS", DEFAULT_INGEST_STOP_GRACE_MS)?;
        let drain_seconds = parsed_var(vars, "RELAY_DRAIN_SECONDS", 0)?;
        let log_format = parsed_var(vars, "LOG_FORMAT", LogFormat::Text)?;

        Ok(Config {
            bind_address,
            ingest_secret,
            allow_origin,
            engine_path,
            sink_mode,
            multicast_group,
            ingest_ports,
            mix_ports,
            max_participants,
            mix_width,
            mix_height,
            mix_frame_rate,
            ingest_ping_interval_seconds,
            ingest_stop_grace_ms,
            drain_seconds,
            log_format,
        })
    }

    /// Interval between liveness pings on an ingest connection.
    #[must_use]
    pub fn ingest_ping_interval(&self) -> Duration {
        Duration::from_secs(self.ingest_ping_interval_seconds)
    }

    /// Grace period for an ingest engine to exit after its input closes.
    #[must_use]
    pub fn ingest_stop_grace(&self) -> Duration {
        Duration::from_millis(self.ingest_stop_grace_ms)
    }
}

fn string_var(vars: &HashMap<String, String>, name: &str, default: &str) -> String {
    vars.get(name)
        .cloned()
        .unwrap_or_else(|| default.to_string())
}

fn parsed_var<T>(vars: &HashMap<String, String>, name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match vars.get(name) {
        Some(value_str) => value_str.parse().map_err(|e| {
            ConfigError::InvalidValue(format!("{name} could not be parsed from '{value_str}': {e}"))
        }),
        None => Ok(default),
    }
}

fn positive_var<T>(vars: &HashMap<String, String>, name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Default + fmt::Display,
    T::Err: fmt::Display,
{
    let value = parsed_var(vars, name, default)?;
    if value <= T::default() {
        return Err(ConfigError::InvalidValue(format!(
            "{name} must be greater than 0, got {value}"
        )));
    }
    Ok(value)
}

fn port_window(
    vars: &HashMap<String, String>,
    base_name: &str,
    default_base: u16,
    size_name: &str,
    default_size: u16,
) -> Result<PortWindow, ConfigError> {
    let base: u16 = parsed_var(vars, base_name, default_base)?;
    let size: u16 = positive_var(vars, size_name, default_size)?;
    PortWindow::new(base, size).ok_or_else(|| {
        ConfigError::InvalidValue(format!(
            "{base_name}={base} with {size_name}={size} runs past port 65535"
        ))
    })
}
