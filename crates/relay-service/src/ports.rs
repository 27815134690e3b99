//! Deterministic rendezvous ports.
//!
//! Independent engine processes find each other without a negotiation
//! protocol: the ingest engine for `(session, publisher)` writes to a port
//! derived from that pair, and the mixer later reads from the same derived
//! port. Nothing is stored; every port is recomputed from its key.
//!
//! ```text
//! port = base + fnv1a32(key) % window
//!
//! ingest key: "<session>|<publisher>"   window: TS_BASE_PORT  .. +TS_PORT_WINDOW
//! mix key:    "mix|<session>"           window: MIX_BASE_PORT .. +MIX_PORT_WINDOW
//! ```
//!
//! The two windows are validated as disjoint at startup, so an ingest key
//! that happens to spell a mix key can never land on a mix port. Two keys of
//! the same purpose may still hash to the same port; that collision is not
//! detected.

use crate::config::Config;
use common::types::{PublisherId, SessionId};
use std::fmt;
use std::str::FromStr;

/// Loopback target used in unicast mode.
pub const LOOPBACK_HOST: &str = "127.0.0.1";

/// MPEG-TS payload size per UDP datagram (7 x 188).
pub const TS_PACKET_SIZE: u32 = 1316;

/// UDP receive FIFO size for mixer inputs, in bytes.
pub const INPUT_FIFO_SIZE: u32 = 50_000_000;

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// 32-bit FNV-1a. Stable across processes and platforms.
fn fnv1a_32(bytes: &[u8]) -> u32 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u32::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

/// Map `key` to a port in `[base, base + window)`.
///
/// Pure and deterministic. A zero window is treated as a window of one.
#[must_use]
pub fn allocate(base: u16, window: u16, key: &str) -> u16 {
    let offset = fnv1a_32(key.as_bytes()) % u32::from(window.max(1));
    base.saturating_add(u16::try_from(offset).unwrap_or(0))
}

/// What a port is allocated for. Each purpose has its own key derivation.
#[derive(Debug, Clone, Copy)]
pub enum AllocationKey<'a> {
    /// One publisher's transcoded stream.
    Ingest {
        session: &'a SessionId,
        publisher: &'a PublisherId,
    },
    /// One room's mixed stream.
    Mix { session: &'a SessionId },
}

impl AllocationKey<'_> {
    /// The hashed string for this key.
    #[must_use]
    pub fn derive(&self) -> String {
        match self {
            AllocationKey::Ingest { session, publisher } => format!("{session}|{publisher}"),
            AllocationKey::Mix { session } => format!("mix|{session}"),
        }
    }
}

/// A contiguous port range reserved for one allocation purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortWindow {
    base: u16,
    size: u16,
}

impl PortWindow {
    /// Returns `None` for an empty window or one that runs past port 65535.
    #[must_use]
    pub fn new(base: u16, size: u16) -> Option<Self> {
        if size == 0 || u32::from(base) + u32::from(size) > u32::from(u16::MAX) + 1 {
            return None;
        }
        Some(Self { base, size })
    }

    #[must_use]
    pub fn base(&self) -> u16 {
        self.base
    }

    #[must_use]
    pub fn size(&self) -> u16 {
        self.size
    }

    /// Highest port in the window (inclusive).
    #[must_use]
    pub fn last(&self) -> u16 {
        self.base.saturating_add(self.size - 1)
    }

    #[must_use]
    pub fn contains(&self, port: u16) -> bool {
        port >= self.base && port <= self.last()
    }

    #[must_use]
    pub fn overlaps(&self, other: &PortWindow) -> bool {
        self.base <= other.last() && other.base <= self.last()
    }

    /// Allocate the port for `key` inside this window.
    #[must_use]
    pub fn allocate(&self, key: &AllocationKey<'_>) -> u16 {
        allocate(self.base, self.size, &key.derive())
    }
}

impl fmt::Display for PortWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.base, self.last())
    }
}

/// Transport-stream delivery mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SinkMode {
    /// Send to the loopback interface.
    #[default]
    Unicast,
    /// Send to a configured multicast group.
    Multicast,
}

impl FromStr for SinkMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unicast" => Ok(SinkMode::Unicast),
            "multicast" => Ok(SinkMode::Multicast),
            other => Err(format!("expected 'unicast' or 'multicast', got '{other}'")),
        }
    }
}

/// A network address an engine writes a transport stream to (and the mixer
/// or packager reads it from).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkAddress {
    mode: SinkMode,
    host: String,
    port: u16,
}

impl SinkAddress {
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// URL an engine writes to.
    #[must_use]
    pub fn output_url(&self) -> String {
        match self.mode {
            SinkMode::Unicast => format!(
                "udp://{}:{}?pkt_size={TS_PACKET_SIZE}",
                self.host, self.port
            ),
            SinkMode::Multicast => format!(
                "udp://{}:{}?ttl=1&pkt_size={TS_PACKET_SIZE}",
                self.host, self.port
            ),
        }
    }

    /// URL an engine reads the same stream from.
    ///
    /// Multicast readers bind with `@` so they join the group instead of
    /// connecting to it.
    #[must_use]
    pub fn input_url(&self) -> String {
        let options = format!("overrun_nonfatal=1&fifo_size={INPUT_FIFO_SIZE}");
        match self.mode {
            SinkMode::Unicast => format!("udp://{}:{}?{options}", self.host, self.port),
            SinkMode::Multicast => format!("udp://@{}:{}?{options}", self.host, self.port),
        }
    }
}

impl fmt::Display for SinkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.output_url())
    }
}

/// Port windows plus delivery mode: everything needed to turn a key into a
/// sink address.
#[derive(Debug, Clone)]
pub struct Addressing {
    ingest: PortWindow,
    mix: PortWindow,
    mode: SinkMode,
    multicast_group: String,
}

impl Addressing {
    #[must_use]
    pub fn new(
        ingest: PortWindow,
        mix: PortWindow,
        mode: SinkMode,
        multicast_group: impl Into<String>,
    ) -> Self {
        Self {
            ingest,
            mix,
            mode,
            multicast_group: multicast_group.into(),
        }
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.ingest_ports,
            config.mix_ports,
            config.sink_mode,
            config.multicast_group.clone(),
        )
    }

    /// Port carrying one publisher's transcoded stream.
    #[must_use]
    pub fn publisher_port(&self, session: &SessionId, publisher: &PublisherId) -> u16 {
        self.ingest
            .allocate(&AllocationKey::Ingest { session, publisher })
    }

    /// Port carrying one room's mixed stream.
    #[must_use]
    pub fn mix_port(&self, session: &SessionId) -> u16 {
        self.mix.allocate(&AllocationKey::Mix { session })
    }

    #[must_use]
    pub fn publisher_sink(&self, session: &SessionId, publisher: &PublisherId) -> SinkAddress {
        self.sink(self.publisher_port(session, publisher))
    }

    #[must_use]
    pub fn mix_sink(&self, session: &SessionId) -> SinkAddress {
        self.sink(self.mix_port(session))
    }

    fn sink(&self, port: u16) -> SinkAddress {
        let host = match self.mode {
            SinkMode::Unicast => LOOPBACK_HOST.to_string(),
            SinkMode::Multicast => self.multicast_group.clone(),
        };
        SinkAddress {
            mode: self.mode,
            host,
            port,
        }
    }
}
