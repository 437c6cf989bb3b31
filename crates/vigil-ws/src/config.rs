//! Server configuration with environment overrides.
//!
//! Precedence is defaults, then `VIGIL_*` environment variables, then
//! whatever the caller (CLI) sets explicitly. Invalid environment values
//! are logged and ignored rather than failing startup.

use serde::{Deserialize, Serialize};
use tracing::warn;
use vigil_core::SupervisorConfig;

/// Default bind host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default bind port; 0 asks the OS for an ephemeral port.
pub const DEFAULT_PORT: u16 = 0;

/// Default cap on concurrent client connections.
pub const DEFAULT_MAX_CONNECTIONS: usize = 1_024;

/// Default per-connection outbound channel capacity.
pub const DEFAULT_OUTBOUND_BUFFER: usize = 64;

/// Configuration for a [`WsServer`](crate::server::WsServer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,

    /// Port to bind (0 = auto-assign).
    pub port: u16,

    /// Maximum concurrent client connections; further upgrades get 503.
    pub max_connections: usize,

    /// Capacity of each connection's outbound message channel.
    pub outbound_buffer: usize,

    /// Heartbeat supervision timing.
    pub heartbeat: SupervisorConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
            heartbeat: SupervisorConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Apply `VIGIL_*` environment overrides on top of `self`.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(v) = read_env_u64_range("VIGIL_PROBE_INTERVAL_MS", 1, 3_600_000) {
            self.heartbeat.probe_interval_ms = v;
        }
        if let Some(v) = read_env_u64_range("VIGIL_RESPONSE_TIMEOUT_MS", 1, 86_400_000) {
            self.heartbeat.response_timeout_ms = v;
        }
        if let Some(v) = read_env_usize_range("VIGIL_MAX_CONNECTIONS", 1, 1_000_000) {
            self.max_connections = v;
        }
        if let Some(v) = read_env_usize_range("VIGIL_OUTBOUND_BUFFER", 1, 65_536) {
            self.outbound_buffer = v;
        }
        self
    }
}

fn parse_u64_range(raw: &str, min: u64, max: u64) -> Option<u64> {
    raw.trim()
        .parse::<u64>()
        .ok()
        .filter(|v| (min..=max).contains(v))
}

fn parse_usize_range(raw: &str, min: usize, max: usize) -> Option<usize> {
    raw.trim()
        .parse::<usize>()
        .ok()
        .filter(|v| (min..=max).contains(v))
}

fn read_env_u64_range(key: &str, min: u64, max: u64) -> Option<u64> {
    let raw = std::env::var(key).ok()?;
    let parsed = parse_u64_range(&raw, min, max);
    if parsed.is_none() {
        warn!(key, raw, "ignoring invalid environment override");
    }
    parsed
}

fn read_env_usize_range(key: &str, min: usize, max: usize) -> Option<usize> {
    let raw = std::env::var(key).ok()?;
    let parsed = parse_usize_range(&raw, min, max);
    if parsed.is_none() {
        warn!(key, raw, "ignoring invalid environment override");
    }
    parsed
}
