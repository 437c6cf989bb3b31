//! Supervisor timing configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{ConfigError, Result};

/// Default delay between probe ticks: 25 seconds.
pub const DEFAULT_PROBE_INTERVAL_MS: u64 = 25_000;

/// Default silence window before a peer is declared dead: 60 seconds.
///
/// Larger than the probe interval, so a peer sees at least one full probe
/// cycle before its first check.
pub const DEFAULT_RESPONSE_TIMEOUT_MS: u64 = 60_000;

/// Timing knobs for a [`Supervisor`](crate::supervisor::Supervisor).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SupervisorConfig {
    /// Milliseconds between probe ticks.
    pub probe_interval_ms: u64,

    /// Milliseconds of silence after which a connection is terminated.
    /// Also the period of the check timer.
    pub response_timeout_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            probe_interval_ms: DEFAULT_PROBE_INTERVAL_MS,
            response_timeout_ms: DEFAULT_RESPONSE_TIMEOUT_MS,
        }
    }
}

impl SupervisorConfig {
    /// The probe period as a [`Duration`].
    #[must_use]
    pub const fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    /// The response timeout (and check period) as a [`Duration`].
    #[must_use]
    pub const fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    /// Reject periods a timer cannot be armed with.
    pub fn validate(&self) -> Result<()> {
        if self.probe_interval_ms == 0 {
            return Err(ConfigError::ZeroProbeInterval);
        }
        if self.response_timeout_ms == 0 {
            return Err(ConfigError::ZeroResponseTimeout);
        }
        Ok(())
    }
}
