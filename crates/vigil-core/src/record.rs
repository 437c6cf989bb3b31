//! Per-connection liveness bookkeeping.
//!
//! The supervisor keeps one [`LivenessRecord`] per observed connection in a
//! [`LivenessTable`] keyed by connection id. Presence in the table is the
//! "response listener installed" guard, so the checker never installs a
//! second listener on the same connection.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::peer::ListenerId;

/// Last-observed probe response for one connection.
///
/// Written by the response listener, read by the checker. Uses the tokio
/// clock so checks stay consistent with the timers driving them.
#[derive(Debug, Default)]
pub struct ResponseCell {
    last: Mutex<Option<Instant>>,
}

impl ResponseCell {
    /// Record that a response arrived now.
    pub fn record_now(&self) {
        *self.last.lock() = Some(Instant::now());
    }

    /// When the most recent response arrived, if any ever did.
    #[must_use]
    pub fn last_response(&self) -> Option<Instant> {
        *self.last.lock()
    }

    /// True if no response arrived within `window`, or none ever arrived.
    #[must_use]
    pub fn silent_for(&self, window: Duration) -> bool {
        match *self.last.lock() {
            Some(at) => at.elapsed() > window,
            None => true,
        }
    }
}

/// Supervisor-owned metadata for one supervised connection.
#[derive(Debug)]
pub struct LivenessRecord {
    /// Shared with the response listener installed on the connection.
    pub cell: std::sync::Arc<ResponseCell>,
    /// Handle for removing that listener on teardown.
    pub listener: ListenerId,
}

/// Side table mapping connection ids to their liveness records.
///
/// The single lock also serializes a check tick against a concurrent
/// `stop` sweep; see [`Supervisor`](crate::supervisor::Supervisor).
#[derive(Debug, Default)]
pub struct LivenessTable {
    records: Mutex<HashMap<String, LivenessRecord>>,
}

impl LivenessTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// True when nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Whether a record exists for `id`.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.records.lock().contains_key(id)
    }

    /// Run `f` with exclusive access to the record map.
    pub(crate) fn with<R>(&self, f: impl FnOnce(&mut HashMap<String, LivenessRecord>) -> R) -> R {
        f(&mut self.records.lock())
    }
}
