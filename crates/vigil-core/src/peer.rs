//! Interfaces between the supervisor and the server it watches.
//!
//! The supervisor never owns connections. It observes a [`ConnectionSet`]
//! provided by the server and talks to individual connections through
//! [`ProbeTarget`]. Both traits are object-safe; the server hands the
//! supervisor `Arc<dyn …>` handles.

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// Identifies one installed response listener on a connection.
///
/// Minted by the connection when a listener is installed; the supervisor
/// keeps it to remove exactly that listener later.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Wrap a raw listener slot number.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw slot number.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Callback invoked on every probe response from a connection.
pub type ResponseListener = Arc<dyn Fn() + Send + Sync>;

/// One supervised connection.
///
/// All methods are called from timer ticks and must not block:
/// `send_probe` and `force_close` are fire-and-forget.
pub trait ProbeTarget: Send + Sync {
    /// Stable identity of this connection within its set.
    fn id(&self) -> &str;

    /// Whether the transport is currently open.
    fn is_open(&self) -> bool;

    /// Enqueue a liveness probe. Failures are the transport's problem; a
    /// peer that never sees probes falls silent and is terminated by the
    /// checker.
    fn send_probe(&self);

    /// Forcibly terminate the underlying transport.
    fn force_close(&self);

    /// Install `listener` to run on every probe response.
    fn add_response_listener(&self, listener: ResponseListener) -> ListenerId;

    /// Remove a previously installed listener. Unknown ids are ignored.
    fn remove_response_listener(&self, id: ListenerId);
}

/// The server-side view a [`Supervisor`](crate::supervisor::Supervisor)
/// observes.
pub trait ConnectionSet: Send + Sync {
    /// Snapshot of the currently registered connections.
    ///
    /// Called on every tick; membership changes between ticks are expected.
    fn connections(&self) -> Vec<Arc<dyn ProbeTarget>>;

    /// Whether the server is still accepting new connections.
    fn is_accepting(&self) -> bool;

    /// Token cancelled when the server shuts down.
    fn shutdown_token(&self) -> CancellationToken;
}
