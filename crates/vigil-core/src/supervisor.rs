//! The heartbeat supervisor: lifecycle control, probe emitter, liveness
//! checker.
//!
//! [`Supervisor::start`] arms two periodic loops against the server's live
//! connection set. The probe loop fires a probe at every open connection
//! once per probe interval. The check loop runs once per response timeout:
//! on first sight of a connection it installs a response listener and gives
//! the peer a full cycle of grace; on later ticks it terminates connections
//! whose last response is older than the timeout, or that never responded
//! at all. A third task watches the server's shutdown token and stops
//! supervision when the server closes.
//!
//! Liveness state lives exclusively in the supervisor's side table; the
//! check tick and the `stop` sweep both run under the table lock, so a
//! tick in flight when `stop` lands either finishes and is swept, or sees
//! the cancelled token and does nothing.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::SupervisorConfig;
use crate::peer::{ConnectionSet, ProbeTarget};
use crate::record::{LivenessRecord, LivenessTable, ResponseCell};

/// Handles for one armed supervision run.
struct Armed {
    cancel: CancellationToken,
    probe_loop: JoinHandle<()>,
    check_loop: JoinHandle<()>,
    shutdown_watch: JoinHandle<()>,
}

/// Periodic heartbeat supervision over a dynamic connection set.
///
/// One supervisor watches one server. `start` and `stop` are idempotent
/// and may be called repeatedly, in any order, from any task.
pub struct Supervisor {
    config: SupervisorConfig,
    server: Arc<dyn ConnectionSet>,
    table: Arc<LivenessTable>,
    armed: Arc<Mutex<Option<Armed>>>,
}

impl Supervisor {
    /// Create a supervisor for `server`. Nothing runs until [`start`].
    ///
    /// [`start`]: Supervisor::start
    #[must_use]
    pub fn new(config: SupervisorConfig, server: Arc<dyn ConnectionSet>) -> Self {
        Self {
            config,
            server,
            table: Arc::new(LivenessTable::new()),
            armed: Arc::new(Mutex::new(None)),
        }
    }

    /// The timing configuration this supervisor runs with.
    #[must_use]
    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Whether the loops are currently armed.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.armed.lock().is_some()
    }

    /// Number of connections with an installed liveness record.
    #[must_use]
    pub fn tracked_connections(&self) -> usize {
        self.table.len()
    }

    /// Arm supervision. Idempotent: any previous run is torn down first,
    /// so starting twice is the same as starting once.
    ///
    /// No-ops (with a log line) when the server is no longer accepting
    /// connections or the timing configuration cannot drive a timer.
    pub fn start(&self) {
        let mut armed = self.armed.lock();
        let _ = disarm(&mut armed, &self.server, &self.table);

        if let Err(err) = self.config.validate() {
            warn!(%err, "not starting heartbeat supervision");
            return;
        }
        if !self.server.is_accepting() {
            debug!("server is not accepting connections, nothing to supervise");
            return;
        }

        let cancel = CancellationToken::new();
        let probe_loop = tokio::spawn(run_probe_loop(
            Arc::clone(&self.server),
            self.config.probe_interval(),
            cancel.clone(),
        ));
        let check_loop = tokio::spawn(run_check_loop(
            Arc::clone(&self.server),
            Arc::clone(&self.table),
            self.config.response_timeout(),
            cancel.clone(),
        ));
        let shutdown_watch = tokio::spawn(watch_server_shutdown(
            self.server.shutdown_token(),
            Arc::clone(&self.armed),
            Arc::clone(&self.server),
            Arc::clone(&self.table),
            cancel.clone(),
        ));

        *armed = Some(Armed {
            cancel,
            probe_loop,
            check_loop,
            shutdown_watch,
        });
        info!(
            probe_interval_ms = self.config.probe_interval_ms,
            response_timeout_ms = self.config.response_timeout_ms,
            "heartbeat supervision started"
        );
    }

    /// Disarm supervision and sweep all per-connection liveness state.
    ///
    /// Idempotent and safe in any state, including before the first
    /// `start` and from inside the shutdown watch. Connections themselves
    /// are left untouched; only supervisor-owned metadata is removed.
    pub fn stop(&self) {
        let mut armed = self.armed.lock();
        if disarm(&mut armed, &self.server, &self.table) {
            info!("heartbeat supervision stopped");
        }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        // A supervisor dropped while armed must not leave loops or
        // listeners behind.
        let mut armed = self.armed.lock();
        let _ = disarm(&mut armed, &self.server, &self.table);
    }
}

/// Tear down an armed run, if any. Returns whether one was armed.
///
/// The caller holds the arming lock, serializing concurrent `start` and
/// `stop` calls end to end.
fn disarm(
    slot: &mut Option<Armed>,
    server: &Arc<dyn ConnectionSet>,
    table: &LivenessTable,
) -> bool {
    let Some(armed) = slot.take() else {
        return false;
    };
    armed.cancel.cancel();
    armed.probe_loop.abort();
    armed.check_loop.abort();
    armed.shutdown_watch.abort();

    // Sweep under the table lock: a check tick that entered its body
    // before the cancel lands finishes first, and whatever it installed
    // is removed here.
    let connections = server.connections();
    let swept = table.with(|records| {
        let mut unhook = Vec::new();
        for conn in &connections {
            if let Some(record) = records.remove(conn.id()) {
                unhook.push((Arc::clone(conn), record.listener));
            }
        }
        // Records for connections that already left the set; their
        // listeners died with the transport.
        records.clear();
        unhook
    });
    for (conn, listener) in swept {
        conn.remove_response_listener(listener);
    }
    true
}

async fn run_probe_loop(
    server: Arc<dyn ConnectionSet>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    // Skip the immediate first tick; probing starts one period in.
    let _ = ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if cancel.is_cancelled() {
                    break;
                }
                send_probes(server.as_ref());
            }
            () = cancel.cancelled() => break,
        }
    }
}

/// One probe tick: fire a probe at every open connection in the set.
fn send_probes(server: &dyn ConnectionSet) {
    let connections = server.connections();
    let mut sent = 0_usize;
    for conn in &connections {
        if conn.is_open() {
            conn.send_probe();
            sent += 1;
        }
    }
    trace!(sent, total = connections.len(), "probe tick");
}

async fn run_check_loop(
    server: Arc<dyn ConnectionSet>,
    table: Arc<LivenessTable>,
    timeout: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(timeout);
    let _ = ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => check_connections(server.as_ref(), &table, timeout, &cancel),
            () = cancel.cancelled() => break,
        }
    }
}

/// One check tick over the current connection set.
///
/// Runs entirely under the table lock so a concurrent `stop` sweep cannot
/// interleave with it.
fn check_connections(
    server: &dyn ConnectionSet,
    table: &LivenessTable,
    timeout: Duration,
    cancel: &CancellationToken,
) {
    let connections = server.connections();
    table.with(|records| {
        if cancel.is_cancelled() {
            return;
        }

        // Prune records whose connection left the set since the last tick.
        let live: HashSet<&str> = connections.iter().map(|c| c.id()).collect();
        records.retain(|id, _| live.contains(id.as_str()));

        for conn in &connections {
            if let Some(record) = records.get(conn.id()) {
                if record.cell.silent_for(timeout) {
                    warn!(
                        conn_id = conn.id(),
                        ?timeout,
                        "no probe response within timeout, terminating"
                    );
                    conn.force_close();
                }
            } else {
                // First sight of this connection: install the listener and
                // give the peer a full cycle before judging it.
                let cell = Arc::new(ResponseCell::default());
                let listener = conn.add_response_listener({
                    let cell = Arc::clone(&cell);
                    Arc::new(move || cell.record_now())
                });
                debug!(conn_id = conn.id(), "tracking connection");
                let _prev = records.insert(
                    conn.id().to_string(),
                    LivenessRecord { cell, listener },
                );
            }
        }
    });
}

/// Stop supervision when the server announces shutdown.
///
/// Disarms through the shared arming slot, so a `stop` that raced ahead
/// leaves nothing for the watcher to do.
async fn watch_server_shutdown(
    closed: CancellationToken,
    slot: Arc<Mutex<Option<Armed>>>,
    server: Arc<dyn ConnectionSet>,
    table: Arc<LivenessTable>,
    cancel: CancellationToken,
) {
    tokio::select! {
        () = closed.cancelled() => {
            let mut armed = slot.lock();
            if disarm(&mut armed, &server, &table) {
                info!("server shutdown observed, stopping heartbeat supervision");
            }
        }
        () = cancel.cancelled() => {}
    }
}
