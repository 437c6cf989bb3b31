//! Registry of live client connections, the supervisor's window onto the
//! server.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use metrics::gauge;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use vigil_core::peer::{ConnectionSet, ProbeTarget};

use crate::connection::WsConnection;
use crate::metrics::WS_CONNECTIONS_ACTIVE;

/// All currently connected clients, keyed by connection id.
///
/// Membership is mutated only by the socket handlers; the supervisor just
/// snapshots it through [`ConnectionSet`].
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<String, Arc<WsConnection>>>,
    accepting: AtomicBool,
    shutdown: CancellationToken,
}

impl ConnectionRegistry {
    /// Create an empty registry tied to the server's shutdown token.
    ///
    /// The registry reports not-accepting until [`set_accepting`] flips it
    /// after the listener binds.
    ///
    /// [`set_accepting`]: ConnectionRegistry::set_accepting
    #[must_use]
    pub fn new(shutdown: CancellationToken) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            accepting: AtomicBool::new(false),
            shutdown,
        }
    }

    /// Flip the accepting flag; the server calls this once bound.
    pub fn set_accepting(&self, accepting: bool) {
        self.accepting.store(accepting, Ordering::Release);
    }

    /// Register a connection.
    pub fn add(&self, conn: Arc<WsConnection>) {
        let mut connections = self.connections.write();
        if let Some(prev) = connections.insert(conn.id().to_string(), conn) {
            warn!(conn_id = prev.id(), "replaced connection with duplicate id");
        } else {
            gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
        }
    }

    /// Remove and return a connection.
    pub fn remove(&self, id: &str) -> Option<Arc<WsConnection>> {
        let removed = self.connections.write().remove(id);
        if removed.is_some() {
            gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
        }
        removed
    }

    /// Look up a connection by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<WsConnection>> {
        self.connections.read().get(id).cloned()
    }

    /// Number of registered connections.
    #[must_use]
    pub fn count(&self) -> usize {
        self.connections.read().len()
    }

    /// Fire every connection's kill token. Used at shutdown so socket
    /// tasks exit instead of waiting out their clients.
    pub fn close_all(&self) {
        for conn in self.connections.read().values() {
            conn.force_close();
        }
    }
}

impl ConnectionSet for ConnectionRegistry {
    fn connections(&self) -> Vec<Arc<dyn ProbeTarget>> {
        self.connections
            .read()
            .values()
            .map(|c| Arc::clone(c) as Arc<dyn ProbeTarget>)
            .collect()
    }

    fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire) && !self.shutdown.is_cancelled()
    }

    fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;

    fn make_registry() -> ConnectionRegistry {
        ConnectionRegistry::new(CancellationToken::new())
    }

    fn make_conn(id: &str) -> Arc<WsConnection> {
        let (tx, _rx) = mpsc::channel(4);
        Arc::new(WsConnection::new(id.to_string(), tx))
    }

    #[tokio::test]
    async fn add_and_remove() {
        let registry = make_registry();
        assert_eq!(registry.count(), 0);

        registry.add(make_conn("a"));
        registry.add(make_conn("b"));
        assert_eq!(registry.count(), 2);
        assert!(registry.get("a").is_some());

        let removed = registry.remove("a");
        assert!(removed.is_some());
        assert_eq!(registry.count(), 1);
        assert!(registry.get("a").is_none());
    }

    #[tokio::test]
    async fn remove_unknown_returns_none() {
        let registry = make_registry();
        assert!(registry.remove("ghost").is_none());
    }

    #[tokio::test]
    async fn snapshot_contains_all_connections() {
        let registry = make_registry();
        registry.add(make_conn("a"));
        registry.add(make_conn("b"));

        let snapshot = registry.connections();
        assert_eq!(snapshot.len(), 2);
        let mut ids: Vec<&str> = snapshot.iter().map(|c| c.id()).collect();
        ids.sort_unstable();
        assert_eq!(ids, ["a", "b"]);
    }

    #[tokio::test]
    async fn accepting_follows_flag_and_token() {
        let token = CancellationToken::new();
        let registry = ConnectionRegistry::new(token.clone());
        assert!(!registry.is_accepting(), "not accepting before bind");

        registry.set_accepting(true);
        assert!(registry.is_accepting());

        token.cancel();
        assert!(!registry.is_accepting(), "shutdown ends accepting");
    }

    #[tokio::test]
    async fn close_all_fires_kill_tokens() {
        let registry = make_registry();
        let a = make_conn("a");
        let b = make_conn("b");
        registry.add(Arc::clone(&a));
        registry.add(Arc::clone(&b));

        registry.close_all();
        assert!(a.kill_signal().is_cancelled());
        assert!(b.kill_signal().is_cancelled());
    }

    #[tokio::test]
    async fn duplicate_id_replaces() {
        let registry = make_registry();
        registry.add(make_conn("a"));
        registry.add(make_conn("a"));
        assert_eq!(registry.count(), 1);
    }
}
