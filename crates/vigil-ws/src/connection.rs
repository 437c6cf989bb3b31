//! One WebSocket client connection and its supervisor-facing adapter.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use axum::extract::ws::Message;
use metrics::counter;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::trace;
use vigil_core::peer::{ListenerId, ProbeTarget, ResponseListener};

use crate::metrics::{
    HEARTBEAT_PROBES_TOTAL, HEARTBEAT_RESPONSES_TOTAL, HEARTBEAT_TERMINATIONS_TOTAL,
    WS_OUTBOUND_DROPS_TOTAL,
};

/// Server-side state for one connected client.
///
/// Outbound traffic goes through a bounded channel drained by the socket
/// writer task; `try_send` keeps every producer non-blocking. The kill
/// token tears the socket tasks down when the supervisor terminates the
/// connection.
pub struct WsConnection {
    id: String,
    outbound: mpsc::Sender<Message>,
    open: AtomicBool,
    kill: CancellationToken,
    listeners: Mutex<Vec<(ListenerId, ResponseListener)>>,
    next_listener: AtomicU64,
    dropped: AtomicU64,
}

impl WsConnection {
    /// Create a connection wrapping the outbound channel `tx`.
    #[must_use]
    pub fn new(id: String, outbound: mpsc::Sender<Message>) -> Self {
        Self {
            id,
            outbound,
            open: AtomicBool::new(true),
            kill: CancellationToken::new(),
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(1),
            dropped: AtomicU64::new(0),
        }
    }

    /// The connection id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Enqueue a text frame. Returns false if the channel is full or the
    /// writer is gone; the message is dropped and counted.
    pub fn send_text(&self, text: String) -> bool {
        self.send(Message::Text(text.into()))
    }

    fn send(&self, message: Message) -> bool {
        match self.outbound.try_send(message) {
            Ok(()) => true,
            Err(_) => {
                let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
                counter!(WS_OUTBOUND_DROPS_TOTAL).increment(1);
                false
            }
        }
    }

    /// Run every response listener. Called by the socket reader on Pong.
    pub fn notify_response(&self) {
        counter!(HEARTBEAT_RESPONSES_TOTAL).increment(1);
        let listeners: Vec<ResponseListener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener();
        }
    }

    /// Mark the transport closed. Called when a socket task exits.
    pub fn mark_closed(&self) {
        self.open.store(false, Ordering::Release);
    }

    /// Cancelled when the connection must be torn down.
    #[must_use]
    pub fn kill_signal(&self) -> CancellationToken {
        self.kill.clone()
    }

    /// Messages dropped on a full or closed outbound channel.
    #[must_use]
    pub fn dropped_messages(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Number of installed response listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }
}

impl ProbeTarget for WsConnection {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn send_probe(&self) {
        if self.send(Message::Ping(Vec::new().into())) {
            counter!(HEARTBEAT_PROBES_TOTAL).increment(1);
            trace!(conn_id = %self.id, "probe enqueued");
        }
    }

    fn force_close(&self) {
        counter!(HEARTBEAT_TERMINATIONS_TOTAL).increment(1);
        self.open.store(false, Ordering::Release);
        self.kill.cancel();
    }

    fn add_response_listener(&self, listener: ResponseListener) -> ListenerId {
        let id = ListenerId::new(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, listener));
        id
    }

    fn remove_response_listener(&self, id: ListenerId) {
        self.listeners.lock().retain(|(lid, _)| *lid != id);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn make_conn(capacity: usize) -> (Arc<WsConnection>, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Arc::new(WsConnection::new("c1".to_string(), tx)), rx)
    }

    #[tokio::test]
    async fn new_connection_is_open() {
        let (conn, _rx) = make_conn(4);
        assert!(conn.is_open());
        assert_eq!(ProbeTarget::id(conn.as_ref()), "c1");
        assert_eq!(conn.dropped_messages(), 0);
    }

    #[tokio::test]
    async fn send_text_reaches_channel() {
        let (conn, mut rx) = make_conn(4);
        assert!(conn.send_text("hello".to_string()));
        match rx.recv().await {
            Some(Message::Text(text)) => assert_eq!(text.as_str(), "hello"),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn probe_enqueues_ping_frame() {
        let (conn, mut rx) = make_conn(4);
        conn.send_probe();
        assert!(matches!(rx.recv().await, Some(Message::Ping(_))));
    }

    #[tokio::test]
    async fn full_channel_drops_and_counts() {
        let (conn, _rx) = make_conn(1);
        assert!(conn.send_text("first".to_string()));
        assert!(!conn.send_text("second".to_string()));
        conn.send_probe();
        assert_eq!(conn.dropped_messages(), 2);
    }

    #[tokio::test]
    async fn force_close_flips_open_and_fires_kill() {
        let (conn, _rx) = make_conn(4);
        let kill = conn.kill_signal();
        assert!(!kill.is_cancelled());

        conn.force_close();
        assert!(!conn.is_open());
        assert!(kill.is_cancelled());
    }

    #[tokio::test]
    async fn mark_closed_does_not_fire_kill() {
        let (conn, _rx) = make_conn(4);
        conn.mark_closed();
        assert!(!conn.is_open());
        assert!(!conn.kill_signal().is_cancelled());
    }

    #[tokio::test]
    async fn listeners_fire_on_response() {
        let (conn, _rx) = make_conn(4);
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_in = Arc::clone(&hits);
        let _id = conn.add_response_listener(Arc::new(move || {
            let _ = hits_in.fetch_add(1, Ordering::SeqCst);
        }));

        conn.notify_response();
        conn.notify_response();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn removed_listener_stops_firing() {
        let (conn, _rx) = make_conn(4);
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_in = Arc::clone(&hits);
        let id = conn.add_response_listener(Arc::new(move || {
            let _ = hits_in.fetch_add(1, Ordering::SeqCst);
        }));

        conn.notify_response();
        conn.remove_response_listener(id);
        conn.notify_response();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(conn.listener_count(), 0);
    }

    #[tokio::test]
    async fn remove_unknown_listener_is_ignored() {
        let (conn, _rx) = make_conn(4);
        conn.remove_response_listener(ListenerId::new(99));
        assert_eq!(conn.listener_count(), 0);
    }

    #[tokio::test]
    async fn listener_ids_are_unique() {
        let (conn, _rx) = make_conn(4);
        let a = conn.add_response_listener(Arc::new(|| {}));
        let b = conn.add_response_listener(Arc::new(|| {}));
        assert_ne!(a, b);
        assert_eq!(conn.listener_count(), 2);
    }

    #[tokio::test]
    async fn response_with_no_listeners_is_fine() {
        let (conn, _rx) = make_conn(4);
        conn.notify_response();
    }
}
