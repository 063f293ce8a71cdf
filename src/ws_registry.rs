//! WebSocket connection registry: maps connection id to its outbound channel, fans out dispatches,
//! and tracks ping times for the stale-connection timeout.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;

use crate::coordinator::{Audience, Dispatch};
use crate::metrics::Metrics;
use crate::presence::ConnectionId;

/// Per-connection state: sender to push messages to the socket task, last ping time for timeout.
#[derive(Debug)]
pub struct ConnectionEntry {
    pub conn_id: ConnectionId,
    pub tx: mpsc::Sender<String>,
    /// Unix timestamp (seconds) when we last received a ping from the client.
    pub last_ping_at: AtomicU64,
}

impl ConnectionEntry {
    pub fn touch(&self) {
        self.last_ping_at.store(now_secs(), Ordering::Relaxed);
    }

    pub fn is_stale(&self, now: u64, max_age_secs: u64) -> bool {
        now.saturating_sub(self.last_ping_at.load(Ordering::Relaxed)) > max_age_secs
    }
}

pub(crate) fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Registry of live WebSocket connections. Thread-safe; shared via Arc.
pub struct ConnectionRegistry {
    inner: dashmap::DashMap<ConnectionId, Arc<ConnectionEntry>>,
    next_id: AtomicU64,
    buffer: usize,
    metrics: Metrics,
}

impl ConnectionRegistry {
    pub fn new(buffer: usize, metrics: Metrics) -> Self {
        Self {
            inner: dashmap::DashMap::new(),
            next_id: AtomicU64::new(1),
            buffer: buffer.max(1),
            metrics,
        }
    }

    /// Register a new connection under a fresh id. Returns the entry (to update last_ping_at)
    /// and the receiver for the send task. Caller must call `remove_connection` when the socket closes.
    pub fn register(&self) -> (Arc<ConnectionEntry>, mpsc::Receiver<String>) {
        let conn_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.buffer);
        let entry = Arc::new(ConnectionEntry {
            conn_id,
            tx,
            last_ping_at: AtomicU64::new(now_secs()),
        });
        self.inner.insert(conn_id, entry.clone());
        self.metrics.connections_active.inc();
        (entry, rx)
    }

    /// Remove a single connection. Returns false if it was already gone.
    pub fn remove_connection(&self, conn_id: ConnectionId) -> bool {
        let removed = self.inner.remove(&conn_id).is_some();
        if removed {
            self.metrics.connections_active.dec();
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Serialize once and push to every live connection in the audience. Returns how many
    /// connections accepted the frame. A full or closed buffer skips that connection only.
    pub fn deliver(&self, dispatch: &Dispatch) -> usize {
        let text = match dispatch.event.to_json() {
            Ok(text) => text,
            Err(e) => {
                tracing::error!("serialize outbound event: {:?}", e);
                return 0;
            }
        };
        if let Audience::Only(conn_id) = dispatch.audience {
            return match self.inner.get(&conn_id) {
                Some(entry) => usize::from(self.push(entry.value(), &text)),
                None => 0,
            };
        }
        let mut delivered = 0;
        for entry in self.inner.iter() {
            if dispatch.audience.includes(*entry.key()) && self.push(entry.value(), &text) {
                delivered += 1;
            }
        }
        delivered
    }

    fn push(&self, entry: &ConnectionEntry, text: &str) -> bool {
        if entry.tx.try_send(text.to_string()).is_err() {
            tracing::debug!(conn_id = entry.conn_id, "ws broadcast try_send failed");
            self.metrics.deliveries_dropped_total.inc();
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::OutboundEvent;

    fn registry(buffer: usize) -> ConnectionRegistry {
        ConnectionRegistry::new(buffer, Metrics::new().unwrap())
    }

    fn leave(audience: Audience) -> Dispatch {
        Dispatch {
            audience,
            event: OutboundEvent::Leave {
                username: "bob".into(),
            },
        }
    }

    #[tokio::test]
    async fn delivers_by_audience() {
        let reg = registry(8);
        let (a, mut rx_a) = reg.register();
        let (b, mut rx_b) = reg.register();

        assert_eq!(reg.deliver(&leave(Audience::All)), 2);
        assert!(rx_a.recv().await.is_some());
        assert!(rx_b.recv().await.is_some());

        assert_eq!(reg.deliver(&leave(Audience::AllExcept(a.conn_id))), 1);
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.recv().await.is_some());

        assert_eq!(reg.deliver(&leave(Audience::Only(b.conn_id))), 1);
        assert!(rx_a.try_recv().is_err());
        assert_eq!(
            rx_b.recv().await.unwrap(),
            r#"{"type":"leave","payload":{"username":"bob"}}"#
        );
    }

    #[tokio::test]
    async fn full_buffer_does_not_block_others() {
        let reg = registry(1);
        let (_slow, _rx_slow) = reg.register();
        let (_fast, mut rx_fast) = reg.register();

        assert_eq!(reg.deliver(&leave(Audience::All)), 2);
        rx_fast.recv().await.unwrap();
        // slow never drains; its second frame is dropped
        assert_eq!(reg.deliver(&leave(Audience::All)), 1);
        assert!(rx_fast.recv().await.is_some());
        assert_eq!(reg.metrics.deliveries_dropped_total.get(), 1);
    }

    #[test]
    fn ids_are_unique_and_removal_is_idempotent() {
        let reg = registry(4);
        let (a, _ra) = reg.register();
        let (b, _rb) = reg.register();
        assert_ne!(a.conn_id, b.conn_id);
        assert_eq!(reg.len(), 2);
        assert!(reg.remove_connection(a.conn_id));
        assert!(!reg.remove_connection(a.conn_id));
        assert_eq!(reg.metrics.connections_active.get(), 1);
        assert_eq!(reg.deliver(&leave(Audience::Only(a.conn_id))), 0);
    }

    #[test]
    fn stale_after_max_age() {
        let reg = registry(4);
        let (entry, _rx) = reg.register();
        let now = now_secs();
        assert!(!entry.is_stale(now, 300));
        assert!(entry.is_stale(now + 301, 300));
        entry.touch();
        assert!(!entry.is_stale(now_secs(), 0));
    }
}
