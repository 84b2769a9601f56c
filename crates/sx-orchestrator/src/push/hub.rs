//! Registry of push clients

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use sx_core::types::StatusSnapshot;

struct ClientEntry {
    tx: mpsc::Sender<Arc<StatusSnapshot>>,
    cancel: CancellationToken,
}

/// Fans snapshots out to every registered client
pub struct PushHub {
    clients: DashMap<u64, ClientEntry>,
    next_id: AtomicU64,
    latest: watch::Receiver<Arc<StatusSnapshot>>,
    buffer: usize,
}

impl PushHub {
    /// Create a hub that greets new clients with the value of `latest`
    pub fn new(latest: watch::Receiver<Arc<StatusSnapshot>>, buffer: usize) -> Self {
        Self {
            clients: DashMap::new(),
            next_id: AtomicU64::new(1),
            latest,
            buffer: buffer.max(1),
        }
    }

    /// Register a client. The current snapshot is queued before this returns.
    pub fn register(self: &Arc<Self>) -> PushSubscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.buffer);
        let cancel = CancellationToken::new();

        // Queue the greeting before the client becomes visible to broadcast,
        // so nothing older can overtake it.
        let current = Arc::clone(&self.latest.borrow());
        let _ = tx.try_send(current);

        self.clients.insert(
            id,
            ClientEntry {
                tx,
                cancel: cancel.clone(),
            },
        );
        tracing::debug!("Push client {} registered ({} connected)", id, self.clients.len());

        PushSubscription {
            id,
            rx,
            cancel,
            last_sent: 0,
            hub: Arc::clone(self),
        }
    }

    /// Remove a client. Its subscription ends.
    pub fn unregister(&self, id: u64) {
        if let Some((_, entry)) = self.clients.remove(&id) {
            entry.cancel.cancel();
            tracing::debug!("Push client {} unregistered", id);
        }
    }

    /// Send a snapshot to every client without waiting on any of them.
    ///
    /// A client whose queue is full skips this snapshot; it catches up with
    /// the next one since every snapshot is complete.
    pub fn broadcast(&self, snapshot: &Arc<StatusSnapshot>) {
        let mut closed = Vec::new();
        for entry in self.clients.iter() {
            match entry.tx.try_send(Arc::clone(snapshot)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::trace!("Push client {} lagging, snapshot skipped", entry.key());
                }
                Err(mpsc::error::TrySendError::Closed(_)) => closed.push(*entry.key()),
            }
        }
        for id in closed {
            self.unregister(id);
        }
    }

    /// Drop every client connection
    pub fn disconnect_all(&self) {
        let ids: Vec<u64> = self.clients.iter().map(|e| *e.key()).collect();
        let count = ids.len();
        for id in ids {
            self.unregister(id);
        }
        if count > 0 {
            tracing::info!("Disconnected {} push clients", count);
        }
    }

    /// Number of connected clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether no client is connected
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Forward every new snapshot to all clients until cancelled
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut rx = self.latest.clone();

        loop {
            tokio::select! {
                changed = rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let snapshot = Arc::clone(&rx.borrow_and_update());
                    self.broadcast(&snapshot);
                }
                _ = cancel.cancelled() => break,
            }
        }

        self.disconnect_all();
        tracing::info!("Push hub shut down");
    }
}

/// One client's stream of snapshots; unregisters on drop
pub struct PushSubscription {
    id: u64,
    rx: mpsc::Receiver<Arc<StatusSnapshot>>,
    cancel: CancellationToken,
    last_sent: u64,
    hub: Arc<PushHub>,
}

impl PushSubscription {
    /// Registry key of this client, unique for the lifetime of the hub
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next snapshot for this client, `None` once disconnected.
    ///
    /// Snapshots are delivered in `last_update` order; anything not newer
    /// than the last one delivered is skipped.
    pub async fn recv(&mut self) -> Option<Arc<StatusSnapshot>> {
        loop {
            let snapshot = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return None,
                next = self.rx.recv() => next?,
            };
            if snapshot.last_update > self.last_sent || self.last_sent == 0 {
                self.last_sent = snapshot.last_update;
                return Some(snapshot);
            }
        }
    }

    /// Token cancelled when the hub drops this client
    pub fn cancelled(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Drop for PushSubscription {
    fn drop(&mut self) {
        self.hub.unregister(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn snapshot(last_update: u64) -> Arc<StatusSnapshot> {
        Arc::new(StatusSnapshot {
            last_update,
            ..StatusSnapshot::default()
        })
    }

    fn hub(initial: u64) -> (watch::Sender<Arc<StatusSnapshot>>, Arc<PushHub>) {
        let (tx, rx) = watch::channel(snapshot(initial));
        (tx, Arc::new(PushHub::new(rx, 4)))
    }

    #[tokio::test]
    async fn test_register_gets_current_snapshot() {
        let (_tx, hub) = hub(42);
        let mut sub = hub.register();
        assert_eq!(sub.recv().await.unwrap().last_update, 42);
        assert_eq!(hub.len(), 1);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all() {
        let (_tx, hub) = hub(1);
        let mut a = hub.register();
        let mut b = hub.register();
        a.recv().await.unwrap();
        b.recv().await.unwrap();

        hub.broadcast(&snapshot(2));
        assert_eq!(a.recv().await.unwrap().last_update, 2);
        assert_eq!(b.recv().await.unwrap().last_update, 2);
    }

    #[tokio::test]
    async fn test_stale_snapshots_skipped() {
        let (_tx, hub) = hub(5);
        let mut sub = hub.register();
        hub.broadcast(&snapshot(3));
        hub.broadcast(&snapshot(7));

        assert_eq!(sub.recv().await.unwrap().last_update, 5);
        assert_eq!(sub.recv().await.unwrap().last_update, 7);
    }

    #[tokio::test]
    async fn test_full_queue_does_not_block() {
        let (_tx, hub) = hub(1);
        let _sub = hub.register();
        for i in 2..100 {
            hub.broadcast(&snapshot(i));
        }
        assert_eq!(hub.len(), 1);
    }

    #[tokio::test]
    async fn test_drop_unregisters() {
        let (_tx, hub) = hub(1);
        let sub = hub.register();
        assert_eq!(hub.len(), 1);
        drop(sub);
        assert!(hub.is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_all_ends_streams() {
        let (_tx, hub) = hub(1);
        let mut sub = hub.register();
        sub.recv().await.unwrap();

        hub.disconnect_all();
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_run_forwards_watch_updates() {
        let (tx, hub) = hub(1);
        let mut sub = hub.register();
        sub.recv().await.unwrap();

        let cancel = CancellationToken::new();
        let task = tokio::spawn(Arc::clone(&hub).run(cancel.clone()));
        tokio::task::yield_now().await;

        tx.send_replace(snapshot(9));
        let next = tokio::time::timeout(Duration::from_secs(1), sub.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(next.last_update, 9);

        cancel.cancel();
        task.await.unwrap();
        assert!(hub.is_empty());
    }
}
