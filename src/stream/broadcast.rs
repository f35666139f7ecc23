//! Chunk broadcaster
//!
//! Fans encoded video chunks out to every connected legacy viewer.
//! Delivery is fire-and-forget: a viewer that cannot accept a chunk is
//! skipped and logged, never removed here — removal happens only through
//! the connection's own close path (the `ViewerGuard`).

use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Viewer ID type (UUID string)
pub type ViewerId = String;

/// Per-viewer connection handle
struct Viewer {
    tx: mpsc::UnboundedSender<Bytes>,
    connected_at: Instant,
    chunks_sent: AtomicU64,
}

/// Chunk broadcaster
///
/// Holds the live viewer set and delivers each chunk to every member.
/// Iteration works on a snapshot of the senders taken under a read
/// lock, so a viewer unregistering mid-broadcast cannot invalidate the
/// delivery pass.
pub struct ChunkBroadcaster {
    viewers: RwLock<HashMap<ViewerId, Viewer>>,
    chunks_relayed: AtomicU64,
}

impl ChunkBroadcaster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            viewers: RwLock::new(HashMap::new()),
            chunks_relayed: AtomicU64::new(0),
        })
    }

    /// Register a viewer; chunks will be queued on `tx` from now on.
    pub fn register(&self, tx: mpsc::UnboundedSender<Bytes>) -> ViewerId {
        let id = uuid::Uuid::new_v4().to_string();
        self.viewers.write().insert(
            id.clone(),
            Viewer {
                tx,
                connected_at: Instant::now(),
                chunks_sent: AtomicU64::new(0),
            },
        );
        info!(
            "Viewer {} connected (total: {})",
            id,
            self.viewer_count()
        );
        id
    }

    /// Remove a viewer; no-op if already removed.
    pub fn unregister(&self, id: &str) {
        if let Some(viewer) = self.viewers.write().remove(id) {
            info!(
                "Viewer {} disconnected after {:.1}s ({} chunks)",
                id,
                viewer.connected_at.elapsed().as_secs_f32(),
                viewer.chunks_sent.load(Ordering::Relaxed)
            );
        }
    }

    /// Current viewer count
    pub fn viewer_count(&self) -> usize {
        self.viewers.read().len()
    }

    /// Total chunks relayed since startup
    pub fn chunks_relayed(&self) -> u64 {
        self.chunks_relayed.load(Ordering::Relaxed)
    }

    /// Deliver `chunk` to every registered viewer.
    ///
    /// A failed send (viewer task already gone) is logged and skipped;
    /// it never interrupts delivery to the remaining viewers.
    pub fn broadcast(&self, chunk: Bytes) {
        let targets: Vec<(ViewerId, mpsc::UnboundedSender<Bytes>)> = {
            let viewers = self.viewers.read();
            viewers
                .iter()
                .map(|(id, v)| (id.clone(), v.tx.clone()))
                .collect()
        };

        if targets.is_empty() {
            return;
        }

        let mut delivered = 0usize;
        for (id, tx) in targets {
            if tx.send(chunk.clone()).is_err() {
                warn!("Failed to deliver chunk to viewer {}", id);
                continue;
            }
            delivered += 1;
            let viewers = self.viewers.read();
            if let Some(viewer) = viewers.get(&id) {
                viewer.chunks_sent.fetch_add(1, Ordering::Relaxed);
            }
        }

        self.chunks_relayed.fetch_add(1, Ordering::Relaxed);
        debug!("Relayed {}-byte chunk to {} viewers", chunk.len(), delivered);
    }
}

/// RAII guard for viewer lifecycle management
///
/// Ensures the registry entry is cleaned up even when the connection
/// task ends abruptly.
pub struct ViewerGuard {
    id: ViewerId,
    broadcaster: Arc<ChunkBroadcaster>,
}

impl ViewerGuard {
    pub fn new(broadcaster: Arc<ChunkBroadcaster>, tx: mpsc::UnboundedSender<Bytes>) -> Self {
        let id = broadcaster.register(tx);
        Self { id, broadcaster }
    }

    pub fn id(&self) -> &ViewerId {
        &self.id
    }
}

impl Drop for ViewerGuard {
    fn drop(&mut self) {
        self.broadcaster.unregister(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_delivers_verbatim() {
        let broadcaster = ChunkBroadcaster::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        broadcaster.register(tx1);
        broadcaster.register(tx2);

        let chunk = Bytes::from_static(b"\x00\x00\x00\x01frame");
        broadcaster.broadcast(chunk.clone());

        assert_eq!(rx1.recv().await.unwrap(), chunk);
        assert_eq!(rx2.recv().await.unwrap(), chunk);
    }

    #[tokio::test]
    async fn test_dead_viewer_does_not_block_the_rest() {
        let broadcaster = ChunkBroadcaster::new();
        let (dead_tx, dead_rx) = mpsc::unbounded_channel::<Bytes>();
        let (live_tx, mut live_rx) = mpsc::unbounded_channel();
        broadcaster.register(dead_tx);
        broadcaster.register(live_tx);
        drop(dead_rx);

        broadcaster.broadcast(Bytes::from_static(b"chunk"));

        assert_eq!(live_rx.recv().await.unwrap(), Bytes::from_static(b"chunk"));
        // failed delivery does not evict the entry; that is the close path's job
        assert_eq!(broadcaster.viewer_count(), 2);
    }

    #[tokio::test]
    async fn test_guard_unregisters_on_drop() {
        let broadcaster = ChunkBroadcaster::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let guard = ViewerGuard::new(broadcaster.clone(), tx);
        assert_eq!(broadcaster.viewer_count(), 1);
        drop(guard);
        assert_eq!(broadcaster.viewer_count(), 0);
    }

    #[tokio::test]
    async fn test_unregister_is_idempotent() {
        let broadcaster = ChunkBroadcaster::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let id = broadcaster.register(tx);
        broadcaster.unregister(&id);
        broadcaster.unregister(&id);
        assert_eq!(broadcaster.viewer_count(), 0);
    }
}
