//! Peer registry
//!
//! Tracks every connected signaling peer by a generated identifier.
//! The identifier combines the connect time with a random suffix;
//! collisions are treated as negligible, not impossible.

use bytes::Bytes;
use parking_lot::RwLock;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::messages::ServerFrame;

/// Peer ID type (`peer_<millis>_<suffix>`)
pub type PeerId = String;

/// Registered signaling peer
struct Peer {
    tx: mpsc::UnboundedSender<ServerFrame>,
    /// Outbound media channel, populated only once a real negotiation
    /// engine attaches one. Stays `None` with the stub dispatcher.
    data_channel: Option<mpsc::UnboundedSender<Bytes>>,
    connected_at: Instant,
}

/// Peer registry
pub struct PeerRegistry {
    peers: RwLock<HashMap<PeerId, Peer>>,
}

impl PeerRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            peers: RwLock::new(HashMap::new()),
        })
    }

    /// Register a peer and immediately announce its id on `tx`.
    pub fn register(&self, tx: mpsc::UnboundedSender<ServerFrame>) -> PeerId {
        let id = Self::generate_peer_id();

        self.peers.write().insert(
            id.clone(),
            Peer {
                tx: tx.clone(),
                data_channel: None,
                connected_at: Instant::now(),
            },
        );

        if tx
            .send(ServerFrame::PeerId {
                peer_id: id.clone(),
            })
            .is_err()
        {
            warn!("Peer {} disconnected before receiving its id", id);
        }

        info!("WebRTC peer connected: {}", id);
        id
    }

    /// Remove a peer; no-op if already removed.
    pub fn unregister(&self, id: &str) {
        if let Some(peer) = self.peers.write().remove(id) {
            info!(
                "WebRTC peer disconnected: {} (connected {:.1}s)",
                id,
                peer.connected_at.elapsed().as_secs_f32()
            );
        }
    }

    /// Whether a peer id is currently registered
    pub fn contains(&self, id: &str) -> bool {
        self.peers.read().contains_key(id)
    }

    /// Current peer count
    pub fn peer_count(&self) -> usize {
        self.peers.read().len()
    }

    /// Queue a frame on a peer's socket. Returns false when the peer is
    /// unknown or its connection task has already gone away.
    pub fn send(&self, id: &str, frame: ServerFrame) -> bool {
        let tx = {
            let peers = self.peers.read();
            match peers.get(id) {
                Some(peer) => peer.tx.clone(),
                None => return false,
            }
        };
        tx.send(frame).is_ok()
    }

    /// Attach a data channel to a peer (used by a future media engine).
    pub fn set_data_channel(&self, id: &str, tx: mpsc::UnboundedSender<Bytes>) -> bool {
        let mut peers = self.peers.write();
        match peers.get_mut(id) {
            Some(peer) => {
                peer.data_channel = Some(tx);
                true
            }
            None => false,
        }
    }

    /// Deliver a video chunk to every peer with an open data channel.
    ///
    /// A failed send is logged with the peer id and skipped.
    pub fn broadcast_data(&self, chunk: &Bytes) {
        let targets: Vec<(PeerId, mpsc::UnboundedSender<Bytes>)> = {
            let peers = self.peers.read();
            peers
                .iter()
                .filter_map(|(id, peer)| {
                    peer.data_channel
                        .as_ref()
                        .map(|tx| (id.clone(), tx.clone()))
                })
                .collect()
        };

        for (id, tx) in targets {
            if tx.send(chunk.clone()).is_err() {
                warn!("Error sending to peer {}", id);
            }
        }
    }

    fn generate_peer_id() -> PeerId {
        let millis = chrono::Utc::now().timestamp_millis();
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(9)
            .map(char::from)
            .collect();
        let id = format!("peer_{}_{}", millis, suffix.to_lowercase());
        debug!("Generated peer id {}", id);
        id
    }
}
