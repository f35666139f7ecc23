use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;

use crate::camera::StreamSession;
use crate::config::RelayConfig;
use crate::signaling::{PeerRegistry, SignalingDispatcher};
use crate::stream::ChunkBroadcaster;

/// Application-wide state shared across handlers
///
/// Owns the three pieces of shared mutable state — the stream session,
/// the viewer set and the peer map — for the whole process lifetime.
pub struct AppState {
    /// Relay configuration (immutable after startup)
    pub config: RelayConfig,
    /// Stream session (capture process supervisor)
    pub session: Arc<StreamSession>,
    /// Legacy viewer fan-out
    pub broadcaster: Arc<ChunkBroadcaster>,
    /// Signaling peer registry
    pub peers: Arc<PeerRegistry>,
    /// Signaling message router
    pub dispatcher: SignalingDispatcher,
    /// Shutdown signal sender
    pub shutdown_tx: broadcast::Sender<()>,
    /// Relay start instant, for uptime reporting
    started_at: Instant,
}

impl AppState {
    /// Create new application state
    pub fn new(config: RelayConfig, shutdown_tx: broadcast::Sender<()>) -> Arc<Self> {
        let broadcaster = ChunkBroadcaster::new();
        let peers = PeerRegistry::new();
        let session = StreamSession::new(
            config.camera.clone(),
            broadcaster.clone(),
            peers.clone(),
        );
        let dispatcher =
            SignalingDispatcher::new(session.clone(), peers.clone(), config.camera.clone());

        Arc::new(Self {
            config,
            session,
            broadcaster,
            peers,
            dispatcher,
            shutdown_tx,
            started_at: Instant::now(),
        })
    }

    /// Seconds since the relay started
    pub fn uptime_secs(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64()
    }

    /// Subscribe to shutdown signal
    pub fn shutdown_signal(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_starts_idle() {
        let (shutdown_tx, _) = broadcast::channel(1);
        let state = AppState::new(RelayConfig::default(), shutdown_tx);

        assert!(!state.session.is_running());
        assert_eq!(state.broadcaster.viewer_count(), 0);
        assert_eq!(state.peers.peer_count(), 0);
        assert!(state.uptime_secs() >= 0.0);
    }
}
