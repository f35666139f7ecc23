//! Signaling message dispatcher
//!
//! Routes each inbound frame by its `type` tag. There is no persistent
//! per-peer negotiation state: offer/answer/ICE are acknowledged or
//! logged without building a media description, and the corresponding
//! `DispatchOutcome::Unimplemented` marks the seam where a real media
//! engine would attach.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::camera::{StreamQuality, StreamSession};
use crate::config::CameraConfig;

use super::messages::{ClientFrame, ServerFrame};
use super::registry::{PeerId, PeerRegistry};

/// What became of an inbound signaling frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Handled; at least one reply frame was queued
    Replied,
    /// Routed to the stub negotiation path (acknowledgment at most)
    Unimplemented,
    /// Precondition not met (e.g. quality change while idle); dropped
    Ignored,
    /// Sender references a peer id no longer in the registry
    UnknownPeer,
}

/// Parse an inbound signaling text frame.
///
/// Two-stage parse: structurally invalid JSON is an error (the sender
/// gets an `error` frame); valid JSON with an unrecognized `type` is
/// logged and dropped without a reply.
pub fn parse_client_frame(text: &str) -> Result<Option<ClientFrame>, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    match serde_json::from_value::<ClientFrame>(value) {
        Ok(frame) => Ok(Some(frame)),
        Err(e) => {
            info!("Ignoring signaling message with unhandled type: {}", e);
            Ok(None)
        }
    }
}

/// Signaling dispatcher
pub struct SignalingDispatcher {
    session: Arc<StreamSession>,
    peers: Arc<PeerRegistry>,
    config: CameraConfig,
}

impl SignalingDispatcher {
    pub fn new(
        session: Arc<StreamSession>,
        peers: Arc<PeerRegistry>,
        config: CameraConfig,
    ) -> Self {
        Self {
            session,
            peers,
            config,
        }
    }

    /// Route one frame from `peer_id`. Replies are queued on `reply`,
    /// which is the same sender registered for that peer.
    pub async fn dispatch(
        &self,
        peer_id: &PeerId,
        frame: ClientFrame,
        reply: &mpsc::UnboundedSender<ServerFrame>,
    ) -> DispatchOutcome {
        if !self.peers.contains(peer_id) {
            warn!(
                "Dropping {} message from unknown peer {}",
                frame.type_name(),
                peer_id
            );
            if self.config.report_unknown_peer {
                let _ = reply.send(ServerFrame::Error {
                    message: format!("peer not found: {}", peer_id),
                });
            }
            return DispatchOutcome::UnknownPeer;
        }

        info!(
            "Received signaling message from {}: {}",
            peer_id,
            frame.type_name()
        );

        match frame {
            ClientFrame::Offer { .. } => {
                // a real engine would build an RTCPeerConnection and answer
                info!("Processing WebRTC offer from {}", peer_id);
                let _ = reply.send(ServerFrame::offer_received(peer_id.clone()));
                if self.session.is_running() {
                    let _ = reply.send(ServerFrame::stream_ready(peer_id.clone()));
                }
                DispatchOutcome::Unimplemented
            }
            ClientFrame::Answer { .. } => {
                info!("Processing WebRTC answer from {}", peer_id);
                DispatchOutcome::Unimplemented
            }
            ClientFrame::IceCandidate { .. } => {
                info!("Processing ICE candidate from {}", peer_id);
                DispatchOutcome::Unimplemented
            }
            ClientFrame::RequestStream => {
                let frame = if self.session.is_running() {
                    ServerFrame::StreamAvailable {
                        peer_id: Some(peer_id.clone()),
                    }
                } else {
                    ServerFrame::StreamUnavailable
                };
                let _ = reply.send(frame);
                DispatchOutcome::Replied
            }
            ClientFrame::ChangeQuality { quality } => {
                if !self.session.is_running() {
                    return DispatchOutcome::Ignored;
                }
                let quality = StreamQuality::from_name(quality.as_deref().unwrap_or(""));
                self.session.stop().await;
                self.session.schedule_restart(
                    quality,
                    Duration::from_millis(self.config.signaling_restart_delay_ms),
                );
                let _ = reply.send(ServerFrame::QualityChanged { quality });
                DispatchOutcome::Replied
            }
        }
    }
}
