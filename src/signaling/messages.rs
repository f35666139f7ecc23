//! Signaling wire frames
//!
//! JSON frames exchanged over the signaling socket, tagged by `type`.
//! Field names match the wire format the front-end already speaks
//! (`peerId`, `fallback`), so the relay is a drop-in replacement.

use serde::{Deserialize, Serialize};

use crate::camera::StreamQuality;

/// Client-to-server signaling frame
///
/// The legacy viewer socket accepts only `RequestStream` and
/// `ChangeQuality`; the signaling socket accepts all variants.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// SDP offer (payload logged, not negotiated)
    Offer {
        #[serde(default)]
        sdp: Option<String>,
    },
    /// SDP answer (payload logged, not negotiated)
    Answer {
        #[serde(default)]
        sdp: Option<String>,
    },
    /// ICE candidate (payload logged, not negotiated)
    IceCandidate {
        #[serde(default)]
        candidate: Option<serde_json::Value>,
    },
    /// Ask whether the stream is currently available
    RequestStream,
    /// Restart the capture process with a different quality preset
    ChangeQuality {
        #[serde(default)]
        quality: Option<String>,
    },
}

impl ClientFrame {
    /// Wire name of the frame type, for logging
    pub fn type_name(&self) -> &'static str {
        match self {
            ClientFrame::Offer { .. } => "offer",
            ClientFrame::Answer { .. } => "answer",
            ClientFrame::IceCandidate { .. } => "ice_candidate",
            ClientFrame::RequestStream => "request_stream",
            ClientFrame::ChangeQuality { .. } => "change_quality",
        }
    }
}

/// Server-to-client signaling frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Identifier assigned to a freshly connected peer
    PeerId {
        #[serde(rename = "peerId")]
        peer_id: String,
    },
    /// Acknowledgment that an offer reached the relay
    OfferReceived {
        #[serde(rename = "peerId")]
        peer_id: String,
        message: String,
    },
    /// The stream can be consumed over the websocket fallback
    StreamReady {
        #[serde(rename = "peerId")]
        peer_id: String,
        fallback: String,
    },
    /// Reply to `request_stream` while the capture process is up
    ///
    /// Carries the peer id on the signaling path; the legacy path sends
    /// the frame without one.
    StreamAvailable {
        #[serde(rename = "peerId", default, skip_serializing_if = "Option::is_none")]
        peer_id: Option<String>,
    },
    /// Reply to `request_stream` while nothing is streaming
    StreamUnavailable,
    /// Quality change accepted; the restart completes asynchronously
    QualityChanged { quality: StreamQuality },
    /// Error report, sent only to the offending peer
    Error { message: String },
}

impl ServerFrame {
    pub fn offer_received(peer_id: impl Into<String>) -> Self {
        ServerFrame::OfferReceived {
            peer_id: peer_id.into(),
            message: "WebRTC offer received. Preparing stream...".to_string(),
        }
    }

    pub fn stream_ready(peer_id: impl Into<String>) -> Self {
        ServerFrame::StreamReady {
            peer_id: peer_id.into(),
            fallback: "websocket".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_frame_parses_tagged_type() {
        let frame: ClientFrame = serde_json::from_str(r#"{"type":"request_stream"}"#).unwrap();
        assert!(matches!(frame, ClientFrame::RequestStream));

        let frame: ClientFrame =
            serde_json::from_str(r#"{"type":"change_quality","quality":"low"}"#).unwrap();
        match frame {
            ClientFrame::ChangeQuality { quality } => assert_eq!(quality.as_deref(), Some("low")),
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[test]
    fn test_change_quality_field_is_optional() {
        let frame: ClientFrame = serde_json::from_str(r#"{"type":"change_quality"}"#).unwrap();
        match frame {
            ClientFrame::ChangeQuality { quality } => assert!(quality.is_none()),
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[test]
    fn test_offer_tolerates_extra_fields() {
        let frame: ClientFrame =
            serde_json::from_str(r#"{"type":"offer","sdp":"v=0","extra":1}"#).unwrap();
        assert_eq!(frame.type_name(), "offer");
    }

    #[test]
    fn test_peer_id_wire_name() {
        let json = serde_json::to_string(&ServerFrame::PeerId {
            peer_id: "peer_1_abc".to_string(),
        })
        .unwrap();
        assert!(json.contains(r#""type":"peer_id""#));
        assert!(json.contains(r#""peerId":"peer_1_abc""#));
    }

    #[test]
    fn test_stream_available_omits_missing_peer_id() {
        let json = serde_json::to_string(&ServerFrame::StreamAvailable { peer_id: None }).unwrap();
        assert_eq!(json, r#"{"type":"stream_available"}"#);

        let json = serde_json::to_string(&ServerFrame::StreamAvailable {
            peer_id: Some("peer_1_abc".to_string()),
        })
        .unwrap();
        assert!(json.contains(r#""peerId""#));
    }

    #[test]
    fn test_stream_ready_fallback() {
        let json = serde_json::to_string(&ServerFrame::stream_ready("p")).unwrap();
        assert!(json.contains(r#""fallback":"websocket""#));
    }
}
