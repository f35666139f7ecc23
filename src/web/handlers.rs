use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::camera::StreamQuality;
use crate::error::Result;
use crate::state::AppState;

// ============================================================================
// Health & Status
// ============================================================================

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub streaming: bool,
    #[serde(rename = "webrtcPeers")]
    pub webrtc_peers: usize,
    pub timestamp: DateTime<Utc>,
}

/// Health check; never fails.
pub async fn camera_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        streaming: state.session.is_running(),
        webrtc_peers: state.peers.peer_count(),
        timestamp: Utc::now(),
    })
}

/// Stream status response
#[derive(Serialize)]
pub struct StatusResponse {
    pub streaming: bool,
    pub connected_clients: usize,
    pub webrtc_peers: usize,
    /// Seconds since the relay started
    pub uptime: f64,
}

pub async fn camera_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        streaming: state.session.is_running(),
        connected_clients: state.broadcaster.viewer_count(),
        webrtc_peers: state.peers.peer_count(),
        uptime: state.uptime_secs(),
    })
}

// ============================================================================
// Stream Control
// ============================================================================

/// Start request body (optional; missing body means default quality)
#[derive(Debug, Default, Deserialize)]
pub struct StartRequest {
    pub quality: Option<String>,
}

/// Start response
#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub status: &'static str,
    pub quality: StreamQuality,
}

/// Start the capture process.
///
/// 409 if already streaming; 500 if both spawn attempts fail (start
/// waits for the first output chunk or a bounded grace period before
/// reporting success).
pub async fn camera_start(
    State(state): State<Arc<AppState>>,
    body: Option<Json<StartRequest>>,
) -> Result<Json<StartResponse>> {
    let requested = body.and_then(|Json(req)| req.quality);
    let quality = StreamQuality::from_name(requested.as_deref().unwrap_or(""));

    let quality = state.session.start(quality).await?;
    Ok(Json(StartResponse {
        status: "started",
        quality,
    }))
}

/// Stop response
#[derive(Serialize)]
pub struct StopResponse {
    pub status: &'static str,
}

/// Stop the capture process; idempotent, always succeeds.
pub async fn camera_stop(State(state): State<Arc<AppState>>) -> Json<StopResponse> {
    state.session.stop().await;
    Json(StopResponse { status: "stopped" })
}

// ============================================================================
// WebRTC configuration
// ============================================================================

/// ICE servers handed to client-side WebRTC
#[derive(Serialize)]
pub struct WebRtcConfigResponse {
    #[serde(rename = "iceServers")]
    pub ice_servers: Vec<IceServerInfo>,
}

#[derive(Serialize)]
pub struct IceServerInfo {
    pub urls: String,
}

/// Static STUN list from config; no TURN, no credentials.
pub async fn webrtc_config(State(state): State<Arc<AppState>>) -> Json<WebRtcConfigResponse> {
    let ice_servers = state
        .config
        .webrtc
        .stun_servers
        .iter()
        .map(|urls| IceServerInfo { urls: urls.clone() })
        .collect();

    Json(WebRtcConfigResponse { ice_servers })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CaptureCommand;
    use crate::config::RelayConfig;
    use tokio::sync::broadcast;

    fn idle_state() -> Arc<AppState> {
        let (shutdown_tx, _) = broadcast::channel(1);
        AppState::new(RelayConfig::default(), shutdown_tx)
    }

    fn runnable_state() -> Arc<AppState> {
        let mut config = RelayConfig::default();
        config.camera.primary = CaptureCommand::Custom {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), "printf x; sleep 30".to_string()],
        };
        config.camera.ready_grace_ms = 300;
        let (shutdown_tx, _) = broadcast::channel(1);
        AppState::new(config, shutdown_tx)
    }

    #[tokio::test]
    async fn test_health_reports_idle() {
        let state = idle_state();
        let Json(health) = camera_health(State(state)).await;
        assert_eq!(health.status, "healthy");
        assert!(!health.streaming);
        assert_eq!(health.webrtc_peers, 0);
    }

    #[tokio::test]
    async fn test_status_counts() {
        let state = idle_state();
        let Json(status) = camera_status(State(state)).await;
        assert!(!status.streaming);
        assert_eq!(status.connected_clients, 0);
        assert_eq!(status.webrtc_peers, 0);
        assert!(status.uptime >= 0.0);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let state = idle_state();
        let Json(resp) = camera_stop(State(state.clone())).await;
        assert_eq!(resp.status, "stopped");
        let Json(resp) = camera_stop(State(state)).await;
        assert_eq!(resp.status, "stopped");
    }

    #[tokio::test]
    async fn test_start_resolves_quality_and_conflicts() {
        let state = runnable_state();

        let Json(resp) = camera_start(
            State(state.clone()),
            Some(Json(StartRequest {
                quality: Some("high".to_string()),
            })),
        )
        .await
        .unwrap();
        assert_eq!(resp.status, "started");
        assert_eq!(resp.quality, StreamQuality::High);

        let err = camera_start(State(state.clone()), None).await.unwrap_err();
        assert!(matches!(err, crate::AppError::AlreadyStreaming));

        state.session.stop().await;
    }

    #[tokio::test]
    async fn test_start_without_body_defaults_to_medium() {
        let state = runnable_state();

        let Json(resp) = camera_start(State(state.clone()), None).await.unwrap();
        assert_eq!(resp.quality, StreamQuality::Medium);

        state.session.stop().await;
    }

    #[tokio::test]
    async fn test_webrtc_config_lists_stun_servers() {
        let state = idle_state();
        let Json(config) = webrtc_config(State(state)).await;
        assert_eq!(config.ice_servers.len(), 2);
        assert!(config.ice_servers[0].urls.starts_with("stun:"));
    }

    #[test]
    fn test_ice_servers_wire_shape() {
        let resp = WebRtcConfigResponse {
            ice_servers: vec![IceServerInfo {
                urls: "stun:stun.l.google.com:19302".to_string(),
            }],
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains(r#""iceServers""#));
        assert!(json.contains(r#""urls":"stun:stun.l.google.com:19302""#));
    }
}
