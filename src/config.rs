use serde::{Deserialize, Serialize};

use crate::camera::CaptureCommand;

/// Main relay configuration
///
/// Assembled once at startup from defaults plus CLI overrides;
/// there is no persistent settings store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Web server settings
    pub web: WebConfig,
    /// Camera subprocess settings
    pub camera: CameraConfig,
    /// WebRTC client configuration
    pub webrtc: WebRtcConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            web: WebConfig::default(),
            camera: CameraConfig::default(),
            webrtc: WebRtcConfig::default(),
        }
    }
}

/// Web server configuration
///
/// A single listener carries the HTTP control API and both
/// WebSocket upgrade paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// Listen address
    pub bind_address: String,
    /// Listen port
    pub port: u16,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Camera subprocess configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Primary capture command
    pub primary: CaptureCommand,
    /// Fallback capture command, attempted once if the primary fails to spawn
    pub fallback: CaptureCommand,
    /// How long `start` waits for the first output chunk before
    /// optimistically reporting success (milliseconds)
    pub ready_grace_ms: u64,
    /// Delay before respawning after a quality change on the signaling path
    /// (milliseconds); lets the dying process release the camera
    pub signaling_restart_delay_ms: u64,
    /// Delay before respawning after a quality change on the legacy path
    /// (milliseconds)
    pub legacy_restart_delay_ms: u64,
    /// Grace period between SIGTERM and SIGKILL on stop (milliseconds)
    pub stop_grace_ms: u64,
    /// Reply with an `error` frame when a message references an unknown
    /// peer id (always logged regardless)
    pub report_unknown_peer: bool,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            primary: CaptureCommand::LibcameraVid,
            fallback: CaptureCommand::Raspivid,
            ready_grace_ms: 2000,
            signaling_restart_delay_ms: 500,
            legacy_restart_delay_ms: 1000,
            stop_grace_ms: 2000,
            report_unknown_peer: false,
        }
    }
}

/// WebRTC client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebRtcConfig {
    /// STUN server URLs handed to clients via /api/camera/webrtc-config
    pub stun_servers: Vec<String>,
}

impl Default for WebRtcConfig {
    fn default() -> Self {
        Self {
            stun_servers: vec![
                "stun:stun.l.google.com:19302".to_string(),
                "stun:stun1.l.google.com:19302".to_string(),
            ],
        }
    }
}
