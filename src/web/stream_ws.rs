//! Legacy viewer WebSocket
//!
//! Binary H.264 chunks flow server→client once streaming; the client
//! may send `request_stream` and `change_quality` control frames.
//! Malformed input is logged and dropped — the legacy protocol has no
//! error replies.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use bytes::Bytes;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::camera::StreamQuality;
use crate::signaling::dispatcher::parse_client_frame;
use crate::signaling::{ClientFrame, ServerFrame};
use crate::state::AppState;
use crate::stream::ViewerGuard;

/// Server ping cadence on idle connections
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// WebSocket upgrade handler for `/camera-stream`
pub async fn stream_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<Bytes>();
    let guard = ViewerGuard::new(state.broadcaster.clone(), tx);
    info!("Client connected to camera stream (legacy)");

    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);

    loop {
        tokio::select! {
            chunk = rx.recv() => {
                match chunk {
                    Some(chunk) => {
                        if sender.send(Message::Binary(chunk.to_vec())).await.is_err() {
                            warn!("Failed to send chunk to viewer {}, disconnecting", guard.id());
                            break;
                        }
                    }
                    None => break,
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_control_frame(&text, &state, &mut sender).await;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sender.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Client disconnected from camera stream");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }

            _ = heartbeat.tick() => {
                if sender.send(Message::Ping(vec![])).await.is_err() {
                    break;
                }
            }
        }
    }

    drop(guard);
}

/// Handle a JSON control frame from a legacy viewer.
///
/// Only `request_stream` and `change_quality` are meaningful here;
/// signaling-only frames are ignored. A quality change on this path is
/// not acknowledged.
async fn handle_control_frame(
    text: &str,
    state: &Arc<AppState>,
    sender: &mut SplitSink<WebSocket, Message>,
) {
    let frame = match parse_client_frame(text) {
        Ok(Some(frame)) => frame,
        Ok(None) => return,
        Err(e) => {
            warn!("WebSocket message error: {}", e);
            return;
        }
    };

    match frame {
        ClientFrame::RequestStream => {
            let reply = if state.session.is_running() {
                ServerFrame::StreamAvailable { peer_id: None }
            } else {
                ServerFrame::StreamUnavailable
            };
            send_frame(sender, &reply).await;
        }
        ClientFrame::ChangeQuality { quality } => {
            if !state.session.is_running() {
                return;
            }
            let quality = StreamQuality::from_name(quality.as_deref().unwrap_or(""));
            state.session.stop().await;
            state.session.schedule_restart(
                quality,
                Duration::from_millis(state.config.camera.legacy_restart_delay_ms),
            );
        }
        other => {
            debug!(
                "Ignoring {} frame on the legacy stream socket",
                other.type_name()
            );
        }
    }
}

async fn send_frame(sender: &mut SplitSink<WebSocket, Message>, frame: &ServerFrame) {
    match serde_json::to_string(frame) {
        Ok(json) => {
            let _ = sender.send(Message::Text(json)).await;
        }
        Err(e) => warn!("Failed to serialize reply frame: {}", e),
    }
}
