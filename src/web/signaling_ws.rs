//! WebRTC signaling WebSocket
//!
//! Each connection is a peer: registered (and announced its id) on
//! upgrade, removed on close. Inbound JSON frames go through the
//! dispatcher; unparseable input earns an `error` frame and the
//! connection stays open.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::warn;

use crate::signaling::dispatcher::parse_client_frame;
use crate::signaling::ServerFrame;
use crate::state::AppState;

/// Server ping cadence on idle connections
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// WebSocket upgrade handler for `/webrtc-signaling`
pub async fn signaling_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<ServerFrame>();
    let peer_id = state.peers.register(tx.clone());

    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);

    loop {
        tokio::select! {
            frame = rx.recv() => {
                match frame {
                    Some(frame) => {
                        match serde_json::to_string(&frame) {
                            Ok(json) => {
                                if sender.send(Message::Text(json)).await.is_err() {
                                    warn!("Failed to send frame to peer {}, disconnecting", peer_id);
                                    break;
                                }
                            }
                            Err(e) => warn!("Failed to serialize frame for {}: {}", peer_id, e),
                        }
                    }
                    None => break,
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match parse_client_frame(&text) {
                            Ok(Some(frame)) => {
                                let _ = state.dispatcher.dispatch(&peer_id, frame, &tx).await;
                            }
                            Ok(None) => {}
                            Err(e) => {
                                warn!("WebRTC signaling error from {}: {}", peer_id, e);
                                let _ = tx.send(ServerFrame::Error {
                                    message: e.to_string(),
                                });
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sender.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!("WebRTC peer error ({}): {}", peer_id, e);
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

    state.peers.unregister(&peer_id);
}
