use axum::{
    routing::{any, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers;
use super::signaling_ws::signaling_ws_handler;
use super::stream_ws::stream_ws_handler;
use crate::state::AppState;

/// Create the main application router
///
/// One listener carries the HTTP control surface and both WebSocket
/// upgrade paths. CORS is wide open: the relay sits on a LAN and the
/// front-end is served from elsewhere.
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/health", get(handlers::camera_health))
        .route("/start", post(handlers::camera_start))
        .route("/stop", post(handlers::camera_stop))
        .route("/status", get(handlers::camera_status))
        .route("/webrtc-config", get(handlers::webrtc_config));

    Router::new()
        .nest("/api/camera", api_routes)
        // Legacy binary stream viewers
        .route("/camera-stream", any(stream_ws_handler))
        // WebRTC signaling peers
        .route("/webrtc-signaling", any(signaling_ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
