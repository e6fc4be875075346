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
use super::ws::ws_handler;
use crate::state::AppState;

/// Create the main application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/health", get(handlers::health_check))
        // One-shot detection
        .route("/detect", post(handlers::detect))
        // WebRTC signaling endpoints
        .route("/webrtc/offer", post(handlers::webrtc_offer))
        .route("/webrtc/ice-candidate", post(handlers::webrtc_ice_candidate))
        .route("/webrtc/close", post(handlers::webrtc_close))
        .route("/webrtc/status", get(handlers::webrtc_status))
        // WebSocket endpoint for per-session events
        .route("/ws", any(ws_handler));

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
