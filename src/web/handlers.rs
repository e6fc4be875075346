use std::sync::Arc;

use axum::{extract::State, Json};
use base64::Engine as _;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::detection::{Detection, VideoFrame};
use crate::error::{AppError, Result};
use crate::metrics::now_ms;
use crate::session::{
    AnswerResponse, CloseRequest, IceCandidateRequest, OfferRequest, SessionInfo,
};
use crate::state::AppState;

// ============================================================================
// Health
// ============================================================================

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
    pub version: &'static str,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        timestamp: chrono::Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============================================================================
// WebRTC signaling
// ============================================================================

/// Generic status response
#[derive(Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}

/// Handle WebRTC offer
pub async fn webrtc_offer(
    State(state): State<Arc<AppState>>,
    Json(request): Json<OfferRequest>,
) -> Result<Json<AnswerResponse>> {
    let response = state.controller.handle_offer(request).await?;
    Ok(Json(response))
}

/// Add ICE candidate
pub async fn webrtc_ice_candidate(
    State(state): State<Arc<AppState>>,
    Json(request): Json<IceCandidateRequest>,
) -> Result<Json<StatusResponse>> {
    state.controller.handle_ice_candidate(request).await?;
    Ok(Json(StatusResponse { status: "success" }))
}

/// Close WebRTC session
pub async fn webrtc_close(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CloseRequest>,
) -> Result<Json<StatusResponse>> {
    state.controller.close(&request.session_id).await?;
    Ok(Json(StatusResponse { status: "closed" }))
}

/// Session status listing
#[derive(Serialize)]
pub struct WebRtcStatus {
    pub version: &'static str,
    pub build_date: &'static str,
    pub session_count: usize,
    pub max_sessions: usize,
    pub sessions: Vec<SessionInfo>,
    pub detector: String,
}

pub async fn webrtc_status(State(state): State<Arc<AppState>>) -> Json<WebRtcStatus> {
    let sessions = state.registry.list().await;
    Json(WebRtcStatus {
        version: env!("CARGO_PKG_VERSION"),
        build_date: env!("BUILD_DATE"),
        session_count: sessions.len(),
        max_sessions: state.config.session.max_sessions,
        sessions,
        detector: state.detector.backend_name(),
    })
}

// ============================================================================
// One-shot detection
// ============================================================================

/// One-shot detection request
#[derive(Deserialize)]
pub struct DetectRequest {
    #[serde(default)]
    pub frame_id: u64,
    /// Producer-side capture timestamp; defaults to request arrival
    pub capture_ts: Option<i64>,
    /// Base64 image payload, optionally a data URL
    pub image_data: String,
}

/// One-shot detection response
#[derive(Serialize)]
pub struct DetectResponse {
    pub frame_id: u64,
    pub capture_ts: i64,
    pub recv_ts: i64,
    pub inference_ts: i64,
    pub detections: Vec<Detection>,
}

/// Run detection on a single submitted image
///
/// Unlike the frame path, inference failures surface here as errors; the
/// caller asked for this specific result.
pub async fn detect(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DetectRequest>,
) -> Result<Json<DetectResponse>> {
    let recv_ts = now_ms();
    let image = decode_image_payload(&request.image_data)?;
    let capture_ts = request.capture_ts.unwrap_or(recv_ts);

    let frame = VideoFrame::with_capture_ts(image, request.frame_id, capture_ts);
    let detections = state.detector.detect(&frame).await?;
    let inference_ts = now_ms();

    Ok(Json(DetectResponse {
        frame_id: request.frame_id,
        capture_ts,
        recv_ts,
        inference_ts,
        detections,
    }))
}

/// Decode a base64 image payload, tolerating a data-URL prefix
fn decode_image_payload(payload: &str) -> Result<Bytes> {
    let encoded = match payload.split_once(',') {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => payload,
    };

    if encoded.trim().is_empty() {
        return Err(AppError::InvalidInput("image_data is empty".into()));
    }

    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| AppError::InvalidInput(format!("image_data is not valid base64: {}", e)))?;

    Ok(Bytes::from(decoded))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_payload_accepts_plain_base64() {
        let decoded = decode_image_payload("aGVsbG8=").unwrap();
        assert_eq!(&decoded[..], b"hello");
    }

    #[test]
    fn image_payload_strips_data_url_prefix() {
        let decoded = decode_image_payload("data:image/jpeg;base64,aGVsbG8=").unwrap();
        assert_eq!(&decoded[..], b"hello");
    }

    #[test]
    fn image_payload_rejects_empty_and_garbage() {
        assert!(decode_image_payload("").is_err());
        assert!(decode_image_payload("data:image/jpeg;base64,").is_err());
        assert!(decode_image_payload("!!not-base64!!").is_err());
    }
}
