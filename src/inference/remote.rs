//! HTTP delegation to an external inference engine
//!
//! Posts one frame per request as a base64 payload and expects a JSON
//! detection list back. The engine owns model loading, preprocessing and
//! postprocessing; this side only measures and forwards.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use super::Detector;
use crate::detection::{Detection, VideoFrame};
use crate::error::{AppError, Result};

/// Request body sent to the inference engine
#[derive(Debug, Serialize)]
struct DetectRequest {
    frame_id: u64,
    capture_ts: i64,
    image_data: String,
}

/// Response body expected from the inference engine
#[derive(Debug, Deserialize)]
struct DetectResponse {
    detections: Vec<Detection>,
}

/// Detector backend delegating to a remote HTTP endpoint
pub struct RemoteDetector {
    client: reqwest::Client,
    endpoint: String,
}

impl RemoteDetector {
    pub fn new(endpoint: String, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl Detector for RemoteDetector {
    fn name(&self) -> &str {
        "remote"
    }

    async fn detect(&self, frame: &VideoFrame) -> Result<Vec<Detection>> {
        let request = DetectRequest {
            frame_id: frame.sequence,
            capture_ts: frame.capture_ts,
            image_data: base64::engine::general_purpose::STANDARD.encode(frame.data()),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Inference request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Upstream(format!(
                "Inference engine returned {}",
                response.status()
            )));
        }

        let body: DetectResponse = response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Malformed inference response: {}", e)))?;

        // Reject malformed detections at the boundary instead of letting
        // them propagate into records
        for detection in &body.detections {
            detection.validate()?;
        }

        Ok(body.detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_carries_base64_payload() {
        use bytes::Bytes;

        let frame = VideoFrame::with_capture_ts(Bytes::from_static(b"abc"), 4, 1234);
        let request = DetectRequest {
            frame_id: frame.sequence,
            capture_ts: frame.capture_ts,
            image_data: base64::engine::general_purpose::STANDARD.encode(frame.data()),
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["frame_id"], 4);
        assert_eq!(json["capture_ts"], 1234);
        assert_eq!(json["image_data"], "YWJj");
    }

    #[test]
    fn response_parses_detection_list() {
        let body = r#"{"detections":[{"label":"dog","score":0.7,"xmin":0.1,"ymin":0.1,"xmax":0.4,"ymax":0.6}]}"#;
        let parsed: DetectResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.detections.len(), 1);
        assert_eq!(parsed.detections[0].label, "dog");
    }
}
