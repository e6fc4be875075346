//! Inference capability boundary
//!
//! Detection itself is an external collaborator; this module defines the
//! trait the rest of the crate programs against, plus a hot-swappable handle
//! so the backend can be replaced at runtime without touching sessions that
//! already hold a reference.

pub mod remote;

pub use remote::RemoteDetector;

use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;

use crate::detection::{Detection, VideoFrame};
use crate::error::Result;

/// Object detection capability
#[async_trait]
pub trait Detector: Send + Sync {
    /// Backend name for logs and status endpoints
    fn name(&self) -> &str;

    /// Run detection on one frame
    ///
    /// Failures are recoverable at the call site: on the frame path the
    /// stage degrades to an empty detection list rather than failing the
    /// stream.
    async fn detect(&self, frame: &VideoFrame) -> Result<Vec<Detection>>;
}

/// Shared, swappable reference to the active detector
///
/// Sessions capture the handle at stage construction; swapping the backend
/// takes effect on their next frame.
pub struct DetectorHandle {
    current: ArcSwap<Box<dyn Detector>>,
}

impl DetectorHandle {
    pub fn new(detector: Box<dyn Detector>) -> Self {
        Self {
            current: ArcSwap::from_pointee(detector),
        }
    }

    /// Replace the active backend
    pub fn swap(&self, detector: Box<dyn Detector>) {
        tracing::info!(backend = detector.name(), "Switching inference backend");
        self.current.store(Arc::new(detector));
    }

    /// Name of the active backend
    pub fn backend_name(&self) -> String {
        self.current.load().name().to_string()
    }

    /// Run detection through the active backend
    pub async fn detect(&self, frame: &VideoFrame) -> Result<Vec<Detection>> {
        let detector = self.current.load_full();
        detector.detect(frame).await
    }
}

/// Backend that never reports detections
///
/// Used when no inference endpoint is configured and as the delegation
/// policy for client-assisted sessions.
pub struct NullDetector;

#[async_trait]
impl Detector for NullDetector {
    fn name(&self) -> &str {
        "null"
    }

    async fn detect(&self, _frame: &VideoFrame) -> Result<Vec<Detection>> {
        Ok(vec![])
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FixedDetector;
    use super::*;
    use bytes::Bytes;

    fn frame() -> VideoFrame {
        VideoFrame::new(Bytes::from_static(b"frame"), 0)
    }

    #[tokio::test]
    async fn null_detector_reports_nothing() {
        let handle = DetectorHandle::new(Box::new(NullDetector));
        assert_eq!(handle.backend_name(), "null");
        assert!(handle.detect(&frame()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn swap_takes_effect_on_next_call() {
        let handle = DetectorHandle::new(Box::new(NullDetector));

        let detection = Detection {
            label: "cat".into(),
            score: 0.9,
            xmin: 0.0,
            ymin: 0.0,
            xmax: 0.5,
            ymax: 0.5,
        };
        handle.swap(Box::new(FixedDetector::new(vec![detection])));

        assert_eq!(handle.backend_name(), "fixed");
        let detections = handle.detect(&frame()).await.unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].label, "cat");
    }
}
