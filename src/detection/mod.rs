//! Detection results and the per-track detection stage

pub mod frame;
pub mod stage;

pub use frame::VideoFrame;
pub use stage::DetectionStage;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// One labeled, scored, bounding-boxed object found in a single frame
///
/// Coordinates are normalized to `[0, 1]` with `xmin <= xmax` and
/// `ymin <= ymax`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub score: f64,
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl Detection {
    /// Validate label, score range and box geometry
    pub fn validate(&self) -> Result<()> {
        if self.label.is_empty() {
            return Err(AppError::InvalidInput("detection label is empty".into()));
        }
        if !(0.0..=1.0).contains(&self.score) {
            return Err(AppError::InvalidInput(format!(
                "detection score {} outside [0, 1]",
                self.score
            )));
        }
        let coords = [self.xmin, self.ymin, self.xmax, self.ymax];
        if coords.iter().any(|c| !(0.0..=1.0).contains(c)) {
            return Err(AppError::InvalidInput(
                "bounding box coordinates outside [0, 1]".into(),
            ));
        }
        if self.xmin > self.xmax || self.ymin > self.ymax {
            return Err(AppError::InvalidInput("bounding box is inverted".into()));
        }
        Ok(())
    }
}

/// Full per-frame detection result with correlation timestamps
///
/// Timestamps are unix milliseconds on the producer clock and must be
/// non-decreasing: `capture_ts <= recv_ts <= inference_ts`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionRecord {
    /// Frame sequence number, monotonic per session starting at 0
    pub frame_id: u64,
    pub capture_ts: i64,
    pub recv_ts: i64,
    pub inference_ts: i64,
    pub detections: Vec<Detection>,
}

impl DetectionRecord {
    /// Build a record, rejecting non-monotonic timestamps instead of
    /// silently reordering them
    pub fn new(
        frame_id: u64,
        capture_ts: i64,
        recv_ts: i64,
        inference_ts: i64,
        detections: Vec<Detection>,
    ) -> Result<Self> {
        if capture_ts > recv_ts || recv_ts > inference_ts {
            return Err(AppError::InvalidInput(format!(
                "timestamps out of order: capture={} recv={} inference={}",
                capture_ts, recv_ts, inference_ts
            )));
        }
        Ok(Self {
            frame_id,
            capture_ts,
            recv_ts,
            inference_ts,
            detections,
        })
    }

    /// Network-leg duration in milliseconds
    pub fn network_latency(&self) -> i64 {
        self.recv_ts - self.capture_ts
    }

    /// Model inference duration in milliseconds
    pub fn server_latency(&self) -> i64 {
        self.inference_ts - self.recv_ts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(score: f64) -> Detection {
        Detection {
            label: "person".into(),
            score,
            xmin: 0.1,
            ymin: 0.2,
            xmax: 0.5,
            ymax: 0.9,
        }
    }

    #[test]
    fn record_latency_round_trip() {
        let record = DetectionRecord::new(3, 1000, 1010, 1060, vec![person(0.9)]).unwrap();
        assert_eq!(record.network_latency(), 10);
        assert_eq!(record.server_latency(), 50);
    }

    #[test]
    fn record_rejects_decreasing_timestamps() {
        assert!(DetectionRecord::new(0, 1010, 1000, 1060, vec![]).is_err());
        assert!(DetectionRecord::new(0, 1000, 1060, 1010, vec![]).is_err());
    }

    #[test]
    fn record_accepts_equal_timestamps() {
        assert!(DetectionRecord::new(0, 1000, 1000, 1000, vec![]).is_ok());
    }

    #[test]
    fn detection_validation() {
        assert!(person(0.5).validate().is_ok());
        assert!(person(1.5).validate().is_err());

        let mut inverted = person(0.5);
        inverted.xmin = 0.9;
        assert!(inverted.validate().is_err());

        let mut unlabeled = person(0.5);
        unlabeled.label.clear();
        assert!(unlabeled.validate().is_err());
    }

    #[test]
    fn record_serializes_wire_field_names() {
        let record = DetectionRecord::new(1, 1000, 1010, 1060, vec![person(0.8)]).unwrap();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["frame_id"], 1);
        assert_eq!(json["capture_ts"], 1000);
        assert_eq!(json["recv_ts"], 1010);
        assert_eq!(json["inference_ts"], 1060);
        assert_eq!(json["detections"][0]["label"], "person");
        assert_eq!(json["detections"][0]["xmin"], 0.1);
    }
}
