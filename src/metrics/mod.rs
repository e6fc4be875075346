//! Per-session performance metrics
//!
//! Consumes detection records, maintains a bounded rolling latency window
//! and produces the metric snapshots broadcast to clients.

pub mod window;

pub use window::RollingWindow;

use std::time::Instant;

use serde::Serialize;

use crate::detection::DetectionRecord;

/// Current wall-clock time in unix milliseconds
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Aggregated metrics snapshot for one session
///
/// Serialized field names are pinned for client compatibility; do not rename.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    /// Model inference duration (ms)
    pub model_inference_time: f64,
    /// End-to-end duration (ms)
    pub total_time: f64,
    /// End-to-end minus inference (ms)
    pub overhead_time: f64,
    /// Frames processed per second since session start
    #[serde(rename = "modelFPS")]
    pub model_fps: f64,
    /// Rolling median of end-to-end latency (ms)
    pub e2e_latency_median: f64,
    /// Rolling p95 of end-to-end latency (ms)
    pub e2e_latency_p95: f64,
    /// Inference-leg duration (ms)
    pub server_latency: f64,
    /// Network-leg duration (ms)
    pub network_latency: f64,
    /// Frames processed per second since session start
    #[serde(rename = "processedFPS")]
    pub processed_fps: f64,
}

/// Rolling metrics state for a single session
#[derive(Debug)]
pub struct SessionMetrics {
    started_at: Instant,
    frames: u64,
    window: RollingWindow,
}

impl SessionMetrics {
    pub fn new(window_capacity: usize) -> Self {
        Self {
            started_at: Instant::now(),
            frames: 0,
            window: RollingWindow::new(window_capacity),
        }
    }

    /// Processed-frame count so far
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Fold one detection record into the rolling state and snapshot it
    ///
    /// `now` is the observation wall-clock time in unix ms; end-to-end
    /// latency is measured against the record's capture timestamp.
    pub fn observe(&mut self, record: &DetectionRecord, now: i64) -> MetricsSnapshot {
        let e2e = (now - record.capture_ts).max(0) as f64;
        let server = record.server_latency() as f64;
        let network = record.network_latency() as f64;

        self.frames += 1;
        self.window.push(e2e);

        // Long-run average since session start, not an instantaneous rate
        let elapsed = self.started_at.elapsed().as_secs_f64();
        let fps = if elapsed > 0.0 {
            self.frames as f64 / elapsed
        } else {
            0.0
        };

        MetricsSnapshot {
            model_inference_time: server,
            total_time: e2e,
            overhead_time: e2e - server,
            model_fps: fps,
            e2e_latency_median: self.window.median(),
            e2e_latency_p95: self.window.p95(),
            server_latency: server,
            network_latency: network,
            processed_fps: fps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(frame_id: u64, capture: i64, recv: i64, inference: i64) -> DetectionRecord {
        DetectionRecord::new(frame_id, capture, recv, inference, vec![]).unwrap()
    }

    #[test]
    fn snapshot_derives_latency_legs() {
        let mut metrics = SessionMetrics::new(16);
        let snapshot = metrics.observe(&record(0, 1000, 1010, 1060), 1100);

        assert_eq!(snapshot.network_latency, 10.0);
        assert_eq!(snapshot.server_latency, 50.0);
        assert_eq!(snapshot.model_inference_time, 50.0);
        assert_eq!(snapshot.total_time, 100.0);
        assert_eq!(snapshot.overhead_time, 50.0);
        assert!(snapshot.processed_fps >= 0.0);
    }

    #[test]
    fn first_sample_is_both_median_and_p95() {
        let mut metrics = SessionMetrics::new(16);
        let snapshot = metrics.observe(&record(0, 1000, 1000, 1000), 1080);
        assert_eq!(snapshot.e2e_latency_median, 80.0);
        assert_eq!(snapshot.e2e_latency_p95, 80.0);
    }

    #[test]
    fn window_statistics_reflect_only_retained_samples() {
        let mut metrics = SessionMetrics::new(2);
        metrics.observe(&record(0, 0, 0, 0), 500);
        metrics.observe(&record(1, 0, 0, 0), 100);
        let snapshot = metrics.observe(&record(2, 0, 0, 0), 200);

        // The 500ms sample was evicted; window is {100, 200}
        assert!(snapshot.e2e_latency_p95 <= 200.0);
        assert_eq!(snapshot.e2e_latency_median, 200.0);
    }

    #[test]
    fn frame_count_is_cumulative() {
        let mut metrics = SessionMetrics::new(4);
        for i in 0..10 {
            metrics.observe(&record(i, 0, 0, 0), 10);
        }
        assert_eq!(metrics.frames(), 10);
    }

    #[test]
    fn clock_skew_clamps_e2e_to_zero() {
        let mut metrics = SessionMetrics::new(4);
        // Observation time before capture_ts must not produce negative e2e
        let snapshot = metrics.observe(&record(0, 2000, 2000, 2000), 1000);
        assert_eq!(snapshot.total_time, 0.0);
    }

    #[test]
    fn snapshot_serializes_pinned_field_names() {
        let mut metrics = SessionMetrics::new(4);
        let snapshot = metrics.observe(&record(0, 1000, 1010, 1060), 1100);
        let json = serde_json::to_value(&snapshot).unwrap();

        for key in [
            "modelInferenceTime",
            "totalTime",
            "overheadTime",
            "modelFPS",
            "e2eLatencyMedian",
            "e2eLatencyP95",
            "serverLatency",
            "networkLatency",
            "processedFPS",
        ] {
            assert!(json.get(key).is_some(), "missing field {}", key);
        }
    }
}
