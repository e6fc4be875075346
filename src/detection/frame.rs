//! Video frame data structures

use bytes::Bytes;

use crate::metrics::now_ms;

/// A video frame observed on a session's media track
///
/// Frames arrive as depacketized access units from the WebRTC transport; the
/// payload is opaque to this crate and handed to the inference capability
/// as-is. `capture_ts` is the arrival wall-clock time in unix milliseconds.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Raw frame data
    data: Bytes,
    /// Frame sequence number
    pub sequence: u64,
    /// Arrival wall-clock timestamp (unix ms)
    pub capture_ts: i64,
}

impl VideoFrame {
    /// Create a new video frame stamped with the current wall-clock time
    pub fn new(data: Bytes, sequence: u64) -> Self {
        Self {
            data,
            sequence,
            capture_ts: now_ms(),
        }
    }

    /// Create a frame with an explicit capture timestamp
    pub fn with_capture_ts(data: Bytes, sequence: u64, capture_ts: i64) -> Self {
        Self {
            data,
            sequence,
            capture_ts,
        }
    }

    /// Get frame data as bytes slice
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Get frame data as Bytes (cheap clone)
    pub fn data_bytes(&self) -> Bytes {
        self.data.clone()
    }

    /// Get data length
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if frame is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_keeps_payload_and_sequence() {
        let frame = VideoFrame::new(Bytes::from_static(b"au"), 7);
        assert_eq!(frame.data(), b"au");
        assert_eq!(frame.sequence, 7);
        assert!(frame.capture_ts > 0);
    }

    #[test]
    fn explicit_capture_ts_is_preserved() {
        let frame = VideoFrame::with_capture_ts(Bytes::new(), 0, 1000);
        assert_eq!(frame.capture_ts, 1000);
        assert!(frame.is_empty());
    }
}
