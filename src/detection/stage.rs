//! Per-track detection stage
//!
//! Observes every frame flowing through a session's video track, runs the
//! inference capability on it and publishes the resulting detection record
//! and metrics snapshot to the session's room. The original RTP stream is
//! forwarded unmodified; observation never alters or drops media.
//!
//! Backpressure: a single latest-frame slot sits between the track reader
//! and the inference worker. While inference runs, newer frames overwrite
//! the slot instead of queuing, so sustained inference latency sheds frames
//! rather than growing memory.

use std::sync::Arc;

use bytes::BytesMut;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
use webrtc::track::track_local::TrackLocalWriter;
use webrtc::track::track_remote::TrackRemote;

use super::{DetectionRecord, VideoFrame};
use crate::events::{RoomBus, SessionEvent};
use crate::inference::DetectorHandle;
use crate::metrics::now_ms;
use crate::session::{ProcessingMode, Session};

/// Single-frame handoff between the track reader and the inference worker
struct FrameSlot {
    slot: parking_lot::Mutex<Option<VideoFrame>>,
    notify: Notify,
}

impl FrameSlot {
    fn new() -> Self {
        Self {
            slot: parking_lot::Mutex::new(None),
            notify: Notify::new(),
        }
    }

    /// Deposit a frame; returns the frame it displaced, if any
    fn put(&self, frame: VideoFrame) -> Option<VideoFrame> {
        let displaced = self.slot.lock().replace(frame);
        self.notify.notify_one();
        displaced
    }

    fn take(&self) -> Option<VideoFrame> {
        self.slot.lock().take()
    }
}

/// Turns observed frames into detection records
///
/// Split out from the worker task so frame semantics are testable without a
/// live peer connection.
pub(crate) struct FrameProcessor {
    mode: ProcessingMode,
    detector: Arc<DetectorHandle>,
    next_frame_id: u64,
}

impl FrameProcessor {
    pub(crate) fn new(mode: ProcessingMode, detector: Arc<DetectorHandle>) -> Self {
        Self {
            mode,
            detector,
            next_frame_id: 0,
        }
    }

    /// Process one frame into a detection record
    ///
    /// `recv_ts` and `inference_ts` are measured around the detector call.
    /// An inference failure degrades to an empty detection list; only a
    /// timestamp-order violation (clock regression) drops the record, and
    /// then only that single frame.
    pub(crate) async fn process(&mut self, frame: &VideoFrame) -> Option<DetectionRecord> {
        let recv_ts = now_ms();

        let detections = match self.mode {
            ProcessingMode::Server => match self.detector.detect(frame).await {
                Ok(detections) => detections,
                Err(e) => {
                    warn!("Inference failed, reporting empty detections: {}", e);
                    vec![]
                }
            },
            // Detection happens client-side; this stage only timestamps
            ProcessingMode::ClientAssisted => vec![],
        };

        let inference_ts = now_ms();

        match DetectionRecord::new(
            self.next_frame_id,
            frame.capture_ts,
            recv_ts,
            inference_ts,
            detections,
        ) {
            Ok(record) => {
                self.next_frame_id += 1;
                Some(record)
            }
            Err(e) => {
                warn!("Dropping frame record: {}", e);
                None
            }
        }
    }
}

/// Detection stage bound to one session's video track
pub struct DetectionStage {
    session_id: String,
    reader: JoinHandle<()>,
    worker: JoinHandle<()>,
}

impl DetectionStage {
    /// Spawn the reader and worker tasks for a remote video track
    pub fn spawn(
        session: Arc<Session>,
        track: Arc<TrackRemote>,
        forward: Arc<TrackLocalStaticRTP>,
        detector: Arc<DetectorHandle>,
        events: Arc<RoomBus>,
    ) -> Self {
        let session_id = session.id.clone();
        let cancel = session.cancel_token();
        let slot = Arc::new(FrameSlot::new());

        let reader = tokio::spawn(read_loop(
            session_id.clone(),
            track,
            forward,
            Arc::clone(&slot),
            cancel.clone(),
        ));

        let processor = FrameProcessor::new(session.mode, detector);
        let worker = tokio::spawn(detect_loop(session, processor, slot, events, cancel));

        Self {
            session_id,
            reader,
            worker,
        }
    }

    /// Stop both tasks; safe to call during teardown after cancellation
    pub fn abort(&self) {
        debug!("Aborting detection stage for session {}", self.session_id);
        self.reader.abort();
        self.worker.abort();
    }
}

#[cfg(test)]
impl DetectionStage {
    /// Stage with inert tasks, for registry tests that need no live track
    pub(crate) fn inert(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            reader: tokio::spawn(async {}),
            worker: tokio::spawn(async {}),
        }
    }
}

/// Read RTP from the remote track, forward it unmodified and assemble
/// access units into frames for the worker
async fn read_loop(
    session_id: String,
    track: Arc<TrackRemote>,
    forward: Arc<TrackLocalStaticRTP>,
    slot: Arc<FrameSlot>,
    cancel: CancellationToken,
) {
    let mut assembly = BytesMut::new();
    let mut sequence: u64 = 0;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            result = track.read_rtp() => {
                let (packet, _) = match result {
                    Ok(pair) => pair,
                    Err(e) => {
                        debug!("Track ended for session {}: {}", session_id, e);
                        break;
                    }
                };

                // Forward before observing; the downstream stream must not
                // depend on inference keeping up
                if let Err(e) = forward.write_rtp(&packet).await {
                    debug!("Forwarding RTP failed for session {}: {}", session_id, e);
                }

                assembly.extend_from_slice(&packet.payload);
                if packet.header.marker {
                    let data = assembly.split().freeze();
                    if !data.is_empty() {
                        let frame = VideoFrame::new(data, sequence);
                        sequence += 1;
                        if slot.put(frame).is_some() {
                            debug!("Shedding frame for session {} (inference busy)", session_id);
                        }
                    }
                }
            }
        }
    }
}

/// Consume frames from the slot, run detection and publish results
async fn detect_loop(
    session: Arc<Session>,
    mut processor: FrameProcessor,
    slot: Arc<FrameSlot>,
    events: Arc<RoomBus>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = slot.notify.notified() => {}
        }

        while let Some(frame) = slot.take() {
            let record = match processor.process(&frame).await {
                Some(record) => record,
                None => continue,
            };

            // A result that lost the race with close is discarded, never
            // broadcast
            if cancel.is_cancelled() {
                return;
            }

            let snapshot = session.observe(&record, now_ms());
            events.publish(&session.id, SessionEvent::DetectionResult(record));
            events.publish(&session.id, SessionEvent::MetricsUpdate(snapshot));
        }
    }
}
