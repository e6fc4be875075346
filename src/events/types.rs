//! Session event types
//!
//! Defines the events delivered through a session's room. Wire tags and
//! payload field names are pinned for client compatibility.

use serde::Serialize;

use crate::detection::DetectionRecord;
use crate::metrics::MetricsSnapshot;
use crate::session::SessionState;

/// Event published to a session's room
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Per-frame detection result
    DetectionResult(DetectionRecord),
    /// Aggregated metrics snapshot
    MetricsUpdate(MetricsSnapshot),
    /// Session state transition
    SessionState { state: SessionState },
}
