//! Signaling types and request/response messages

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// SDP offer from client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SdpOffer {
    /// SDP content
    pub sdp: String,
    /// Description type, must be "offer"
    #[serde(rename = "type")]
    pub kind: String,
}

impl SdpOffer {
    pub fn new(sdp: impl Into<String>) -> Self {
        Self {
            sdp: sdp.into(),
            kind: "offer".to_string(),
        }
    }

    /// Reject absent or malformed payloads before any state is touched
    pub fn validate(&self) -> Result<()> {
        if self.sdp.trim().is_empty() {
            return Err(AppError::InvalidInput("offer SDP is empty".into()));
        }
        if self.kind != "offer" {
            return Err(AppError::InvalidInput(format!(
                "unexpected description type \"{}\"",
                self.kind
            )));
        }
        Ok(())
    }
}

/// SDP answer from server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SdpAnswer {
    /// SDP content
    pub sdp: String,
    /// Description type, always "answer"
    #[serde(rename = "type")]
    pub kind: String,
}

impl SdpAnswer {
    pub fn new(sdp: impl Into<String>) -> Self {
        Self {
            sdp: sdp.into(),
            kind: "answer".to_string(),
        }
    }
}

/// ICE candidate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceCandidate {
    /// Candidate string; empty signals end-of-candidates
    pub candidate: String,
    /// SDP mid (media ID)
    #[serde(rename = "sdpMid")]
    pub sdp_mid: Option<String>,
    /// SDP mline index
    #[serde(rename = "sdpMLineIndex")]
    pub sdp_mline_index: Option<u16>,
    /// Username fragment
    #[serde(rename = "usernameFragment")]
    pub username_fragment: Option<String>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_mline_index: None,
            username_fragment: None,
        }
    }

    /// An empty candidate string is the end-of-candidates signal
    pub fn is_end_of_candidates(&self) -> bool {
        self.candidate.trim().is_empty()
    }
}

/// Where detection runs for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessingMode {
    /// Inference runs on this server for every frame
    #[serde(rename = "server")]
    Server,
    /// Detection happens client-side; this server is a timestamp source only
    #[serde(rename = "client-assisted", alias = "wasm")]
    ClientAssisted,
}

impl Default for ProcessingMode {
    fn default() -> Self {
        Self::ClientAssisted
    }
}

impl std::fmt::Display for ProcessingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessingMode::Server => write!(f, "server"),
            ProcessingMode::ClientAssisted => write!(f, "client-assisted"),
        }
    }
}

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Identifier reserved, no peer handle yet
    New,
    /// Offer received, answer being produced
    Negotiating,
    /// Local and remote descriptions set, media flowing or imminent
    Active,
    /// Explicitly closed or transport-reported terminal state
    Closed,
    /// Negotiation or transport failure
    Failed,
}

impl SessionState {
    /// Terminal states accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::New => write!(f, "new"),
            SessionState::Negotiating => write!(f, "negotiating"),
            SessionState::Active => write!(f, "active"),
            SessionState::Closed => write!(f, "closed"),
            SessionState::Failed => write!(f, "failed"),
        }
    }
}

/// WebRTC offer request (from HTTP API)
#[derive(Debug, Clone, Deserialize)]
pub struct OfferRequest {
    /// Session identifier; generated when absent
    pub session_id: Option<String>,
    /// SDP offer
    pub offer: SdpOffer,
    /// Processing mode, defaults to client-assisted
    #[serde(default)]
    pub mode: ProcessingMode,
}

/// WebRTC answer response (from HTTP API)
#[derive(Debug, Clone, Serialize)]
pub struct AnswerResponse {
    /// SDP answer
    pub answer: SdpAnswer,
    /// Session identifier for this connection
    pub session_id: String,
}

/// ICE candidate request (trickle ICE)
#[derive(Debug, Clone, Deserialize)]
pub struct IceCandidateRequest {
    /// Session identifier
    pub session_id: String,
    /// Candidate; null signals end-of-candidates
    pub candidate: Option<IceCandidate>,
}

/// Close request
#[derive(Debug, Clone, Deserialize)]
pub struct CloseRequest {
    /// Session identifier
    pub session_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offer_validation_rejects_empty_sdp() {
        let offer = SdpOffer {
            sdp: "   ".into(),
            kind: "offer".into(),
        };
        assert!(offer.validate().is_err());
    }

    #[test]
    fn offer_validation_rejects_wrong_type() {
        let offer = SdpOffer {
            sdp: "v=0".into(),
            kind: "answer".into(),
        };
        assert!(offer.validate().is_err());
        assert!(SdpOffer::new("v=0").validate().is_ok());
    }

    #[test]
    fn mode_accepts_legacy_wasm_alias() {
        let mode: ProcessingMode = serde_json::from_str("\"wasm\"").unwrap();
        assert_eq!(mode, ProcessingMode::ClientAssisted);

        let mode: ProcessingMode = serde_json::from_str("\"client-assisted\"").unwrap();
        assert_eq!(mode, ProcessingMode::ClientAssisted);

        let mode: ProcessingMode = serde_json::from_str("\"server\"").unwrap();
        assert_eq!(mode, ProcessingMode::Server);
    }

    #[test]
    fn terminal_states() {
        assert!(SessionState::Closed.is_terminal());
        assert!(SessionState::Failed.is_terminal());
        assert!(!SessionState::Active.is_terminal());
        assert!(!SessionState::Negotiating.is_terminal());
    }

    #[test]
    fn end_of_candidates_detection() {
        assert!(IceCandidate::new("").is_end_of_candidates());
        assert!(!IceCandidate::new("candidate:1 1 udp ...").is_end_of_candidates());
    }

    #[test]
    fn offer_request_defaults_mode() {
        let req: OfferRequest = serde_json::from_str(
            r#"{"session_id":"s1","offer":{"sdp":"v=0","type":"offer"}}"#,
        )
        .unwrap();
        assert_eq!(req.mode, ProcessingMode::ClientAssisted);
        assert_eq!(req.session_id.as_deref(), Some("s1"));
    }

    #[test]
    fn answer_response_wire_shape() {
        let response = AnswerResponse {
            answer: SdpAnswer::new("v=0"),
            session_id: "s1".into(),
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["answer"]["type"], "answer");
        assert_eq!(json["answer"]["sdp"], "v=0");
        assert_eq!(json["session_id"], "s1");
    }
}
