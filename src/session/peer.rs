//! WebRTC peer connection wrapper
//!
//! Thin handle over the webrtc crate's `RTCPeerConnection`: codec/interceptor
//! setup, offer/answer application, trickle ICE and transport state watching.
//! The peer connection itself is owned by the webrtc stack; sessions hold
//! this handle for close and state queries.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_VP8};
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::{OnTrackHdlrFn, RTCPeerConnection};
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
use webrtc::track::track_local::TrackLocal;

use super::signaling::{IceCandidate, SdpAnswer, SdpOffer};
use crate::config::StreamConfig;
use crate::error::{AppError, Result};

/// Peer connection handle for one session
pub struct PeerHandle {
    /// Session ID
    session_id: String,
    /// WebRTC peer connection
    pc: Arc<RTCPeerConnection>,
    /// Local track echoing the observed frames back to the client
    forward_track: Arc<TrackLocalStaticRTP>,
    /// Transport state receiver
    state_rx: watch::Receiver<RTCPeerConnectionState>,
}

impl PeerHandle {
    /// Create a new peer connection with default codecs and interceptors
    pub async fn new(config: &StreamConfig, session_id: String) -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| AppError::Transport(format!("Failed to register codecs: {}", e)))?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)
            .map_err(|e| AppError::Transport(format!("Failed to register interceptors: {}", e)))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        // Build ICE servers
        let mut ice_servers = vec![];

        for stun_url in &config.stun_servers {
            ice_servers.push(RTCIceServer {
                urls: vec![stun_url.clone()],
                ..Default::default()
            });
        }

        for turn in &config.turn_servers {
            ice_servers.push(RTCIceServer {
                urls: turn.urls.clone(),
                username: turn.username.clone(),
                credential: turn.credential.clone(),
                ..Default::default()
            });
        }

        let rtc_config = RTCConfiguration {
            ice_servers,
            ..Default::default()
        };

        let pc = api
            .new_peer_connection(rtc_config)
            .await
            .map_err(|e| AppError::Transport(format!("Failed to create peer connection: {}", e)))?;
        let pc = Arc::new(pc);

        // The observed frames are forwarded back on this track; it must be
        // negotiated with the answer, so it is added before the offer is
        // applied.
        let forward_track = Arc::new(TrackLocalStaticRTP::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_owned(),
                ..Default::default()
            },
            "video".to_owned(),
            "webrtc-vision".to_owned(),
        ));

        pc.add_track(Arc::clone(&forward_track) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(|e| AppError::Transport(format!("Failed to add forward track: {}", e)))?;

        // Transport state channel
        let (state_tx, state_rx) = watch::channel(RTCPeerConnectionState::New);
        {
            let session_id = session_id.clone();
            pc.on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
                let session_id = session_id.clone();
                let state_tx = state_tx.clone();
                Box::pin(async move {
                    info!("Peer {} connection state: {}", session_id, s);
                    let _ = state_tx.send(s);
                })
            }));
        }

        Ok(Self {
            session_id,
            pc,
            forward_track,
            state_rx,
        })
    }

    /// Install the incoming-track handler
    pub fn on_track(&self, handler: OnTrackHdlrFn) {
        self.pc.on_track(handler);
    }

    /// Track used to forward observed frames back to the client
    pub fn forward_track(&self) -> Arc<TrackLocalStaticRTP> {
        Arc::clone(&self.forward_track)
    }

    /// Apply a remote offer and produce the local answer
    ///
    /// Waits for ICE gathering to complete so the returned SDP carries the
    /// server's candidates; the caller bounds the whole exchange with the
    /// negotiation timeout.
    pub async fn apply_offer(&self, offer: SdpOffer) -> Result<SdpAnswer> {
        let remote = RTCSessionDescription::offer(offer.sdp)
            .map_err(|e| AppError::InvalidInput(format!("Invalid SDP offer: {}", e)))?;

        self.pc
            .set_remote_description(remote)
            .await
            .map_err(|e| AppError::Transport(format!("Failed to set remote description: {}", e)))?;

        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(|e| AppError::Transport(format!("Failed to create answer: {}", e)))?;

        let mut gather_complete = self.pc.gathering_complete_promise().await;

        self.pc
            .set_local_description(answer)
            .await
            .map_err(|e| AppError::Transport(format!("Failed to set local description: {}", e)))?;

        let _ = gather_complete.recv().await;

        let local = self
            .pc
            .local_description()
            .await
            .ok_or_else(|| AppError::Transport("Local description missing".into()))?;

        Ok(SdpAnswer::new(local.sdp))
    }

    /// Add a trickled ICE candidate
    pub async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: candidate.username_fragment,
        };

        self.pc
            .add_ice_candidate(init)
            .await
            .map_err(|e| AppError::Transport(format!("Failed to add ICE candidate: {}", e)))?;

        Ok(())
    }

    /// Current transport state
    pub fn connection_state(&self) -> RTCPeerConnectionState {
        *self.state_rx.borrow()
    }

    /// Subscribe to transport state changes
    pub fn state_watch(&self) -> watch::Receiver<RTCPeerConnectionState> {
        self.state_rx.clone()
    }

    /// Close the connection
    pub async fn close(&self) -> Result<()> {
        debug!("Closing peer connection for session {}", self.session_id);
        self.pc
            .close()
            .await
            .map_err(|e| AppError::Transport(format!("Failed to close peer connection: {}", e)))?;
        Ok(())
    }

    /// Get session ID
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}
