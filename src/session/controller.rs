//! Signaling controller
//!
//! Drives the session state machine (`New -> Negotiating -> Active ->
//! Closed`, with `Failed` terminal from negotiation or transport errors)
//! from the public offer/ICE/close operations and from transport callbacks.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;

use super::peer::PeerHandle;
use super::registry::SessionRegistry;
use super::signaling::{
    AnswerResponse, IceCandidateRequest, OfferRequest, SdpAnswer, SdpOffer, SessionState,
};
use super::Session;
use crate::config::StreamConfig;
use crate::detection::DetectionStage;
use crate::error::{AppError, Result};
use crate::events::{RoomBus, SessionEvent};
use crate::inference::DetectorHandle;

/// Public signaling operations over the session registry
pub struct SignalingController {
    registry: Arc<SessionRegistry>,
    events: Arc<RoomBus>,
    detector: Arc<DetectorHandle>,
    stream_config: StreamConfig,
    negotiation_timeout: Duration,
}

impl SignalingController {
    pub fn new(
        registry: Arc<SessionRegistry>,
        events: Arc<RoomBus>,
        detector: Arc<DetectorHandle>,
        stream_config: StreamConfig,
        negotiation_timeout: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            events,
            detector,
            stream_config,
            negotiation_timeout,
        })
    }

    /// Handle a client offer and produce the local answer
    ///
    /// Malformed offers are rejected before the registry is touched; a live
    /// session under the same id is a conflict. Negotiation is bounded: a
    /// session that cannot produce an answer in time transitions to failed
    /// instead of hanging.
    pub async fn handle_offer(&self, request: OfferRequest) -> Result<AnswerResponse> {
        request.offer.validate()?;

        let session = self
            .registry
            .create(request.session_id, request.mode)
            .await?;
        let session_id = session.id.clone();

        let negotiated = tokio::time::timeout(
            self.negotiation_timeout,
            self.negotiate(&session, request.offer),
        )
        .await;

        match negotiated {
            Ok(Ok(answer)) => {
                // Both descriptions are set once the answer exists
                session.set_state(SessionState::Active);
                self.events.publish(
                    &session_id,
                    SessionEvent::SessionState {
                        state: SessionState::Active,
                    },
                );
                Ok(AnswerResponse {
                    answer,
                    session_id,
                })
            }
            Ok(Err(e)) => {
                self.teardown(&session_id, SessionState::Failed).await;
                Err(e)
            }
            Err(_) => {
                warn!("Negotiation timed out for session {}", session_id);
                self.teardown(&session_id, SessionState::Failed).await;
                Err(AppError::Transport(format!(
                    "negotiation timed out after {:?}",
                    self.negotiation_timeout
                )))
            }
        }
    }

    /// Add a trickled ICE candidate to a session
    ///
    /// An absent or empty candidate is the end-of-candidates signal and a
    /// valid no-op.
    pub async fn handle_ice_candidate(&self, request: IceCandidateRequest) -> Result<()> {
        let session = self.registry.get(&request.session_id).await?;

        let candidate = match request.candidate {
            Some(c) if !c.is_end_of_candidates() => c,
            _ => {
                debug!(
                    "End of candidates for session {}",
                    request.session_id
                );
                return Ok(());
            }
        };

        match session.peer() {
            Some(peer) => peer.add_ice_candidate(candidate).await,
            None => {
                // Candidate raced ahead of the offer answer; nothing to add
                // it to yet
                debug!(
                    "Dropping early candidate for session {}",
                    request.session_id
                );
                Ok(())
            }
        }
    }

    /// Close a session
    ///
    /// Idempotent: closing an already-closed or unknown session succeeds, to
    /// tolerate duplicate teardown signals from network retries.
    pub async fn close(&self, session_id: &str) -> Result<()> {
        self.teardown(session_id, SessionState::Closed).await;
        Ok(())
    }

    /// Sweep sessions whose transport reached a terminal state
    pub async fn sweep(&self) {
        for session_id in self.registry.cleanup_stale().await {
            self.events.drop_room(&session_id);
        }
    }

    async fn negotiate(&self, session: &Arc<Session>, offer: SdpOffer) -> Result<SdpAnswer> {
        let peer = Arc::new(
            PeerHandle::new(&self.stream_config, session.id.clone()).await?,
        );
        session.set_peer(Arc::clone(&peer));
        session.set_state(SessionState::Negotiating);

        self.install_track_handler(session, &peer);
        self.watch_transport(session.id.clone(), &peer);

        peer.apply_offer(offer).await
    }

    /// Attach the detection stage when the first video track arrives
    ///
    /// Additional video tracks on the same session are ignored: the stage
    /// slot accepts exactly one occupant.
    fn install_track_handler(&self, session: &Arc<Session>, peer: &Arc<PeerHandle>) {
        let session = Arc::clone(session);
        let detector = Arc::clone(&self.detector);
        let events = Arc::clone(&self.events);
        let forward = peer.forward_track();

        peer.on_track(Box::new(move |track, _receiver, _transceiver| {
            let session = Arc::clone(&session);
            let detector = Arc::clone(&detector);
            let events = Arc::clone(&events);
            let forward = Arc::clone(&forward);

            Box::pin(async move {
                if track.kind() != RTPCodecType::Video {
                    debug!("Ignoring non-video track for session {}", session.id);
                    return;
                }

                let stage = DetectionStage::spawn(
                    Arc::clone(&session),
                    track,
                    forward,
                    detector,
                    events,
                );

                match session.attach_stage(stage) {
                    Ok(()) => info!("Detection stage attached for session {}", session.id),
                    Err(e) => debug!(
                        "Ignoring additional video track for session {}: {}",
                        session.id, e
                    ),
                }
            })
        }));
    }

    /// Mirror transport-reported terminal states into session teardown
    fn watch_transport(&self, session_id: String, peer: &Arc<PeerHandle>) {
        let registry = Arc::clone(&self.registry);
        let events = Arc::clone(&self.events);
        let mut state_rx = peer.state_watch();

        tokio::spawn(async move {
            while state_rx.changed().await.is_ok() {
                let transport = *state_rx.borrow();
                match transport {
                    RTCPeerConnectionState::Failed => {
                        warn!("Transport failed for session {}", session_id);
                        teardown(&registry, &events, &session_id, SessionState::Failed).await;
                        break;
                    }
                    RTCPeerConnectionState::Closed | RTCPeerConnectionState::Disconnected => {
                        teardown(&registry, &events, &session_id, SessionState::Closed).await;
                        break;
                    }
                    _ => {}
                }
            }
        });
    }

    async fn teardown(&self, session_id: &str, final_state: SessionState) {
        teardown(&self.registry, &self.events, session_id, final_state).await;
    }
}

/// Remove a session and notify its room
///
/// Frame workers are cancelled inside `remove` before the terminal state
/// event goes out, so no detection result can follow it.
async fn teardown(
    registry: &Arc<SessionRegistry>,
    events: &Arc<RoomBus>,
    session_id: &str,
    final_state: SessionState,
) {
    match registry.remove(session_id, final_state).await {
        Ok(session) => {
            events.publish(
                session_id,
                SessionEvent::SessionState {
                    state: session.state(),
                },
            );
        }
        Err(_) => {
            debug!("Teardown for unknown session {} ignored", session_id);
        }
    }
    events.drop_room(session_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::NullDetector;
    use crate::session::signaling::ProcessingMode;
    use webrtc::api::media_engine::MediaEngine;
    use webrtc::api::APIBuilder;
    use webrtc::peer_connection::configuration::RTCConfiguration;

    /// Produce a real client-side offer with a video send section
    async fn client_offer_sdp() -> String {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs().unwrap();
        let api = APIBuilder::new().with_media_engine(media_engine).build();
        let pc = api
            .new_peer_connection(RTCConfiguration::default())
            .await
            .unwrap();
        pc.add_transceiver_from_kind(RTPCodecType::Video, None)
            .await
            .unwrap();
        let offer = pc.create_offer(None).await.unwrap();
        let sdp = offer.sdp.clone();
        pc.close().await.unwrap();
        sdp
    }

    fn controller_with_registry() -> (Arc<SignalingController>, Arc<SessionRegistry>) {
        let registry = Arc::new(SessionRegistry::new(8, 16));
        let events = Arc::new(RoomBus::new());
        let detector = Arc::new(DetectorHandle::new(Box::new(NullDetector)));
        let controller = SignalingController::new(
            Arc::clone(&registry),
            events,
            detector,
            StreamConfig::default(),
            Duration::from_secs(5),
        );
        (controller, registry)
    }

    fn offer_request(session_id: &str, sdp: &str) -> OfferRequest {
        OfferRequest {
            session_id: Some(session_id.to_string()),
            offer: SdpOffer {
                sdp: sdp.to_string(),
                kind: "offer".to_string(),
            },
            mode: ProcessingMode::Server,
        }
    }

    #[tokio::test]
    async fn valid_offer_reaches_active_and_returns_an_answer() {
        let (controller, registry) = controller_with_registry();
        let sdp = client_offer_sdp().await;

        let response = controller
            .handle_offer(offer_request("s1", &sdp))
            .await
            .unwrap();
        assert_eq!(response.session_id, "s1");
        assert_eq!(response.answer.kind, "answer");
        assert!(!response.answer.sdp.is_empty());
        assert_eq!(
            registry.get("s1").await.unwrap().state(),
            SessionState::Active
        );

        // A second offer on the still-active identifier conflicts
        let err = controller
            .handle_offer(offer_request("s1", &sdp))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        controller.close("s1").await.unwrap();
        assert!(registry.get("s1").await.is_err());
    }

    #[tokio::test]
    async fn empty_offer_is_rejected_without_touching_the_registry() {
        let (controller, registry) = controller_with_registry();

        let err = controller
            .handle_offer(offer_request("s1", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
        assert_eq!(registry.count().await, 0);
    }

    #[tokio::test]
    async fn offer_for_live_session_conflicts() {
        let (controller, registry) = controller_with_registry();
        let existing = registry
            .create(Some("s1".into()), ProcessingMode::Server)
            .await
            .unwrap();
        existing.set_state(SessionState::Negotiating);

        let err = controller
            .handle_offer(offer_request("s1", "v=0"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        // The live session is untouched
        assert_eq!(registry.get("s1").await.unwrap().state(), SessionState::Negotiating);
    }

    #[tokio::test]
    async fn unparseable_sdp_fails_and_cleans_up() {
        let (controller, registry) = controller_with_registry();

        // Non-empty but not a valid session description
        let err = controller
            .handle_offer(offer_request("s1", "this is not sdp"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::InvalidInput(_) | AppError::Transport(_)
        ));
        // The failed session does not linger in the registry
        assert!(registry.get("s1").await.is_err());
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let (controller, registry) = controller_with_registry();
        registry
            .create(Some("s1".into()), ProcessingMode::Server)
            .await
            .unwrap();

        assert!(controller.close("s1").await.is_ok());
        assert!(controller.close("s1").await.is_ok());
        assert!(controller.close("never-existed").await.is_ok());
        assert_eq!(registry.count().await, 0);
    }

    #[tokio::test]
    async fn ice_candidate_for_unknown_session_is_not_found() {
        let (controller, _) = controller_with_registry();

        let err = controller
            .handle_ice_candidate(IceCandidateRequest {
                session_id: "missing".into(),
                candidate: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn null_candidate_is_a_valid_noop() {
        let (controller, registry) = controller_with_registry();
        registry
            .create(Some("s1".into()), ProcessingMode::Server)
            .await
            .unwrap();

        assert!(controller
            .handle_ice_candidate(IceCandidateRequest {
                session_id: "s1".into(),
                candidate: None,
            })
            .await
            .is_ok());

        assert!(controller
            .handle_ice_candidate(IceCandidateRequest {
                session_id: "s1".into(),
                candidate: Some(super::super::signaling::IceCandidate::new("")),
            })
            .await
            .is_ok());
    }
}
