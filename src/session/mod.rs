//! Session lifecycle: registry, signaling controller and peer wrapper

pub mod controller;
pub mod peer;
pub mod registry;
pub mod signaling;

pub use controller::SignalingController;
pub use peer::PeerHandle;
pub use registry::{Session, SessionInfo, SessionRegistry};
pub use signaling::{
    AnswerResponse, CloseRequest, IceCandidate, IceCandidateRequest, OfferRequest, ProcessingMode,
    SdpAnswer, SdpOffer, SessionState,
};
