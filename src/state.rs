use std::sync::Arc;

use tokio::sync::broadcast;

use crate::config::AppConfig;
use crate::events::RoomBus;
use crate::inference::DetectorHandle;
use crate::session::{SessionRegistry, SignalingController};

/// Application-wide state shared across handlers
///
/// The registry is the single owner of sessions; the controller is the only
/// entry point for signaling mutations. Handlers never touch the webrtc
/// stack directly.
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Session registry
    pub registry: Arc<SessionRegistry>,
    /// Signaling controller
    pub controller: Arc<SignalingController>,
    /// Per-session event rooms
    pub events: Arc<RoomBus>,
    /// Active inference backend
    pub detector: Arc<DetectorHandle>,
    /// Shutdown signal sender
    pub shutdown_tx: broadcast::Sender<()>,
}

impl AppState {
    /// Create new application state
    pub fn new(
        config: AppConfig,
        registry: Arc<SessionRegistry>,
        controller: Arc<SignalingController>,
        events: Arc<RoomBus>,
        detector: Arc<DetectorHandle>,
        shutdown_tx: broadcast::Sender<()>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            registry,
            controller,
            events,
            detector,
            shutdown_tx,
        })
    }

    /// Subscribe to shutdown signal
    pub fn shutdown_signal(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }
}
