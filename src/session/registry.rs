//! Session registry
//!
//! Thread-safe mapping of session identifier to session state. The registry
//! is the single owner of sessions; removal unconditionally releases the
//! owned detection stage and peer handle.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{watch, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::peer::PeerHandle;
use super::signaling::{ProcessingMode, SessionState};
use crate::detection::{DetectionRecord, DetectionStage};
use crate::error::{AppError, Result};
use crate::metrics::{MetricsSnapshot, SessionMetrics};

/// One negotiated real-time video exchange with a client
pub struct Session {
    /// Session identifier
    pub id: String,
    /// Processing mode
    pub mode: ProcessingMode,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Peer handle, set once negotiation starts
    peer: Mutex<Option<Arc<PeerHandle>>>,
    /// Detection stage, attached on the first video track only
    stage: Mutex<Option<DetectionStage>>,
    /// Rolling metrics state
    metrics: Mutex<SessionMetrics>,
    /// Lifecycle state
    state_tx: watch::Sender<SessionState>,
    state_rx: watch::Receiver<SessionState>,
    /// Cancelled on close; stops frame workers before teardown
    cancel: CancellationToken,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .field("created_at", &self.created_at)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(id: String, mode: ProcessingMode, window_capacity: usize) -> Arc<Self> {
        let (state_tx, state_rx) = watch::channel(SessionState::New);
        Arc::new(Self {
            id,
            mode,
            created_at: Utc::now(),
            peer: Mutex::new(None),
            stage: Mutex::new(None),
            metrics: Mutex::new(SessionMetrics::new(window_capacity)),
            state_tx,
            state_rx,
            cancel: CancellationToken::new(),
        })
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// Subscribe to lifecycle state changes
    pub fn state_watch(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    /// Transition to a new state
    ///
    /// Terminal states are sticky: once closed or failed, further
    /// transitions are ignored. Returns whether the transition happened.
    pub fn set_state(&self, next: SessionState) -> bool {
        let current = self.state();
        if current.is_terminal() || current == next {
            return false;
        }
        info!("Session {} state: {} -> {}", self.id, current, next);
        let _ = self.state_tx.send(next);
        true
    }

    /// Install the peer handle (once, at negotiation start)
    pub fn set_peer(&self, peer: Arc<PeerHandle>) {
        *self.peer.lock() = Some(peer);
    }

    /// Peer handle, if negotiation has started
    pub fn peer(&self) -> Option<Arc<PeerHandle>> {
        self.peer.lock().clone()
    }

    /// Attach the detection stage for the first observed video track
    ///
    /// At most one stage per session; a second video track is rejected so
    /// the caller can ignore it.
    pub fn attach_stage(&self, stage: DetectionStage) -> Result<()> {
        let mut slot = self.stage.lock();
        if slot.is_some() {
            // The redundant stage already has running tasks; stop them
            stage.abort();
            return Err(AppError::Conflict(format!(
                "session {} already has a detection stage",
                self.id
            )));
        }
        // A session being torn down must not accept a stage the teardown
        // path would never see
        if self.cancel.is_cancelled() {
            stage.abort();
            return Err(AppError::NotFound(format!("session {} is closed", self.id)));
        }
        *slot = Some(stage);
        Ok(())
    }

    /// Whether a detection stage is attached
    pub fn has_stage(&self) -> bool {
        self.stage.lock().is_some()
    }

    /// Fold a detection record into this session's metrics
    pub fn observe(&self, record: &DetectionRecord, now: i64) -> MetricsSnapshot {
        self.metrics.lock().observe(record, now)
    }

    /// Token cancelled when the session shuts down
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Release all owned resources
    ///
    /// Cancels frame workers first so no result can be broadcast after
    /// close, then drops the stage and closes the peer.
    pub async fn shutdown(&self, final_state: SessionState) {
        self.set_state(final_state);
        self.cancel.cancel();

        let stage = self.stage.lock().take();
        if let Some(stage) = stage {
            stage.abort();
        }

        let peer = self.peer.lock().take();
        if let Some(peer) = peer {
            if let Err(e) = peer.close().await {
                warn!("Failed to close peer for session {}: {}", self.id, e);
            }
        }
    }
}

/// Session summary for status endpoints
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub state: SessionState,
    pub mode: ProcessingMode,
    pub created_at: DateTime<Utc>,
}

/// Thread-safe session registry
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    max_sessions: usize,
    window_capacity: usize,
}

impl SessionRegistry {
    pub fn new(max_sessions: usize, window_capacity: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_sessions,
            window_capacity,
        }
    }

    /// Create and register a session
    ///
    /// Fails with `Conflict` while a non-terminal session holds the id; an
    /// entry left behind in a terminal state is replaced. The check and the
    /// insert happen under one write lock so two near-simultaneous offers
    /// for the same id cannot both succeed.
    pub async fn create(&self, id: Option<String>, mode: ProcessingMode) -> Result<Arc<Session>> {
        let id = id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        if id.is_empty() {
            return Err(AppError::InvalidInput("session_id is empty".into()));
        }

        let mut sessions = self.sessions.write().await;

        if let Some(existing) = sessions.get(&id) {
            if !existing.state().is_terminal() {
                return Err(AppError::Conflict(format!(
                    "session {} already exists",
                    id
                )));
            }
        }

        let live = sessions
            .values()
            .filter(|s| !s.state().is_terminal())
            .count();
        if live >= self.max_sessions {
            return Err(AppError::ServiceUnavailable(format!(
                "maximum sessions ({}) reached",
                self.max_sessions
            )));
        }

        let session = Session::new(id.clone(), mode, self.window_capacity);
        sessions.insert(id.clone(), Arc::clone(&session));

        info!("Session created: {} (mode: {})", id, mode);
        Ok(session)
    }

    /// Look up a session
    pub async fn get(&self, id: &str) -> Result<Arc<Session>> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("session not found: {}", id)))
    }

    /// Attach a detection stage to a session's first video track
    pub async fn attach_stage(&self, id: &str, stage: DetectionStage) -> Result<()> {
        let session = self.get(id).await?;
        session.attach_stage(stage)
    }

    /// Remove a session and release its resources
    pub async fn remove(&self, id: &str, final_state: SessionState) -> Result<Arc<Session>> {
        let session = self
            .sessions
            .write()
            .await
            .remove(id)
            .ok_or_else(|| AppError::NotFound(format!("session not found: {}", id)))?;

        session.shutdown(final_state).await;
        info!("Session removed: {} ({})", id, final_state);
        Ok(session)
    }

    /// List all sessions
    pub async fn list(&self) -> Vec<SessionInfo> {
        self.sessions
            .read()
            .await
            .values()
            .map(|s| SessionInfo {
                session_id: s.id.clone(),
                state: s.state(),
                mode: s.mode,
                created_at: s.created_at,
            })
            .collect()
    }

    /// Number of registered sessions
    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Sweep sessions whose lifecycle reached a terminal state
    ///
    /// Returns the removed ids so the caller can drop their event rooms.
    pub async fn cleanup_stale(&self) -> Vec<String> {
        let stale: Vec<String> = {
            let sessions = self.sessions.read().await;
            sessions
                .iter()
                .filter(|(_, s)| s.state().is_terminal())
                .map(|(id, _)| id.clone())
                .collect()
        };

        for id in &stale {
            debug!("Removing stale session: {}", id);
            let removed = self.sessions.write().await.remove(id);
            if let Some(session) = removed {
                session.shutdown(session.state()).await;
            }
        }

        stale
    }

    /// Close every session (process shutdown)
    pub async fn close_all(&self) {
        let ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        for id in ids {
            let _ = self.remove(&id, SessionState::Closed).await;
        }
    }
}
