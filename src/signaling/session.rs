//! Session-Schnittstelle zum Calling-Service
//!
//! Die eigentliche Session (Signaling, Handshake, Medien) läuft außerhalb
//! dieses Crates. Der Controller sieht nur das `Session`-Trait:
//! - Snapshot des aktuellen Zustands (für Resync)
//! - Event-Stream (broadcast)
//! - Anfragen: Annehmen, Ablehnen, Auflegen
//!
//! `LoopbackSession` ist eine In-Process Implementierung für Hosts ohne
//! eigenen Service und für Tests.

use super::events::{RemoteIdentity, SessionEvent};
use crate::call_engine::CallState;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Kapazität des Event-Kanals pro Session
pub const EVENT_CHANNEL_CAPACITY: usize = 100;

// ============================================================================
// SESSION TRAIT
// ============================================================================

/// Laufende Call-Session des Calling-Service
pub trait Session: Send + Sync {
    /// Aktueller Zustand aus Sicht der Session
    fn current_state(&self) -> CallState;

    /// Gegenstelle des aktuellen Anrufs (falls bekannt)
    fn remote_identity(&self) -> Option<Arc<RemoteIdentity>>;

    /// Authentication String des verbundenen Anrufs
    ///
    /// Sessions, die den String nicht aufbewahren, liefern `None`.
    fn auth_string(&self) -> Option<String> {
        None
    }

    /// Gibt einen Event-Receiver zurück
    fn subscribe(&self) -> broadcast::Receiver<SessionEvent>;

    fn request_answer(&self);

    fn request_deny(&self);

    fn request_hangup(&self);

    /// Die "Connected"-Anzeige ist aktualisiert
    fn notify_ui_update_complete(&self);
}

// ============================================================================
// LOOPBACK SESSION
// ============================================================================

/// Anfragen, die der Controller an eine Session gestellt hat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRequest {
    Answer,
    Deny,
    Hangup,
    UiUpdateComplete,
}

#[derive(Debug, Clone, Default)]
struct SessionState {
    call_state: CallState,
    remote: Option<Arc<RemoteIdentity>>,
    auth_string: Option<String>,
    requests: Vec<SessionRequest>,
}

/// In-Process Session: Events werden per `emit` eingespeist
pub struct LoopbackSession {
    state: Arc<RwLock<SessionState>>,
    event_tx: broadcast::Sender<SessionEvent>,
    retain_auth_string: bool,
}

impl LoopbackSession {
    /// Erstellt eine neue Session im Zustand Idle
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            state: Arc::new(RwLock::new(SessionState::default())),
            event_tx,
            retain_auth_string: false,
        }
    }

    /// Session merkt sich den Authentication String für spätere Resyncs
    pub fn retaining_auth_string(mut self) -> Self {
        self.retain_auth_string = true;
        self
    }

    /// Speist ein Event ein, aktualisiert den Session-Zustand und
    /// verteilt es an alle Subscriber
    pub fn emit(&self, event: SessionEvent) {
        {
            let mut state = self.state.write();
            match &event {
                SessionEvent::IncomingCall(remote) => {
                    state.call_state = CallState::Ringing;
                    state.remote = Some(Arc::clone(remote));
                    state.auth_string = None;
                }
                SessionEvent::OutgoingCall(remote) => {
                    state.call_state = CallState::Dialing;
                    state.remote = Some(Arc::clone(remote));
                    state.auth_string = None;
                }
                SessionEvent::AnswerRequested => state.call_state = CallState::Answering,
                SessionEvent::CallConnected(auth) => {
                    state.call_state = CallState::Connected;
                    if self.retain_auth_string {
                        state.auth_string = Some(auth.clone());
                    }
                }
                SessionEvent::CallBusy
                | SessionEvent::HandshakeFailed
                | SessionEvent::RecipientUnavailable
                | SessionEvent::ServerFailure
                | SessionEvent::LoginFailed
                | SessionEvent::ClientFailure(_)
                | SessionEvent::CodecInitFailed(_)
                | SessionEvent::Terminate(_)
                | SessionEvent::Idle => state.call_state = CallState::Idle,
                _ => {}
            }
        }

        tracing::debug!("Session emitting {}", event.name());
        // Ohne Subscriber geht das Event verloren, das ist hier gewollt
        let _ = self.event_tx.send(event);
    }

    /// Alle bisher gestellten Anfragen in Reihenfolge
    pub fn requests(&self) -> Vec<SessionRequest> {
        self.state.read().requests.clone()
    }

    /// Anzahl aktiver Subscriber
    pub fn subscriber_count(&self) -> usize {
        self.event_tx.receiver_count()
    }

    fn record(&self, request: SessionRequest) {
        let mut state = self.state.write();
        state.requests.push(request);
        match request {
            SessionRequest::Answer => state.call_state = CallState::Answering,
            SessionRequest::Deny | SessionRequest::Hangup => state.call_state = CallState::Idle,
            SessionRequest::UiUpdateComplete => {}
        }
    }
}

impl Session for LoopbackSession {
    fn current_state(&self) -> CallState {
        self.state.read().call_state
    }

    fn remote_identity(&self) -> Option<Arc<RemoteIdentity>> {
        self.state.read().remote.clone()
    }

    fn auth_string(&self) -> Option<String> {
        self.state.read().auth_string.clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    fn request_answer(&self) {
        tracing::info!("Answer requested");
        self.record(SessionRequest::Answer);
    }

    fn request_deny(&self) {
        tracing::info!("Deny requested");
        self.record(SessionRequest::Deny);
    }

    fn request_hangup(&self) {
        tracing::info!("Hangup requested");
        self.record(SessionRequest::Hangup);
    }

    fn notify_ui_update_complete(&self) {
        self.record(SessionRequest::UiUpdateComplete);
    }
}

impl Default for LoopbackSession {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LoopbackSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackSession")
            .field("state", &*self.state.read())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================
