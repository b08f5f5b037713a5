//! Session Resync
//!
//! Hängt den Dispatcher an eine laufende Session an. Beim Anhängen wird der
//! aktuelle Zustand der Session als synthetische Event-Folge eingespielt,
//! danach werden Live-Events weitergeleitet. Die Reihenfolge ist wichtig:
//! erst abonnieren, dann den Zustand lesen, damit kein Event dazwischen
//! verloren geht.

use super::controller::Inbound;
use super::dispatcher::EventDispatcher;
use super::state::CallState;
use crate::signaling::{RemoteIdentity, Session, SessionEvent};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

/// Platzhalter, wenn die Session den Authentication String nicht aufbewahrt
pub const UNKNOWN_AUTH_STRING: &str = "XXXX";

/// Nummer für Sessions, die mitten im Anruf keine Gegenstelle liefern
const UNKNOWN_NUMBER: &str = "Unknown";

// ============================================================================
// SNAPSHOT
// ============================================================================

/// Zustand einer Session zum Zeitpunkt des Anhängens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub state: CallState,
    pub identity: Option<Arc<RemoteIdentity>>,
    pub auth_string: Option<String>,
}

impl Snapshot {
    pub fn capture(session: &dyn Session) -> Self {
        Self {
            state: session.current_state(),
            identity: session.remote_identity(),
            auth_string: session.auth_string(),
        }
    }

    /// Events, die die Maschine in den Zustand der Session bringen
    ///
    /// Nur das letzte Event wird sichtbar; die vorherigen positionieren die Maschine.
    pub fn replay_events(&self) -> Vec<SessionEvent> {
        match self.state {
            CallState::Idle => vec![SessionEvent::Idle],
            CallState::Ringing => vec![SessionEvent::IncomingCall(self.identity())],
            CallState::Dialing => vec![SessionEvent::OutgoingCall(self.identity())],
            CallState::Answering => vec![
                SessionEvent::IncomingCall(self.identity()),
                SessionEvent::AnswerRequested,
            ],
            CallState::Connected => vec![SessionEvent::CallConnected(
                self.auth_string
                    .clone()
                    .unwrap_or_else(|| UNKNOWN_AUTH_STRING.to_string()),
            )],
        }
    }

    fn identity(&self) -> Arc<RemoteIdentity> {
        self.identity.clone().unwrap_or_else(|| {
            tracing::warn!("Session in state {} has no remote identity", self.state.as_str());
            Arc::new(RemoteIdentity::new(UNKNOWN_NUMBER))
        })
    }
}

// ============================================================================
// SESSION BINDING
// ============================================================================

/// Verbindung zwischen genau einer Session und dem Dispatcher
pub struct SessionBinding {
    dispatcher: EventDispatcher,
    forwarder: Mutex<Option<JoinHandle<()>>>,
}

impl SessionBinding {
    pub fn new(dispatcher: EventDispatcher) -> Self {
        Self {
            dispatcher,
            forwarder: Mutex::new(None),
        }
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    /// Hängt an `session` an; eine vorherige Session wird vorher getrennt
    ///
    /// Muss innerhalb einer Tokio-Runtime aufgerufen werden.
    pub fn attach(&self, session: Arc<dyn Session>) {
        let mut forwarder = self.forwarder.lock();
        if let Some(previous) = forwarder.take() {
            previous.abort();
            self.dispatcher.close_gate();
        }

        let events = session.subscribe();
        let snapshot = Snapshot::capture(session.as_ref());
        tracing::info!("Attaching to session in state {}", snapshot.state.as_str());

        let generation = self.dispatcher.open_gate();
        self.dispatcher
            .send_for(generation, Inbound::Resync { session, snapshot });

        let dispatcher = self.dispatcher.clone();
        *forwarder = Some(tokio::spawn(forward(events, dispatcher, generation)));
    }

    /// Trennt sofort; die Session selbst bleibt unberührt
    pub fn detach(&self) {
        if let Some(handle) = self.forwarder.lock().take() {
            handle.abort();
            self.dispatcher.close_gate();
            tracing::info!("Detached from session");
        }
    }

    pub fn is_attached(&self) -> bool {
        self.forwarder.lock().is_some()
    }
}

impl Drop for SessionBinding {
    fn drop(&mut self) {
        if let Some(handle) = self.forwarder.get_mut().take() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for SessionBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionBinding")
            .field("attached", &self.is_attached())
            .finish()
    }
}

/// Leitet Live-Events weiter, gestempelt mit der eigenen Attach-Generation
async fn forward(
    mut events: broadcast::Receiver<SessionEvent>,
    dispatcher: EventDispatcher,
    generation: u64,
) {
    loop {
        match events.recv().await {
            Ok(event) => {
                if !dispatcher.submit_for(generation, event) {
                    tracing::debug!("Forwarder of generation {} is stale, stopping", generation);
                    break;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!("Session event stream lagged, {} event(s) skipped", skipped);
            }
            Err(RecvError::Closed) => {
                tracing::debug!("Session event stream closed");
                break;
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
