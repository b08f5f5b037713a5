//! Event Dispatcher
//!
//! Serialisiert alle Eingaben (Session-Events, Benutzeraktionen, Resync) auf
//! einen einzigen Task, der den `CallController` besitzt. `submit` darf von
//! jedem Thread aus aufgerufen werden und wartet nie auf die Verarbeitung.
//!
//! Jeder Umschlag trägt die Attach-Generation zum Zeitpunkt des Einreichens.
//! Der besitzende Task verwirft Umschläge, deren Generation nicht mehr die
//! aktuell angehängte ist. Damit gehen Events nach `detach` verloren, statt
//! sich für später anzustauen.

use super::controller::{CallController, ControllerStatus, Inbound, UserCommand};
use super::machine::UserDecision;
use super::state::CallState;
use crate::signaling::SessionEvent;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Dispatcher task is no longer running")]
    Closed,
}

// ============================================================================
// ENVELOPES
// ============================================================================

pub(crate) enum Envelope {
    Gated { generation: u64, inbound: Inbound },
    Query(oneshot::Sender<ControllerStatus>),
    Detach,
}

/// Attach-Zustand, geteilt zwischen Einreichern und besitzendem Task
///
/// Generation und Attached-Bit liegen in einem Wort (`generation << 1 | 1`),
/// damit beide immer zusammen gelesen werden.
#[derive(Debug, Default)]
struct Gate {
    word: AtomicU64,
}

const ATTACHED: u64 = 1;

impl Gate {
    fn open(&self) -> u64 {
        let next = |word: u64| (((word >> 1) + 1) << 1) | ATTACHED;
        match self
            .word
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |word| Some(next(word)))
        {
            Ok(previous) | Err(previous) => next(previous) >> 1,
        }
    }

    fn close(&self) {
        self.word.fetch_and(!ATTACHED, Ordering::AcqRel);
    }

    /// Generation für einen neuen Umschlag, `None` wenn nicht angehängt
    fn stamp(&self) -> Option<u64> {
        let word = self.word.load(Ordering::Acquire);
        (word & ATTACHED != 0).then_some(word >> 1)
    }

    fn admits(&self, generation: u64) -> bool {
        self.word.load(Ordering::Acquire) == (generation << 1) | ATTACHED
    }
}

// ============================================================================
// EVENT DISPATCHER
// ============================================================================

#[derive(Clone)]
pub struct EventDispatcher {
    tx: mpsc::UnboundedSender<Envelope>,
    gate: Arc<Gate>,
}

impl EventDispatcher {
    /// Startet den besitzenden Task; muss innerhalb einer Tokio-Runtime laufen
    pub fn spawn(controller: CallController) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let gate = Arc::new(Gate::default());

        tokio::spawn(run(controller, rx, Arc::clone(&gate)));
        tracing::debug!("Event dispatcher started");

        Self { tx, gate }
    }

    /// Reicht ein Session-Event ein; `false` wenn es verworfen wurde
    pub fn submit(&self, event: SessionEvent) -> bool {
        let name = event.name();
        let queued = self.send_gated(Inbound::Event(event));
        if !queued {
            tracing::debug!("Dropping {} event, dispatcher is detached", name);
        }
        queued
    }

    pub fn answer(&self) -> bool {
        self.send_gated(Inbound::User(UserCommand::Answer))
    }

    pub fn deny(&self) -> bool {
        self.send_gated(Inbound::User(UserCommand::Deny))
    }

    pub fn hangup(&self) -> bool {
        self.send_gated(Inbound::User(UserCommand::Hangup))
    }

    /// Antwort auf den offenen Dialog
    pub fn decide(&self, decision: UserDecision) -> bool {
        self.send_gated(Inbound::User(UserCommand::Decide(decision)))
    }

    /// Zustand nach Verarbeitung aller vorher eingereichten Umschläge
    pub async fn state(&self) -> Result<CallState, DispatchError> {
        Ok(self.status().await?.state)
    }

    pub async fn status(&self) -> Result<ControllerStatus, DispatchError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Envelope::Query(reply_tx))
            .map_err(|_| DispatchError::Closed)?;
        reply_rx.await.map_err(|_| DispatchError::Closed)
    }

    pub fn is_attached(&self) -> bool {
        self.gate.stamp().is_some()
    }

    /// Neue Attach-Generation; ältere Umschläge werden ab jetzt verworfen
    pub(crate) fn open_gate(&self) -> u64 {
        let generation = self.gate.open();
        tracing::debug!("Dispatcher attached (generation {})", generation);
        generation
    }

    /// Schließt den Gate sofort; der Detach-Umschlag löst die Session im Controller
    pub(crate) fn close_gate(&self) {
        self.gate.close();
        if self.tx.send(Envelope::Detach).is_err() {
            tracing::warn!("Dispatcher task gone while detaching");
        }
    }

    pub(crate) fn send_gated(&self, inbound: Inbound) -> bool {
        match self.gate.stamp() {
            Some(generation) => self.send_for(generation, inbound),
            None => false,
        }
    }

    /// Event eines Forwarders, der für `generation` gestartet wurde
    pub(crate) fn submit_for(&self, generation: u64, event: SessionEvent) -> bool {
        self.send_for(generation, Inbound::Event(event))
    }

    /// Stempelt mit einer festen Generation statt der aktuellen
    pub(crate) fn send_for(&self, generation: u64, inbound: Inbound) -> bool {
        if !self.gate.admits(generation) {
            return false;
        }
        self.tx
            .send(Envelope::Gated {
                generation,
                inbound,
            })
            .is_ok()
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("gate", &self.gate)
            .finish()
    }
}

// ============================================================================
// OWNING TASK
// ============================================================================

async fn run(
    mut controller: CallController,
    mut rx: mpsc::UnboundedReceiver<Envelope>,
    gate: Arc<Gate>,
) {
    loop {
        let deadline = controller.shutdown_deadline();
        tokio::select! {
            _ = wait_for(deadline) => controller.on_shutdown_elapsed(),
            envelope = rx.recv() => match envelope {
                Some(envelope) => dispatch(&mut controller, &gate, envelope),
                None => break,
            },
        }
    }

    // Alle Sender sind weg; ein scharfer Timer läuft trotzdem ab
    if let Some(deadline) = controller.shutdown_deadline() {
        tokio::time::sleep_until(deadline).await;
        controller.on_shutdown_elapsed();
    }
    tracing::debug!("Event dispatcher stopped");
}

fn dispatch(controller: &mut CallController, gate: &Gate, envelope: Envelope) {
    match envelope {
        Envelope::Gated {
            generation,
            inbound,
        } => {
            if gate.admits(generation) {
                controller.handle(inbound);
            } else {
                tracing::trace!("Discarding envelope of stale generation {}", generation);
            }
        }
        Envelope::Query(reply) => {
            // Fragesteller hat evtl. schon aufgegeben
            let _ = reply.send(controller.status());
        }
        Envelope::Detach => controller.detach_session(),
    }
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

// ============================================================================
// TESTS
// ============================================================================
