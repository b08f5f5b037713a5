//! CallController - besitzt den Call-Zustand
//!
//! Läuft ausschließlich auf dem Dispatcher-Task. Hält CallMachine,
//! Side-Effect Coordinator und Deferred Shutdown und verteilt die Direktiven
//! eines Übergangs an die zuständigen Kollaborateure.

use super::audio::Ringer;
use super::effects::{EffectCoordinator, Presentation};
use super::machine::{Applied, CallMachine, PendingDecision, UserDecision};
use super::resync::Snapshot;
use super::shutdown::{CallId, DeferredShutdown, HostSurface, ShutdownAction};
use super::state::{CallState, Directive};
use crate::config::Settings;
use crate::invite::InviteSender;
use crate::signaling::{Session, SessionEvent, TerminationCause};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::time::Instant;

// ============================================================================
// TYPES
// ============================================================================

/// Externe Kollaborateure des Controllers
pub struct Collaborators {
    pub presentation: Arc<dyn Presentation>,
    pub ringer: Arc<dyn Ringer>,
    pub host: Arc<dyn HostSurface>,
    pub invites: InviteSender,
}

/// Aktionen des Benutzers am Call-Screen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserCommand {
    Answer,
    Deny,
    Hangup,
    Decide(UserDecision),
}

/// Eingaben, die über den Gate des Dispatchers laufen
pub(crate) enum Inbound {
    Event(SessionEvent),
    User(UserCommand),
    Resync {
        session: Arc<dyn Session>,
        snapshot: Snapshot,
    },
}

/// Momentaufnahme des Controllers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerStatus {
    pub state: CallState,
    pub pending: Option<PendingDecision>,
    pub call_id: CallId,
    pub shutdown_armed: bool,
    pub shutdown_fired: bool,
    pub tearing_down: bool,
    pub attached: bool,
}

// ============================================================================
// CALL CONTROLLER
// ============================================================================

pub struct CallController {
    machine: CallMachine,
    effects: EffectCoordinator,
    shutdown: DeferredShutdown,
    host: Arc<dyn HostSurface>,
    invites: InviteSender,
    settings: Arc<RwLock<Settings>>,
    session: Option<Arc<dyn Session>>,
}

impl CallController {
    pub fn new(collaborators: Collaborators, settings: Arc<RwLock<Settings>>) -> Self {
        Self {
            machine: CallMachine::new(),
            effects: EffectCoordinator::new(collaborators.presentation, collaborators.ringer),
            shutdown: DeferredShutdown::new(),
            host: collaborators.host,
            invites: collaborators.invites,
            settings,
            session: None,
        }
    }

    pub fn status(&self) -> ControllerStatus {
        ControllerStatus {
            state: self.machine.state(),
            pending: self.machine.pending().cloned(),
            call_id: self.shutdown.guard().call_id(),
            shutdown_armed: self.shutdown.guard().is_armed(),
            shutdown_fired: self.shutdown.guard().has_fired(),
            tearing_down: self.machine.is_tearing_down(),
            attached: self.session.is_some(),
        }
    }

    pub(crate) fn handle(&mut self, inbound: Inbound) {
        match inbound {
            Inbound::Event(event) => {
                if let SessionEvent::DebugInfo(info) = &event {
                    tracing::debug!("Session debug info: {}", info);
                }
                if let SessionEvent::CodecInitFailed(detail) = &event {
                    tracing::warn!("Codec failed to initialize: {}", detail);
                }
                let applied = self.machine.apply(&event);
                self.execute(applied);
            }
            Inbound::User(command) => self.handle_user(command),
            Inbound::Resync { session, snapshot } => {
                tracing::info!(
                    "Resyncing with session in state {}",
                    snapshot.state.as_str()
                );
                self.session = Some(session);
                let applied = self.machine.resync(&snapshot);
                self.execute(applied);
            }
        }
    }

    fn handle_user(&mut self, command: UserCommand) {
        match command {
            UserCommand::Answer => {
                if self.machine.state() != CallState::Ringing {
                    tracing::warn!(
                        "Ignoring answer in state {}",
                        self.machine.state().as_str()
                    );
                    return;
                }
                if let Some(session) = &self.session {
                    session.request_answer();
                }
                let applied = self.machine.apply(&SessionEvent::AnswerRequested);
                self.execute(applied);
            }
            UserCommand::Deny => {
                if self.machine.state() != CallState::Ringing {
                    tracing::warn!("Ignoring deny in state {}", self.machine.state().as_str());
                    return;
                }
                if let Some(session) = &self.session {
                    session.request_deny();
                }
                let applied = self
                    .machine
                    .apply(&SessionEvent::Terminate(TerminationCause::Local));
                self.execute(applied);
            }
            UserCommand::Hangup => {
                tracing::info!("Hangup pressed, handling termination now");
                if let Some(session) = &self.session {
                    session.request_hangup();
                }
                let applied = self
                    .machine
                    .apply(&SessionEvent::Terminate(TerminationCause::Local));
                self.execute(applied);
            }
            UserCommand::Decide(decision) => {
                let applied = self.machine.resolve(decision);
                self.execute(applied);
            }
        }
    }

    fn execute(&mut self, applied: Applied) {
        if applied.begins_call {
            let call_id = self.shutdown.begin_call();
            match self.machine.remote() {
                Some(remote) => tracing::info!("Call {} started with {}", call_id, remote.label()),
                None => tracing::info!("Call {} started", call_id),
            }
        }

        for directive in applied.directives {
            match directive {
                Directive::ArmShutdown => {
                    self.shutdown.arm();
                }
                Directive::NotifyUiUpdateComplete => {
                    if let Some(session) = &self.session {
                        session.notify_ui_update_complete();
                    }
                }
                Directive::SendInstallInvite(number) => {
                    if let Err(e) = self.invites.send_install_link(&number) {
                        tracing::error!("Install invite failed: {}", e);
                    }
                }
                other => self.effects.issue(&other, self.session.as_deref()),
            }
        }
    }

    /// Observer wurde getrennt; der Shutdown-Timer läuft weiter
    pub(crate) fn detach_session(&mut self) {
        if self.session.take().is_some() {
            tracing::info!("Detached from session");
        }
    }

    pub(crate) fn shutdown_deadline(&self) -> Option<Instant> {
        self.shutdown.deadline()
    }

    /// Deadline des Deferred Shutdown ist erreicht
    pub(crate) fn on_shutdown_elapsed(&mut self) {
        self.effects.stop_audio();
        tracing::info!("Releasing call {}", self.shutdown.guard().call_id());

        let policy = self.settings.read().diagnostics_policy();
        match self.shutdown.fire(policy, self.machine.state()) {
            ShutdownAction::Finalize => self.host.finalize(),
            ShutdownAction::SubmitDiagnostics(report) => {
                tracing::info!("Submitting diagnostics for call {}", report.call_id);
                self.host.submit_diagnostics(report);
            }
            ShutdownAction::Nothing => {}
        }
        self.machine.mark_tearing_down();
    }
}

impl std::fmt::Debug for CallController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallController")
            .field("status", &self.status())
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================
