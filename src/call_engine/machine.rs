//! CallMachine - hält den einzigen CallState und offene Benutzerentscheidungen
//!
//! Wrapper um die reine Übergangsfunktion. Zusätzlich zum CallState verwaltet
//! er orthogonal dazu den Dialog-Zustand (Bestätigung, Install-Link) und ob der
//! aktuelle Anruf bereits heruntergefahren wird.

use super::resync::Snapshot;
use super::state::{apply, CallState, Directive, Prompt, Transition};
use crate::signaling::{RemoteIdentity, SessionEvent, TerminationCause};
use std::sync::Arc;

// ============================================================================
// DECISIONS
// ============================================================================

/// Offener blockierender Dialog
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingDecision {
    /// Server-Nachricht oder fataler Fehler, wartet auf "Ok"
    Acknowledge,
    /// Install-Link an `number` senden oder nicht
    InstallInvite { number: String },
}

impl From<&Prompt> for PendingDecision {
    fn from(prompt: &Prompt) -> Self {
        match prompt {
            Prompt::ServerMessage(_) | Prompt::FatalError(_) => Self::Acknowledge,
            Prompt::InstallInvite { number } => Self::InstallInvite {
                number: number.clone(),
            },
        }
    }
}

/// Antwort des Benutzers auf einen Dialog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserDecision {
    Acknowledge,
    Accept,
    Decline,
}

/// Ergebnis eines Schritts der Maschine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Applied {
    pub directives: Vec<Directive>,
    /// Mit diesem Schritt hat ein neuer Anruf begonnen
    pub begins_call: bool,
}

// ============================================================================
// CALL MACHINE
// ============================================================================

#[derive(Debug, Default)]
pub struct CallMachine {
    state: CallState,
    pending: Option<PendingDecision>,
    tearing_down: bool,
    remote: Option<Arc<RemoteIdentity>>,
}

impl CallMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn pending(&self) -> Option<&PendingDecision> {
        self.pending.as_ref()
    }

    /// Gegenstelle des aktuellen (bzw. letzten) Anrufs
    pub fn remote(&self) -> Option<&Arc<RemoteIdentity>> {
        self.remote.as_ref()
    }

    pub fn is_tearing_down(&self) -> bool {
        self.tearing_down
    }

    fn start_call(&mut self) {
        self.pending = None;
        self.tearing_down = false;
    }

    /// Der Deferred Shutdown für den aktuellen Anruf hat ausgelöst
    pub fn mark_tearing_down(&mut self) {
        self.tearing_down = true;
    }

    /// Wendet ein Event an
    pub fn apply(&mut self, event: &SessionEvent) -> Applied {
        if self.tearing_down
            && matches!(
                event,
                SessionEvent::ServerMessage(_) | SessionEvent::NoSuchUser(_)
            )
        {
            tracing::debug!("Already tearing down, suppressing {}", event.name());
            return Applied::default();
        }

        let begins_call = self.state.is_idle()
            && matches!(
                event,
                SessionEvent::IncomingCall(_) | SessionEvent::OutgoingCall(_)
            );
        if begins_call {
            self.start_call();
        }
        if let SessionEvent::IncomingCall(remote) | SessionEvent::OutgoingCall(remote) = event {
            self.remote = Some(Arc::clone(remote));
        }

        let Transition {
            state,
            mut directives,
        } = apply(self.state, event);

        // Ein offener Dialog bleibt stehen, bis er beantwortet ist
        if self.tearing_down || self.pending.is_some() {
            let before = directives.len();
            directives.retain(|d| !matches!(d, Directive::Prompt(_)));
            if directives.len() != before {
                tracing::debug!("Dropping prompt of {}, dialog already open", event.name());
            }
        }
        if let Some(prompt) = directives.iter().find_map(|d| match d {
            Directive::Prompt(prompt) => Some(prompt),
            _ => None,
        }) {
            self.pending = Some(PendingDecision::from(prompt));
        }

        if state != self.state {
            tracing::info!(
                "Call state {} -> {} ({})",
                self.state.as_str(),
                state.as_str(),
                event.name()
            );
        }
        self.state = state;

        Applied {
            directives,
            begins_call,
        }
    }

    /// Spielt eine Event-Folge ein; nur die Direktiven des letzten Events
    /// werden zurückgegeben, die vorherigen positionieren nur die Maschine
    pub fn replay(&mut self, events: &[SessionEvent]) -> Applied {
        let mut begins_call = false;
        let mut last = Applied::default();
        for event in events {
            last = self.apply(event);
            begins_call |= last.begins_call;
        }
        last.begins_call = begins_call;
        last
    }

    /// Bringt die Maschine auf den Stand einer Session, an die gerade angehängt wurde
    ///
    /// Läuft in der Session ein anderer Anruf als der zuletzt gesehene (oder
    /// ist der gesehene schon heruntergefahren), beginnt damit ein neuer Anruf.
    pub fn resync(&mut self, snapshot: &Snapshot) -> Applied {
        let number = |remote: Option<&Arc<RemoteIdentity>>| remote.map(|r| r.number.clone());
        let same_call = !self.state.is_idle()
            && !self.tearing_down
            && number(self.remote.as_ref()) == number(snapshot.identity.as_ref());
        let begins_call = !snapshot.state.is_idle() && !same_call;

        if begins_call {
            tracing::info!(
                "Session is in another call ({}), starting over",
                snapshot.state.as_str()
            );
            self.start_call();
            self.remote = snapshot.identity.clone();
        }

        let mut applied = self.replay(&snapshot.replay_events());
        applied.begins_call |= begins_call;
        applied
    }

    /// Löst einen offenen Dialog auf; jede gültige Antwort beendet den Anruf lokal
    pub fn resolve(&mut self, decision: UserDecision) -> Applied {
        let mut directives = match (self.pending.take(), decision) {
            (Some(PendingDecision::Acknowledge), UserDecision::Acknowledge)
            | (Some(PendingDecision::InstallInvite { .. }), UserDecision::Decline) => Vec::new(),
            (Some(PendingDecision::InstallInvite { number }), UserDecision::Accept) => {
                vec![Directive::SendInstallInvite(number)]
            }
            (pending, decision) => {
                tracing::warn!(
                    "Ignoring decision {:?}, pending dialog is {:?}",
                    decision,
                    pending
                );
                self.pending = pending;
                return Applied::default();
            }
        };

        let terminated = self.apply(&SessionEvent::Terminate(TerminationCause::Local));
        directives.extend(terminated.directives);
        Applied {
            directives,
            begins_call: false,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call_engine::state::status;
    use crate::signaling::RemoteIdentity;
    use std::sync::Arc;

    fn bob() -> Arc<RemoteIdentity> {
        Arc::new(RemoteIdentity::new("+15550123"))
    }

    fn dialing() -> CallMachine {
        let mut machine = CallMachine::new();
        machine.apply(&SessionEvent::OutgoingCall(bob()));
        machine
    }

    #[test]
    fn test_new_call_detection() {
        let mut machine = CallMachine::new();
        assert!(machine.apply(&SessionEvent::OutgoingCall(bob())).begins_call);
        // Wiederholtes Event im selben Anruf beginnt keinen neuen
        assert!(!machine.apply(&SessionEvent::OutgoingCall(bob())).begins_call);
    }

    #[test]
    fn test_local_and_remote_termination_race() {
        let mut machine = dialing();
        let local = machine.apply(&SessionEvent::Terminate(TerminationCause::Local));
        let remote = machine.apply(&SessionEvent::Terminate(TerminationCause::Remote));

        assert!(local.directives.contains(&Directive::Show(
            crate::call_engine::Screen::ActiveCall {
                identity: None,
                status: status::CANCELLING_CALL,
                auth: None,
            }
        )));
        assert!(!remote
            .directives
            .iter()
            .any(|d| matches!(d, Directive::Show(_))));
        assert_eq!(machine.state(), CallState::Idle);
    }

    #[test]
    fn test_no_such_user_accept() {
        let mut machine = dialing();
        machine.apply(&SessionEvent::NoSuchUser("+15550199".to_string()));
        assert_eq!(
            machine.pending(),
            Some(&PendingDecision::InstallInvite {
                number: "+15550199".to_string()
            })
        );

        let applied = machine.resolve(UserDecision::Accept);
        let invites = applied
            .directives
            .iter()
            .filter(|d| matches!(d, Directive::SendInstallInvite(_)))
            .count();
        assert_eq!(invites, 1);
        assert_eq!(applied.directives[0], Directive::SendInstallInvite("+15550199".to_string()));
        assert!(applied.directives.contains(&Directive::ArmShutdown));
        assert_eq!(machine.state(), CallState::Idle);
        assert_eq!(machine.pending(), None);

        // Zweite Antwort hat keinen offenen Dialog mehr
        assert_eq!(machine.resolve(UserDecision::Accept), Applied::default());
    }

    #[test]
    fn test_no_such_user_decline() {
        let mut machine = dialing();
        machine.apply(&SessionEvent::NoSuchUser("+15550199".to_string()));

        let applied = machine.resolve(UserDecision::Decline);
        assert!(!applied
            .directives
            .iter()
            .any(|d| matches!(d, Directive::SendInstallInvite(_))));
        assert!(applied.directives.contains(&Directive::ArmShutdown));
        assert_eq!(machine.state(), CallState::Idle);
    }

    #[test]
    fn test_mismatched_decision_keeps_dialog() {
        let mut machine = CallMachine::new();
        machine.apply(&SessionEvent::ServerMessage("hello".to_string()));

        assert_eq!(machine.resolve(UserDecision::Accept), Applied::default());
        assert_eq!(machine.pending(), Some(&PendingDecision::Acknowledge));

        let applied = machine.resolve(UserDecision::Acknowledge);
        assert!(applied.directives.contains(&Directive::ArmShutdown));
    }

    #[test]
    fn test_client_failure_arms_after_acknowledge() {
        let mut machine = dialing();
        let failed = machine.apply(&SessionEvent::ClientFailure(Some("fatal".to_string())));
        assert!(!failed.directives.contains(&Directive::ArmShutdown));
        assert_eq!(machine.state(), CallState::Idle);

        let acknowledged = machine.resolve(UserDecision::Acknowledge);
        assert_eq!(acknowledged.directives, vec![Directive::ArmShutdown]);
    }

    #[test]
    fn test_prompts_suppressed_while_tearing_down() {
        let mut machine = dialing();
        machine.apply(&SessionEvent::CallBusy);
        machine.mark_tearing_down();

        let server = machine.apply(&SessionEvent::ServerMessage("late".to_string()));
        assert!(server.directives.is_empty());
        let unknown = machine.apply(&SessionEvent::NoSuchUser("1".to_string()));
        assert!(unknown.directives.is_empty());
        let client = machine.apply(&SessionEvent::ClientFailure(Some("late".to_string())));
        assert!(!client
            .directives
            .iter()
            .any(|d| matches!(d, Directive::Prompt(_))));
        assert_eq!(machine.pending(), None);
    }

    #[test]
    fn test_new_call_clears_teardown() {
        let mut machine = dialing();
        machine.apply(&SessionEvent::ServerFailure);
        machine.mark_tearing_down();

        let next = machine.apply(&SessionEvent::IncomingCall(bob()));
        assert!(next.begins_call);
        assert!(!machine.is_tearing_down());
    }

    #[test]
    fn test_second_prompt_waits_for_first() {
        let mut machine = dialing();
        let first = machine.apply(&SessionEvent::ServerMessage("maintenance".to_string()));
        assert!(first.directives.iter().any(|d| matches!(d, Directive::Prompt(_))));

        let second = machine.apply(&SessionEvent::NoSuchUser("+15550199".to_string()));
        assert!(!second.directives.iter().any(|d| matches!(d, Directive::Prompt(_))));
        assert_eq!(machine.pending(), Some(&PendingDecision::Acknowledge));

        // "Ok" auf den ersten Dialog wird angenommen
        let acknowledged = machine.resolve(UserDecision::Acknowledge);
        assert!(acknowledged.directives.contains(&Directive::ArmShutdown));
        assert_eq!(machine.pending(), None);
    }

    fn snapshot(state: CallState, number: &str) -> Snapshot {
        Snapshot {
            state,
            identity: Some(Arc::new(RemoteIdentity::new(number))),
            auth_string: Some("ABCD".to_string()),
        }
    }

    #[test]
    fn test_resync_after_teardown_starts_new_call() {
        let mut machine = dialing();
        machine.apply(&SessionEvent::CallBusy);
        machine.mark_tearing_down();

        let applied = machine.resync(&snapshot(CallState::Connected, "+15550456"));
        assert!(applied.begins_call);
        assert!(!machine.is_tearing_down());
        assert_eq!(machine.state(), CallState::Connected);
        assert_eq!(machine.remote().map(|r| r.number.as_str()), Some("+15550456"));

        let message = machine.apply(&SessionEvent::ServerMessage("hello".to_string()));
        assert!(message.directives.iter().any(|d| matches!(d, Directive::Prompt(_))));
    }

    #[test]
    fn test_resync_onto_other_remote_starts_new_call() {
        let mut machine = dialing();
        let applied = machine.resync(&snapshot(CallState::Ringing, "+15550456"));
        assert!(applied.begins_call);
        assert_eq!(machine.state(), CallState::Ringing);
    }

    #[test]
    fn test_resync_into_same_call_continues_it() {
        let mut machine = dialing();
        let applied = machine.resync(&snapshot(CallState::Connected, "+15550123"));
        assert!(!applied.begins_call);
        assert_eq!(machine.state(), CallState::Connected);

        // Idle-Snapshot beginnt nie einen Anruf
        let idle = machine.resync(&snapshot(CallState::Idle, "+15550123"));
        assert!(!idle.begins_call);
    }

    #[test]
    fn test_replay_keeps_only_last_directives() {
        let mut machine = CallMachine::new();
        let applied = machine.replay(&[
            SessionEvent::IncomingCall(bob()),
            SessionEvent::AnswerRequested,
        ]);
        assert!(applied.begins_call);
        assert_eq!(machine.state(), CallState::Answering);
        assert_eq!(applied.directives.len(), 1);
    }
}
