//! Call State Machine
//!
//! Reine Übergangsfunktion `apply(state, event)`: liefert den neuen Zustand
//! und die Direktiven für Anzeige, Audio und Shutdown. Keine Seiteneffekte,
//! jedes Event hat einen definierten Übergang, es gibt keinen Fehlerfall.

use super::audio::AudioCue;
use crate::signaling::{RemoteIdentity, SessionEvent, TerminationCause};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ============================================================================
// CALL STATE
// ============================================================================

/// Aktueller Status eines Anrufs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    /// Kein aktiver Anruf
    #[default]
    Idle,
    /// Eingehender Anruf wartet auf Antwort
    Ringing,
    /// Ausgehender Anruf wird aufgebaut
    Dialing,
    /// Eingehender Anruf wurde angenommen, Verbindung wird aufgebaut
    Answering,
    /// Anruf aktiv
    Connected,
}

impl CallState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Ringing => "ringing",
            Self::Dialing => "dialing",
            Self::Answering => "answering",
            Self::Connected => "connected",
        }
    }

    pub fn is_idle(&self) -> bool {
        *self == Self::Idle
    }
}

/// Statustexte für die Anruf-Anzeige
pub mod status {
    pub const DIALING: &str = "Dialing...";
    pub const ANSWERING: &str = "Answering...";
    pub const CONNECTING: &str = "Connecting...";
    pub const PERFORMING_HANDSHAKE: &str = "Performing handshake...";
    pub const RINGING: &str = "Ringing...";
    pub const CONNECTED: &str = "Connected";
    pub const BUSY: &str = "Busy...";
    pub const HANDSHAKE_FAILED: &str = "Handshake failed!";
    pub const RECIPIENT_UNAVAILABLE: &str = "Recipient unavailable";
    pub const SERVER_FAILED: &str = "Server failed!";
    pub const LOGIN_FAILED: &str = "Login failed!";
    pub const CLIENT_FAILED: &str = "Client failed";
    pub const CANCELLING_CALL: &str = "Cancelling call";
    pub const CALL_REJECTED: &str = "Call rejected";
    pub const ENDING_CALL: &str = "Ending call";
    pub const CODEC_FAILED: &str = "Codec Failed to Initialize";
}

// ============================================================================
// DIRECTIVES
// ============================================================================

/// Was die Anzeige darstellen soll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Screen {
    /// Anzeige zurücksetzen
    Reset,
    /// Annehmen/Ablehnen-Dialog für einen eingehenden Anruf
    IncomingCall(Arc<RemoteIdentity>),
    /// Aktiver Anruf mit Statustext
    ///
    /// Ohne `identity` wird die Gegenstelle beim Ausführen aus der Session gelesen.
    ActiveCall {
        identity: Option<Arc<RemoteIdentity>>,
        status: &'static str,
        auth: Option<String>,
    },
}

/// Blockierende Dialoge, die eine Entscheidung des Benutzers erfordern
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prompt {
    /// Nachricht vom Server, wird bestätigt
    ServerMessage(String),
    /// Fataler Client-Fehler, wird bestätigt
    FatalError(String),
    /// Nummer nicht registriert: Install-Link senden?
    InstallInvite { number: String },
}

impl Prompt {
    pub fn title(&self) -> &'static str {
        match self {
            Self::ServerMessage(_) => "Message from the server:",
            Self::FatalError(_) => "Fatal Error",
            Self::InstallInvite { .. } => "Number not registered!",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::ServerMessage(text) | Self::FatalError(text) => text,
            Self::InstallInvite { .. } => {
                "The number you dialed is not registered for secure calls. \
                 Both parties of a call need to have the app installed in order \
                 to have a secure conversation. Would you like to send an install \
                 link to the contact you were trying to dial?"
            }
        }
    }
}

/// Anweisung an die Kollaborateure, erzeugt durch einen Übergang
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Signalton abspielen
    Play(AudioCue),
    /// Anzeige aktualisieren
    Show(Screen),
    /// Blockierenden Dialog anzeigen
    Prompt(Prompt),
    /// Kurzer Hinweis (Toast)
    Notice(String),
    /// Session mitteilen, dass die "Connected"-Anzeige steht
    NotifyUiUpdateComplete,
    /// Install-Link an die Nummer senden
    SendInstallInvite(String),
    /// Deferred Shutdown scharf schalten
    ArmShutdown,
}

// ============================================================================
// TRANSITION
// ============================================================================

/// Ergebnis von `apply`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: CallState,
    pub directives: Vec<Directive>,
}

impl Transition {
    fn to(state: CallState) -> Self {
        Self {
            state,
            directives: Vec::new(),
        }
    }

    fn with(mut self, directive: Directive) -> Self {
        self.directives.push(directive);
        self
    }

    fn status(self, status: &'static str) -> Self {
        self.with(Directive::Show(Screen::ActiveCall {
            identity: None,
            status,
            auth: None,
        }))
    }

    /// Text des letzten Statusupdates (für Logs und Tests)
    pub fn status_text(&self) -> Option<&'static str> {
        self.directives.iter().rev().find_map(|d| match d {
            Directive::Show(Screen::ActiveCall { status, .. }) => Some(*status),
            _ => None,
        })
    }

    pub fn arms_shutdown(&self) -> bool {
        self.directives.contains(&Directive::ArmShutdown)
    }
}

/// Fehlschlag: Ton, Statustext, Idle, Shutdown
fn failed(cue: AudioCue, status: &'static str) -> Transition {
    Transition::to(CallState::Idle)
        .with(Directive::Play(cue))
        .status(status)
        .with(Directive::ArmShutdown)
}

/// Beenden: der Text hängt nur vom Zustand beim Beenden und der Ursache ab
fn terminate(state: CallState, cause: TerminationCause) -> Transition {
    let ended = Transition::to(CallState::Idle);
    let ended = match (state, cause) {
        (CallState::Idle, _) => ended,
        (CallState::Dialing, TerminationCause::Local) => ended.status(status::CANCELLING_CALL),
        (CallState::Dialing, TerminationCause::Remote) => ended.status(status::CALL_REJECTED),
        _ => ended.status(status::ENDING_CALL),
    };
    ended.with(Directive::ArmShutdown)
}

/// Übergangsfunktion der Call State Machine
pub fn apply(state: CallState, event: &SessionEvent) -> Transition {
    match event {
        SessionEvent::Idle => Transition::to(CallState::Idle).with(Directive::Show(Screen::Reset)),

        SessionEvent::IncomingCall(remote) => Transition::to(CallState::Ringing)
            .with(Directive::Show(Screen::IncomingCall(Arc::clone(remote)))),

        SessionEvent::OutgoingCall(remote) => {
            Transition::to(CallState::Dialing).with(Directive::Show(Screen::ActiveCall {
                identity: Some(Arc::clone(remote)),
                status: status::DIALING,
                auth: None,
            }))
        }

        SessionEvent::AnswerRequested => match state {
            CallState::Ringing | CallState::Answering => {
                Transition::to(CallState::Answering).status(status::ANSWERING)
            }
            _ => Transition::to(state),
        },

        SessionEvent::CallConnecting => Transition::to(state).with(Directive::Play(AudioCue::Sonar)),

        SessionEvent::ConnectingToInitiator => Transition::to(state).status(status::CONNECTING),

        SessionEvent::PerformingHandshake => Transition::to(state)
            .with(Directive::Play(AudioCue::Handshake))
            .status(status::PERFORMING_HANDSHAKE),

        SessionEvent::CallRinging => Transition::to(state)
            .with(Directive::Play(AudioCue::Ring))
            .status(status::RINGING),

        SessionEvent::CallConnected(auth) => Transition::to(CallState::Connected)
            .with(Directive::Play(AudioCue::Complete))
            .with(Directive::Show(Screen::ActiveCall {
                identity: None,
                status: status::CONNECTED,
                auth: Some(auth.clone()),
            }))
            .with(Directive::NotifyUiUpdateComplete),

        SessionEvent::CallBusy => failed(AudioCue::Busy, status::BUSY),
        SessionEvent::HandshakeFailed => failed(AudioCue::Failure, status::HANDSHAKE_FAILED),
        SessionEvent::RecipientUnavailable => {
            failed(AudioCue::Failure, status::RECIPIENT_UNAVAILABLE)
        }
        SessionEvent::ServerFailure => failed(AudioCue::Failure, status::SERVER_FAILED),
        SessionEvent::LoginFailed => failed(AudioCue::Failure, status::LOGIN_FAILED),

        // Mit Nachricht wird erst nach der Bestätigung heruntergefahren
        SessionEvent::ClientFailure(Some(message)) => Transition::to(CallState::Idle)
            .with(Directive::Play(AudioCue::Failure))
            .status(status::CLIENT_FAILED)
            .with(Directive::Prompt(Prompt::FatalError(message.clone()))),
        SessionEvent::ClientFailure(None) => failed(AudioCue::Failure, status::CLIENT_FAILED),

        SessionEvent::ServerMessage(message) => {
            Transition::to(state).with(Directive::Prompt(Prompt::ServerMessage(message.clone())))
        }

        SessionEvent::NoSuchUser(number) => Transition::to(state)
            .with(Directive::Play(AudioCue::Failure))
            .with(Directive::Prompt(Prompt::InstallInvite {
                number: number.clone(),
            })),

        SessionEvent::CodecInitFailed(detail) => {
            let mut transition = terminate(state, TerminationCause::Local);
            transition.directives.insert(
                0,
                Directive::Notice(format!("{}: {}", status::CODEC_FAILED, detail)),
            );
            transition
        }

        SessionEvent::Terminate(cause) => terminate(state, *cause),

        SessionEvent::DebugInfo(_) => Transition::to(state),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATES: [CallState; 5] = [
        CallState::Idle,
        CallState::Ringing,
        CallState::Dialing,
        CallState::Answering,
        CallState::Connected,
    ];

    fn alice() -> Arc<RemoteIdentity> {
        Arc::new(RemoteIdentity::new("+15550100").with_display_name("Alice"))
    }

    #[test]
    fn test_terminate_always_ends_idle() {
        for state in ALL_STATES {
            for cause in [TerminationCause::Local, TerminationCause::Remote] {
                let first = apply(state, &SessionEvent::Terminate(cause));
                assert_eq!(first.state, CallState::Idle);

                let again = apply(first.state, &SessionEvent::Terminate(cause));
                assert_eq!(again.state, CallState::Idle);
                assert_eq!(again.status_text(), None);
            }
        }
    }

    #[test]
    fn test_terminate_wording_while_dialing() {
        let local = apply(
            CallState::Dialing,
            &SessionEvent::Terminate(TerminationCause::Local),
        );
        assert_eq!(local.status_text(), Some(status::CANCELLING_CALL));

        let remote = apply(
            CallState::Dialing,
            &SessionEvent::Terminate(TerminationCause::Remote),
        );
        assert_eq!(remote.status_text(), Some(status::CALL_REJECTED));
    }

    #[test]
    fn test_terminate_wording_other_states() {
        for state in [CallState::Ringing, CallState::Answering, CallState::Connected] {
            for cause in [TerminationCause::Local, TerminationCause::Remote] {
                let t = apply(state, &SessionEvent::Terminate(cause));
                assert_eq!(t.status_text(), Some(status::ENDING_CALL));
                assert!(t.arms_shutdown());
            }
        }
    }

    #[test]
    fn test_terminate_while_idle_changes_no_presentation() {
        let t = apply(
            CallState::Idle,
            &SessionEvent::Terminate(TerminationCause::Remote),
        );
        assert!(t
            .directives
            .iter()
            .all(|d| !matches!(d, Directive::Show(_) | Directive::Play(_))));
    }

    #[test]
    fn test_incoming_and_outgoing_calls() {
        let incoming = apply(CallState::Idle, &SessionEvent::IncomingCall(alice()));
        assert_eq!(incoming.state, CallState::Ringing);
        assert_eq!(
            incoming.directives,
            vec![Directive::Show(Screen::IncomingCall(alice()))]
        );

        let outgoing = apply(CallState::Idle, &SessionEvent::OutgoingCall(alice()));
        assert_eq!(outgoing.state, CallState::Dialing);
        assert_eq!(outgoing.status_text(), Some(status::DIALING));
    }

    #[test]
    fn test_answer_requires_ringing() {
        let answered = apply(CallState::Ringing, &SessionEvent::AnswerRequested);
        assert_eq!(answered.state, CallState::Answering);
        assert_eq!(answered.status_text(), Some(status::ANSWERING));

        let ignored = apply(CallState::Connected, &SessionEvent::AnswerRequested);
        assert_eq!(ignored.state, CallState::Connected);
        assert!(ignored.directives.is_empty());
    }

    #[test]
    fn test_progress_events_keep_state() {
        for state in ALL_STATES {
            let sonar = apply(state, &SessionEvent::CallConnecting);
            assert_eq!(sonar.state, state);
            assert_eq!(sonar.directives, vec![Directive::Play(AudioCue::Sonar)]);

            let handshake = apply(state, &SessionEvent::PerformingHandshake);
            assert_eq!(handshake.state, state);
            assert_eq!(
                handshake.directives[0],
                Directive::Play(AudioCue::Handshake)
            );
            assert_eq!(
                handshake.status_text(),
                Some(status::PERFORMING_HANDSHAKE)
            );
        }
    }

    #[test]
    fn test_connected_carries_auth_string() {
        let t = apply(
            CallState::Dialing,
            &SessionEvent::CallConnected("ABCD".to_string()),
        );
        assert_eq!(t.state, CallState::Connected);
        assert_eq!(
            t.directives,
            vec![
                Directive::Play(AudioCue::Complete),
                Directive::Show(Screen::ActiveCall {
                    identity: None,
                    status: status::CONNECTED,
                    auth: Some("ABCD".to_string()),
                }),
                Directive::NotifyUiUpdateComplete,
            ]
        );
    }

    #[test]
    fn test_failures_end_idle_and_arm() {
        let cases = [
            (SessionEvent::CallBusy, AudioCue::Busy, status::BUSY),
            (
                SessionEvent::HandshakeFailed,
                AudioCue::Failure,
                status::HANDSHAKE_FAILED,
            ),
            (
                SessionEvent::RecipientUnavailable,
                AudioCue::Failure,
                status::RECIPIENT_UNAVAILABLE,
            ),
            (
                SessionEvent::ServerFailure,
                AudioCue::Failure,
                status::SERVER_FAILED,
            ),
            (
                SessionEvent::LoginFailed,
                AudioCue::Failure,
                status::LOGIN_FAILED,
            ),
            (
                SessionEvent::ClientFailure(None),
                AudioCue::Failure,
                status::CLIENT_FAILED,
            ),
        ];

        for (event, cue, text) in cases {
            let t = apply(CallState::Connected, &event);
            assert_eq!(t.state, CallState::Idle, "{}", event.name());
            assert_eq!(t.directives[0], Directive::Play(cue));
            assert_eq!(t.status_text(), Some(text));
            assert!(t.arms_shutdown());
        }
    }

    #[test]
    fn test_client_failure_with_message_prompts_first() {
        let t = apply(
            CallState::Dialing,
            &SessionEvent::ClientFailure(Some("boom".to_string())),
        );
        assert_eq!(t.state, CallState::Idle);
        assert!(t
            .directives
            .contains(&Directive::Prompt(Prompt::FatalError("boom".to_string()))));
        assert!(!t.arms_shutdown());
    }

    #[test]
    fn test_codec_failure_forces_local_termination() {
        for state in ALL_STATES {
            let t = apply(state, &SessionEvent::CodecInitFailed("no opus".to_string()));
            let local = apply(state, &SessionEvent::Terminate(TerminationCause::Local));
            assert_eq!(t.state, CallState::Idle);
            assert!(matches!(t.directives[0], Directive::Notice(_)));
            assert_eq!(&t.directives[1..], &local.directives[..]);
        }

        let from_connected = apply(
            CallState::Connected,
            &SessionEvent::CodecInitFailed("x".to_string()),
        );
        assert_eq!(from_connected.status_text(), Some(status::ENDING_CALL));
    }

    #[test]
    fn test_prompts_keep_state() {
        let server = apply(
            CallState::Connected,
            &SessionEvent::ServerMessage("maintenance".to_string()),
        );
        assert_eq!(server.state, CallState::Connected);
        assert_eq!(
            server.directives,
            vec![Directive::Prompt(Prompt::ServerMessage(
                "maintenance".to_string()
            ))]
        );

        let unknown = apply(
            CallState::Dialing,
            &SessionEvent::NoSuchUser("+15550199".to_string()),
        );
        assert_eq!(unknown.state, CallState::Dialing);
        assert!(!unknown.arms_shutdown());
    }

    #[test]
    fn test_idle_snapshot_resets() {
        let t = apply(CallState::Connected, &SessionEvent::Idle);
        assert_eq!(t.state, CallState::Idle);
        assert_eq!(t.directives, vec![Directive::Show(Screen::Reset)]);
        assert!(!t.arms_shutdown());
    }
}
