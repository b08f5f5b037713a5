//! Event Types des Calling-Service
//!
//! Diese Strukturen beschreiben alles, was die Session asynchron an den
//! Call-Controller meldet. Sie sind unveränderlich, sobald sie erzeugt wurden.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

// ============================================================================
// REMOTE IDENTITY
// ============================================================================

/// Gegenstelle eines Anrufs (Nummer + optionaler Anzeigename)
///
/// Gehört der Session; der Controller hält nur `Arc`-Referenzen darauf.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteIdentity {
    pub number: String,
    #[serde(rename = "displayName", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl RemoteIdentity {
    pub fn new(number: impl Into<String>) -> Self {
        Self {
            number: number.into(),
            display_name: None,
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    /// Name für die Anzeige, fällt auf die Nummer zurück
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.number)
    }
}

impl fmt::Display for RemoteIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.display_name {
            Some(name) => write!(f, "{} <{}>", name, self.number),
            None => f.write_str(&self.number),
        }
    }
}

// ============================================================================
// TERMINATION CAUSE
// ============================================================================

/// Wer den Anruf beendet hat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationCause {
    /// Lokal (Auflegen, Ablehnen, Bestätigung eines Dialogs)
    Local,
    /// Von der Gegenstelle bzw. vom Server
    Remote,
}

// ============================================================================
// SESSION EVENTS
// ============================================================================

/// Alle Events, die die Session an den Controller liefern kann
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Kein Anruf aktiv (wird beim Resync synthetisiert)
    Idle,

    /// Eingehender Anruf
    IncomingCall(Arc<RemoteIdentity>),

    /// Ausgehender Anruf wurde gestartet
    OutgoingCall(Arc<RemoteIdentity>),

    /// Benutzer hat den eingehenden Anruf angenommen
    AnswerRequested,

    /// Verbindung zum Server wird aufgebaut
    CallConnecting,

    /// Verbindung zum Anrufer wird aufgebaut
    ConnectingToInitiator,

    /// Schlüsselaustausch läuft
    PerformingHandshake,

    /// Gegenstelle klingelt
    CallRinging,

    /// Anruf steht, mit Authentication String (SAS)
    CallConnected(String),

    /// Gegenstelle besetzt
    CallBusy,

    /// Schlüsselaustausch fehlgeschlagen
    HandshakeFailed,

    /// Gegenstelle nicht erreichbar
    RecipientUnavailable,

    /// Server-Fehler
    ServerFailure,

    /// Login beim Server fehlgeschlagen
    LoginFailed,

    /// Lokaler Client-Fehler, optional mit Nachricht für den Benutzer
    ClientFailure(Option<String>),

    /// Nachricht vom Server
    ServerMessage(String),

    /// Nummer ist nicht registriert
    NoSuchUser(String),

    /// Codec konnte nicht initialisiert werden
    CodecInitFailed(String),

    /// Anruf beendet
    Terminate(TerminationCause),

    /// Debug-Informationen der Session
    DebugInfo(String),
}

impl SessionEvent {
    /// Kurzname für Logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::IncomingCall(_) => "incoming_call",
            Self::OutgoingCall(_) => "outgoing_call",
            Self::AnswerRequested => "answer_requested",
            Self::CallConnecting => "call_connecting",
            Self::ConnectingToInitiator => "connecting_to_initiator",
            Self::PerformingHandshake => "performing_handshake",
            Self::CallRinging => "call_ringing",
            Self::CallConnected(_) => "call_connected",
            Self::CallBusy => "call_busy",
            Self::HandshakeFailed => "handshake_failed",
            Self::RecipientUnavailable => "recipient_unavailable",
            Self::ServerFailure => "server_failure",
            Self::LoginFailed => "login_failed",
            Self::ClientFailure(_) => "client_failure",
            Self::ServerMessage(_) => "server_message",
            Self::NoSuchUser(_) => "no_such_user",
            Self::CodecInitFailed(_) => "codec_init_failed",
            Self::Terminate(_) => "terminate",
            Self::DebugInfo(_) => "debug_info",
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
