//! Side-Effect Coordinator
//!
//! Setzt Direktiven auf Anzeige und Ringer um. Pro Direktive höchstens ein
//! Audio- und ein Anzeige-Kommando, blockiert nicht und wiederholt nichts.
//! Die Kollaborateure sind last-write-wins, doppelte Direktiven sind harmlos.

use super::audio::Ringer;
use super::state::{Directive, Prompt, Screen};
use crate::signaling::{RemoteIdentity, Session};
use std::sync::Arc;

// ============================================================================
// PRESENTATION
// ============================================================================

/// Anruf-Anzeige des Hosts
pub trait Presentation: Send + Sync {
    fn reset(&self);

    fn show_incoming_call(&self, identity: &RemoteIdentity);

    /// Aktiver Anruf, optional mit Authentication String
    fn show_active_call(&self, identity: Option<&RemoteIdentity>, status: &str, auth: Option<&str>);

    /// Blockierender Dialog; die Antwort kommt über `UserDecision` zurück
    fn show_prompt(&self, prompt: &Prompt);

    /// Kurzer, nicht blockierender Hinweis
    fn show_notice(&self, text: &str);
}

// ============================================================================
// COORDINATOR
// ============================================================================

pub struct EffectCoordinator {
    presentation: Arc<dyn Presentation>,
    ringer: Arc<dyn Ringer>,
}

impl EffectCoordinator {
    pub fn new(presentation: Arc<dyn Presentation>, ringer: Arc<dyn Ringer>) -> Self {
        Self {
            presentation,
            ringer,
        }
    }

    /// Führt eine Anzeige- oder Audio-Direktive aus
    ///
    /// Fehlt die Gegenstelle in der Direktive, wird sie aus `session` gelesen.
    /// Direktiven für Session, Invite und Shutdown gehören nicht hierher.
    pub fn issue(&self, directive: &Directive, session: Option<&dyn Session>) {
        match directive {
            Directive::Play(cue) => {
                tracing::debug!("Playing {} cue", cue.as_str());
                self.ringer.play(*cue);
            }
            Directive::Show(Screen::Reset) => self.presentation.reset(),
            Directive::Show(Screen::IncomingCall(identity)) => {
                self.presentation.show_incoming_call(identity)
            }
            Directive::Show(Screen::ActiveCall {
                identity,
                status,
                auth,
            }) => {
                let identity = identity
                    .clone()
                    .or_else(|| session.and_then(|s| s.remote_identity()));
                self.presentation
                    .show_active_call(identity.as_deref(), status, auth.as_deref());
            }
            Directive::Prompt(prompt) => self.presentation.show_prompt(prompt),
            Directive::Notice(text) => self.presentation.show_notice(text),
            other => {
                tracing::warn!("Directive {:?} is not a presentation effect", other);
            }
        }
    }

    /// Stoppt laufende Signaltöne
    pub fn stop_audio(&self) {
        self.ringer.stop();
    }
}

impl std::fmt::Debug for EffectCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectCoordinator").finish_non_exhaustive()
    }
}

// ============================================================================
// TESTS
// ============================================================================
