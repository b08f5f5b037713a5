//! Audio Cues - Signaltöne während des Verbindungsaufbaus
//!
//! Die Wiedergabe selbst übernimmt der Host (`Ringer`). Der Controller
//! entscheidet nur, welcher Ton wann gespielt oder gestoppt wird.

use serde::{Deserialize, Serialize};

// ============================================================================
// AUDIO CUES
// ============================================================================

/// Signaltöne, die der Ringer kennt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioCue {
    /// Freiton, Gegenstelle klingelt
    Ring,
    /// Besetztton
    Busy,
    /// Verbindung steht
    Complete,
    /// Fehler beim Verbindungsaufbau
    Failure,
    /// Schlüsselaustausch läuft
    Handshake,
    /// Verbindung zum Server wird aufgebaut
    Sonar,
}

impl AudioCue {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ring => "ring",
            Self::Busy => "busy",
            Self::Complete => "complete",
            Self::Failure => "failure",
            Self::Handshake => "handshake",
            Self::Sonar => "sonar",
        }
    }
}

// ============================================================================
// RINGER
// ============================================================================

/// Ausgehender Ringer des Hosts
///
/// Aufrufe sind fire-and-forget und dürfen nicht blockieren.
pub trait Ringer: Send + Sync {
    /// Spielt einen Ton ab (ersetzt einen laufenden Ton)
    fn play(&self, cue: AudioCue);

    /// Stoppt jeden laufenden Ton
    fn stop(&self);
}

/// Ringer ohne Ausgabe, z.B. für Headless-Hosts
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentRinger;

impl Ringer for SilentRinger {
    fn play(&self, cue: AudioCue) {
        tracing::trace!("Silent ringer ignoring cue {}", cue.as_str());
    }

    fn stop(&self) {}
}

// ============================================================================
// TESTS
// ============================================================================
