//! Deferred Shutdown
//!
//! Nach jedem Ende eines Anrufs wird der Call-Screen mit 3 Sekunden
//! Verzögerung geschlossen, oder es werden Diagnosedaten übermittelt, falls
//! der Benutzer zugestimmt hat. Der `ShutdownGuard` sorgt dafür, dass das pro
//! Anruf höchstens einmal passiert, egal wie viele Ende-Events eintreffen.

use super::state::CallState;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Verzögerung zwischen Anrufende und Shutdown
pub const SHUTDOWN_DELAY: Duration = Duration::from_millis(3000);

/// Eindeutige ID eines Anrufs
pub type CallId = Uuid;

// ============================================================================
// HOST SURFACE
// ============================================================================

/// Diagnosedaten eines beendeten Anrufs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsReport {
    pub call_id: CallId,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub final_state: CallState,
}

/// Die Oberfläche, die den Anruf hostet (Call-Screen)
pub trait HostSurface: Send + Sync {
    /// Call-Screen schließen
    fn finalize(&self);

    /// Diagnosedaten übermitteln; der Host übernimmt danach das Schließen
    fn submit_diagnostics(&self, report: DiagnosticsReport);
}

/// Ob Diagnosedaten gesendet werden dürfen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiagnosticsPolicy {
    /// Globaler Schalter (Build/Konfiguration)
    pub enabled: bool,
    /// Zustimmung des Benutzers
    pub user_consent: bool,
}

impl DiagnosticsPolicy {
    pub fn allows_delivery(&self) -> bool {
        self.enabled && self.user_consent
    }
}

// ============================================================================
// SHUTDOWN GUARD
// ============================================================================

/// Zustand des Shutdowns für genau einen Anruf
#[derive(Debug, Clone)]
pub struct ShutdownGuard {
    call_id: CallId,
    started_at: DateTime<Utc>,
    armed: bool,
    fired: bool,
    diagnostics_in_progress: bool,
}

impl ShutdownGuard {
    fn new() -> Self {
        Self {
            call_id: Uuid::new_v4(),
            started_at: Utc::now(),
            armed: false,
            fired: false,
            diagnostics_in_progress: false,
        }
    }

    pub fn call_id(&self) -> CallId {
        self.call_id
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }

    pub fn diagnostics_in_progress(&self) -> bool {
        self.diagnostics_in_progress
    }
}

/// Was beim Auslösen zu tun ist
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownAction {
    Finalize,
    SubmitDiagnostics(DiagnosticsReport),
    /// Schon erledigt bzw. Diagnose läuft bereits
    Nothing,
}

// ============================================================================
// DEFERRED SHUTDOWN
// ============================================================================

/// Single-Shot Timer, wird vom besitzenden Task abgefragt
///
/// Der Timer selbst ist nur eine Deadline; der Dispatcher-Loop wartet darauf
/// und ruft dann `fire` auf. Einmal scharf geschaltet wird er nicht abgebrochen.
#[derive(Debug)]
pub struct DeferredShutdown {
    delay: Duration,
    guard: ShutdownGuard,
    deadline: Option<Instant>,
}

impl DeferredShutdown {
    pub fn new() -> Self {
        Self::with_delay(SHUTDOWN_DELAY)
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            guard: ShutdownGuard::new(),
            deadline: None,
        }
    }

    pub fn guard(&self) -> &ShutdownGuard {
        &self.guard
    }

    /// Beginnt einen neuen Anruf mit frischem Guard
    ///
    /// Eine noch laufende Deadline gehört zum vorherigen Anruf und verfällt.
    pub fn begin_call(&mut self) -> CallId {
        if self.deadline.take().is_some() {
            tracing::debug!(
                "Discarding pending shutdown of superseded call {}",
                self.guard.call_id
            );
        }
        self.guard = ShutdownGuard::new();
        self.guard.call_id
    }

    /// Schaltet den Timer scharf; `false` wenn das für diesen Anruf schon geschehen ist
    pub fn arm(&mut self) -> bool {
        if self.guard.armed {
            tracing::debug!("Shutdown already armed for call {}", self.guard.call_id);
            return false;
        }
        self.guard.armed = true;
        self.deadline = Some(Instant::now() + self.delay);
        tracing::info!(
            "Shutdown armed for call {} ({} ms)",
            self.guard.call_id,
            self.delay.as_millis()
        );
        true
    }

    /// Zeitpunkt, an dem der Timer auslöst
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Deadline ist erreicht: entscheidet zwischen Finalize und Diagnose
    pub fn fire(&mut self, policy: DiagnosticsPolicy, final_state: CallState) -> ShutdownAction {
        self.deadline = None;
        if self.guard.fired {
            return ShutdownAction::Nothing;
        }
        self.guard.fired = true;

        if !policy.allows_delivery() {
            return ShutdownAction::Finalize;
        }
        if self.guard.diagnostics_in_progress {
            return ShutdownAction::Nothing;
        }
        self.guard.diagnostics_in_progress = true;

        ShutdownAction::SubmitDiagnostics(DiagnosticsReport {
            call_id: self.guard.call_id,
            started_at: self.guard.started_at,
            ended_at: Utc::now(),
            final_state,
        })
    }
}

impl Default for DeferredShutdown {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
