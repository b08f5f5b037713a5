//! Call Engine Module - Zustandsmaschine und Steuerung eines Anrufs
//!
//! Dieses Modul verwaltet:
//! - Call State Machine (genau ein aktiver Zustand)
//! - Event Dispatcher (ein besitzender Task, FIFO)
//! - Side-Effects auf Anzeige und Signaltöne
//! - Deferred Shutdown nach Anrufende
//! - Resync beim Anhängen an eine laufende Session

mod audio;
mod controller;
mod dispatcher;
mod effects;
mod machine;
mod resync;
mod shutdown;
pub(crate) mod state;

pub use audio::{AudioCue, Ringer, SilentRinger};
pub use controller::{CallController, Collaborators, ControllerStatus, UserCommand};
pub use dispatcher::{DispatchError, EventDispatcher};
pub use effects::{EffectCoordinator, Presentation};
pub use machine::{Applied, CallMachine, PendingDecision, UserDecision};
pub use resync::{SessionBinding, Snapshot, UNKNOWN_AUTH_STRING};
pub use shutdown::{
    CallId, DeferredShutdown, DiagnosticsPolicy, DiagnosticsReport, HostSurface, ShutdownAction,
    ShutdownGuard, SHUTDOWN_DELAY,
};
pub use state::{apply, status, CallState, Directive, Prompt, Screen, Transition};
