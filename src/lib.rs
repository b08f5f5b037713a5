//! Call Control - Steuerung sicherer Sprachanrufe
//!
//! Die Steuerungsschicht zwischen einer laufenden Call-Session und der
//! Anruf-Oberfläche:
//! - Call State Machine mit genau einem aktiven Zustand
//! - Event Dispatcher, der alle Übergänge auf einen Task serialisiert
//! - Side-Effects auf Anzeige und Signaltöne
//! - Deferred Shutdown bzw. Diagnose-Übermittlung nach Anrufende
//! - Resync beim Anhängen an eine schon laufende Session

pub mod call_engine;
pub mod config;
pub mod invite;
pub mod signaling;

#[cfg(test)]
mod testing;

use anyhow::{anyhow, Context};
use call_engine::{
    CallController, CallState, Collaborators, DispatchError, EventDispatcher, HostSurface,
    Presentation, Ringer, SessionBinding, UserDecision,
};
use config::{Settings, SettingsStore};
use invite::{InviteSender, SmsTransport};
use once_cell::sync::OnceCell;
use signaling::Session;
use std::sync::Arc;

// ============================================================================
// HOST
// ============================================================================

/// Alles, was der Host der App zur Verfügung stellt
pub struct Host {
    pub presentation: Arc<dyn Presentation>,
    pub ringer: Arc<dyn Ringer>,
    pub surface: Arc<dyn HostSurface>,
    pub sms: Arc<dyn SmsTransport>,
}

// ============================================================================
// APPLICATION STATE
// ============================================================================

/// Globaler Application State
pub struct CallApp {
    settings: SettingsStore,
    binding: SessionBinding,
}

/// Singleton für die CallApp
static CALL_APP: OnceCell<Arc<CallApp>> = OnceCell::new();

impl CallApp {
    /// Initialisiert Logging, Einstellungen und Dispatcher
    ///
    /// Muss innerhalb einer Tokio-Runtime aufgerufen werden.
    pub fn init(host: Host) -> anyhow::Result<Arc<Self>> {
        init_logging()?;

        let settings = SettingsStore::load_or_create().context("Failed to load settings")?;
        Self::init_with_settings(settings, host)
    }

    /// Wie `init`, aber mit einer schon geöffneten Einstellungsdatei
    pub fn init_with_settings(settings: SettingsStore, host: Host) -> anyhow::Result<Arc<Self>> {
        tracing::info!("Initializing Call App...");
        tracing::info!("Settings: {:?}", settings.path());

        let app = Self::new(settings, host);
        CALL_APP
            .set(Arc::clone(&app))
            .map_err(|_| anyhow!("CallApp already initialized"))?;

        Ok(app)
    }

    /// Baut eine App ohne globales Singleton
    pub fn new(settings: SettingsStore, host: Host) -> Arc<Self> {
        let shared = settings.shared();
        let collaborators = Collaborators {
            presentation: host.presentation,
            ringer: host.ringer,
            host: host.surface,
            invites: InviteSender::new(host.sms, Arc::clone(&shared)),
        };
        let dispatcher = EventDispatcher::spawn(CallController::new(collaborators, shared));

        Arc::new(Self {
            settings,
            binding: SessionBinding::new(dispatcher),
        })
    }

    /// Gibt die globale CallApp zurück
    pub fn get() -> Option<Arc<Self>> {
        CALL_APP.get().cloned()
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        self.binding.dispatcher()
    }

    // ------------------------------------------------------------------------
    // Session
    // ------------------------------------------------------------------------

    /// Hängt die App an eine (evtl. schon laufende) Session an
    pub fn bind(&self, session: Arc<dyn Session>) {
        self.binding.attach(session);
    }

    pub fn unbind(&self) {
        self.binding.detach();
    }

    pub fn is_bound(&self) -> bool {
        self.binding.is_attached()
    }

    // ------------------------------------------------------------------------
    // Benutzeraktionen
    // ------------------------------------------------------------------------

    pub fn answer(&self) -> bool {
        self.dispatcher().answer()
    }

    pub fn deny(&self) -> bool {
        self.dispatcher().deny()
    }

    pub fn hangup(&self) -> bool {
        self.dispatcher().hangup()
    }

    pub fn decide(&self, decision: UserDecision) -> bool {
        self.dispatcher().decide(decision)
    }

    pub async fn state(&self) -> Result<CallState, DispatchError> {
        self.dispatcher().state().await
    }

    // ------------------------------------------------------------------------
    // Einstellungen
    // ------------------------------------------------------------------------

    pub fn settings(&self) -> Settings {
        self.settings.settings()
    }

    /// Speichert die Zustimmung; gilt ab dem nächsten Shutdown
    pub fn set_diagnostics_consent(&self, consent: bool) -> anyhow::Result<()> {
        self.settings
            .set_diagnostics_consent(consent)
            .context("Failed to store diagnostics consent")
    }
}

impl std::fmt::Debug for CallApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallApp")
            .field("settings", &self.settings)
            .field("binding", &self.binding)
            .finish()
    }
}

/// Logging initialisieren; ein schon gesetzter Subscriber bleibt bestehen
fn init_logging() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("call_control=debug".parse()?);

    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_err()
    {
        tracing::debug!("Global tracing subscriber already set");
    }
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
