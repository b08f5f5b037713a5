//! Persistente Einstellungen
//!
//! Wird als JSON im Konfigurationsverzeichnis der App gespeichert:
//! - Windows: `%APPDATA%/kaufm/call-control/config/settings.json`
//! - macOS: `~/Library/Application Support/com.kaufm.call-control/settings.json`
//! - Linux: `~/.config/call-control/settings.json`
//!
//! ## Verwendung
//! ```no_run
//! use call_control::config::SettingsStore;
//!
//! let store = SettingsStore::load_or_create()?;
//! store.set_diagnostics_consent(true)?;
//! # Ok::<(), call_control::config::SettingsError>(())
//! ```

use crate::call_engine::DiagnosticsPolicy;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use url::Url;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to access settings file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse settings: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid install link '{link}': {source}")]
    InvalidInviteLink {
        link: String,
        #[source]
        source: url::ParseError,
    },
}

// ============================================================================
// SETTINGS
// ============================================================================

/// Einstellungen zur Übermittlung von Diagnosedaten
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DiagnosticsSettings {
    /// Globaler Schalter, ob überhaupt Diagnosedaten gesammelt werden
    pub enabled: bool,
    /// Benutzer hat dem Senden zugestimmt
    pub user_consent: bool,
}

/// Text und Link der Install-Einladung per SMS
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InviteSettings {
    pub message: String,
    pub link: String,
}

impl Default for InviteSettings {
    fn default() -> Self {
        Self {
            message: "I'd like to call you securely. You can install the app here:".to_string(),
            link: "https://example.org/install".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub diagnostics: DiagnosticsSettings,
    pub invite: InviteSettings,
}

impl Settings {
    /// Prüft die Werte, die nicht schon durch den Typ abgesichert sind
    pub fn validate(&self) -> Result<(), SettingsError> {
        Url::parse(&self.invite.link).map_err(|source| SettingsError::InvalidInviteLink {
            link: self.invite.link.clone(),
            source,
        })?;
        Ok(())
    }

    pub fn diagnostics_policy(&self) -> DiagnosticsPolicy {
        DiagnosticsPolicy {
            enabled: self.diagnostics.enabled,
            user_consent: self.diagnostics.user_consent,
        }
    }
}

// ============================================================================
// SETTINGS STORE
// ============================================================================

/// Lädt und speichert `Settings`; der aktuelle Stand wird geteilt gehalten
pub struct SettingsStore {
    path: PathBuf,
    current: Arc<RwLock<Settings>>,
}

impl SettingsStore {
    /// Lädt die Einstellungen oder legt sie mit Standardwerten an
    pub fn load_or_create() -> Result<Self, SettingsError> {
        Self::open(Self::get_settings_path()?)
    }

    /// Öffnet eine Einstellungsdatei an einem bestimmten Pfad
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SettingsError> {
        let path = path.into();

        let settings = if path.exists() {
            tracing::info!("Loading settings from {:?}", path);
            let raw = fs::read_to_string(&path)?;
            serde_json::from_str::<Settings>(&raw)?
        } else {
            tracing::info!("Creating default settings at {:?}", path);
            let settings = Settings::default();
            Self::write(&path, &settings)?;
            settings
        };
        settings.validate()?;

        Ok(Self {
            path,
            current: Arc::new(RwLock::new(settings)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Kopie der aktuellen Einstellungen
    pub fn settings(&self) -> Settings {
        self.current.read().clone()
    }

    /// Geteilter Zugriff für den Controller (liest beim Shutdown die Zustimmung)
    pub fn shared(&self) -> Arc<RwLock<Settings>> {
        Arc::clone(&self.current)
    }

    /// Setzt die Zustimmung zur Diagnose-Übermittlung und speichert sofort
    pub fn set_diagnostics_consent(&self, consent: bool) -> Result<(), SettingsError> {
        let snapshot = {
            let mut settings = self.current.write();
            settings.diagnostics.user_consent = consent;
            settings.clone()
        };
        tracing::info!("Diagnostics consent set to {}", consent);
        Self::write(&self.path, &snapshot)
    }

    /// Ersetzt alle Einstellungen und speichert sie
    pub fn replace(&self, settings: Settings) -> Result<(), SettingsError> {
        settings.validate()?;
        Self::write(&self.path, &settings)?;
        *self.current.write() = settings;
        Ok(())
    }

    fn write(path: &Path, settings: &Settings) -> Result<(), SettingsError> {
        // Parent-Verzeichnis erstellen falls nicht vorhanden
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(settings)?)?;
        Ok(())
    }

    /// Ermittelt den Pfad zur Einstellungsdatei
    fn get_settings_path() -> Result<PathBuf, SettingsError> {
        let proj_dirs = directories::ProjectDirs::from("com", "kaufm", "call-control")
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "Could not determine app config directory",
                )
            })?;

        let mut path = proj_dirs.config_dir().to_path_buf();
        path.push("settings.json");
        Ok(path)
    }
}

impl std::fmt::Debug for SettingsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsStore")
            .field("path", &self.path)
            .field("settings", &*self.current.read())
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================
