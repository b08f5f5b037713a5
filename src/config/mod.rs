//! Config Module - persistente Einstellungen
//!
//! Dieses Modul verwaltet die Einstellungen des Benutzers:
//! - Zustimmung zur Übermittlung von Diagnosedaten
//! - Text und Link der Install-Einladung
//!

mod settings;

pub use settings::{DiagnosticsSettings, InviteSettings, Settings, SettingsError, SettingsStore};
