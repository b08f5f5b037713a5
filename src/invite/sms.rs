//! Install-Einladung per SMS
//!
//! Wenn die gewählte Nummer nicht registriert ist, kann der Benutzer einen
//! Install-Link an die Nummer schicken. Der Text wird in SMS-Segmente
//! aufgeteilt und über den `SmsTransport` des Hosts gesendet.

use crate::config::Settings;
use parking_lot::RwLock;
use std::sync::Arc;
use thiserror::Error;

/// GSM-7: Septets einer einzelnen SMS bzw. pro Teil einer mehrteiligen (UDH belegt den Rest)
pub const GSM7_SINGLE_LEN: usize = 160;
pub const GSM7_MULTIPART_LEN: usize = 153;

/// UCS-2: UTF-16 Einheiten einer einzelnen SMS bzw. pro Teil
pub const UCS2_SINGLE_LEN: usize = 70;
pub const UCS2_MULTIPART_LEN: usize = 67;

/// GSM 03.38 Default-Alphabet
const GSM7_BASIC: &str = "@£$¥èéùìòÇ\nØø\rÅåΔ_ΦΓΛΩΠΨΣΘΞÆæßÉ !\"#¤%&'()*+,-./0123456789:;<=>?\
                          ¡ABCDEFGHIJKLMNOPQRSTUVWXYZÄÖÑÜ§¿abcdefghijklmnopqrstuvwxyzäöñüà";

/// Erweiterungstabelle, jedes Zeichen belegt zwei Septets (Escape + Code)
const GSM7_EXTENSION: &str = "\u{c}^{}\\[~]|€";

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InviteError {
    #[error("No destination number for install invite")]
    EmptyDestination,

    #[error("Failed to send install invite: {0}")]
    Transport(String),
}

// ============================================================================
// TRANSPORT
// ============================================================================

/// SMS-Versand des Hosts
pub trait SmsTransport: Send + Sync {
    fn send_multipart(&self, destination: &str, parts: &[String]) -> Result<(), InviteError>;
}

/// Kodierung, in der eine SMS verschickt wird
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmsEncoding {
    Gsm7,
    Ucs2,
}

impl SmsEncoding {
    /// GSM-7 wenn alle Zeichen darin darstellbar sind, sonst UCS-2
    pub fn detect(text: &str) -> Self {
        if text
            .chars()
            .all(|c| GSM7_BASIC.contains(c) || GSM7_EXTENSION.contains(c))
        {
            Self::Gsm7
        } else {
            Self::Ucs2
        }
    }

    pub fn single_len(&self) -> usize {
        match self {
            Self::Gsm7 => GSM7_SINGLE_LEN,
            Self::Ucs2 => UCS2_SINGLE_LEN,
        }
    }

    pub fn multipart_len(&self) -> usize {
        match self {
            Self::Gsm7 => GSM7_MULTIPART_LEN,
            Self::Ucs2 => UCS2_MULTIPART_LEN,
        }
    }

    /// Platz, den ein Zeichen in dieser Kodierung belegt
    fn units(&self, c: char) -> usize {
        match self {
            Self::Gsm7 if GSM7_EXTENSION.contains(c) => 2,
            Self::Gsm7 => 1,
            Self::Ucs2 => c.len_utf16(),
        }
    }
}

/// Teilt einen Text in SMS-Segmente auf
///
/// Zeichen werden nie getrennt, auch keine Escape-Sequenzen oder Surrogate.
pub fn divide_message(text: &str) -> Vec<String> {
    let encoding = SmsEncoding::detect(text);
    let total: usize = text.chars().map(|c| encoding.units(c)).sum();
    if total <= encoding.single_len() {
        return vec![text.to_string()];
    }

    let limit = encoding.multipart_len();
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut used = 0;
    for c in text.chars() {
        let units = encoding.units(c);
        if used + units > limit {
            parts.push(std::mem::take(&mut current));
            used = 0;
        }
        current.push(c);
        used += units;
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

// ============================================================================
// INVITE SENDER
// ============================================================================

pub struct InviteSender {
    transport: Arc<dyn SmsTransport>,
    settings: Arc<RwLock<Settings>>,
}

impl InviteSender {
    pub fn new(transport: Arc<dyn SmsTransport>, settings: Arc<RwLock<Settings>>) -> Self {
        Self {
            transport,
            settings,
        }
    }

    /// Text der Einladung aus den aktuellen Einstellungen
    pub fn compose(&self) -> String {
        let settings = self.settings.read();
        format!("{} {}", settings.invite.message.trim_end(), settings.invite.link)
    }

    /// Sendet den Install-Link, gibt die Anzahl der Segmente zurück
    pub fn send_install_link(&self, destination: &str) -> Result<usize, InviteError> {
        let destination = destination.trim();
        if destination.is_empty() {
            return Err(InviteError::EmptyDestination);
        }

        let parts = divide_message(&self.compose());
        tracing::info!(
            "Sending install invite to {} ({} part(s))",
            destination,
            parts.len()
        );
        self.transport.send_multipart(destination, &parts)?;
        Ok(parts.len())
    }
}

impl std::fmt::Debug for InviteSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InviteSender")
            .field("message", &self.compose())
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================
