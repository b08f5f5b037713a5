//! Gemeinsame Test-Helfer
//!
//! `Recorder` implementiert alle Host-Traits und protokolliert jeden Aufruf.

use crate::call_engine::{
    AudioCue, CallController, CallId, Collaborators, DiagnosticsReport, HostSurface,
    Presentation, Prompt, Ringer,
};
use crate::config::Settings;
use crate::invite::{InviteError, InviteSender, SmsTransport};
use crate::signaling::RemoteIdentity;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Reset,
    Incoming(String),
    Active {
        number: Option<String>,
        status: String,
        auth: Option<String>,
    },
    Prompt(Prompt),
    Notice(String),
    Play(AudioCue),
    Stop,
    Finalize,
    Diagnostics(CallId),
    Sms {
        destination: String,
        parts: usize,
    },
}

#[derive(Debug, Default)]
pub struct Recorder {
    records: Mutex<Vec<Record>>,
}

impl Recorder {
    pub fn records(&self) -> Vec<Record> {
        self.records.lock().clone()
    }

    pub fn count(&self, predicate: impl Fn(&Record) -> bool) -> usize {
        self.records.lock().iter().filter(|r| predicate(r)).count()
    }

    /// Wie oft ein Status im Active-Call-Screen angezeigt wurde
    pub fn count_status(&self, status: &str) -> usize {
        self.count(|r| matches!(r, Record::Active { status: s, .. } if s == status))
    }

    pub fn last_status(&self) -> Option<String> {
        self.records.lock().iter().rev().find_map(|r| match r {
            Record::Active { status, .. } => Some(status.clone()),
            _ => None,
        })
    }

    /// Alle angezeigten Status in Reihenfolge
    pub fn statuses(&self) -> Vec<String> {
        self.records
            .lock()
            .iter()
            .filter_map(|r| match r {
                Record::Active { status, .. } => Some(status.clone()),
                _ => None,
            })
            .collect()
    }

    /// Letzter Screen-Aufruf (Reset, Incoming oder Active)
    pub fn last_screen(&self) -> Option<Record> {
        self.records
            .lock()
            .iter()
            .rev()
            .find(|r| matches!(r, Record::Reset | Record::Incoming(_) | Record::Active { .. }))
            .cloned()
    }

    fn push(&self, record: Record) {
        self.records.lock().push(record);
    }
}

impl Presentation for Recorder {
    fn reset(&self) {
        self.push(Record::Reset);
    }

    fn show_incoming_call(&self, identity: &RemoteIdentity) {
        self.push(Record::Incoming(identity.number.clone()));
    }

    fn show_active_call(&self, identity: Option<&RemoteIdentity>, status: &str, auth: Option<&str>) {
        self.push(Record::Active {
            number: identity.map(|i| i.number.clone()),
            status: status.to_string(),
            auth: auth.map(str::to_string),
        });
    }

    fn show_prompt(&self, prompt: &Prompt) {
        self.push(Record::Prompt(prompt.clone()));
    }

    fn show_notice(&self, text: &str) {
        self.push(Record::Notice(text.to_string()));
    }
}

impl Ringer for Recorder {
    fn play(&self, cue: AudioCue) {
        self.push(Record::Play(cue));
    }

    fn stop(&self) {
        self.push(Record::Stop);
    }
}

impl HostSurface for Recorder {
    fn finalize(&self) {
        self.push(Record::Finalize);
    }

    fn submit_diagnostics(&self, report: DiagnosticsReport) {
        self.push(Record::Diagnostics(report.call_id));
    }
}

impl SmsTransport for Recorder {
    fn send_multipart(&self, destination: &str, parts: &[String]) -> Result<(), InviteError> {
        self.push(Record::Sms {
            destination: destination.to_string(),
            parts: parts.len(),
        });
        Ok(())
    }
}

/// Controller, dessen Kollaborateure alle in `recorder` protokollieren
pub fn controller(recorder: &Arc<Recorder>) -> CallController {
    let settings = Arc::new(RwLock::new(Settings::default()));
    let collaborators = Collaborators {
        presentation: recorder.clone(),
        ringer: recorder.clone(),
        host: recorder.clone(),
        invites: InviteSender::new(recorder.clone(), Arc::clone(&settings)),
    };
    CallController::new(collaborators, settings)
}
