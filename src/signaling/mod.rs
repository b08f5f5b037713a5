//! Signaling Module - Schnittstelle zum Calling-Service
//!
//! Dieses Modul beschreibt die Seite der Session:
//! - Events, die der Service asynchron meldet
//! - Das `Session`-Trait (Snapshot, Event-Stream, Anfragen)
//! - Eine In-Process Session für Hosts ohne eigenen Service
//!

mod events;
mod session;

pub use events::{RemoteIdentity, SessionEvent, TerminationCause};
pub use session::{LoopbackSession, Session, SessionRequest, EVENT_CHANNEL_CAPACITY};
