//! Session model and the directory of connected participants.
//!
//! The directory is the single authoritative membership view. It lives
//! inside the dispatch loop and is never shared: everything else reaches
//! it through events, and fan-out tasks only ever see snapshots of the
//! sink handles it hands back.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use uuid::Uuid;

/// One outbound frame pushed to a connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A chunk of text, written to the socket as-is.
    Line(String),
    /// Ask the writer task to shut the stream down and stop.
    Close,
}

/// Sender half of a connection's outbound channel.
/// The dispatcher clones this to push composed lines to a client.
pub type OutboundSender = mpsc::UnboundedSender<Frame>;

/// Server-side record of one connected, named participant.
#[derive(Debug, Clone)]
pub struct Session {
    /// Display name, exactly as submitted at login.
    pub name: String,
    /// Write-only handle to the connection.
    pub sink: OutboundSender,
    /// Whether broadcast lines are prefixed with a timestamp for this
    /// client. Toggled by `/timestamp`, off by default.
    pub show_timestamps: bool,
    /// When the login was admitted.
    pub connected_at: DateTime<Utc>,
    /// Identity of the originating connection. Removal is gated on this
    /// so a rejected duplicate login can never evict the name holder.
    pub conn_id: Uuid,
}

/// What a fan-out task needs to deliver one message to one client.
#[derive(Debug, Clone)]
pub struct Recipient {
    pub sink: OutboundSender,
    pub show_timestamps: bool,
}

/// The authoritative mapping of display names to sessions.
///
/// Keyed by the exact submitted name; login-conflict and whisper lookups
/// compare case-insensitively. Invariant: at most one live session per
/// case-insensitive name.
#[derive(Debug, Default)]
pub struct Directory {
    sessions: HashMap<String, Session>,
}

impl Directory {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
        }
    }

    /// True if a session with a case-insensitively equal name exists.
    pub fn contains_name(&self, name: &str) -> bool {
        let lowered = name.to_lowercase();
        self.sessions.keys().any(|k| k.to_lowercase() == lowered)
    }

    /// Admit a session under its exact submitted name.
    pub fn insert(&mut self, session: Session) {
        self.sessions.insert(session.name.clone(), session);
    }

    /// Look up a session by exact name.
    pub fn get(&self, name: &str) -> Option<&Session> {
        self.sessions.get(name)
    }

    /// Mutable lookup by exact name (timestamp toggle).
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Session> {
        self.sessions.get_mut(name)
    }

    /// Look up a session by case-insensitive name (whisper targets).
    pub fn find(&self, name: &str) -> Option<&Session> {
        let lowered = name.to_lowercase();
        self.sessions
            .values()
            .find(|s| s.name.to_lowercase() == lowered)
    }

    /// Remove the session registered under `name`, but only when it was
    /// created by the same connection.
    pub fn remove(&mut self, name: &str, conn_id: Uuid) -> Option<Session> {
        match self.sessions.get(name) {
            Some(s) if s.conn_id == conn_id => self.sessions.remove(name),
            _ => None,
        }
    }

    /// Names of all current sessions, in no particular order.
    pub fn names(&self) -> Vec<String> {
        self.sessions.keys().cloned().collect()
    }

    /// Copy of every session's delivery handle and timestamp preference,
    /// taken before fan-out so detached tasks never read the live map.
    pub fn delivery_snapshot(&self) -> Vec<Recipient> {
        self.sessions
            .values()
            .map(|s| Recipient {
                sink: s.sink.clone(),
                show_timestamps: s.show_timestamps,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
