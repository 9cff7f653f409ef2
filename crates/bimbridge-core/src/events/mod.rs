//! Domain events and the append-only event store
//!
//! Events are the audit and undo substrate for command execution. Every
//! document mutation a command performs is recorded as a `DomainEvent`;
//! undo replays the inverse of those events. The store guarantees a
//! strictly increasing, gap-free sequence per session and never mutates or
//! removes an appended event for the lifetime of the session.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use bimbridge_host::{ElementId, ParamValue};

/// A unique event ID (UUID).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        EventId(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What happened, as a discriminated payload.
///
/// Undo handlers pattern-match on these variants; creation/modification
/// variants carry everything needed to compute their inverse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum EventPayload {
    TransactionStarted {
        command_name: String,
    },
    TransactionCommitted {
        elements_affected: u32,
    },
    TransactionRolledBack {
        error: String,
    },
    ElementCreated {
        element_id: ElementId,
        category: String,
        type_name: String,
    },
    ParameterChanged {
        element_id: ElementId,
        name: String,
        previous: ParamValue,
        current: ParamValue,
    },
    ElementDeleted {
        element_id: ElementId,
    },
    UndoApplied {
        undone_command_id: Uuid,
        events_reversed: u32,
    },
}

/// An immutable record of one state change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    pub event_id: EventId,
    pub command_id: Uuid,
    pub user_id: String,
    pub session_id: String,
    /// Strictly increasing, gap-free within a session.
    pub sequence: u64,
    pub correlation_id: String,
    pub payload: EventPayload,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct SessionLog {
    next_sequence: u64,
    events: Vec<DomainEvent>,
}

/// Append-only event store with per-session sequencing.
///
/// A single lock covers the sequence counter and the append, so sequences
/// stay gap-free under concurrent writers.
#[derive(Debug, Default)]
pub struct EventStore {
    sessions: Mutex<HashMap<String, SessionLog>>,
}

impl EventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event, returning its sequence number.
    pub fn append(
        &self,
        command_id: Uuid,
        user_id: &str,
        session_id: &str,
        correlation_id: &str,
        payload: EventPayload,
    ) -> u64 {
        let mut sessions = self.sessions.lock().unwrap();
        let log = sessions.entry(session_id.to_string()).or_default();
        let sequence = log.next_sequence;
        log.next_sequence += 1;
        log.events.push(DomainEvent {
            event_id: EventId::new(),
            command_id,
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
            sequence,
            correlation_id: correlation_id.to_string(),
            payload,
            timestamp: Utc::now(),
        });
        tracing::debug!(session = session_id, sequence, "event appended");
        sequence
    }

    /// All events for a session, in sequence order.
    pub fn events_for_session(&self, session_id: &str) -> Vec<DomainEvent> {
        let sessions = self.sessions.lock().unwrap();
        sessions
            .get(session_id)
            .map(|log| log.events.clone())
            .unwrap_or_default()
    }

    /// All events recorded for one command, in sequence order (undo path).
    pub fn events_for_command(&self, command_id: Uuid) -> Vec<DomainEvent> {
        let sessions = self.sessions.lock().unwrap();
        let mut events: Vec<DomainEvent> = sessions
            .values()
            .flat_map(|log| log.events.iter())
            .filter(|e| e.command_id == command_id)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.sequence);
        events
    }
}
