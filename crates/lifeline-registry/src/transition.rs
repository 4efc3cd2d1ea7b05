//! Pure lifecycle transitions.
//!
//! A [`Transition`] maps the current instance row (if any) and the current
//! time to the new row plus the records to append. It performs no I/O, so
//! the registry can run it inside a storage transaction.

use serde_json::Value;

use lifeline_core::config::AttributeLimits;
use lifeline_core::{EventKind, Timestamp};
use lifeline_state::{
    ErrorRecord, EventRecord, Instance, InstanceWrite, Record, StateError, StateResult,
    UtteranceRecord,
};

use crate::attributes::merge_attributes;

/// Whether a transition may create an unknown instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    CreateIfAbsent,
    RequireExisting,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Setup,
    Started { data: Value },
    Heartbeat,
    Stopped,
    Utterance { data: Value },
    Error { message: String },
}

impl Transition {
    /// The transition a bare event of `kind` triggers.
    pub fn for_event(kind: EventKind) -> Self {
        match kind {
            EventKind::Setup => Transition::Setup,
            EventKind::Started => Transition::Started { data: Value::Null },
            EventKind::Heartbeat => Transition::Heartbeat,
            EventKind::Stopped => Transition::Stopped,
            EventKind::Utterance => Transition::Utterance { data: Value::Null },
        }
    }

    /// The event kind this transition appends, if any. Errors are not events.
    pub fn event_kind(&self) -> Option<EventKind> {
        match self {
            Transition::Setup => Some(EventKind::Setup),
            Transition::Started { .. } => Some(EventKind::Started),
            Transition::Heartbeat => Some(EventKind::Heartbeat),
            Transition::Stopped => Some(EventKind::Stopped),
            Transition::Utterance { .. } => Some(EventKind::Utterance),
            Transition::Error { .. } => None,
        }
    }

    pub fn admission(&self) -> Admission {
        match self {
            Transition::Setup | Transition::Started { .. } => Admission::CreateIfAbsent,
            _ => Admission::RequireExisting,
        }
    }

    pub fn name(&self) -> &'static str {
        match self.event_kind() {
            Some(kind) => kind.as_str(),
            None => "ERROR",
        }
    }

    /// Compute the new row and appended records.
    ///
    /// Fails with [`StateError::NotFound`] when `current` is `None` and
    /// `admission` is [`Admission::RequireExisting`].
    pub fn apply(
        &self,
        id: &str,
        current: Option<Instance>,
        admission: Admission,
        now: Timestamp,
        limits: &AttributeLimits,
    ) -> StateResult<InstanceWrite> {
        let mut instance = match (current, admission) {
            (Some(instance), _) => instance,
            (None, Admission::CreateIfAbsent) => Instance::new(id, now),
            (None, Admission::RequireExisting) => {
                return Err(StateError::NotFound(id.to_string()));
            }
        };

        let mut records = Vec::with_capacity(2);
        match self {
            Transition::Setup => {
                instance.last_setup_at = Some(now);
            }
            Transition::Started { data } => {
                merge_attributes(id, &mut instance.attributes, data, limits);
                instance.is_online = true;
                instance.last_start_at = Some(now);
            }
            Transition::Heartbeat => {
                instance.is_online = true;
                instance.last_uptime = uptime_secs(instance.last_start_at, now);
                instance.last_heartbeat_at = Some(now);
            }
            Transition::Stopped => {
                instance.is_online = false;
                instance.last_uptime = uptime_secs(instance.last_start_at, now);
                instance.last_stop_at = Some(now);
            }
            Transition::Utterance { data } => {
                records.push(Record::Utterance(UtteranceRecord {
                    instance_id: id.to_string(),
                    created_at: now,
                    data: data.clone(),
                }));
                instance.last_utterance_at = Some(now);
            }
            Transition::Error { message } => {
                records.push(Record::Error(ErrorRecord {
                    instance_id: id.to_string(),
                    message: message.clone(),
                    created_at: now,
                }));
                instance.last_error_at = Some(now);
            }
        }

        if let Some(kind) = self.event_kind() {
            records.push(Record::Event(EventRecord {
                instance_id: id.to_string(),
                kind,
                created_at: now,
            }));
        }

        Ok(InstanceWrite { instance, records })
    }
}

/// Whole seconds since `started_at`, rounded; zero if never started or if
/// `now` precedes the start.
pub fn uptime_secs(started_at: Option<Timestamp>, now: Timestamp) -> u64 {
    match started_at {
        Some(start) => (now.saturating_sub(start) as f64 / 1_000.0).round() as u64,
        None => 0,
    }
}
