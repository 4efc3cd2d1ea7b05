//! Persisted records: instances, the append-only logs, and daily metrics.
//!
//! Field names serialize in camelCase so API responses can return these
//! types as they are stored.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use lifeline_core::{EventKind, InstanceId, Timestamp};

// ── Instance ──────────────────────────────────────────────────────

/// Derived state of one monitored client instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    #[serde(rename = "instanceID")]
    pub id: InstanceId,
    pub created_at: Timestamp,
    pub is_online: bool,
    pub last_setup_at: Option<Timestamp>,
    pub last_start_at: Option<Timestamp>,
    pub last_utterance_at: Option<Timestamp>,
    pub last_heartbeat_at: Option<Timestamp>,
    pub last_stop_at: Option<Timestamp>,
    pub last_error_at: Option<Timestamp>,
    /// Seconds between the last start and the last heartbeat or stop.
    pub last_uptime: u64,
    /// Caller-supplied extension attributes (scalars only).
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl Instance {
    /// A fresh, offline instance with no history.
    pub fn new(id: impl Into<InstanceId>, created_at: Timestamp) -> Self {
        Self {
            id: id.into(),
            created_at,
            is_online: false,
            last_setup_at: None,
            last_start_at: None,
            last_utterance_at: None,
            last_heartbeat_at: None,
            last_stop_at: None,
            last_error_at: None,
            last_uptime: 0,
            attributes: BTreeMap::new(),
        }
    }
}

// ── Append-only records ───────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    #[serde(rename = "instanceID")]
    pub instance_id: InstanceId,
    pub kind: EventKind,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UtteranceRecord {
    #[serde(rename = "instanceID")]
    pub instance_id: InstanceId,
    pub created_at: Timestamp,
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    #[serde(rename = "instanceID")]
    pub instance_id: InstanceId,
    pub message: String,
    pub created_at: Timestamp,
}

/// A record appended in the same transaction as an instance update.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Event(EventRecord),
    Utterance(UtteranceRecord),
    Error(ErrorRecord),
}

impl Record {
    pub fn created_at(&self) -> Timestamp {
        match self {
            Record::Event(e) => e.created_at,
            Record::Utterance(u) => u.created_at,
            Record::Error(e) => e.created_at,
        }
    }
}

/// The outcome of an instance transition: the new row plus what to append.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceWrite {
    pub instance: Instance,
    pub records: Vec<Record>,
}

// ── Daily metrics ─────────────────────────────────────────────────

/// Immutable point-in-time rollup produced by one aggregation run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DailyMetric {
    pub instances_nb: u64,
    pub active_instances_nb: u64,
    pub utterances_nb: u64,
    pub setups_nb: u64,
    pub online_instances_nb: u64,
    pub created_at: Timestamp,
}

// ── Windows ───────────────────────────────────────────────────────

/// Closed time interval `[start, end]` in epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl TimeWindow {
    /// Every representable timestamp.
    pub const ALL: TimeWindow = TimeWindow {
        start: 0,
        end: Timestamp::MAX,
    };

    /// The window of length `span` that ends at `end`.
    pub fn ending_at(end: Timestamp, span: Duration) -> Self {
        Self {
            start: end.saturating_sub(span.as_millis() as u64),
            end,
        }
    }

    pub fn contains(&self, ts: Timestamp) -> bool {
        self.start <= ts && ts <= self.end
    }
}
