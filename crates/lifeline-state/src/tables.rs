//! redb table definitions for the Lifeline state store.
//!
//! Instances are keyed by instance ID. The append-only logs are keyed by
//! `{created_at:020}:{seq:020}` (see [`record_key`]).

use redb::TableDefinition;

use lifeline_core::Timestamp;

/// Instance rows keyed by `{instance_id}`.
pub const INSTANCES: TableDefinition<&str, &[u8]> = TableDefinition::new("instances");

/// Lifecycle events.
pub const EVENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("events");

/// Utterance payloads.
pub const UTTERANCES: TableDefinition<&str, &[u8]> = TableDefinition::new("utterances");

/// Error reports.
pub const ERRORS: TableDefinition<&str, &[u8]> = TableDefinition::new("errors");

/// Daily metric snapshots.
pub const DAILY_METRICS: TableDefinition<&str, &[u8]> = TableDefinition::new("daily_metrics");

/// Counters shared by the append-only logs.
pub const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

/// Key in [`META`] holding the last issued record sequence number.
pub const SEQ_KEY: &str = "record_seq";

/// Key for an append-only record. Zero padding makes lexical order equal
/// chronological order; `seq` keeps same-millisecond records distinct.
pub fn record_key(created_at: Timestamp, seq: u64) -> String {
    format!("{created_at:020}:{seq:020}")
}

/// Lower bound (inclusive) of all record keys with `created_at >= ts`.
pub fn lower_bound(ts: Timestamp) -> String {
    format!("{ts:020}")
}

/// Upper bound (exclusive) of all record keys with `created_at <= ts`.
pub fn upper_bound(ts: Timestamp) -> String {
    format!("{:020}", ts.saturating_add(1))
}
