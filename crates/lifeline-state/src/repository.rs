//! The storage contract the registry and the aggregation engine depend on.

use std::sync::Arc;

use lifeline_core::{EventKind, InstanceId, Timestamp};

use crate::error::StateResult;
use crate::types::*;

/// Read-decide step of an atomic instance update.
///
/// Receives the current row (`None` if the instance is unknown) and returns
/// the row to store plus the records to append. Returning an error aborts
/// the transaction with nothing written.
pub type Decide<'a> = dyn FnMut(Option<Instance>) -> StateResult<InstanceWrite> + 'a;

/// Persistence operations over instances, the append-only logs, and
/// daily metrics.
///
/// Implementations must run [`update_instance`](Self::update_instance) and
/// [`mark_stale_offline`](Self::mark_stale_offline) as single write
/// transactions.
pub trait TelemetryRepository: Send + Sync {
    // ── Instances ──────────────────────────────────────────────────

    fn find_instance(&self, id: &str) -> StateResult<Option<Instance>>;

    /// Insert `instance` unless a row with its ID exists. Returns whether
    /// it was inserted.
    fn create_instance(&self, instance: &Instance) -> StateResult<bool>;

    /// Atomically read the instance, let `decide` compute its new state,
    /// then store it together with the appended records.
    fn update_instance(&self, id: &str, decide: &mut Decide<'_>) -> StateResult<Instance>;

    fn list_instances(&self) -> StateResult<Vec<Instance>>;

    // ── Event store reads ──────────────────────────────────────────

    fn list_events_for_instance(&self, id: &str) -> StateResult<Vec<EventRecord>>;

    fn list_utterances_for_instance(&self, id: &str) -> StateResult<Vec<UtteranceRecord>>;

    fn list_errors_for_instance(&self, id: &str) -> StateResult<Vec<ErrorRecord>>;

    // ── Window counts ──────────────────────────────────────────────

    /// Instances whose `created_at` falls in `window`.
    fn count_instances_created(&self, window: TimeWindow) -> StateResult<u64>;

    /// Events of `kind` in `window`.
    fn count_events_in_window(&self, kind: EventKind, window: TimeWindow) -> StateResult<u64>;

    /// Distinct instances with at least one event of `kind` in `window`.
    fn count_instances_with_event(&self, kind: EventKind, window: TimeWindow)
    -> StateResult<u64>;

    fn count_utterances_in_window(&self, window: TimeWindow) -> StateResult<u64>;

    /// Distinct instances with at least one utterance in `window`.
    fn count_instances_with_utterance(&self, window: TimeWindow) -> StateResult<u64>;

    // ── Staleness ──────────────────────────────────────────────────

    /// Set `is_online = false` on every instance with no event at or after
    /// `cutoff`. Returns the IDs that were online and got flipped.
    fn mark_stale_offline(&self, cutoff: Timestamp) -> StateResult<Vec<InstanceId>>;

    // ── Daily metrics ──────────────────────────────────────────────

    fn put_daily_metric(&self, metric: &DailyMetric) -> StateResult<()>;

    /// Most recent snapshots first.
    fn list_daily_metrics(&self, limit: usize) -> StateResult<Vec<DailyMetric>>;

    /// Number of stored snapshots, without decoding them.
    fn count_daily_metrics(&self) -> StateResult<u64>;
}

pub type SharedRepository = Arc<dyn TelemetryRepository>;
