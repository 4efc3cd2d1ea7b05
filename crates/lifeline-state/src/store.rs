//! StateStore — redb-backed implementation of [`TelemetryRepository`].
//!
//! Supports both on-disk and in-memory backends (the latter for testing).

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use redb::{
    Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition,
    WriteTransaction,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use lifeline_core::{EventKind, InstanceId, Timestamp};

use crate::error::{StateError, StateResult};
use crate::repository::{Decide, TelemetryRepository};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

type LogTable = TableDefinition<'static, &'static str, &'static [u8]>;

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(INSTANCES).map_err(map_err!(Table))?;
        txn.open_table(EVENTS).map_err(map_err!(Table))?;
        txn.open_table(UTTERANCES).map_err(map_err!(Table))?;
        txn.open_table(ERRORS).map_err(map_err!(Table))?;
        txn.open_table(DAILY_METRICS).map_err(map_err!(Table))?;
        txn.open_table(META).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Decode every record of a log table whose timestamp falls in `window`,
    /// oldest first.
    fn visit_log<T: DeserializeOwned>(
        &self,
        table: LogTable,
        window: TimeWindow,
        mut visit: impl FnMut(T),
    ) -> StateResult<()> {
        let lo = lower_bound(window.start);
        let hi = upper_bound(window.end);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table).map_err(map_err!(Table))?;
        for entry in table
            .range(lo.as_str()..hi.as_str())
            .map_err(map_err!(Read))?
        {
            let (_, value) = entry.map_err(map_err!(Read))?;
            visit(decode(value.value())?);
        }
        Ok(())
    }

    fn visit_instances(&self, mut visit: impl FnMut(Instance)) -> StateResult<()> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(INSTANCES).map_err(map_err!(Table))?;
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            visit(decode(value.value())?);
        }
        Ok(())
    }
}

// ── Transaction helpers ────────────────────────────────────────────

fn encode<T: Serialize>(value: &T) -> StateResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(map_err!(Serialize))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StateResult<T> {
    serde_json::from_slice(bytes).map_err(map_err!(Deserialize))
}

/// Reserve `count` sequence numbers, returning the first.
fn reserve_seq(txn: &WriteTransaction, count: u64) -> StateResult<u64> {
    let mut meta = txn.open_table(META).map_err(map_err!(Table))?;
    let last = meta
        .get(SEQ_KEY)
        .map_err(map_err!(Read))?
        .map(|guard| guard.value())
        .unwrap_or(0);
    meta.insert(SEQ_KEY, last + count).map_err(map_err!(Write))?;
    Ok(last + 1)
}

fn append_records(txn: &WriteTransaction, records: &[Record]) -> StateResult<()> {
    if records.is_empty() {
        return Ok(());
    }
    let mut seq = reserve_seq(txn, records.len() as u64)?;
    let mut events = txn.open_table(EVENTS).map_err(map_err!(Table))?;
    let mut utterances = txn.open_table(UTTERANCES).map_err(map_err!(Table))?;
    let mut errors = txn.open_table(ERRORS).map_err(map_err!(Table))?;

    for record in records {
        let key = record_key(record.created_at(), seq);
        seq += 1;
        let (table, value) = match record {
            Record::Event(e) => (&mut events, encode(e)?),
            Record::Utterance(u) => (&mut utterances, encode(u)?),
            Record::Error(e) => (&mut errors, encode(e)?),
        };
        table
            .insert(key.as_str(), value.as_slice())
            .map_err(map_err!(Write))?;
    }
    Ok(())
}

fn write_instance(
    txn: &WriteTransaction,
    id: &str,
    decide: &mut Decide<'_>,
) -> StateResult<Instance> {
    let mut instances = txn.open_table(INSTANCES).map_err(map_err!(Table))?;
    let current = match instances.get(id).map_err(map_err!(Read))? {
        Some(guard) => Some(decode::<Instance>(guard.value())?),
        None => None,
    };
    let write = decide(current)?;
    let value = encode(&write.instance)?;
    instances
        .insert(id, value.as_slice())
        .map_err(map_err!(Write))?;
    drop(instances);
    append_records(txn, &write.records)?;
    Ok(write.instance)
}

impl TelemetryRepository for StateStore {
    // ── Instances ──────────────────────────────────────────────────

    fn find_instance(&self, id: &str) -> StateResult<Option<Instance>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(INSTANCES).map_err(map_err!(Table))?;
        match table.get(id).map_err(map_err!(Read))? {
            Some(guard) => Ok(Some(decode(guard.value())?)),
            None => Ok(None),
        }
    }

    fn create_instance(&self, instance: &Instance) -> StateResult<bool> {
        let value = encode(instance)?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let created;
        {
            let mut table = txn.open_table(INSTANCES).map_err(map_err!(Table))?;
            created = table
                .get(instance.id.as_str())
                .map_err(map_err!(Read))?
                .is_none();
            if created {
                table
                    .insert(instance.id.as_str(), value.as_slice())
                    .map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(instance_id = %instance.id, created, "instance create");
        Ok(created)
    }

    fn update_instance(&self, id: &str, decide: &mut Decide<'_>) -> StateResult<Instance> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        match write_instance(&txn, id, decide) {
            Ok(instance) => {
                txn.commit().map_err(map_err!(Transaction))?;
                debug!(instance_id = %id, online = instance.is_online, "instance stored");
                Ok(instance)
            }
            Err(e) => {
                txn.abort().map_err(map_err!(Transaction))?;
                Err(e)
            }
        }
    }

    fn list_instances(&self) -> StateResult<Vec<Instance>> {
        let mut results = Vec::new();
        self.visit_instances(|inst| results.push(inst))?;
        Ok(results)
    }

    // ── Event store reads ──────────────────────────────────────────

    fn list_events_for_instance(&self, id: &str) -> StateResult<Vec<EventRecord>> {
        let mut results = Vec::new();
        self.visit_log(EVENTS, TimeWindow::ALL, |e: EventRecord| {
            if e.instance_id == id {
                results.push(e);
            }
        })?;
        Ok(results)
    }

    fn list_utterances_for_instance(&self, id: &str) -> StateResult<Vec<UtteranceRecord>> {
        let mut results = Vec::new();
        self.visit_log(UTTERANCES, TimeWindow::ALL, |u: UtteranceRecord| {
            if u.instance_id == id {
                results.push(u);
            }
        })?;
        Ok(results)
    }

    fn list_errors_for_instance(&self, id: &str) -> StateResult<Vec<ErrorRecord>> {
        let mut results = Vec::new();
        self.visit_log(ERRORS, TimeWindow::ALL, |e: ErrorRecord| {
            if e.instance_id == id {
                results.push(e);
            }
        })?;
        Ok(results)
    }

    // ── Window counts ──────────────────────────────────────────────

    fn count_instances_created(&self, window: TimeWindow) -> StateResult<u64> {
        let mut count = 0;
        self.visit_instances(|inst| {
            if window.contains(inst.created_at) {
                count += 1;
            }
        })?;
        Ok(count)
    }

    fn count_events_in_window(&self, kind: EventKind, window: TimeWindow) -> StateResult<u64> {
        let mut count = 0;
        self.visit_log(EVENTS, window, |e: EventRecord| {
            if e.kind == kind {
                count += 1;
            }
        })?;
        Ok(count)
    }

    fn count_instances_with_event(
        &self,
        kind: EventKind,
        window: TimeWindow,
    ) -> StateResult<u64> {
        let mut seen = HashSet::new();
        self.visit_log(EVENTS, window, |e: EventRecord| {
            if e.kind == kind {
                seen.insert(e.instance_id);
            }
        })?;
        Ok(seen.len() as u64)
    }

    fn count_utterances_in_window(&self, window: TimeWindow) -> StateResult<u64> {
        let mut count = 0;
        self.visit_log(UTTERANCES, window, |_: UtteranceRecord| count += 1)?;
        Ok(count)
    }

    fn count_instances_with_utterance(&self, window: TimeWindow) -> StateResult<u64> {
        let mut seen = HashSet::new();
        self.visit_log(UTTERANCES, window, |u: UtteranceRecord| {
            seen.insert(u.instance_id);
        })?;
        Ok(seen.len() as u64)
    }

    // ── Staleness ──────────────────────────────────────────────────

    fn mark_stale_offline(&self, cutoff: Timestamp) -> StateResult<Vec<InstanceId>> {
        let lo = lower_bound(cutoff);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let mut flipped = Vec::new();
        {
            let mut fresh = HashSet::new();
            let events = txn.open_table(EVENTS).map_err(map_err!(Table))?;
            for entry in events.range(lo.as_str()..).map_err(map_err!(Read))? {
                let (_, value) = entry.map_err(map_err!(Read))?;
                let event: EventRecord = decode(value.value())?;
                fresh.insert(event.instance_id);
            }
            drop(events);

            let mut instances = txn.open_table(INSTANCES).map_err(map_err!(Table))?;
            let mut stale = Vec::new();
            for entry in instances.iter().map_err(map_err!(Read))? {
                let (_, value) = entry.map_err(map_err!(Read))?;
                let inst: Instance = decode(value.value())?;
                if inst.is_online && !fresh.contains(&inst.id) {
                    stale.push(inst);
                }
            }
            for mut inst in stale {
                inst.is_online = false;
                let value = encode(&inst)?;
                instances
                    .insert(inst.id.as_str(), value.as_slice())
                    .map_err(map_err!(Write))?;
                flipped.push(inst.id);
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(cutoff, flipped = flipped.len(), "stale instances marked offline");
        Ok(flipped)
    }

    // ── Daily metrics ──────────────────────────────────────────────

    fn put_daily_metric(&self, metric: &DailyMetric) -> StateResult<()> {
        let value = encode(metric)?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let seq = reserve_seq(&txn, 1)?;
            let key = record_key(metric.created_at, seq);
            let mut table = txn.open_table(DAILY_METRICS).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(created_at = metric.created_at, "daily metric stored");
        Ok(())
    }

    fn list_daily_metrics(&self, limit: usize) -> StateResult<Vec<DailyMetric>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(DAILY_METRICS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))?.rev() {
            if results.len() >= limit {
                break;
            }
            let (_, value) = entry.map_err(map_err!(Read))?;
            results.push(decode(value.value())?);
        }
        Ok(results)
    }

    fn count_daily_metrics(&self) -> StateResult<u64> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(DAILY_METRICS).map_err(map_err!(Table))?;
        table.len().map_err(map_err!(Read))
    }
}
