//! Daily scheduler — fires the aggregation engine at a fixed UTC time.
//!
//! Runs are single-flight: a trigger that arrives while a run is in
//! progress is skipped, never run alongside it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, NaiveTime, TimeDelta, Utc};
use tokio::sync::{Mutex, watch};
use tracing::{debug, error, info, warn};

use lifeline_core::{SharedClock, Timestamp};

use crate::engine::{AggregationEngine, RunReport};
use crate::error::AggregateError;

/// Observer of run lifecycle events.
pub trait RunHooks: Send + Sync {
    fn on_started(&self, _run_id: u64) {}
    fn on_completed(&self, _run_id: u64, _report: &RunReport) {}
    fn on_failed(&self, _run_id: u64, _error: &AggregateError) {}
    fn on_skipped(&self) {}
}

/// Hooks that only log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogHooks;

impl RunHooks for LogHooks {
    fn on_started(&self, run_id: u64) {
        info!(run_id, "daily aggregation started");
    }

    fn on_completed(&self, run_id: u64, report: &RunReport) {
        info!(
            run_id,
            created_at = report.metric.created_at,
            flipped_offline = report.flipped_offline.len(),
            "daily aggregation completed"
        );
    }

    fn on_failed(&self, run_id: u64, err: &AggregateError) {
        error!(run_id, error = %err, "daily aggregation failed");
    }

    fn on_skipped(&self) {
        warn!("daily aggregation skipped, previous run still in progress");
    }
}

/// Result of one trigger.
#[derive(Debug)]
pub enum RunOutcome {
    Completed(RunReport),
    Failed(AggregateError),
    Skipped,
}

/// Fires [`AggregationEngine::run`] once a day at `run_at` UTC.
#[derive(Clone)]
pub struct DailyScheduler {
    engine: AggregationEngine,
    clock: SharedClock,
    run_at: NaiveTime,
    hooks: Arc<dyn RunHooks>,
    in_flight: Arc<Mutex<()>>,
    runs: Arc<AtomicU64>,
}

impl DailyScheduler {
    pub fn new(engine: AggregationEngine, clock: SharedClock, run_at: NaiveTime) -> Self {
        Self {
            engine,
            clock,
            run_at,
            hooks: Arc::new(LogHooks),
            in_flight: Arc::new(Mutex::new(())),
            runs: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn RunHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Run the engine now unless a run is already in flight.
    ///
    /// Failures are reported through the hooks and returned; they never
    /// propagate as panics.
    pub async fn trigger(&self) -> RunOutcome {
        let Ok(_guard) = self.in_flight.clone().try_lock_owned() else {
            self.hooks.on_skipped();
            return RunOutcome::Skipped;
        };

        let run_id = self.runs.fetch_add(1, Ordering::Relaxed) + 1;
        self.hooks.on_started(run_id);

        let engine = self.engine.clone();
        let result = match tokio::task::spawn_blocking(move || engine.run()).await {
            Ok(result) => result,
            Err(e) => Err(AggregateError::Aborted(e.to_string())),
        };

        match result {
            Ok(report) => {
                self.hooks.on_completed(run_id, &report);
                RunOutcome::Completed(report)
            }
            Err(e) => {
                self.hooks.on_failed(run_id, &e);
                RunOutcome::Failed(e)
            }
        }
    }

    /// Run the schedule loop until shutdown signal.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(run_at = %self.run_at, "daily aggregation scheduler started");

        // The timer is monotonic but slots come from the wall clock. A clock
        // that still reads before the slot on wakeup must not fire it again.
        let mut last_slot: Option<Timestamp> = None;

        loop {
            let now = self.clock.now_ms();
            let from = last_slot.map_or(now, |slot| slot.max(now));
            let next = next_run_after(from, self.run_at);
            let delay = Duration::from_millis(next.saturating_sub(now));
            debug!(next_run_ms = next, delay_secs = delay.as_secs(), "next aggregation scheduled");

            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    last_slot = Some(next);
                    // Awaited inline, so the next tick is computed only after
                    // this run finishes.
                    self.trigger().await;
                }
                _ = shutdown.changed() => {
                    info!("daily aggregation scheduler shutting down");
                    break;
                }
            }
        }
    }
}

/// The first instant strictly after `now_ms` whose UTC wall time is `run_at`.
pub fn next_run_after(now_ms: Timestamp, run_at: NaiveTime) -> Timestamp {
    let now = DateTime::<Utc>::from_timestamp_millis(now_ms as i64).unwrap_or_default();
    let today = now.date_naive().and_time(run_at).and_utc();
    let next = if today > now {
        today
    } else {
        today + TimeDelta::days(1)
    };
    next.timestamp_millis() as Timestamp
}
