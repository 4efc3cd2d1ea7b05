//! Aggregation engine — one daily rollup run.

use std::time::{Duration, Instant};

use tracing::{debug, info};

use lifeline_core::{EventKind, InstanceId, SharedClock, Timestamp};
use lifeline_state::{DailyMetric, SharedRepository, StateResult, TimeWindow};

use crate::error::{AggregateError, AggregateResult};

/// Rolling window lengths used by a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Windows {
    /// Window for daily counts and the staleness sweep.
    pub online: Duration,
    /// Window for the active-instance count.
    pub active: Duration,
}

impl Default for Windows {
    fn default() -> Self {
        Self {
            online: Duration::from_secs(24 * 3_600),
            active: Duration::from_secs(30 * 86_400),
        }
    }
}

/// What a completed run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub metric: DailyMetric,
    /// Instances the staleness sweep set offline.
    pub flipped_offline: Vec<InstanceId>,
}

/// Computes and persists daily metrics.
///
/// The engine does not serialize its own runs; [`DailyScheduler`](crate::DailyScheduler)
/// provides the single-flight guarantee.
#[derive(Clone)]
pub struct AggregationEngine {
    repo: SharedRepository,
    clock: SharedClock,
    windows: Windows,
    timeout: Option<Duration>,
}

impl AggregationEngine {
    pub fn new(repo: SharedRepository, clock: SharedClock) -> Self {
        Self {
            repo,
            clock,
            windows: Windows::default(),
            timeout: None,
        }
    }

    pub fn with_windows(mut self, windows: Windows) -> Self {
        self.windows = windows;
        self
    }

    /// Abandon runs that are still going after `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn windows(&self) -> Windows {
        self.windows
    }

    /// Compute the five counters for windows ending at `now`.
    pub fn compute(&self, now: Timestamp) -> StateResult<DailyMetric> {
        let daily = TimeWindow::ending_at(now, self.windows.online);
        let active = TimeWindow::ending_at(now, self.windows.active);

        let metric = DailyMetric {
            instances_nb: self.repo.count_instances_created(daily)?,
            active_instances_nb: self.repo.count_instances_with_utterance(active)?,
            utterances_nb: self.repo.count_utterances_in_window(daily)?,
            setups_nb: self.repo.count_events_in_window(EventKind::Setup, daily)?,
            online_instances_nb: self
                .repo
                .count_instances_with_event(EventKind::Heartbeat, daily)?,
            created_at: now,
        };
        debug!(?metric, "daily counters computed");
        Ok(metric)
    }

    /// Flip offline every instance with no event since the start of the
    /// online window ending at `now`.
    pub fn sweep(&self, now: Timestamp) -> StateResult<Vec<InstanceId>> {
        let cutoff = TimeWindow::ending_at(now, self.windows.online).start;
        self.repo.mark_stale_offline(cutoff)
    }

    /// Run one rollup: counts, staleness sweep, then persist.
    ///
    /// Any error abandons the run before the metric is written.
    pub fn run(&self) -> AggregateResult<RunReport> {
        let started = Instant::now();
        let now = self.clock.now_ms();

        let metric = self.compute(now)?;
        self.check_deadline(started, "counting")?;

        let flipped_offline = self.sweep(now)?;
        self.check_deadline(started, "staleness sweep")?;

        self.repo.put_daily_metric(&metric)?;

        info!(
            instances = metric.instances_nb,
            active_instances = metric.active_instances_nb,
            utterances = metric.utterances_nb,
            setups = metric.setups_nb,
            online_instances = metric.online_instances_nb,
            flipped_offline = flipped_offline.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "daily metric persisted"
        );
        Ok(RunReport {
            metric,
            flipped_offline,
        })
    }

    fn check_deadline(&self, started: Instant, phase: &'static str) -> AggregateResult<()> {
        match self.timeout {
            Some(timeout) if started.elapsed() > timeout => {
                Err(AggregateError::DeadlineExceeded(timeout, phase))
            }
            _ => Ok(()),
        }
    }
}
