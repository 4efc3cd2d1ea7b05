//! lifeline-aggregate — the daily rollup.
//!
//! Computes global counters over rolling windows, flips stale instances
//! offline, and appends one immutable [`DailyMetric`](lifeline_state::DailyMetric)
//! per run.
//!
//! # Architecture
//!
//! ```text
//! DailyScheduler
//!   ├── run() → sleeps until the next UTC run time, then trigger()
//!   └── trigger() → single-flight guard → AggregationEngine::run()
//!                       │                      ├── counts (one shared `now`)
//!                       │                      ├── staleness sweep
//!                       │                      └── persist DailyMetric
//!                       └── RunHooks (started / completed / failed / skipped)
//!
//! Prometheus exposition
//!   └── render_prometheus() → text/plain for /metrics endpoint
//! ```

pub mod engine;
pub mod error;
pub mod prometheus;
pub mod schedule;

pub use engine::{AggregationEngine, RunReport, Windows};
pub use error::{AggregateError, AggregateResult};
pub use prometheus::render_prometheus;
pub use schedule::{DailyScheduler, LogHooks, RunHooks, RunOutcome, next_run_after};
