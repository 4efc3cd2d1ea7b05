//! Aggregation error types.

use std::time::Duration;

use thiserror::Error;

use lifeline_state::StateError;

pub type AggregateResult<T> = Result<T, AggregateError>;

#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("storage error: {0}")]
    Storage(#[from] StateError),

    #[error("run exceeded its {0:?} deadline during {1}")]
    DeadlineExceeded(Duration, &'static str),

    #[error("run task aborted: {0}")]
    Aborted(String),
}
