//! Failures surfaced by the telemetry store.

use thiserror::Error;

pub type StateResult<T> = Result<T, StateError>;

/// Each variant carries the underlying redb or serde_json message.
#[derive(Debug, Error)]
pub enum StateError {
    /// The database file could not be opened or created.
    #[error("cannot open lifeline store: {0}")]
    Open(String),

    #[error("storage transaction failed: {0}")]
    Transaction(String),

    /// A telemetry table could not be opened inside a transaction.
    #[error("cannot open telemetry table: {0}")]
    Table(String),

    #[error("storage read failed: {0}")]
    Read(String),

    #[error("storage write failed: {0}")]
    Write(String),

    /// A record could not be encoded as JSON before being stored.
    #[error("cannot encode telemetry record: {0}")]
    Serialize(String),

    /// A stored row no longer decodes into its record type.
    #[error("stored telemetry record is corrupt: {0}")]
    Deserialize(String),

    /// The instance an operation requires does not exist.
    #[error("instance not found: {0}")]
    NotFound(String),
}
