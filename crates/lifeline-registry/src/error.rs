//! Registry error types.

use thiserror::Error;

use lifeline_state::StateError;

pub type RegistryResult<T> = Result<T, RegistryError>;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("instance not found: {0}")]
    InstanceNotFound(String),

    #[error(transparent)]
    Storage(StateError),
}

impl From<StateError> for RegistryError {
    fn from(e: StateError) -> Self {
        match e {
            StateError::NotFound(id) => RegistryError::InstanceNotFound(id),
            other => RegistryError::Storage(other),
        }
    }
}
