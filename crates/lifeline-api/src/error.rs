//! Ingestion error type and its HTTP mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

use lifeline_registry::RegistryError;
use lifeline_state::StateError;

use crate::handlers::ApiResponse;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Missing required fields")]
    MissingFields,

    #[error("Invalid event name")]
    InvalidEventName,

    #[error("Instance not found")]
    InstanceNotFound,

    /// A query parameter that could not be parsed.
    #[error("Invalid {0}")]
    InvalidParameter(&'static str),

    #[error("{0}")]
    Internal(String),
}

impl IngestError {
    pub fn status(&self) -> StatusCode {
        match self {
            IngestError::MissingFields
            | IngestError::InvalidEventName
            | IngestError::InvalidParameter(_) => StatusCode::BAD_REQUEST,
            IngestError::InstanceNotFound => StatusCode::NOT_FOUND,
            IngestError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<RegistryError> for IngestError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::InstanceNotFound(_) => IngestError::InstanceNotFound,
            RegistryError::Storage(e) => IngestError::Internal(e.to_string()),
        }
    }
}

impl From<StateError> for IngestError {
    fn from(e: StateError) -> Self {
        match e {
            StateError::NotFound(_) => IngestError::InstanceNotFound,
            e => IngestError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        (status, Json(ApiResponse::<()>::err(self.to_string()))).into_response()
    }
}
