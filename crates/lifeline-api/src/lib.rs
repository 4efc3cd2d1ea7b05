//! lifeline-api — HTTP ingestion API for Lifeline.
//!
//! Provides axum route handlers that record instance lifecycle telemetry,
//! plus read-only routes over the derived state and daily metrics.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | POST | `/on-post-install` | Register an install (generates `instanceID` if absent) |
//! | POST | `/on-start` | Record a start, creating the instance if needed |
//! | POST | `/on-utterance` | Record an utterance payload |
//! | POST | `/on-event` | Record a bare lifecycle event |
//! | POST | `/on-error` | Record an error message |
//! | GET | `/instances/{id}` | Current instance state |
//! | GET | `/daily-metrics` | Recent daily snapshots, newest first |
//! | GET | `/metrics` | Prometheus exposition |

pub mod error;
pub mod handlers;

use axum::Router;
use axum::routing::{get, post};

use lifeline_core::SharedClock;
use lifeline_core::config::AttributeLimits;
use lifeline_registry::InstanceRegistry;
use lifeline_state::SharedRepository;

pub use error::IngestError;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub registry: InstanceRegistry,
    pub repo: SharedRepository,
    pub clock: SharedClock,
}

impl ApiState {
    pub fn new(repo: SharedRepository, clock: SharedClock) -> Self {
        Self {
            registry: InstanceRegistry::new(repo.clone(), clock.clone()),
            repo,
            clock,
        }
    }

    pub fn with_attribute_limits(mut self, limits: AttributeLimits) -> Self {
        self.registry = self.registry.with_attribute_limits(limits);
        self
    }
}

/// Build the complete API router (ingestion + read routes + metrics).
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/on-post-install", post(handlers::on_post_install))
        .route("/on-start", post(handlers::on_start))
        .route("/on-utterance", post(handlers::on_utterance))
        .route("/on-event", post(handlers::on_event))
        .route("/on-error", post(handlers::on_error))
        .route("/instances/{id}", get(handlers::get_instance))
        .route("/daily-metrics", get(handlers::list_daily_metrics))
        .route("/metrics", get(handlers::prometheus_metrics))
        .with_state(state)
}
