//! lifeline-state — persistence for instances, events, and daily metrics.
//!
//! Backed by [redb](https://docs.rs/redb). Components never touch redb
//! directly: they hold a [`SharedRepository`] and go through the
//! [`TelemetryRepository`] contract, so the backend can be swapped.
//!
//! # Layout
//!
//! All records are JSON-serialized into `&[u8]` value columns. Append-only
//! logs (events, utterances, errors, daily metrics) are keyed by
//! `{created_at:020}:{seq:020}`, which sorts chronologically and turns every
//! time-window query into a range scan.
//!
//! Every instance transition runs as a single redb write transaction:
//! the instance row and the records it appends commit together or not at
//! all.

pub mod error;
pub mod repository;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use repository::{Decide, SharedRepository, TelemetryRepository};
pub use store::StateStore;
pub use types::*;
