//! lifeline-registry — the instance lifecycle state machine.
//!
//! Turns incoming lifecycle events into derived instance state: the online
//! flag, per-kind last-seen timestamps, and uptime.
//!
//! # Architecture
//!
//! ```text
//! InstanceRegistry
//!   ├── setup() / start()          ← may create the instance
//!   ├── heartbeat() / stop()       ← require an existing instance
//!   ├── utterance() / error()      ← require an existing instance
//!   └── record_event()             ← generic entry, always requires one
//!         │
//!         ▼
//!   Transition::apply()  (pure: current row → new row + records)
//!         │
//!         ▼
//!   TelemetryRepository::update_instance()  (one write transaction)
//! ```
//!
//! Only SETUP and STARTED may bring an unknown instance into existence.
//! Everything else against an unknown ID fails with
//! [`RegistryError::InstanceNotFound`] and writes nothing.

pub mod attributes;
pub mod error;
pub mod registry;
pub mod transition;

pub use error::{RegistryError, RegistryResult};
pub use registry::InstanceRegistry;
pub use transition::{Admission, Transition};
