//! Shared identifiers, timestamps, and event kinds.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Milliseconds since the Unix epoch.
pub type Timestamp = u64;

/// Opaque identifier of a monitored client instance.
pub type InstanceId = String;

/// Lifecycle event kinds recorded in the event log.
///
/// Error reports are stored separately and are not an `EventKind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Setup,
    Started,
    Utterance,
    Heartbeat,
    Stopped,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::Setup,
        EventKind::Started,
        EventKind::Utterance,
        EventKind::Heartbeat,
        EventKind::Stopped,
    ];

    /// Wire name, as sent in `eventName`.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Setup => "SETUP",
            EventKind::Started => "STARTED",
            EventKind::Utterance => "UTTERANCE",
            EventKind::Heartbeat => "HEARTBEAT",
            EventKind::Stopped => "STOPPED",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown event kind: {0}")]
pub struct UnknownEventKind(pub String);

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownEventKind(s.to_string()))
    }
}
