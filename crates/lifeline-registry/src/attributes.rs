//! Bounded merge of caller-supplied instance attributes.
//!
//! STARTED payloads carry free-form data. Only scalar entries within the
//! configured limits are kept; everything else is dropped and logged.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::warn;

use lifeline_core::config::AttributeLimits;

/// Merge the entries of `data` into `target`. Returns how many were dropped.
///
/// Non-object payloads merge nothing. Existing keys are overwritten; new
/// keys are refused once `target` holds `max_keys` entries.
pub fn merge_attributes(
    instance_id: &str,
    target: &mut BTreeMap<String, Value>,
    data: &Value,
    limits: &AttributeLimits,
) -> usize {
    let Some(entries) = data.as_object() else {
        if !data.is_null() {
            warn!(%instance_id, "start data is not an object, attributes ignored");
        }
        return 0;
    };

    let mut dropped = 0;
    for (key, value) in entries {
        if let Some(reason) = rejection(key, value, limits) {
            warn!(%instance_id, %key, reason, "attribute dropped");
            dropped += 1;
            continue;
        }
        if !target.contains_key(key) && target.len() >= limits.max_keys {
            warn!(%instance_id, %key, max_keys = limits.max_keys, "attribute dropped, key limit reached");
            dropped += 1;
            continue;
        }
        target.insert(key.clone(), value.clone());
    }
    dropped
}

fn rejection(key: &str, value: &Value, limits: &AttributeLimits) -> Option<&'static str> {
    if key.is_empty() {
        return Some("empty key");
    }
    if key.len() > limits.max_key_len {
        return Some("key too long");
    }
    match value {
        Value::String(s) if s.len() > limits.max_value_len => Some("value too long"),
        Value::String(_) | Value::Number(_) | Value::Bool(_) => None,
        Value::Null => Some("null value"),
        Value::Array(_) | Value::Object(_) => Some("value is not a scalar"),
    }
}
