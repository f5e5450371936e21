//! # Event Ingestion
//!
//! Turns raw event payloads from either delivery path into an
//! [`AudioRecord`](crate::audio::AudioRecord).
//!
//! ## Flow:
//! 1. **Detector** classifies the payload as streaming or upload
//! 2. The matching **extractor** pulls out bytes and the caller identifier
//! 3. The **orchestrator** wraps the outcome into a response envelope

pub mod detector;
pub mod orchestrator;
pub mod streaming;
pub mod upload;

pub use orchestrator::Orchestrator;

use serde_json::Value;

/// The event's `Records` list, or an empty slice when absent or not a list.
pub(crate) fn records(event: &Value) -> &[Value] {
    event
        .get("Records")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Follow a path of object keys and return the string at the end, if any.
pub(crate) fn str_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    path.iter()
        .try_fold(value, |current, key| current.get(*key))
        .and_then(Value::as_str)
}
