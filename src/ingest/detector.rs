//! # Event Source Detection
//!
//! Classifies an untyped event payload by structure alone.
//!
//! ## Precedence:
//! 1. Non-empty `Records`: the **first** record's `eventSource` decides.
//!    Later records are never consulted, even if they disagree.
//! 2. A bare `kinesis` or `kinesisVideo` key means streaming.
//! 3. `httpMethod` or `requestContext` (a web request) means upload, since
//!    web submissions are backed by object storage.
//! 4. Anything else is an invalid event.

use crate::audio::Channel;
use crate::error::{ErrorCode, IngestError, IngestResult, Severity, ValidationError};
use serde_json::Value;
use tracing::{debug, warn};

/// `eventSource` tag of streaming-channel records.
pub const STREAMING_EVENT_SOURCE: &str = "aws:kinesis";

/// `eventSource` tag of object-upload notification records.
pub const UPLOAD_EVENT_SOURCE: &str = "aws:s3";

const STREAMING_KEYS: &[&str] = &["kinesis", "kinesisVideo"];
const WEB_REQUEST_KEYS: &[&str] = &["httpMethod", "requestContext"];

/// Decide which channel an event belongs to.
pub fn detect(event: &Value) -> IngestResult<Channel> {
    if let Some(first) = event
        .get("Records")
        .and_then(Value::as_array)
        .and_then(|records| records.first())
    {
        match first.get("eventSource").and_then(Value::as_str) {
            Some(STREAMING_EVENT_SOURCE) => {
                debug!("Detected streaming event source");
                return Ok(Channel::Streaming);
            }
            Some(UPLOAD_EVENT_SOURCE) => {
                debug!("Detected upload event source");
                return Ok(Channel::Upload);
            }
            _ => {}
        }
    }

    if has_any_key(event, STREAMING_KEYS) {
        debug!("Detected bare streaming payload");
        return Ok(Channel::Streaming);
    }

    if has_any_key(event, WEB_REQUEST_KEYS) {
        debug!("Detected web request, routing to upload path");
        return Ok(Channel::Upload);
    }

    let keys = top_level_keys(event);
    warn!(event_keys = ?keys, "Unable to determine event source");

    Err(IngestError::InvalidEvent(
        ValidationError::new(
            ErrorCode::InvalidAudio,
            "Unable to determine event source type",
            Severity::High,
        )
        .with_context("event_keys", keys),
    ))
}

fn has_any_key(event: &Value, keys: &[&str]) -> bool {
    event
        .as_object()
        .map(|object| keys.iter().any(|key| object.contains_key(*key)))
        .unwrap_or(false)
}

fn top_level_keys(event: &Value) -> Vec<String> {
    event
        .as_object()
        .map(|object| object.keys().cloned().collect())
        .unwrap_or_default()
}

/// An event whose channel has been decided, carrying its raw payload.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestEvent {
    Streaming(Value),
    Upload(Value),
}

impl IngestEvent {
    /// Run detection once and tag the payload with the result.
    pub fn classify(event: Value) -> IngestResult<Self> {
        Ok(match detect(&event)? {
            Channel::Streaming => IngestEvent::Streaming(event),
            Channel::Upload => IngestEvent::Upload(event),
        })
    }

    pub fn channel(&self) -> Channel {
        match self {
            IngestEvent::Streaming(_) => Channel::Streaming,
            IngestEvent::Upload(_) => Channel::Upload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_records_source_tags() {
        let streaming = json!({"Records": [{"eventSource": "aws:kinesis"}]});
        let upload = json!({"Records": [{"eventSource": "aws:s3"}]});
        assert_eq!(detect(&streaming).unwrap(), Channel::Streaming);
        assert_eq!(detect(&upload).unwrap(), Channel::Upload);
    }

    #[test]
    fn test_only_first_record_counts() {
        let event = json!({"Records": [
            {"eventSource": "aws:s3"},
            {"eventSource": "aws:kinesis"},
            {"eventSource": "aws:kinesis"}
        ]});
        assert_eq!(detect(&event).unwrap(), Channel::Upload);
    }

    #[test]
    fn test_bare_streaming_payload() {
        assert_eq!(detect(&json!({"kinesis": {}})).unwrap(), Channel::Streaming);
        assert_eq!(detect(&json!({"kinesisVideo": {}})).unwrap(), Channel::Streaming);
    }

    #[test]
    fn test_web_request_routes_to_upload() {
        assert_eq!(detect(&json!({"httpMethod": "POST"})).unwrap(), Channel::Upload);
        assert_eq!(detect(&json!({"requestContext": {}})).unwrap(), Channel::Upload);
    }

    #[test]
    fn test_unknown_first_source_falls_through() {
        let event = json!({
            "Records": [{"eventSource": "aws:sqs"}],
            "requestContext": {}
        });
        assert_eq!(detect(&event).unwrap(), Channel::Upload);

        let event = json!({"Records": [{"eventSource": "aws:sqs"}]});
        assert!(matches!(detect(&event), Err(IngestError::InvalidEvent(_))));
    }

    #[test]
    fn test_records_take_precedence_over_bare_keys() {
        let event = json!({
            "Records": [{"eventSource": "aws:s3"}],
            "kinesis": {}
        });
        assert_eq!(detect(&event).unwrap(), Channel::Upload);
    }

    #[test]
    fn test_empty_records_is_invalid() {
        let err = detect(&json!({"Records": []})).unwrap_err();
        let detail = err.detail();
        assert_eq!(detail.code(), ErrorCode::InvalidAudio);
        assert_eq!(detail.context()["event_keys"], json!(["Records"]));
    }

    #[test]
    fn test_non_object_payload_is_invalid() {
        let err = detect(&json!(["Records"])).unwrap_err();
        assert_eq!(err.detail().context()["event_keys"], json!([]));
    }

    #[test]
    fn test_detection_is_deterministic() {
        let event = json!({"Records": [{"eventSource": "aws:kinesis"}], "httpMethod": "GET"});
        assert_eq!(detect(&event).unwrap(), detect(&event).unwrap());
    }

    #[test]
    fn test_classify_tags_payload() {
        let event = json!({"httpMethod": "POST"});
        let classified = IngestEvent::classify(event.clone()).unwrap();
        assert_eq!(classified.channel(), Channel::Upload);
        assert_eq!(classified, IngestEvent::Upload(event));
    }
}
