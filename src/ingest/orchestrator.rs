//! # Ingestion Orchestrator
//!
//! Single entry point for raw events. Detects the delivery path, runs the
//! matching extractor and wraps whatever comes back in an [`Envelope`].
//!
//! ## Guarantees:
//! - `handle` never returns an error and never unwinds
//! - Domain failures keep their code, severity and context
//! - Anything else (including a panic below this layer) becomes `SYS_001`

use super::detector::IngestEvent;
use super::streaming::StreamingAudioExtractor;
use super::upload::UploadAudioExtractor;
use crate::audio::validator::AudioValidator;
use crate::audio::{AudioRecord, Channel};
use crate::error::{ErrorCode, IngestError, IngestResult, Severity, ValidationError};
use crate::storage::ObjectStore;
use serde::Serialize;
use serde_json::{json, Value};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{error, info};

/// Response wrapper handed back to whoever delivered the event.
///
/// Serialises as `{"statusCode": .., "body": {..}}`. The channel and error
/// code are kept for metrics and are not part of the wire form.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub body: Value,
    #[serde(skip)]
    pub channel: Option<Channel>,
    #[serde(skip)]
    pub error_code: Option<ErrorCode>,
}

impl Envelope {
    pub fn success(record: &AudioRecord) -> Self {
        Self {
            status_code: 200,
            body: json!({
                "success": true,
                "result": record.to_structured().to_json(),
            }),
            channel: Some(record.channel()),
            error_code: None,
        }
    }

    pub fn failure(detail: &ValidationError, channel: Option<Channel>) -> Self {
        Self {
            status_code: 500,
            body: json!({
                "success": false,
                "error": detail.to_structured().to_json(),
            }),
            channel,
            error_code: Some(detail.code()),
        }
    }
}

pub struct Orchestrator {
    streaming: StreamingAudioExtractor,
    upload: UploadAudioExtractor,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        let validator = AudioValidator::default();
        Self {
            streaming: StreamingAudioExtractor::new(validator.clone()),
            upload: UploadAudioExtractor::new(store, validator),
        }
    }

    /// Run the extractor matching an already classified event.
    pub fn ingest(&self, event: &IngestEvent) -> IngestResult<AudioRecord> {
        match event {
            IngestEvent::Streaming(payload) => self.streaming.extract(payload),
            IngestEvent::Upload(payload) => self.upload.extract(payload),
        }
    }

    /// Run the whole pipeline and wrap the outcome.
    pub fn handle(&self, event: Value) -> Envelope {
        let mut channel = None;

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| -> IngestResult<AudioRecord> {
            let event = IngestEvent::classify(event)?;
            channel = Some(event.channel());
            info!(channel = event.channel().as_str(), "Detected event source");
            self.ingest(&event)
        }))
        .unwrap_or_else(|payload| Err(panic_to_error(payload.as_ref())));

        match outcome {
            Ok(record) => {
                info!(
                    channel = record.channel().as_str(),
                    format = record.format().as_str(),
                    session_id = record.session_id(),
                    caller_id = record.caller_id(),
                    duration_seconds = record.duration_seconds(),
                    size_bytes = record.audio().len(),
                    received_at = %record.received_at().to_rfc3339(),
                    "Audio ingested"
                );
                Envelope::success(&record)
            }
            Err(err) => {
                let detail = err.detail();
                let context = Value::Object(detail.context().clone());
                error!(
                    kind = err.kind(),
                    error_code = detail.code().as_str(),
                    severity = detail.severity().as_str(),
                    context = %context,
                    "Audio ingestion failed: {}",
                    detail.message()
                );
                Envelope::failure(detail, channel)
            }
        }
    }
}

fn panic_to_error(payload: &(dyn Any + Send)) -> IngestError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());

    IngestError::Internal(
        ValidationError::new(
            ErrorCode::Internal,
            format!("Unexpected error: {}", message),
            Severity::Critical,
        )
        .with_context("exception_type", "panic"),
    )
}
