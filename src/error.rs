//! # Error Handling
//!
//! Two layers of errors live here:
//!
//! - **IngestError**: the domain taxonomy raised by the detector, the
//!   extractors, the validator and the user-context service. Every variant
//!   carries a [`ValidationError`] with a machine code, a developer message,
//!   a pre-localised user message, a severity and diagnostic context.
//! - **AppError**: the HTTP-facing error returned by request handlers and
//!   converted into a JSON response through actix's `ResponseError`.
//!
//! ## Propagation:
//! Errors surface immediately with the most specific kind. The orchestrator
//! is the only place that turns an `IngestError` into a response envelope.

use crate::codec::StructuredValue;
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Boxed source error kept alongside collaborator failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Machine-readable error codes.
///
/// The string forms are stable: clients and dashboards key off them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    #[serde(rename = "AUDIO_001")]
    InvalidAudio,
    #[serde(rename = "AUDIO_002")]
    AudioTooLong,
    #[serde(rename = "AUDIO_003")]
    AudioTooShort,
    #[serde(rename = "AUDIO_004")]
    UnsupportedFormat,
    #[serde(rename = "S3_001")]
    ObjectStore,
    #[serde(rename = "DB_002")]
    Database,
    #[serde(rename = "CTX_004")]
    UserNotFound,
    #[serde(rename = "SYS_001")]
    Internal,
    #[serde(rename = "SYS_002")]
    Configuration,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidAudio => "AUDIO_001",
            ErrorCode::AudioTooLong => "AUDIO_002",
            ErrorCode::AudioTooShort => "AUDIO_003",
            ErrorCode::UnsupportedFormat => "AUDIO_004",
            ErrorCode::ObjectStore => "S3_001",
            ErrorCode::Database => "DB_002",
            ErrorCode::UserNotFound => "CTX_004",
            ErrorCode::Internal => "SYS_001",
            ErrorCode::Configuration => "SYS_002",
        }
    }

    /// Hindi text shown to the caller. Codes without a dedicated prompt share
    /// the generic "something went wrong" message.
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorCode::InvalidAudio => "ऑडियो फाइल में समस्या है। कृपया दोबारा रिकॉर्ड करें।",
            ErrorCode::AudioTooLong => "संदेश बहुत लंबा है। कृपया छोटे संदेश में बोलें।",
            ErrorCode::AudioTooShort => "संदेश बहुत छोटा है। कृपया स्पष्ट रूप से बोलें।",
            ErrorCode::Internal => "तकनीकी समस्या हुई है। कृपया बाद में कोशिश करें।",
            _ => "कुछ समस्या हुई है। कृपया बाद में कोशिश करें।",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How urgently an error needs attention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

/// Structured description of a failure.
///
/// Built once through [`ValidationError::new`] and the `with_*` builders, then
/// only read. The user message is looked up from the code at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    code: ErrorCode,
    message: String,
    user_message: String,
    severity: Severity,
    retry_count: u32,
    timestamp: DateTime<Utc>,
    context: Map<String, Value>,
}

impl ValidationError {
    pub fn new(code: ErrorCode, message: impl Into<String>, severity: Severity) -> Self {
        Self {
            code,
            message: message.into(),
            user_message: code.user_message().to_string(),
            severity,
            retry_count: 0,
            timestamp: Utc::now(),
            context: Map::new(),
        }
    }

    /// Attach one diagnostic context entry.
    pub fn with_context(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.context.insert(key.to_string(), value.into());
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn context(&self) -> &Map<String, Value> {
        &self.context
    }

    /// Structured form used in response envelopes and logs.
    pub fn to_structured(&self) -> StructuredValue {
        let mut fields = BTreeMap::new();
        fields.insert("error_code".to_string(), self.code.as_str().into());
        fields.insert("error_message".to_string(), self.message.clone().into());
        fields.insert(
            "user_friendly_message".to_string(),
            self.user_message.clone().into(),
        );
        fields.insert("severity".to_string(), self.severity.as_str().into());
        fields.insert("retry_count".to_string(), self.retry_count.into());
        fields.insert("timestamp".to_string(), self.timestamp.into());
        fields.insert(
            "context".to_string(),
            StructuredValue::from(Value::Object(self.context.clone())),
        );
        StructuredValue::Map(fields)
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// Domain errors raised while ingesting audio or managing user context.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Malformed or unrecognised event shape
    #[error("invalid event: {0}")]
    InvalidEvent(ValidationError),

    #[error("audio too short: {0}")]
    AudioTooShort(ValidationError),

    #[error("audio too long: {0}")]
    AudioTooLong(ValidationError),

    /// Object store download failed
    #[error("storage error: {detail}")]
    Storage {
        detail: ValidationError,
        #[source]
        source: BoxError,
    },

    /// Document store read or write failed
    #[error("database error: {detail}")]
    Database {
        detail: ValidationError,
        #[source]
        source: BoxError,
    },

    #[error("user not found: {0}")]
    UserNotFound(ValidationError),

    /// Anything unexpected
    #[error("internal error: {0}")]
    Internal(ValidationError),
}

impl IngestError {
    pub fn invalid_event(message: impl Into<String>) -> Self {
        IngestError::InvalidEvent(ValidationError::new(
            ErrorCode::InvalidAudio,
            message,
            Severity::High,
        ))
    }

    pub fn detail(&self) -> &ValidationError {
        match self {
            IngestError::InvalidEvent(detail)
            | IngestError::AudioTooShort(detail)
            | IngestError::AudioTooLong(detail)
            | IngestError::UserNotFound(detail)
            | IngestError::Internal(detail) => detail,
            IngestError::Storage { detail, .. } | IngestError::Database { detail, .. } => detail,
        }
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::InvalidEvent(_) => "invalid_event",
            IngestError::AudioTooShort(_) => "audio_too_short",
            IngestError::AudioTooLong(_) => "audio_too_long",
            IngestError::Storage { .. } => "storage_error",
            IngestError::Database { .. } => "database_error",
            IngestError::UserNotFound(_) => "user_not_found",
            IngestError::Internal(_) => "internal_error",
        }
    }
}

impl From<anyhow::Error> for IngestError {
    fn from(err: anyhow::Error) -> Self {
        IngestError::Internal(
            ValidationError::new(
                ErrorCode::Internal,
                format!("Unexpected error: {}", err),
                Severity::Critical,
            )
            .with_context("exception_type", "anyhow::Error"),
        )
    }
}

pub type IngestResult<T> = Result<T, IngestError>;

/// Errors returned by HTTP handlers.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Domain error carried through to the client with its full detail
    #[error(transparent)]
    Ingest(#[from] IngestError),
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Internal(_) | AppError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) | AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Ingest(err) => match err {
                IngestError::UserNotFound(_) => StatusCode::NOT_FOUND,
                IngestError::InvalidEvent(_)
                | IngestError::AudioTooShort(_)
                | IngestError::AudioTooLong(_) => StatusCode::BAD_REQUEST,
                IngestError::Storage { .. }
                | IngestError::Database { .. }
                | IngestError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            AppError::Ingest(err) => json!({
                "error": err.detail().to_structured().to_json()
            }),
            other => {
                let error_type = match other {
                    AppError::Internal(_) => "internal_error",
                    AppError::BadRequest(_) => "bad_request",
                    AppError::NotFound(_) => "not_found",
                    AppError::ConfigError(_) => "config_error",
                    _ => "validation_error",
                };
                json!({
                    "error": {
                        "type": error_type,
                        "message": other.to_string(),
                        "timestamp": Utc::now().to_rfc3339()
                    }
                })
            }
        };

        HttpResponse::build(self.status_code()).json(body)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(format!("JSON parsing error: {}", err))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_carries_localised_message() {
        let err = ValidationError::new(ErrorCode::AudioTooShort, "Audio data too small: 10 bytes", Severity::Medium)
            .with_context("size_bytes", 10);

        assert_eq!(err.code().as_str(), "AUDIO_003");
        assert_eq!(
            err.to_structured().get("user_friendly_message").and_then(StructuredValue::as_str),
            Some(ErrorCode::AudioTooShort.user_message())
        );
        assert_eq!(err.context()["size_bytes"], json!(10));
        assert_eq!(err.to_string(), "[AUDIO_003] Audio data too small: 10 bytes");
    }

    #[test]
    fn test_unlisted_code_uses_generic_message() {
        let err = ValidationError::new(ErrorCode::ObjectStore, "boom", Severity::High);
        assert_eq!(
            err.to_structured().get("user_friendly_message").and_then(StructuredValue::as_str),
            Some("कुछ समस्या हुई है। कृपया बाद में कोशिश करें।")
        );
    }

    #[test]
    fn test_structured_form() {
        let err = IngestError::invalid_event("Unable to determine event source type");
        let structured = err.detail().to_structured();

        assert_eq!(structured.get("error_code").and_then(|v| v.as_str()), Some("AUDIO_001"));
        assert_eq!(structured.get("severity").and_then(|v| v.as_str()), Some("high"));
        assert_eq!(structured.get("retry_count").and_then(|v| v.as_i64()), Some(0));
        assert!(structured.get("context").and_then(|v| v.as_map()).is_some());
        assert_eq!(err.kind(), "invalid_event");
    }

    #[test]
    fn test_anyhow_becomes_internal() {
        let err: IngestError = anyhow::anyhow!("disk on fire").into();
        assert!(matches!(err, IngestError::Internal(_)));
        assert_eq!(err.detail().severity(), Severity::Critical);
        assert!(err.detail().message().contains("disk on fire"));
    }

    #[test]
    fn test_app_error_status_mapping() {
        let not_found = AppError::from(IngestError::UserNotFound(ValidationError::new(
            ErrorCode::UserNotFound,
            "missing",
            Severity::Medium,
        )));
        assert_eq!(not_found.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::BadRequest("nope".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }
}
