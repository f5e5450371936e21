//! # Upload Audio Extraction
//!
//! App uploads land in the object store under
//! `<prefix>/<caller>/<filename>.<ext>`. The notification event names the
//! container and key; the bytes are fetched through [`ObjectStore`].
//!
//! Keys are used verbatim. Notification keys are URL-encoded by some
//! producers, and that encoding is not undone here.

use super::{records, str_at};
use crate::audio::validator::AudioValidator;
use crate::audio::{AudioFormat, AudioRecord, Channel};
use crate::error::{ErrorCode, IngestError, IngestResult, Severity, ValidationError};
use crate::storage::ObjectStore;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Parsed form of an upload object key.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadKey<'a> {
    pub caller_id: &'a str,
    pub filename: &'a str,
    /// `None` when the last `.`-separated piece is not a supported format
    pub format: Option<AudioFormat>,
}

impl<'a> UploadKey<'a> {
    /// Split `key` into caller and filename. At least three `/`-separated
    /// segments are required.
    pub fn parse(key: &'a str) -> IngestResult<Self> {
        let segments: Vec<&str> = key.split('/').collect();
        if segments.len() < 3 {
            return Err(IngestError::InvalidEvent(
                ValidationError::new(
                    ErrorCode::InvalidAudio,
                    format!("Invalid object key format: {}", key),
                    Severity::High,
                )
                .with_context("key", key)
                .with_context("expected_format", "audio/{caller}/{filename}.{ext}"),
            ));
        }

        let caller_id = segments[1];
        let filename = segments[segments.len() - 1];
        // A filename without a dot is read whole as its own extension.
        let format = filename
            .rsplit('.')
            .next()
            .and_then(AudioFormat::from_extension);

        Ok(Self {
            caller_id,
            filename,
            format,
        })
    }
}

/// Fetches uploaded audio and turns it into an [`AudioRecord`].
pub struct UploadAudioExtractor {
    store: Arc<dyn ObjectStore>,
    validator: AudioValidator,
}

impl UploadAudioExtractor {
    pub fn new(store: Arc<dyn ObjectStore>, validator: AudioValidator) -> Self {
        Self { store, validator }
    }

    /// Download and validate the object named by the first record.
    pub fn extract(&self, event: &Value) -> IngestResult<AudioRecord> {
        let first = records(event)
            .first()
            .ok_or_else(|| IngestError::invalid_event("No records found in upload event"))?;

        let bucket = str_at(first, &["s3", "bucket", "name"]).unwrap_or_default();
        let key = str_at(first, &["s3", "object", "key"]).unwrap_or_default();
        if bucket.is_empty() || key.is_empty() {
            return Err(IngestError::InvalidEvent(
                ValidationError::new(
                    ErrorCode::InvalidAudio,
                    "Missing bucket name or object key in upload event",
                    Severity::High,
                )
                .with_context("bucket", bucket)
                .with_context("key", key),
            ));
        }

        let parsed = UploadKey::parse(key)?;
        let format = match parsed.format {
            Some(format) => format,
            None => {
                warn!(
                    key,
                    filename = parsed.filename,
                    "Unsupported or missing audio extension, assuming opus"
                );
                AudioFormat::Opus
            }
        };

        debug!(bucket, key, caller_id = parsed.caller_id, "Downloading uploaded audio");
        let audio = self.store.download(bucket, key).map_err(|err| {
            IngestError::Storage {
                detail: ValidationError::new(
                    ErrorCode::ObjectStore,
                    format!("Failed to download audio from object store: {}", err),
                    Severity::High,
                )
                .with_context("bucket", bucket)
                .with_context("key", key),
                source: err.into(),
            }
        })?;

        let record = AudioRecord::build(
            Channel::Upload,
            parsed.caller_id.to_string(),
            audio,
            format,
            &self.validator,
        )?;

        info!(
            session_id = record.session_id(),
            bucket,
            key,
            format = %format,
            size_bytes = record.audio().len(),
            duration_seconds = record.duration_seconds(),
            "Fetched uploaded audio"
        );

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryObjectStore;
    use serde_json::json;

    const BUCKET: &str = "vaani-user-inputs";

    fn event(bucket: &str, key: &str) -> Value {
        json!({"Records": [{
            "eventSource": "aws:s3",
            "s3": {"bucket": {"name": bucket}, "object": {"key": key}}
        }]})
    }

    fn mp3_bytes(len: usize) -> Vec<u8> {
        let mut bytes = b"ID3".to_vec();
        bytes.resize(len, 0);
        bytes
    }

    fn extractor_with(key: &str, data: Vec<u8>) -> UploadAudioExtractor {
        let store = MemoryObjectStore::new();
        store.insert(BUCKET, key, data);
        UploadAudioExtractor::new(Arc::new(store), AudioValidator::default())
    }

    #[test]
    fn test_parse_key() {
        let parsed = UploadKey::parse("audio/+919876543210/1700000000.mp3").unwrap();
        assert_eq!(parsed.caller_id, "+919876543210");
        assert_eq!(parsed.filename, "1700000000.mp3");
        assert_eq!(parsed.format, Some(AudioFormat::Mp3));

        let nested = UploadKey::parse("audio/caller/2024/01/clip.WAV").unwrap();
        assert_eq!(nested.caller_id, "caller");
        assert_eq!(nested.format, Some(AudioFormat::Wav));

        assert_eq!(UploadKey::parse("a/b/noextension").unwrap().format, None);
    }

    #[test]
    fn test_dotless_filename_is_its_own_extension() {
        let parsed = UploadKey::parse("audio/c/mp3").unwrap();
        assert_eq!(parsed.filename, "mp3");
        assert_eq!(parsed.format, Some(AudioFormat::Mp3));

        let key = "audio/+919876543210/wav";
        let extractor = extractor_with(key, vec![0; 4096]);
        let record = extractor.extract(&event(BUCKET, key)).unwrap();
        assert_eq!(record.format(), AudioFormat::Wav);
    }

    #[test]
    fn test_parse_key_too_few_segments() {
        let err = UploadKey::parse("justafile.mp3").unwrap_err();
        assert!(matches!(err, IngestError::InvalidEvent(_)));
        assert!(err.detail().message().contains("justafile.mp3"));
        assert!(err.detail().context().contains_key("expected_format"));

        assert!(UploadKey::parse("audio/file.mp3").is_err());
    }

    #[test]
    fn test_extract_mp3_upload() {
        let key = "audio/+919876543210/1700000000.mp3";
        let extractor = extractor_with(key, mp3_bytes(32_000));

        let record = extractor.extract(&event(BUCKET, key)).unwrap();
        assert_eq!(record.caller_id(), "+919876543210");
        assert_eq!(record.format(), AudioFormat::Mp3);
        assert_eq!(record.channel(), Channel::Upload);
        assert_eq!(record.duration_seconds(), 2.0);
        assert!(record.session_id().starts_with("s3_+919876543210_"));
    }

    #[test]
    fn test_unknown_extension_defaults_to_opus() {
        let key = "audio/caller/clip.flac";
        let extractor = extractor_with(key, vec![0; 4096]);

        let record = extractor.extract(&event(BUCKET, key)).unwrap();
        assert_eq!(record.format(), AudioFormat::Opus);
    }

    #[test]
    fn test_missing_object_is_storage_error() {
        let extractor = extractor_with("audio/other/x.mp3", mp3_bytes(2048));
        let err = extractor
            .extract(&event(BUCKET, "audio/caller/missing.mp3"))
            .unwrap_err();

        assert!(matches!(err, IngestError::Storage { .. }));
        assert_eq!(err.detail().code(), ErrorCode::ObjectStore);
        assert_eq!(err.detail().context()["bucket"], BUCKET);
        assert_eq!(err.detail().context()["key"], "audio/caller/missing.mp3");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_missing_bucket_or_key() {
        let extractor = extractor_with("audio/c/x.mp3", mp3_bytes(2048));

        let err = extractor.extract(&event("", "audio/c/x.mp3")).unwrap_err();
        assert!(matches!(err, IngestError::InvalidEvent(_)));

        let err = extractor.extract(&event(BUCKET, "")).unwrap_err();
        assert!(matches!(err, IngestError::InvalidEvent(_)));

        let err = extractor.extract(&json!({"Records": []})).unwrap_err();
        assert!(matches!(err, IngestError::InvalidEvent(_)));
    }

    #[test]
    fn test_small_upload_rejected() {
        let key = "audio/caller/tiny.wav";
        let extractor = extractor_with(key, b"RIFF".to_vec());
        let err = extractor.extract(&event(BUCKET, key)).unwrap_err();
        assert!(matches!(err, IngestError::AudioTooShort(_)));
    }
}
