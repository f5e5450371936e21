//! # Streaming Audio Extraction
//!
//! Phone calls arrive as a batch of records, each holding one base64-encoded
//! audio fragment. Fragments are decoded one by one and concatenated in
//! record order.
//!
//! ## Failure Handling:
//! - A fragment that fails to decode is logged and skipped
//! - Extraction fails only if no records exist or nothing survives decoding
//!
//! ## Caller Identity:
//! The first record's partition key names the caller for the whole batch.
//! Partition keys on later records are not compared against it.

use super::records;
use crate::audio::reassembly::{AudioChunk, ChunkAssembler};
use crate::audio::validator::AudioValidator;
use crate::audio::{AudioFormat, AudioRecord, Channel};
use crate::error::{ErrorCode, IngestError, IngestResult, Severity, ValidationError};
use base64::{engine::general_purpose, Engine as _};
use serde_json::Value;
use tracing::{debug, info, warn};

/// Caller identifier used when the first record carries no partition key.
pub const UNKNOWN_CALLER: &str = "unknown";

/// Streaming ingestion always carries Ogg/Opus.
pub const STREAMING_FORMAT: AudioFormat = AudioFormat::Opus;

#[derive(Debug, Clone, Default)]
pub struct StreamingAudioExtractor {
    validator: AudioValidator,
}

impl StreamingAudioExtractor {
    pub fn new(validator: AudioValidator) -> Self {
        Self { validator }
    }

    /// Reassemble a streaming event into one audio record.
    pub fn extract(&self, event: &Value) -> IngestResult<AudioRecord> {
        let records = records(event);
        if records.is_empty() {
            return Err(IngestError::invalid_event("No records found in streaming event"));
        }

        let caller_id = records[0]
            .get("kinesis")
            .and_then(|payload| payload.get("partitionKey"))
            .and_then(Value::as_str)
            .unwrap_or(UNKNOWN_CALLER)
            .to_string();

        let mut assembler = ChunkAssembler::new();
        for (index, record) in records.iter().enumerate() {
            let payload = record.get("kinesis");
            let encoded = payload
                .and_then(|p| p.get("data"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            if encoded.is_empty() {
                continue;
            }

            let partition_key = payload
                .and_then(|p| p.get("partitionKey"))
                .and_then(Value::as_str)
                .map(str::to_string);

            match general_purpose::STANDARD.decode(encoded) {
                Ok(bytes) => {
                    debug!(
                        index,
                        size_bytes = bytes.len(),
                        sequence_number = ?payload.and_then(|p| p.get("sequenceNumber")),
                        partition_key = ?partition_key,
                        "Extracted audio chunk"
                    );
                    assembler.push(AudioChunk {
                        bytes,
                        index,
                        partition_key,
                    });
                }
                Err(err) => {
                    warn!(index, error = %err, "Failed to decode audio chunk, skipping");
                    assembler.skip(index);
                }
            }
        }

        if assembler.is_empty() {
            return Err(IngestError::InvalidEvent(
                ValidationError::new(
                    ErrorCode::InvalidAudio,
                    "No valid audio data found in streaming records",
                    Severity::High,
                )
                .with_context("total_records", records.len())
                .with_context("skipped_records", assembler.skipped().to_vec()),
            ));
        }

        let chunk_count = assembler.chunk_count();
        let skipped = assembler.skipped().len();
        debug!(
            chunks = chunk_count,
            total_bytes = assembler.total_bytes(),
            "Assembling streaming audio"
        );
        let audio = assembler.assemble();

        let record = AudioRecord::build(
            Channel::Streaming,
            caller_id,
            audio,
            STREAMING_FORMAT,
            &self.validator,
        )?;

        info!(
            session_id = record.session_id(),
            chunks = chunk_count,
            skipped,
            size_bytes = record.audio().len(),
            duration_seconds = record.duration_seconds(),
            "Reassembled streaming audio"
        );

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn encode(bytes: &[u8]) -> String {
        general_purpose::STANDARD.encode(bytes)
    }

    fn record(partition_key: &str, data: &str) -> Value {
        json!({
            "eventSource": "aws:kinesis",
            "kinesis": {
                "partitionKey": partition_key,
                "data": data,
                "sequenceNumber": "49590338271490256608559692538361571095921575989136588898"
            }
        })
    }

    /// A chunk of `len` bytes starting with the Ogg signature.
    fn ogg_chunk(fill: u8, len: usize) -> Vec<u8> {
        let mut bytes = b"OggS".to_vec();
        bytes.resize(len, fill);
        bytes
    }

    #[test]
    fn test_skips_corrupt_chunk_and_keeps_order() {
        let first = ogg_chunk(b'a', 600);
        let third = ogg_chunk(b'c', 600);
        let event = json!({"Records": [
            record("+919876543210", &encode(&first)),
            record("+919876543210", "!!!not base64!!!"),
            record("+919876543210", &encode(&third)),
        ]});

        let result = StreamingAudioExtractor::default().extract(&event).unwrap();

        let mut expected = first.clone();
        expected.extend_from_slice(&third);
        assert_eq!(result.audio(), expected.as_slice());
        assert_eq!(result.format(), AudioFormat::Opus);
        assert_eq!(result.channel(), Channel::Streaming);
    }

    #[test]
    fn test_concatenation_independent_of_interleaved_corruption() {
        let chunks: Vec<Vec<u8>> = (0..5u8).map(|i| vec![i; 300]).collect();
        let expected: Vec<u8> = chunks.concat();

        let mut records = Vec::new();
        for chunk in &chunks {
            records.push(record("caller", "%%%"));
            records.push(record("caller", &encode(chunk)));
        }
        records.push(record("caller", "===="));

        let result = StreamingAudioExtractor::default()
            .extract(&json!({ "Records": records }))
            .unwrap();
        assert_eq!(result.audio(), expected.as_slice());
    }

    #[test]
    fn test_first_partition_key_pins_caller() {
        let event = json!({"Records": [
            record("+911111111111", &encode(&ogg_chunk(1, 800))),
            record("+922222222222", &encode(&ogg_chunk(2, 800))),
        ]});

        let result = StreamingAudioExtractor::default().extract(&event).unwrap();
        assert_eq!(result.caller_id(), "+911111111111");
        assert!(result.session_id().starts_with("kinesis_+911111111111_"));
    }

    #[test]
    fn test_missing_partition_key_is_unknown() {
        let event = json!({"Records": [
            {"kinesis": {"data": encode(&ogg_chunk(0, 2048))}}
        ]});
        let result = StreamingAudioExtractor::default().extract(&event).unwrap();
        assert_eq!(result.caller_id(), UNKNOWN_CALLER);
    }

    #[test]
    fn test_no_records() {
        let err = StreamingAudioExtractor::default()
            .extract(&json!({"kinesis": {}}))
            .unwrap_err();
        assert!(matches!(err, IngestError::InvalidEvent(_)));
    }

    #[test]
    fn test_all_chunks_corrupt() {
        let event = json!({"Records": [record("c", "***"), record("c", "???")]});
        let err = StreamingAudioExtractor::default().extract(&event).unwrap_err();

        assert!(matches!(err, IngestError::InvalidEvent(_)));
        assert_eq!(err.detail().context()["total_records"], 2);
        assert_eq!(err.detail().context()["skipped_records"], json!([0, 1]));
    }

    #[test]
    fn test_reassembled_audio_still_validated() {
        let event = json!({"Records": [record("c", &encode(b"OggSaaa"))]});
        let err = StreamingAudioExtractor::default().extract(&event).unwrap_err();
        assert!(matches!(err, IngestError::AudioTooShort(_)));
    }

    #[test]
    fn test_duration_uses_opus_rate() {
        let event = json!({"Records": [record("c", &encode(&ogg_chunk(0, 40_000)))]});
        let result = StreamingAudioExtractor::default().extract(&event).unwrap();
        assert_eq!(result.duration_seconds(), 10.0);
    }
}
