//! # Audio Normalisation
//!
//! Everything that turns channel-specific bytes into one canonical
//! [`AudioRecord`] lives here. The ingest extractors decide *where* bytes
//! come from; this module decides whether they are acceptable and what the
//! resulting record looks like.
//!
//! ## Key Components:
//! - **Validator**: size limits and soft magic-byte checks
//! - **Duration**: byte-rate heuristic for playback length
//! - **Reassembly**: ordered concatenation of streaming chunks

pub mod duration;
pub mod reassembly;
pub mod validator;

use crate::codec::StructuredValue;
use crate::error::IngestResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use validator::AudioValidator;

/// Audio encodings accepted by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Opus,
    Mp3,
    Wav,
}

impl AudioFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioFormat::Opus => "opus",
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Wav => "wav",
        }
    }

    /// Map a file extension to a format, ignoring case.
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "opus" => Some(AudioFormat::Opus),
            "mp3" => Some(AudioFormat::Mp3),
            "wav" => Some(AudioFormat::Wav),
            _ => None,
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AudioFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AudioFormat::from_extension(s).ok_or_else(|| format!("Unsupported audio format: {}", s))
    }
}

/// Delivery path an event arrived through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Phone-call chunks from the streaming channel
    Streaming,
    /// App-uploaded files announced by an object-store notification
    Upload,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Streaming => "streaming",
            Channel::Upload => "upload",
        }
    }

    /// Prefix used when minting session identifiers.
    pub fn session_tag(&self) -> &'static str {
        match self {
            Channel::Streaming => "kinesis",
            Channel::Upload => "s3",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical result of extraction, consumed by the downstream speech pipeline.
///
/// Only [`AudioRecord::build`] creates one, so the payload size is always
/// inside the validator's limits.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioRecord {
    channel: Channel,
    caller_id: String,
    audio: Vec<u8>,
    format: AudioFormat,
    duration_seconds: f64,
    session_id: String,
    received_at: DateTime<Utc>,
}

impl AudioRecord {
    /// Validate the payload, estimate its duration and mint a session id.
    pub fn build(
        channel: Channel,
        caller_id: String,
        audio: Vec<u8>,
        format: AudioFormat,
        validator: &AudioValidator,
    ) -> IngestResult<Self> {
        validator.validate(&audio, format)?;
        let duration_seconds = duration::estimate_duration(&audio, format);
        let received_at = Utc::now();
        let session_id = session_id(channel, &caller_id, received_at);

        Ok(Self {
            channel,
            caller_id,
            audio,
            format,
            duration_seconds,
            session_id,
            received_at,
        })
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// Phone-number-like identifier of the person on the other end.
    pub fn caller_id(&self) -> &str {
        &self.caller_id
    }

    pub fn audio(&self) -> &[u8] {
        &self.audio
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn duration_seconds(&self) -> f64 {
        self.duration_seconds
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    /// Structured summary for response envelopes. The audio bytes themselves
    /// are reported by size only.
    pub fn to_structured(&self) -> StructuredValue {
        let mut fields = BTreeMap::new();
        fields.insert("source_channel".to_string(), self.channel.as_str().into());
        fields.insert("phone_number".to_string(), self.caller_id.clone().into());
        fields.insert("format".to_string(), self.format.as_str().into());
        fields.insert("duration_seconds".to_string(), self.duration_seconds.into());
        fields.insert("session_id".to_string(), self.session_id.clone().into());
        fields.insert("timestamp".to_string(), self.received_at.into());
        fields.insert("audio_size_bytes".to_string(), self.audio.len().into());
        StructuredValue::Map(fields)
    }
}

/// `<tag>_<caller>_<unix seconds with microseconds>`; unique per caller only
/// as far as the clock resolution goes.
fn session_id(channel: Channel, caller_id: &str, at: DateTime<Utc>) -> String {
    format!(
        "{}_{}_{}.{:06}",
        channel.session_tag(),
        caller_id,
        at.timestamp(),
        at.timestamp_subsec_micros()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IngestError;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(AudioFormat::from_extension("MP3"), Some(AudioFormat::Mp3));
        assert_eq!(AudioFormat::from_extension("wav"), Some(AudioFormat::Wav));
        assert_eq!(AudioFormat::from_extension("Opus"), Some(AudioFormat::Opus));
        assert_eq!(AudioFormat::from_extension("m4a"), None);
        assert!("flac".parse::<AudioFormat>().is_err());
    }

    #[test]
    fn test_build_record() {
        let mut audio = b"OggS".to_vec();
        audio.resize(8000, 0);

        let record = AudioRecord::build(
            Channel::Streaming,
            "+919876543210".to_string(),
            audio,
            AudioFormat::Opus,
            &AudioValidator::default(),
        )
        .unwrap();

        assert_eq!(record.caller_id(), "+919876543210");
        assert_eq!(record.duration_seconds(), 2.0);
        assert!(record.session_id().starts_with("kinesis_+919876543210_"));

        let summary = record.to_structured();
        assert_eq!(summary.get("audio_size_bytes").and_then(|v| v.as_i64()), Some(8000));
        assert_eq!(summary.get("source_channel").and_then(|v| v.as_str()), Some("streaming"));
        assert_eq!(summary.get("format").and_then(|v| v.as_str()), Some("opus"));
    }

    #[test]
    fn test_build_rejects_small_payload() {
        let result = AudioRecord::build(
            Channel::Upload,
            "caller".to_string(),
            vec![0u8; 10],
            AudioFormat::Wav,
            &AudioValidator::default(),
        );
        assert!(matches!(result, Err(IngestError::AudioTooShort(_))));
    }
}
