//! # Audio Validation
//!
//! Size policy and a soft format check based on leading byte signatures.
//!
//! ## Checks:
//! 1. **Size floor**: fewer than 1024 bytes is rejected as too short
//! 2. **Size ceiling**: more than 10 MiB is rejected as too long
//! 3. **Signature**: a mismatch between declared format and leading bytes is
//!    only logged. Transcoding paths routinely produce files whose headers do
//!    not match their extension.

use crate::audio::AudioFormat;
use crate::error::{ErrorCode, IngestError, IngestResult, Severity, ValidationError};
use tracing::warn;

/// Smallest accepted payload, in bytes.
pub const MIN_AUDIO_BYTES: usize = 1024;

/// Largest accepted payload, in bytes (10 MiB).
pub const MAX_AUDIO_BYTES: usize = 10 * 1024 * 1024;

const MP3_SIGNATURES: &[&[u8]] = &[b"ID3", b"\xff\xfb", b"\xff\xf3", b"\xff\xf2"];
const WAV_SIGNATURES: &[&[u8]] = &[b"RIFF"];
const OPUS_SIGNATURES: &[&[u8]] = &[b"OggS"];

/// Size and format sanity checks for audio payloads.
#[derive(Debug, Clone)]
pub struct AudioValidator {
    min_bytes: usize,
    max_bytes: usize,
}

impl Default for AudioValidator {
    fn default() -> Self {
        Self {
            min_bytes: MIN_AUDIO_BYTES,
            max_bytes: MAX_AUDIO_BYTES,
        }
    }
}

impl AudioValidator {
    /// Validate a payload against the size policy and check its signature.
    ///
    /// ## Returns:
    /// - **Ok(())**: size is within `[1024, 10485760]` bytes, inclusive
    /// - **Err(AudioTooShort | AudioTooLong)**: size policy violated
    pub fn validate(&self, audio: &[u8], format: AudioFormat) -> IngestResult<()> {
        let size = audio.len();

        if size < self.min_bytes {
            return Err(IngestError::AudioTooShort(
                ValidationError::new(
                    ErrorCode::AudioTooShort,
                    format!("Audio data too small: {} bytes", size),
                    Severity::Medium,
                )
                .with_context("size_bytes", size)
                .with_context("format", format.as_str()),
            ));
        }

        if size > self.max_bytes {
            return Err(IngestError::AudioTooLong(
                ValidationError::new(
                    ErrorCode::AudioTooLong,
                    format!("Audio data too large: {} bytes", size),
                    Severity::Medium,
                )
                .with_context("size_bytes", size)
                .with_context("max_size", self.max_bytes)
                .with_context("format", format.as_str()),
            ));
        }

        if !matches_signature(audio, format) {
            warn!(
                format = %format,
                detected = ?sniff(audio),
                size_bytes = size,
                "Audio data may not match expected format"
            );
        }

        Ok(())
    }
}

/// Leading byte signatures recognised for each format.
pub fn signatures(format: AudioFormat) -> &'static [&'static [u8]] {
    match format {
        AudioFormat::Mp3 => MP3_SIGNATURES,
        AudioFormat::Wav => WAV_SIGNATURES,
        AudioFormat::Opus => OPUS_SIGNATURES,
    }
}

pub fn matches_signature(audio: &[u8], format: AudioFormat) -> bool {
    signatures(format)
        .iter()
        .any(|signature| audio.starts_with(signature))
}

/// Guess the format from leading bytes alone.
pub fn sniff(audio: &[u8]) -> Option<AudioFormat> {
    [AudioFormat::Opus, AudioFormat::Wav, AudioFormat::Mp3]
        .into_iter()
        .find(|format| matches_signature(audio, *format))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(prefix: &[u8], len: usize) -> Vec<u8> {
        let mut data = prefix.to_vec();
        data.resize(len, 0);
        data
    }

    #[test]
    fn test_size_boundaries() {
        let validator = AudioValidator::default();

        let short = validator.validate(&payload(b"OggS", 1023), AudioFormat::Opus);
        assert!(matches!(short, Err(IngestError::AudioTooShort(_))));

        assert!(validator.validate(&payload(b"OggS", 1024), AudioFormat::Opus).is_ok());
        assert!(validator
            .validate(&payload(b"OggS", MAX_AUDIO_BYTES), AudioFormat::Opus)
            .is_ok());

        let long = validator.validate(&payload(b"OggS", MAX_AUDIO_BYTES + 1), AudioFormat::Opus);
        assert!(matches!(long, Err(IngestError::AudioTooLong(_))));
    }

    #[test]
    fn test_signature_mismatch_is_not_an_error() {
        let validator = AudioValidator::default();
        assert!(validator.validate(&payload(b"RIFF", 2048), AudioFormat::Mp3).is_ok());
    }

    #[test]
    fn test_error_context() {
        let err = AudioValidator::default()
            .validate(&[0u8; 100], AudioFormat::Wav)
            .unwrap_err();
        let detail = err.detail();
        assert_eq!(detail.code(), ErrorCode::AudioTooShort);
        assert_eq!(detail.context()["size_bytes"], 100);
        assert_eq!(detail.context()["format"], "wav");
    }

    #[test]
    fn test_sniff() {
        assert_eq!(sniff(b"ID3\x04rest"), Some(AudioFormat::Mp3));
        assert_eq!(sniff(b"\xff\xfbframe"), Some(AudioFormat::Mp3));
        assert_eq!(sniff(b"RIFF....WAVE"), Some(AudioFormat::Wav));
        assert_eq!(sniff(b"OggS\x00"), Some(AudioFormat::Opus));
        assert_eq!(sniff(b"fLaC"), None);
    }
}
