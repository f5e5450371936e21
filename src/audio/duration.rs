//! # Duration Estimation
//!
//! A crude placeholder for codec-aware duration probing: playback length is
//! guessed from payload size and a typical byte rate per format. Results are
//! good enough for routing and logging, not for billing or trimming.

use crate::audio::AudioFormat;

/// Lower clamp for any estimate, in seconds.
pub const MIN_DURATION_SECONDS: f64 = 1.0;

/// Upper clamp for any estimate, in seconds.
pub const MAX_DURATION_SECONDS: f64 = 300.0;

/// Rate assumed when the format is unknown.
const DEFAULT_BYTES_PER_SECOND: f64 = 8000.0;

/// Typical byte rate of each format.
///
/// - mp3: ~128 kbps
/// - opus: ~32 kbps
/// - wav: 16-bit mono at 16 kHz
pub fn bytes_per_second(format: Option<AudioFormat>) -> f64 {
    match format {
        Some(AudioFormat::Mp3) => 16000.0,
        Some(AudioFormat::Opus) => 4000.0,
        Some(AudioFormat::Wav) => 32000.0,
        None => DEFAULT_BYTES_PER_SECOND,
    }
}

/// Estimate the duration of a payload in a known format.
pub fn estimate_duration(audio: &[u8], format: AudioFormat) -> f64 {
    estimate_duration_for_len(audio.len(), Some(format))
}

/// Estimate from a byte count, clamped to `[1.0, 300.0]` seconds.
pub fn estimate_duration_for_len(len: usize, format: Option<AudioFormat>) -> f64 {
    let raw = len as f64 / bytes_per_second(format);
    raw.clamp(MIN_DURATION_SECONDS, MAX_DURATION_SECONDS)
}
