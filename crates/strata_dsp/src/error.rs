//! DSP Error Types

use thiserror::Error;

/// Errors that can occur during DSP operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DspError {
    #[error("Invalid filter spec for center {center_hz}Hz at sample rate {sample_rate}Hz: {reason}")]
    InvalidSpec {
        center_hz: f64,
        sample_rate: f64,
        reason: &'static str,
    },

    #[error("Sample rate must be positive, got {0}")]
    InvalidSampleRate(f64),

    #[error("Invalid band index: {index} (equalizer has {bands} bands)")]
    InvalidBandIndex { index: usize, bands: usize },

    #[error("Gain must be a finite number of dB, got {0}")]
    NonFiniteGain(f32),

    #[error("Invalid gain bounds: min {min_db}dB must be below max {max_db}dB")]
    InvalidGainBounds { min_db: f32, max_db: f32 },

    #[error("Block size must be at least 2 frames, got {0}")]
    InvalidBlockSize(usize),

    #[error("Band count mismatch: expected {expected}, got {got}")]
    BandCountMismatch { expected: usize, got: usize },

    #[error("Buffer size mismatch: expected {expected}, got {got}")]
    BufferSizeMismatch { expected: usize, got: usize },

    #[error("Invalid polynomial: {0}")]
    InvalidPolynomial(&'static str),
}
