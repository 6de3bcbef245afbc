//! Strata DSP - Multi-Band Equalizer Signal Processing
//!
//! This crate provides the real-time processing core of Strata:
//! - Second-order-section Butterworth bandpass design
//! - Per-band streaming filter state carried across blocks
//! - Lock-free per-band gain table
//! - FFT magnitude spectrum of every processed block
//! - Bounded, lossy spectrum channel to a non-real-time consumer
//! - Bilinear transform and frequency response for analog prototypes
//!
//! # Architecture
//!
//! ```text
//! input block ──▶ downmix ──▶ FilterBank (per band, carried state)
//!                                 │  x (10^(gain/20) - 1), summed onto the dry path
//!                                 ▼
//!                               mix ──▶ stereo output
//!                                 └──▶ SpectrumAnalyzer ──▶ SpectrumChannel (drop newest)
//! ```
//!
//! The processing path never allocates; every buffer is sized when the
//! [`Equalizer`] is constructed.

mod analog;
mod design;
mod equalizer;
mod error;
mod fft;
mod gain;
mod publisher;
mod state;

pub use analog::{bilinear_transform, frequency_response, FrequencyResponse};
pub use design::{
    design_bandpass, design_filter_bank, FilterSpec, SosFilter, MIN_CUTOFF_HZ,
    NYQUIST_MARGIN_HZ, SECTIONS_PER_BAND,
};
pub use equalizer::{
    EqConfig, Equalizer, OUTPUT_CHANNELS, REFERENCE_BLOCK_SIZE, REFERENCE_CENTERS_HZ,
    REFERENCE_Q, REFERENCE_SAMPLE_RATE, REFERENCE_SPECTRUM_CAPACITY,
};
pub use error::DspError;
pub use fft::{rfft_frequencies, SpectrumAnalyzer, MAGNITUDE_EPSILON};
pub use gain::{db_to_amplitude, GainBounds, GainTable};
pub use publisher::{SpectrumChannel, SpectrumSnapshot};
pub use state::{Band, FilterBank, FilterState};
