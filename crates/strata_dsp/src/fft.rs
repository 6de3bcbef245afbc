//! FFT Spectrum Analyzer
//!
//! Computes the magnitude spectrum of one processed block for visualization.
//! The FFT is planned and all working buffers are sized once at construction,
//! so [`SpectrumAnalyzer::analyze`] can run inside the audio callback.

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::error::DspError;

/// Added to FFT magnitudes before the log so silent bins stay finite
pub const MAGNITUDE_EPSILON: f32 = 1e-6;

/// Bin center frequencies of a real FFT of `fft_size` samples:
/// `k * sample_rate / fft_size` for `k` in `0..=fft_size/2`
pub fn rfft_frequencies(fft_size: usize, sample_rate: f64) -> Vec<f32> {
    let spacing = sample_rate / fft_size as f64;
    (0..=fft_size / 2).map(|k| (k as f64 * spacing) as f32).collect()
}

/// Magnitude spectrum (dB) of fixed-size blocks
pub struct SpectrumAnalyzer {
    /// FFT planner output (reused for every block)
    fft: Arc<dyn Fft<f32>>,
    /// In-place FFT working buffer
    buffer: Vec<Complex<f32>>,
    /// Scratch space so `process_with_scratch` never allocates
    scratch: Vec<Complex<f32>>,
    /// Output spectrum, `fft_size / 2 + 1` bins in dB
    magnitudes_db: Vec<f32>,
    frequencies: Arc<[f32]>,
}

impl SpectrumAnalyzer {
    /// Plan an FFT of `fft_size` samples at `sample_rate`
    pub fn new(fft_size: usize, sample_rate: f64) -> Result<Self, DspError> {
        if fft_size < 2 {
            return Err(DspError::InvalidBlockSize(fft_size));
        }
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(DspError::InvalidSampleRate(sample_rate));
        }

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);
        let scratch_len = fft.get_inplace_scratch_len();
        let frequencies: Arc<[f32]> = rfft_frequencies(fft_size, sample_rate).into();

        Ok(Self {
            fft,
            buffer: vec![Complex::new(0.0, 0.0); fft_size],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
            magnitudes_db: vec![0.0; frequencies.len()],
            frequencies,
        })
    }

    pub fn fft_size(&self) -> usize {
        self.buffer.len()
    }

    pub fn bin_count(&self) -> usize {
        self.magnitudes_db.len()
    }

    pub fn frequencies(&self) -> &Arc<[f32]> {
        &self.frequencies
    }

    /// Compute `20*log10(|FFT| + epsilon)` of `samples`.
    ///
    /// Returns `None` (and computes nothing) unless `samples` has exactly
    /// `fft_size` entries.
    ///
    /// # Real-time Safety
    /// No allocations, no locks.
    pub fn analyze(&mut self, samples: &[f64]) -> Option<&[f32]> {
        if samples.len() != self.buffer.len() {
            return None;
        }

        for (slot, &sample) in self.buffer.iter_mut().zip(samples) {
            *slot = Complex::new(sample as f32, 0.0);
        }
        self.fft.process_with_scratch(&mut self.buffer, &mut self.scratch);

        // Only the first half (+ nyquist) carries information for real input
        for (db, bin) in self.magnitudes_db.iter_mut().zip(&self.buffer) {
            *db = 20.0 * (bin.norm() + MAGNITUDE_EPSILON).log10();
        }

        Some(&self.magnitudes_db)
    }
}

impl std::fmt::Debug for SpectrumAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectrumAnalyzer")
            .field("fft_size", &self.fft_size())
            .field("bin_count", &self.bin_count())
            .finish()
    }
}
