//! Per-Band Gain Table
//!
//! Written by the control thread, read by the audio thread. Each band gain is
//! an `f32` stored as bits in an `AtomicU32` so the audio callback never waits
//! on a lock. A write becomes visible to the next block the engine processes.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::DspError;

/// Inclusive range band gains are clamped to (dB)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainBounds {
    pub min_db: f32,
    pub max_db: f32,
}

impl GainBounds {
    pub fn new(min_db: f32, max_db: f32) -> Result<Self, DspError> {
        if !(min_db.is_finite() && max_db.is_finite() && min_db < max_db) {
            return Err(DspError::InvalidGainBounds { min_db, max_db });
        }
        Ok(Self { min_db, max_db })
    }

    #[inline]
    pub fn clamp(&self, value_db: f32) -> f32 {
        value_db.clamp(self.min_db, self.max_db)
    }

    pub fn contains(&self, value_db: f32) -> bool {
        (self.min_db..=self.max_db).contains(&value_db)
    }
}

impl Default for GainBounds {
    /// +/-24dB, the slider range of the reference control surface
    fn default() -> Self {
        Self {
            min_db: -24.0,
            max_db: 24.0,
        }
    }
}

/// Convert dB gain to linear amplitude
/// Formula: amplitude = 10^(dB/20)
#[inline]
pub fn db_to_amplitude(db: f32) -> f64 {
    10.0_f64.powf(f64::from(db) / 20.0)
}

/// Lock-free band gains shared between control and audio threads
#[derive(Debug)]
pub struct GainTable {
    // Rust pattern: AtomicF32 doesn't exist, so we use bit-casting
    gains_bits: Box<[AtomicU32]>,
    bounds: GainBounds,
}

impl GainTable {
    /// Create a table of `band_count` flat (0dB) gains
    pub fn new(band_count: usize, bounds: GainBounds) -> Self {
        let gains_bits = (0..band_count)
            .map(|_| AtomicU32::new(0.0_f32.to_bits()))
            .collect();
        Self { gains_bits, bounds }
    }

    pub fn band_count(&self) -> usize {
        self.gains_bits.len()
    }

    pub fn bounds(&self) -> GainBounds {
        self.bounds
    }

    /// Store a band gain, clamped to the table bounds.
    ///
    /// Returns the value actually stored. NaN is rejected rather than clamped.
    pub fn set_gain(&self, band: usize, value_db: f32) -> Result<f32, DspError> {
        let slot = self.slot(band)?;
        if value_db.is_nan() {
            return Err(DspError::NonFiniteGain(value_db));
        }
        let stored = self.bounds.clamp(value_db);
        // Relaxed ordering is fine: each band is an independent scalar
        slot.store(stored.to_bits(), Ordering::Relaxed);
        Ok(stored)
    }

    /// Current gain of `band` in dB, or `None` for an unknown band
    pub fn get_gain(&self, band: usize) -> Option<f32> {
        self.gains_bits
            .get(band)
            .map(|bits| f32::from_bits(bits.load(Ordering::Relaxed)))
    }

    /// Audio-thread read: unknown bands read as flat
    #[inline]
    pub fn gain_or_flat(&self, band: usize) -> f32 {
        self.get_gain(band).unwrap_or(0.0)
    }

    /// Set every band at once (e.g. from a stored slider layout)
    pub fn set_all(&self, gains_db: &[f32]) -> Result<(), DspError> {
        if gains_db.len() != self.band_count() {
            return Err(DspError::BandCountMismatch {
                expected: self.band_count(),
                got: gains_db.len(),
            });
        }
        for (band, &value) in gains_db.iter().enumerate() {
            self.set_gain(band, value)?;
        }
        Ok(())
    }

    /// Snapshot of all gains (useful for UI state sync)
    pub fn gains(&self) -> Vec<f32> {
        (0..self.band_count()).map(|b| self.gain_or_flat(b)).collect()
    }

    /// Return every band to 0dB
    pub fn reset(&self) {
        for bits in self.gains_bits.iter() {
            bits.store(0.0_f32.to_bits(), Ordering::Relaxed);
        }
    }

    fn slot(&self, band: usize) -> Result<&AtomicU32, DspError> {
        self.gains_bits.get(band).ok_or(DspError::InvalidBandIndex {
            index: band,
            bands: self.band_count(),
        })
    }
}
