//! Bandpass Filter Design
//!
//! Designs 2nd-order Butterworth bandpass filters in cascaded second-order
//! section (SOS) form. Each band is realized as two biquads (4th order overall),
//! which keeps narrow low-frequency bands numerically stable where a single
//! high-order polynomial would lose precision.
//!
//! The design follows the classic procedure:
//! 1. pre-warp the band edges with `tan` (bilinear frequency warping)
//! 2. take the analog Butterworth lowpass prototype poles
//! 3. shift them into a bandpass around the geometric center
//! 4. map poles and zeros to the z-plane with the bilinear transform
//! 5. pair conjugate poles with real zeros into second-order sections

use std::f64::consts::{FRAC_1_SQRT_2, PI};

use biquad::Coefficients;
use rustfft::num_complex::Complex;

use crate::analog::{self, FrequencyResponse};
use crate::error::DspError;

/// Lowest band edge the designer will produce (Hz)
pub const MIN_CUTOFF_HZ: f64 = 20.0;

/// Distance kept between the upper band edge and nyquist (Hz)
pub const NYQUIST_MARGIN_HZ: f64 = 1.0;

/// Number of biquads a band is realized with
pub const SECTIONS_PER_BAND: usize = 2;

/// Sample rate of the normalized design domain (frequencies are expressed
/// relative to nyquist = 1.0)
const DESIGN_FS: f64 = 2.0;

/// Validated bandpass design request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterSpec {
    center_hz: f64,
    quality_factor: f64,
    sample_rate: f64,
}

impl FilterSpec {
    /// Validate a design request.
    ///
    /// Rejects non-positive or non-finite inputs, centers at or above nyquist,
    /// and any center whose unclamped passband `center ± center/(2Q)` leaves
    /// `(0, nyquist)`.
    pub fn new(center_hz: f64, quality_factor: f64, sample_rate: f64) -> Result<Self, DspError> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(DspError::InvalidSampleRate(sample_rate));
        }

        let invalid = |reason| DspError::InvalidSpec {
            center_hz,
            sample_rate,
            reason,
        };

        if !(center_hz.is_finite() && center_hz > 0.0) {
            return Err(invalid("center frequency must be positive"));
        }
        if !(quality_factor.is_finite() && quality_factor > 0.0) {
            return Err(invalid("quality factor must be positive"));
        }

        let nyquist = sample_rate / 2.0;
        if center_hz >= nyquist {
            return Err(invalid("center frequency at or above nyquist"));
        }

        let half_bandwidth = center_hz / quality_factor / 2.0;
        if center_hz - half_bandwidth <= 0.0 {
            return Err(invalid("lower band edge at or below 0Hz"));
        }
        if center_hz + half_bandwidth >= nyquist {
            return Err(invalid("upper band edge at or above nyquist"));
        }

        let spec = Self {
            center_hz,
            quality_factor,
            sample_rate,
        };

        if spec.low_cutoff() >= spec.high_cutoff() {
            return Err(invalid("empty passband after clamping"));
        }

        Ok(spec)
    }

    pub fn center_hz(&self) -> f64 {
        self.center_hz
    }

    pub fn quality_factor(&self) -> f64 {
        self.quality_factor
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn nyquist(&self) -> f64 {
        self.sample_rate / 2.0
    }

    /// `center / Q`
    pub fn bandwidth(&self) -> f64 {
        self.center_hz / self.quality_factor
    }

    /// Lower passband edge, floored at [`MIN_CUTOFF_HZ`]
    pub fn low_cutoff(&self) -> f64 {
        (self.center_hz - self.bandwidth() / 2.0).max(MIN_CUTOFF_HZ)
    }

    /// Upper passband edge, kept [`NYQUIST_MARGIN_HZ`] below nyquist
    pub fn high_cutoff(&self) -> f64 {
        (self.center_hz + self.bandwidth() / 2.0).min(self.nyquist() - NYQUIST_MARGIN_HZ)
    }
}

/// A bandpass filter as a cascade of normalized biquad sections.
///
/// Immutable once designed; the delay lines live in [`crate::FilterState`].
#[derive(Debug, Clone, Copy)]
pub struct SosFilter {
    sections: [Coefficients<f64>; SECTIONS_PER_BAND],
}

impl SosFilter {
    pub fn sections(&self) -> &[Coefficients<f64>; SECTIONS_PER_BAND] {
        &self.sections
    }

    /// Overall filter order (2 per section)
    pub fn order(&self) -> usize {
        2 * SECTIONS_PER_BAND
    }

    /// Sections as `[b0, b1, b2, a0, a1, a2]` rows with `a0 = 1`
    pub fn to_rows(&self) -> [[f64; 6]; SECTIONS_PER_BAND] {
        self.sections
            .map(|c| [c.b0, c.b1, c.b2, 1.0, c.a1, c.a2])
    }

    /// Linear magnitude of the whole cascade at `freq_hz`
    pub fn magnitude_at(&self, freq_hz: f64, sample_rate: f64) -> f64 {
        self.response_at(2.0 * PI * freq_hz / sample_rate).norm()
    }

    /// Magnitude response on `n_points` frequencies covering `[0, fs/2)`
    pub fn frequency_response(&self, sample_rate: f64, n_points: usize) -> FrequencyResponse {
        analog::sample_response(sample_rate, n_points, |w| self.response_at(w).norm())
    }

    fn response_at(&self, w: f64) -> Complex<f64> {
        self.sections
            .iter()
            .map(|c| {
                let num = analog::evaluate_z(&[c.b0, c.b1, c.b2], w);
                let den = analog::evaluate_z(&[1.0, c.a1, c.a2], w);
                num / den
            })
            .product()
    }
}

/// Design one 2nd-order Butterworth bandpass for `spec`
pub fn design_bandpass(spec: &FilterSpec) -> SosFilter {
    // Pre-warped band edges in the normalized domain
    let warp = |hz: f64| 2.0 * DESIGN_FS * (PI * hz / spec.sample_rate).tan();
    let low = warp(spec.low_cutoff());
    let high = warp(spec.high_cutoff());

    let bandwidth = high - low;
    let center_sq = low * high;

    // Upper-half-plane pole of the 2nd-order Butterworth prototype
    let prototype = Complex::new(-FRAC_1_SQRT_2, FRAC_1_SQRT_2);

    // Lowpass-to-bandpass splits each prototype pole into two
    let shifted = prototype * (bandwidth / 2.0);
    let root = (shifted * shifted - center_sq).sqrt();
    let analog_poles = [shifted + root, shifted - root];

    // Bilinear transform; the two zeros at s = 0 land on z = +1, the two at
    // s = infinity on z = -1
    let fs2 = 2.0 * DESIGN_FS;
    let digital_poles = analog_poles.map(|p| (fs2 + p) / (fs2 - p));
    let gain = bandwidth * bandwidth * fs2 * fs2
        / analog_poles
            .iter()
            .map(|&p| (fs2 - p).norm_sqr())
            .product::<f64>();

    // The pole pair closest to the unit circle goes last, with the zero pair
    // nearest to it
    let (first, last) = if digital_poles[0].norm() >= digital_poles[1].norm() {
        (digital_poles[1], digital_poles[0])
    } else {
        (digital_poles[0], digital_poles[1])
    };
    let last_zero = if (last - 1.0).norm() <= (last + 1.0).norm() {
        1.0
    } else {
        -1.0
    };

    SosFilter {
        sections: [
            section(first, -last_zero, gain),
            section(last, last_zero, 1.0),
        ],
    }
}

/// Design one filter per center frequency, sharing `quality_factor`
pub fn design_filter_bank(
    center_frequencies: &[f64],
    quality_factor: f64,
    sample_rate: f64,
) -> Result<Vec<SosFilter>, DspError> {
    center_frequencies
        .iter()
        .map(|&center| FilterSpec::new(center, quality_factor, sample_rate).map(|s| design_bandpass(&s)))
        .collect()
}

/// Biquad with a conjugate pole pair at `pole` and a double real zero at `zero`
fn section(pole: Complex<f64>, zero: f64, gain: f64) -> Coefficients<f64> {
    Coefficients {
        b0: gain,
        b1: -2.0 * zero * gain,
        b2: zero * zero * gain,
        a1: -2.0 * pole.re,
        a2: pole.norm_sqr(),
    }
}
