//! Analog-to-Digital Filter Conversion
//!
//! Bilinear transform of s-domain transfer functions and magnitude response
//! evaluation of the resulting z-domain filters.
//!
//! Polynomials are ordered highest power first for the analog side
//! (`[1, 1]` is `s + 1`) and in ascending powers of `z^-1` for the digital
//! side (`[1, -0.9]` is `1 - 0.9 z^-1`).

use std::f64::consts::PI;

use rustfft::num_complex::Complex;

use crate::error::DspError;

/// Floor applied to linear magnitudes before taking the log, so that exact
/// zeros of the response map to a finite dB value
const MAGNITUDE_FLOOR: f64 = 1e-12;

/// Magnitude response of a digital filter sampled on a linear frequency grid
#[derive(Debug, Clone, PartialEq)]
pub struct FrequencyResponse {
    /// Frequencies in Hz, ascending, in `[0, fs/2)`
    pub frequencies: Vec<f64>,
    /// Magnitude in dB at each frequency
    pub magnitudes_db: Vec<f64>,
}

impl FrequencyResponse {
    pub fn len(&self) -> usize {
        self.frequencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frequencies.is_empty()
    }

    /// Frequency and magnitude of the loudest point on the grid
    pub fn peak(&self) -> Option<(f64, f64)> {
        self.frequencies
            .iter()
            .copied()
            .zip(self.magnitudes_db.iter().copied())
            .fold(None, |best, (f, db)| match best {
                Some((_, best_db)) if best_db >= db => best,
                _ => Some((f, db)),
            })
    }
}

/// Map an analog transfer function `B(s)/A(s)` to a digital one `B(z)/A(z)`
/// with the substitution `s = 2 fs (1 - z^-1) / (1 + z^-1)`.
///
/// Both outputs have `max(deg B, deg A) + 1` coefficients and are normalized
/// so that the first denominator coefficient is 1.
///
/// ```
/// use strata_dsp::bilinear_transform;
///
/// // 1 / (s + 1) sampled at 10 Hz
/// let (b, a) = bilinear_transform(&[1.0], &[1.0, 1.0], 10.0).unwrap();
/// assert!((b[0] - 0.047619).abs() < 1e-6);
/// assert!((a[1] + 0.904762).abs() < 1e-6);
/// ```
pub fn bilinear_transform(
    numerator: &[f64],
    denominator: &[f64],
    sample_rate: f64,
) -> Result<(Vec<f64>, Vec<f64>), DspError> {
    if !(sample_rate.is_finite() && sample_rate > 0.0) {
        return Err(DspError::InvalidSampleRate(sample_rate));
    }
    if numerator.is_empty() {
        return Err(DspError::InvalidPolynomial("numerator is empty"));
    }
    if numerator.iter().chain(denominator).any(|c| !c.is_finite()) {
        return Err(DspError::InvalidPolynomial("coefficients must be finite"));
    }

    let a = trim_leading_zeros(denominator);
    if a.is_empty() {
        return Err(DspError::InvalidPolynomial("denominator is empty or all zeros"));
    }
    let b = match trim_leading_zeros(numerator) {
        [] => &numerator[numerator.len() - 1..],
        b => b,
    };

    let order = (b.len() - 1).max(a.len() - 1);
    let k = 2.0 * sample_rate;

    let mut num = substitute(b, order, k);
    let mut den = substitute(a, order, k);

    let lead = den[0];
    if lead == 0.0 {
        return Err(DspError::InvalidPolynomial(
            "transformed denominator has a zero leading coefficient",
        ));
    }
    num.iter_mut().for_each(|c| *c /= lead);
    den.iter_mut().for_each(|c| *c /= lead);

    Ok((num, den))
}

/// Evaluate the magnitude response of `B(z)/A(z)` at `n_points` equally
/// spaced frequencies covering `[0, fs/2)`.
pub fn frequency_response(
    numerator: &[f64],
    denominator: &[f64],
    sample_rate: f64,
    n_points: usize,
) -> Result<FrequencyResponse, DspError> {
    if !(sample_rate.is_finite() && sample_rate > 0.0) {
        return Err(DspError::InvalidSampleRate(sample_rate));
    }
    if numerator.is_empty() || denominator.is_empty() {
        return Err(DspError::InvalidPolynomial("numerator and denominator must be non-empty"));
    }

    Ok(sample_response(sample_rate, n_points, |w| {
        let num = evaluate_z(numerator, w);
        let den = evaluate_z(denominator, w);
        (num / den).norm()
    }))
}

/// Sample `magnitude(w)` (w in radians/sample) on the grid used by
/// [`frequency_response`]
pub(crate) fn sample_response<F>(sample_rate: f64, n_points: usize, magnitude: F) -> FrequencyResponse
where
    F: Fn(f64) -> f64,
{
    let (frequencies, magnitudes_db) = (0..n_points)
        .map(|i| {
            let w = PI * i as f64 / n_points as f64;
            let freq = w * sample_rate / (2.0 * PI);
            (freq, magnitude_to_db(magnitude(w)))
        })
        .unzip();

    FrequencyResponse {
        frequencies,
        magnitudes_db,
    }
}

pub(crate) fn magnitude_to_db(magnitude: f64) -> f64 {
    20.0 * magnitude.max(MAGNITUDE_FLOOR).log10()
}

/// Evaluate a polynomial in `z^-1` (ascending powers) at `z = e^{jw}`
pub(crate) fn evaluate_z(poly: &[f64], w: f64) -> Complex<f64> {
    let z_inv = Complex::from_polar(1.0, -w);
    poly.iter()
        .rev()
        .fold(Complex::new(0.0, 0.0), |acc, &c| acc * z_inv + c)
}

/// Expand `sum_i c_i s^i` with `s = k (1 - x) / (1 + x)`, multiplied through
/// by `(1 + x)^order`, into ascending powers of `x = z^-1`
fn substitute(poly: &[f64], order: usize, k: f64) -> Vec<f64> {
    let mut out = vec![0.0; order + 1];

    // `rev()` walks from the constant term upwards, so `power` is the power of s
    for (power, &coeff) in poly.iter().rev().enumerate() {
        if coeff == 0.0 {
            continue;
        }
        let mut term = vec![coeff * k.powi(power as i32)];
        for _ in 0..power {
            term = convolve(&term, &[1.0, -1.0]);
        }
        for _ in power..order {
            term = convolve(&term, &[1.0, 1.0]);
        }
        for (o, t) in out.iter_mut().zip(&term) {
            *o += t;
        }
    }

    out
}

fn convolve(a: &[f64], b: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; a.len() + b.len() - 1];
    for (i, &x) in a.iter().enumerate() {
        for (j, &y) in b.iter().enumerate() {
            out[i + j] += x * y;
        }
    }
    out
}

fn trim_leading_zeros(poly: &[f64]) -> &[f64] {
    let start = poly.iter().position(|&c| c != 0.0).unwrap_or(poly.len());
    &poly[start..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_order_lowpass_closed_form() {
        let (b, a) = bilinear_transform(&[1.0], &[1.0, 1.0], 10.0).unwrap();

        assert_eq!(b.len(), 2);
        assert_eq!(a.len(), 2);
        assert!((b[0] - 0.0476).abs() < 1e-3);
        assert!((b[1] - 0.0476).abs() < 1e-3);
        assert!((a[0] - 1.0).abs() < 1e-12);
        assert!((a[1] + 0.9048).abs() < 1e-3);

        // Exact values: 1/21 and -19/21
        assert!((b[0] - 1.0 / 21.0).abs() < 1e-12);
        assert!((a[1] + 19.0 / 21.0).abs() < 1e-12);
    }

    #[test]
    fn test_dc_gain_preserved() {
        // H(s) = 4 / (s^2 + 2s + 4) has unity DC gain; bilinear maps s=0 to z=1
        let (b, a) = bilinear_transform(&[4.0], &[1.0, 2.0, 4.0], 48.0).unwrap();
        let dc = b.iter().sum::<f64>() / a.iter().sum::<f64>();
        assert!((dc - 1.0).abs() < 1e-9, "DC gain was {}", dc);
    }

    #[test]
    fn test_second_order_lengths() {
        let (b, a) = bilinear_transform(&[1.0, 0.0], &[1.0, 1.0, 1.0], 100.0).unwrap();
        assert_eq!(b.len(), 3);
        assert_eq!(a.len(), 3);
        assert_eq!(a[0], 1.0);
    }

    #[test]
    fn test_leading_zeros_ignored() {
        let plain = bilinear_transform(&[1.0], &[1.0, 1.0], 10.0).unwrap();
        let padded = bilinear_transform(&[0.0, 1.0], &[0.0, 1.0, 1.0], 10.0).unwrap();
        assert_eq!(plain, padded);
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        assert!(matches!(
            bilinear_transform(&[1.0], &[1.0, 1.0], 0.0),
            Err(DspError::InvalidSampleRate(_))
        ));
        assert!(matches!(
            bilinear_transform(&[1.0], &[0.0, 0.0], 10.0),
            Err(DspError::InvalidPolynomial(_))
        ));
        assert!(matches!(
            bilinear_transform(&[], &[1.0], 10.0),
            Err(DspError::InvalidPolynomial(_))
        ));
        // s - 2fs puts a pole of the substitution at z = infinity
        assert!(matches!(
            bilinear_transform(&[1.0], &[1.0, -20.0], 10.0),
            Err(DspError::InvalidPolynomial(_))
        ));
    }

    #[test]
    fn test_frequency_response_of_lowpass() {
        let (b, a) = bilinear_transform(&[1.0], &[1.0, 1.0], 10.0).unwrap();
        let response = frequency_response(&b, &a, 10.0, 512).unwrap();

        assert_eq!(response.len(), 512);
        assert_eq!(response.frequencies[0], 0.0);
        assert!(response.frequencies[511] < 5.0);

        // Unity at DC, monotonically falling towards nyquist
        assert!(response.magnitudes_db[0].abs() < 1e-9);
        for pair in response.magnitudes_db.windows(2) {
            assert!(pair[1] < pair[0]);
        }
        let (peak_freq, _) = response.peak().unwrap();
        assert_eq!(peak_freq, 0.0);
    }

    #[test]
    fn test_frequency_response_corner() {
        // The analog corner at 1 rad/s is pre-warped to 2*fs*atan(1/(2*fs)) rad/s
        let fs = 10.0;
        let (b, a) = bilinear_transform(&[1.0], &[1.0, 1.0], fs).unwrap();
        let w_digital = 2.0 * (1.0 / (2.0 * fs)).atan();
        let h = evaluate_z(&b, w_digital) / evaluate_z(&a, w_digital);
        let db = magnitude_to_db(h.norm());
        assert!((db + 3.0103).abs() < 1e-3, "corner gain was {}dB", db);
    }

    #[test]
    fn test_zero_response_is_finite() {
        let response = frequency_response(&[0.0], &[1.0], 8000.0, 16).unwrap();
        assert!(response.magnitudes_db.iter().all(|db| db.is_finite()));
    }
}
