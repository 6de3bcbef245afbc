//! Filter Bank State
//!
//! Per-band delay lines carried across audio blocks. Feeding a signal through
//! [`FilterState::process`] in consecutive blocks produces the same output as
//! filtering the concatenated signal in one call.

use biquad::{Biquad, DirectForm2Transposed};

use crate::design::{self, FilterSpec, SosFilter, SECTIONS_PER_BAND};
use crate::error::DspError;

/// Delay lines for one band's cascade (2 values per section)
///
/// Starts from all-zero state rather than the step-response steady state,
/// so the first block after (re)initialization shows a short transient.
#[derive(Debug, Clone)]
pub struct FilterState {
    // DirectForm2Transposed: 2 state values per section, good numerical behavior
    sections: [DirectForm2Transposed<f64>; SECTIONS_PER_BAND],
}

impl FilterState {
    pub fn new(sos: &SosFilter) -> Self {
        let coeffs = sos.sections();
        Self {
            sections: core::array::from_fn(|i| DirectForm2Transposed::<f64>::new(coeffs[i])),
        }
    }

    /// Number of delay-line values held
    pub fn len(&self) -> usize {
        2 * self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Filter one sample through the cascade
    #[inline]
    pub fn run(&mut self, sample: f64) -> f64 {
        self.sections
            .iter_mut()
            .fold(sample, |x, section| section.run(x))
    }

    /// Filter `input` into `output`, advancing the delay lines
    ///
    /// # Real-time Safety
    /// No allocations. Processes `min(input.len(), output.len())` samples.
    #[inline]
    pub fn process(&mut self, input: &[f64], output: &mut [f64]) {
        for (x, y) in input.iter().zip(output.iter_mut()) {
            *y = self.run(*x);
        }
    }

    /// Clear the delay lines
    pub fn reset(&mut self) {
        for section in &mut self.sections {
            section.reset_state();
        }
    }
}

/// One equalizer band: its design, coefficients and delay lines
#[derive(Debug, Clone)]
pub struct Band {
    pub index: usize,
    pub spec: FilterSpec,
    pub sos: SosFilter,
    state: FilterState,
}

impl Band {
    pub fn new(index: usize, spec: FilterSpec) -> Self {
        let sos = design::design_bandpass(&spec);
        Self {
            index,
            spec,
            sos,
            state: FilterState::new(&sos),
        }
    }

    pub fn state(&self) -> &FilterState {
        &self.state
    }

    /// Run the band filter over a block, carrying state into the next call
    #[inline]
    pub fn process(&mut self, input: &[f64], output: &mut [f64]) {
        self.state.process(input, output);
    }

    pub fn reset(&mut self) {
        self.state.reset();
    }
}

/// The fixed set of bands an equalizer runs, in index order
#[derive(Debug, Clone)]
pub struct FilterBank {
    bands: Vec<Band>,
}

impl FilterBank {
    /// Design and allocate one zeroed band per center frequency.
    ///
    /// Every spec is validated before any filter is synthesized.
    pub fn new(
        center_frequencies: &[f64],
        quality_factor: f64,
        sample_rate: f64,
    ) -> Result<Self, DspError> {
        let specs = center_frequencies
            .iter()
            .map(|&center| FilterSpec::new(center, quality_factor, sample_rate))
            .collect::<Result<Vec<_>, _>>()?;

        let bands = specs
            .into_iter()
            .enumerate()
            .map(|(index, spec)| Band::new(index, spec))
            .collect();

        Ok(Self { bands })
    }

    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    pub fn bands(&self) -> &[Band] {
        &self.bands
    }

    pub fn bands_mut(&mut self) -> &mut [Band] {
        &mut self.bands
    }

    /// Zero every band's delay lines
    pub fn reset(&mut self) {
        self.bands.iter_mut().for_each(Band::reset);
    }
}
