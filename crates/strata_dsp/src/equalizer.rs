//! Streaming Equalizer Engine
//!
//! The per-block entry point the audio callback calls. Each block is
//! downmixed to mono, passed through every band filter with carried state,
//! mixed as a boost/cut around the dry signal, then written to both channels
//! of a stereo output. The mixed signal is collected into block-size windows;
//! every full window is analyzed and published to the spectrum channel, so a
//! device delivering short callbacks still yields one snapshot per block.
//!
//! # Mixing
//!
//! ```text
//! mix = dry + sum_b (10^(gain_b/20) - 1) * bandpass_b(dry)
//! ```
//!
//! A band at 0dB contributes nothing, so a flat table passes the dry signal
//! through unchanged. Filters keep running at 0dB so their state stays
//! continuous when a gain is later moved.
//!
//! # Real-time Safety
//!
//! Every buffer is sized in [`Equalizer::new`]. [`Equalizer::process`] does
//! no allocation, no locking and no logging.

use std::sync::Arc;

use crate::error::DspError;
use crate::fft::SpectrumAnalyzer;
use crate::gain::{db_to_amplitude, GainBounds, GainTable};
use crate::publisher::SpectrumChannel;
use crate::state::FilterBank;

/// Band centers of the reference layout (Hz)
pub const REFERENCE_CENTERS_HZ: [f64; 5] = [60.0, 230.0, 910.0, 3600.0, 14000.0];

/// Quality factor shared by every reference band
pub const REFERENCE_Q: f64 = 2.0;

pub const REFERENCE_SAMPLE_RATE: f64 = 44100.0;

/// Frames per processed block (and FFT size)
pub const REFERENCE_BLOCK_SIZE: usize = 1024;

/// Spectrum snapshots held before new ones are dropped
pub const REFERENCE_SPECTRUM_CAPACITY: usize = 5;

/// Output is always interleaved stereo
pub const OUTPUT_CHANNELS: usize = 2;

/// Construction parameters of an [`Equalizer`]
#[derive(Debug, Clone, PartialEq)]
pub struct EqConfig {
    pub sample_rate: f64,
    /// Frames per processing chunk; also the spectrum FFT size
    pub block_size: usize,
    /// One band per entry, in index order
    pub center_frequencies: Vec<f64>,
    pub quality_factor: f64,
    pub gain_bounds: GainBounds,
    pub spectrum_capacity: usize,
}

impl Default for EqConfig {
    fn default() -> Self {
        Self {
            sample_rate: REFERENCE_SAMPLE_RATE,
            block_size: REFERENCE_BLOCK_SIZE,
            center_frequencies: REFERENCE_CENTERS_HZ.to_vec(),
            quality_factor: REFERENCE_Q,
            gain_bounds: GainBounds::default(),
            spectrum_capacity: REFERENCE_SPECTRUM_CAPACITY,
        }
    }
}

impl EqConfig {
    pub fn band_count(&self) -> usize {
        self.center_frequencies.len()
    }

    /// Duration of one block in milliseconds
    pub fn block_duration_ms(&self) -> f64 {
        (self.block_size as f64 / self.sample_rate) * 1000.0
    }
}

/// Block-wise equalizer with persistent filter state
pub struct Equalizer {
    bank: FilterBank,
    gains: Arc<GainTable>,
    spectrum: Arc<SpectrumChannel>,
    analyzer: SpectrumAnalyzer,
    sample_rate: f64,
    block_size: usize,
    // Pre-allocated per-chunk scratch (block_size each)
    mono: Vec<f64>,
    filtered: Vec<f64>,
    mix: Vec<f64>,
    // Mixed output awaiting analysis; published each time it fills
    analysis: Vec<f64>,
    analysis_fill: usize,
}

impl Equalizer {
    /// Build the filter bank and size every buffer.
    ///
    /// `gains` must have one entry per center frequency and `spectrum` must
    /// carry `block_size / 2 + 1` bins.
    pub fn new(
        config: &EqConfig,
        gains: Arc<GainTable>,
        spectrum: Arc<SpectrumChannel>,
    ) -> Result<Self, DspError> {
        if config.block_size < 2 {
            return Err(DspError::InvalidBlockSize(config.block_size));
        }

        let bank = FilterBank::new(
            &config.center_frequencies,
            config.quality_factor,
            config.sample_rate,
        )?;
        if gains.band_count() != bank.len() {
            return Err(DspError::BandCountMismatch {
                expected: bank.len(),
                got: gains.band_count(),
            });
        }

        let analyzer = SpectrumAnalyzer::new(config.block_size, config.sample_rate)?;
        if spectrum.bin_count() != analyzer.bin_count() {
            return Err(DspError::BufferSizeMismatch {
                expected: analyzer.bin_count(),
                got: spectrum.bin_count(),
            });
        }

        Ok(Self {
            bank,
            gains,
            spectrum,
            analyzer,
            sample_rate: config.sample_rate,
            block_size: config.block_size,
            mono: vec![0.0; config.block_size],
            filtered: vec![0.0; config.block_size],
            mix: vec![0.0; config.block_size],
            analysis: vec![0.0; config.block_size],
            analysis_fill: 0,
        })
    }

    /// Build an equalizer that owns a fresh gain table and spectrum channel
    pub fn from_config(config: &EqConfig) -> Result<Self, DspError> {
        let gains = Arc::new(GainTable::new(config.band_count(), config.gain_bounds));
        let spectrum = Arc::new(SpectrumChannel::for_block(
            config.spectrum_capacity,
            config.block_size,
            config.sample_rate,
        ));
        Self::new(config, gains, spectrum)
    }

    /// Reference layout: 5 bands, Q 2, 44.1kHz, 1024-frame blocks
    pub fn with_defaults() -> Result<Self, DspError> {
        Self::from_config(&EqConfig::default())
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn band_count(&self) -> usize {
        self.bank.len()
    }

    pub fn center_frequencies(&self) -> Vec<f64> {
        self.bank.bands().iter().map(|b| b.spec.center_hz()).collect()
    }

    pub fn bank(&self) -> &FilterBank {
        &self.bank
    }

    /// Gain table shared with the control surface
    pub fn gains(&self) -> &Arc<GainTable> {
        &self.gains
    }

    /// Spectrum channel shared with the visualization consumer
    pub fn spectrum(&self) -> &Arc<SpectrumChannel> {
        &self.spectrum
    }

    /// Process one device buffer.
    ///
    /// `input` is `frame_count` interleaved frames of `channel_count`
    /// samples; `output` receives `frame_count` interleaved stereo frames.
    /// Buffers longer than the block size are processed in block-size
    /// chunks. A spectrum is published for every `block_size` frames of
    /// output, whether they arrive in one call or across several. Frames that cannot be
    /// produced (short `input`, zero channels) are written as silence and
    /// excess `output` is zeroed.
    ///
    /// # Real-time Safety
    /// No allocations, no locks, never blocks.
    pub fn process(
        &mut self,
        input: &[f32],
        frame_count: usize,
        channel_count: usize,
        output: &mut [f32],
    ) {
        let out_frames = frame_count.min(output.len() / OUTPUT_CHANNELS);
        let in_frames = match channel_count {
            0 => 0,
            n => frame_count.min(input.len() / n),
        };
        let frames = out_frames.min(in_frames);

        let mut start = 0;
        while start < frames {
            let len = (frames - start).min(self.block_size);
            let chunk_in = &input[start * channel_count..(start + len) * channel_count];
            let chunk_out = &mut output[start * OUTPUT_CHANNELS..(start + len) * OUTPUT_CHANNELS];
            self.process_chunk(chunk_in, channel_count, chunk_out);
            start += len;
        }

        output[frames * OUTPUT_CHANNELS..].fill(0.0);
    }

    /// Zero every band's delay lines and drop any partially collected
    /// analysis window (full reinitialization)
    pub fn reset(&mut self) {
        self.bank.reset();
        self.analysis_fill = 0;
    }

    /// Frames collected toward the next spectrum snapshot
    pub fn pending_analysis_frames(&self) -> usize {
        self.analysis_fill
    }

    /// One chunk of at most `block_size` frames; `input.len()` is a multiple
    /// of `channel_count` and `output` holds the same number of stereo frames
    fn process_chunk(&mut self, input: &[f32], channel_count: usize, output: &mut [f32]) {
        let Self {
            bank,
            gains,
            spectrum,
            analyzer,
            mono,
            filtered,
            mix,
            analysis,
            analysis_fill,
            ..
        } = self;

        let frames = output.len() / OUTPUT_CHANNELS;
        let mono = &mut mono[..frames];
        let filtered = &mut filtered[..frames];
        let mix = &mut mix[..frames];

        // Downmix
        if channel_count == 1 {
            for (m, &x) in mono.iter_mut().zip(input) {
                *m = f64::from(x);
            }
        } else {
            let scale = 1.0 / channel_count as f64;
            for (m, frame) in mono.iter_mut().zip(input.chunks_exact(channel_count)) {
                *m = frame.iter().map(|&x| f64::from(x)).sum::<f64>() * scale;
            }
        }

        // Dry path at unity, bands add their correction on top
        mix.copy_from_slice(mono);
        for band in bank.bands_mut() {
            band.process(mono, filtered);
            let weight = db_to_amplitude(gains.gain_or_flat(band.index)) - 1.0;
            for (m, &f) in mix.iter_mut().zip(filtered.iter()) {
                *m += weight * f;
            }
        }

        // Chunks never exceed block_size, so at most one window completes
        let mut pending: &[f64] = &*mix;
        while !pending.is_empty() {
            let take = pending.len().min(analysis.len() - *analysis_fill);
            analysis[*analysis_fill..*analysis_fill + take].copy_from_slice(&pending[..take]);
            *analysis_fill += take;
            pending = &pending[take..];

            if *analysis_fill == analysis.len() {
                if let Some(magnitudes_db) = analyzer.analyze(analysis) {
                    spectrum.try_publish(magnitudes_db);
                }
                *analysis_fill = 0;
            }
        }

        for (frame, &sample) in output.chunks_exact_mut(OUTPUT_CHANNELS).zip(mix.iter()) {
            frame.fill(sample as f32);
        }
    }
}

impl std::fmt::Debug for Equalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Equalizer")
            .field("sample_rate", &self.sample_rate)
            .field("block_size", &self.block_size)
            .field("centers", &self.center_frequencies())
            .field("gains", &self.gains.gains())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn tone(freq: f64, frames: usize, fs: f64, amplitude: f64) -> Vec<f32> {
        (0..frames)
            .map(|i| (amplitude * (2.0 * PI * freq * i as f64 / fs).sin()) as f32)
            .collect()
    }

    fn noise(frames: usize) -> Vec<f32> {
        // Deterministic LCG so tests are reproducible
        let mut seed: u32 = 0x1234_5678;
        (0..frames)
            .map(|_| {
                seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                (seed >> 8) as f32 / (1u32 << 24) as f32 - 0.5
            })
            .collect()
    }

    fn rms(samples: &[f32]) -> f64 {
        let sum: f64 = samples.iter().map(|&x| f64::from(x).powi(2)).sum();
        (sum / samples.len() as f64).sqrt()
    }

    fn left(output: &[f32]) -> Vec<f32> {
        output.iter().step_by(OUTPUT_CHANNELS).copied().collect()
    }

    #[test]
    fn test_reference_construction() {
        let eq = Equalizer::with_defaults().unwrap();
        assert_eq!(eq.band_count(), 5);
        assert_eq!(eq.block_size(), 1024);
        assert_eq!(eq.sample_rate(), 44100.0);
        assert_eq!(eq.center_frequencies(), REFERENCE_CENTERS_HZ.to_vec());
        assert_eq!(eq.spectrum().bin_count(), 513);
        assert_eq!(eq.spectrum().capacity(), 5);
    }

    #[test]
    fn test_construction_mismatches_rejected() {
        let config = EqConfig::default();
        let spectrum = Arc::new(SpectrumChannel::for_block(5, 1024, 44100.0));

        let wrong_gains = Arc::new(GainTable::new(3, GainBounds::default()));
        assert!(matches!(
            Equalizer::new(&config, wrong_gains, Arc::clone(&spectrum)),
            Err(DspError::BandCountMismatch { expected: 5, got: 3 })
        ));

        let gains = Arc::new(GainTable::new(5, GainBounds::default()));
        let wrong_spectrum = Arc::new(SpectrumChannel::for_block(5, 512, 44100.0));
        assert!(matches!(
            Equalizer::new(&config, Arc::clone(&gains), wrong_spectrum),
            Err(DspError::BufferSizeMismatch { .. })
        ));

        let tiny = EqConfig {
            block_size: 1,
            ..EqConfig::default()
        };
        assert!(matches!(
            Equalizer::new(&tiny, gains, spectrum),
            Err(DspError::InvalidBlockSize(1))
        ));

        let bad_band = EqConfig {
            center_frequencies: vec![60.0, 30000.0],
            ..EqConfig::default()
        };
        assert!(matches!(
            Equalizer::from_config(&bad_band),
            Err(DspError::InvalidSpec { .. })
        ));
    }

    #[test]
    fn test_zero_gain_is_identity_mono() {
        let mut eq = Equalizer::with_defaults().unwrap();
        let input = noise(4096);
        let mut output = vec![0.0; 4096 * 2];

        eq.process(&input, 4096, 1, &mut output);

        assert_eq!(left(&output), input);
    }

    #[test]
    fn test_zero_gain_is_identity_after_gains_return_to_flat() {
        let mut eq = Equalizer::with_defaults().unwrap();
        let input = noise(2048);
        let mut output = vec![0.0; 2048 * 2];

        for band in 0..5 {
            eq.gains().set_gain(band, 12.0).unwrap();
        }
        eq.process(&input, 2048, 1, &mut output);
        assert_ne!(left(&output), input);

        eq.gains().reset();
        eq.process(&input, 2048, 1, &mut output);
        assert_eq!(left(&output), input);
    }

    #[test]
    fn test_stereo_downmix_and_duplication() {
        let mut eq = Equalizer::with_defaults().unwrap();
        let frames = 1024;
        let l = tone(440.0, frames, 44100.0, 0.8);
        let r = noise(frames);
        let input: Vec<f32> = l.iter().zip(&r).flat_map(|(&a, &b)| [a, b]).collect();
        let mut output = vec![0.0; frames * 2];

        eq.process(&input, frames, 2, &mut output);

        for (i, frame) in output.chunks_exact(2).enumerate() {
            assert_eq!(frame[0], frame[1]);
            let expected = ((f64::from(l[i]) + f64::from(r[i])) * 0.5) as f32;
            assert_eq!(frame[0], expected);
        }
    }

    #[test]
    fn test_gain_monotonic_in_band_energy() {
        let frames = 8192;
        let input = tone(910.0, frames + 1024, 44100.0, 0.25);

        let mut time_rms = Vec::new();
        let mut band_energy = Vec::new();
        for gain_db in [-24.0, -12.0, -3.0, 0.0, 3.0, 12.0, 24.0] {
            let mut eq = Equalizer::with_defaults().unwrap();
            eq.gains().set_gain(2, gain_db).unwrap();

            let mut output = vec![0.0; frames * 2];
            eq.process(&input[..frames], frames, 1, &mut output);
            // Skip the start-up transient
            time_rms.push(rms(&left(&output)[4096..]));

            // Fresh snapshot of the next, settled block
            eq.spectrum().clear();
            eq.process(&input[frames..], 1024, 1, &mut output[..2048]);
            let snapshot = eq.spectrum().try_take().unwrap();
            let energy: f64 = snapshot
                .bins_between(700.0, 1200.0)
                .map(|(_, db)| 10.0_f64.powf(f64::from(db) / 10.0))
                .sum();
            band_energy.push(energy);
        }

        for pair in time_rms.windows(2) {
            assert!(pair[1] > pair[0], "rms not increasing: {:?}", time_rms);
        }
        for pair in band_energy.windows(2) {
            assert!(pair[1] > pair[0], "band energy not increasing: {:?}", band_energy);
        }
    }

    #[test]
    fn test_boost_targets_its_band() {
        let frames = 8192;
        let in_band = tone(3600.0, frames, 44100.0, 0.1);
        let out_of_band = tone(60.0, frames, 44100.0, 0.1);

        let gain_ratio = |input: &[f32]| {
            let mut eq = Equalizer::with_defaults().unwrap();
            eq.gains().set_gain(3, 12.0).unwrap();
            let mut output = vec![0.0; frames * 2];
            eq.process(input, frames, 1, &mut output);
            rms(&left(&output)[4096..]) / rms(&input[4096..])
        };

        // +12dB is x3.98 at the center; the 60Hz tone stays almost flat
        assert!((gain_ratio(&in_band) - 3.98).abs() < 0.1);
        assert!((gain_ratio(&out_of_band) - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_one_spectrum_per_full_block() {
        let mut eq = Equalizer::with_defaults().unwrap();
        let input = noise(1024 * 3 + 500);
        let mut output = vec![0.0; input.len() * 2];

        eq.process(&input, input.len(), 1, &mut output);

        // Three full blocks analyzed, the 500-frame tail waits for more
        assert_eq!(eq.spectrum().len(), 3);
        assert_eq!(eq.pending_analysis_frames(), 500);
        let snapshot = eq.spectrum().try_take().unwrap();
        assert_eq!(snapshot.len(), 513);
        assert_eq!(snapshot.frequencies()[0], 0.0);
        assert!(snapshot.magnitudes_db().iter().all(|db| db.is_finite()));
    }

    #[test]
    fn test_short_callbacks_still_publish() {
        let mut eq = Equalizer::with_defaults().unwrap();
        let input = noise(512);
        let mut output = vec![0.0; 1024];

        for call in 1..=8 {
            eq.process(&input, 512, 1, &mut output);
            assert_eq!(eq.spectrum().published(), call / 2);
        }
        assert_eq!(eq.spectrum().len(), 4);
        assert_eq!(eq.spectrum().try_take().unwrap().len(), 513);

        // Odd sizes carry over across calls
        eq.spectrum().clear();
        for _ in 0..10 {
            eq.process(&input[..300], 300, 1, &mut output[..600]);
        }
        assert_eq!(eq.spectrum().len(), 2);
        assert_eq!(eq.pending_analysis_frames(), 3000 - 2 * 1024);
    }

    #[test]
    fn test_window_spans_calls_like_one_block() {
        let input = noise(1024);
        let mut whole = Equalizer::with_defaults().unwrap();
        let mut split = Equalizer::with_defaults().unwrap();
        let mut output = vec![0.0; 2048];

        whole.process(&input, 1024, 1, &mut output);
        split.process(&input[..256], 256, 1, &mut output[..512]);
        split.process(&input[256..], 768, 1, &mut output[..1536]);

        let expected = whole.spectrum().try_take().unwrap();
        let actual = split.spectrum().try_take().unwrap();
        for (a, e) in actual.magnitudes_db().iter().zip(expected.magnitudes_db()) {
            assert!((a - e).abs() < 1e-3);
        }
    }

    #[test]
    fn test_full_spectrum_channel_never_blocks() {
        let mut eq = Equalizer::with_defaults().unwrap();
        let input = noise(1024);
        let mut output = vec![0.0; 2048];

        for _ in 0..20 {
            eq.process(&input, 1024, 1, &mut output);
        }
        assert_eq!(eq.spectrum().len(), 5);
        assert_eq!(eq.spectrum().dropped(), 15);
    }

    #[test]
    fn test_chunking_matches_whole_buffer() {
        let input = noise(3000);
        for gain in [-6.0, 9.0] {
            let mut whole = Equalizer::with_defaults().unwrap();
            let mut split = Equalizer::with_defaults().unwrap();
            for band in 0..5 {
                whole.gains().set_gain(band, gain).unwrap();
                split.gains().set_gain(band, gain).unwrap();
            }

            let mut expected = vec![0.0; 6000];
            whole.process(&input, 3000, 1, &mut expected);

            let mut actual = vec![0.0; 6000];
            let mut start = 0;
            for len in [256, 1024, 17, 1703] {
                split.process(
                    &input[start..start + len],
                    len,
                    1,
                    &mut actual[start * 2..(start + len) * 2],
                );
                start += len;
            }

            for (a, e) in actual.iter().zip(&expected) {
                assert!((a - e).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_malformed_calls_write_silence() {
        let mut eq = Equalizer::with_defaults().unwrap();

        // Zero channels: nothing can be produced
        let mut output = vec![1.0; 64];
        eq.process(&[0.5; 32], 32, 0, &mut output);
        assert!(output.iter().all(|&x| x == 0.0));

        // Input shorter than frame_count
        let mut output = vec![1.0; 64];
        eq.process(&[0.5; 10], 32, 1, &mut output);
        assert!(output[..20].iter().all(|&x| x == 0.5));
        assert!(output[20..].iter().all(|&x| x == 0.0));

        // Output shorter than frame_count only gets what fits
        let mut output = vec![1.0; 8];
        eq.process(&[0.25; 32], 32, 1, &mut output);
        assert!(output.iter().all(|&x| x == 0.25));

        // Output longer than frame_count is zeroed past the end
        let mut output = vec![1.0; 16];
        eq.process(&[0.25; 4], 4, 1, &mut output);
        assert!(output[..8].iter().all(|&x| x == 0.25));
        assert!(output[8..].iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_reset_clears_filter_state() {
        let input = noise(1024);
        let mut fresh = Equalizer::with_defaults().unwrap();
        fresh.gains().set_gain(1, 6.0).unwrap();
        let mut expected = vec![0.0; 2048];
        fresh.process(&input, 1024, 1, &mut expected);

        let mut reused = Equalizer::with_defaults().unwrap();
        reused.gains().set_gain(1, 6.0).unwrap();
        let mut scratch = vec![0.0; 2048];
        reused.process(&noise(1024), 1024, 1, &mut scratch);
        reused.process(&input[..100], 100, 1, &mut scratch[..200]);
        reused.reset();
        assert_eq!(reused.pending_analysis_frames(), 0);
        let mut actual = vec![0.0; 2048];
        reused.process(&input, 1024, 1, &mut actual);

        assert_eq!(actual, expected);
    }
}
