//! Duplex Stream Bridge
//!
//! Connects a capture callback to a playback callback through an `rtrb` SPSC
//! ring buffer, with the [`Equalizer`] running inside the playback side.
//!
//! ```text
//! capture callback ──CaptureFeed::push──▶ rtrb ring ──RenderBridge::render──▶ playback callback
//!                                                        │
//!                                                  Equalizer::process
//! ```
//!
//! Neither half allocates, locks or logs. Missing input is rendered as
//! silence and counted; input that does not fit the ring is dropped and
//! counted. Both counters live in [`StreamStats`] for the control thread.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use rtrb::{Consumer, Producer, RingBuffer};

use strata_dsp::{Equalizer, OUTPUT_CHANNELS};

/// Blocks of input the ring can hold before capture starts dropping
const RING_BLOCKS: usize = 4;

/// Counters shared between the stream callbacks and the control thread
#[derive(Debug, Default)]
pub struct StreamStats {
    blocks_rendered: AtomicU64,
    underrun_frames: AtomicU64,
    overrun_samples: AtomicU64,
    faults: AtomicU64,
    // Rust pattern: AtomicF32 doesn't exist, so we use bit-casting
    output_peak_bits: AtomicU32,
}

impl StreamStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn blocks_rendered(&self) -> u64 {
        self.blocks_rendered.load(Ordering::Relaxed)
    }

    /// Output frames rendered without captured input
    pub fn underrun_frames(&self) -> u64 {
        self.underrun_frames.load(Ordering::Relaxed)
    }

    /// Captured samples dropped because the ring was full
    pub fn overrun_samples(&self) -> u64 {
        self.overrun_samples.load(Ordering::Relaxed)
    }

    /// Device errors reported by either callback
    pub fn faults(&self) -> u64 {
        self.faults.load(Ordering::Relaxed)
    }

    /// Absolute peak of the most recent rendered callback
    pub fn output_peak(&self) -> f32 {
        f32::from_bits(self.output_peak_bits.load(Ordering::Relaxed))
    }

    pub fn record_fault(&self) {
        self.faults.fetch_add(1, Ordering::Relaxed);
    }

    /// Zero every counter (called when a new stream starts)
    pub fn reset(&self) {
        self.blocks_rendered.store(0, Ordering::Relaxed);
        self.underrun_frames.store(0, Ordering::Relaxed);
        self.overrun_samples.store(0, Ordering::Relaxed);
        self.faults.store(0, Ordering::Relaxed);
        self.output_peak_bits.store(0.0_f32.to_bits(), Ordering::Relaxed);
    }
}

/// Create a connected capture/render pair.
///
/// The ring holds a few blocks of `input_channels`-wide frames; the render
/// side pre-allocates one block of interleaved input scratch.
pub fn duplex_bridge(
    equalizer: Equalizer,
    input_channels: usize,
    stats: Arc<StreamStats>,
) -> (CaptureFeed, RenderBridge) {
    let input_channels = input_channels.max(1);
    let block_size = equalizer.block_size();
    let (producer, consumer) = RingBuffer::<f32>::new(block_size * input_channels * RING_BLOCKS);

    let feed = CaptureFeed {
        producer,
        stats: Arc::clone(&stats),
    };
    let bridge = RenderBridge {
        consumer,
        equalizer,
        input_channels,
        scratch: vec![0.0; block_size * input_channels],
        stats,
    };
    (feed, bridge)
}

/// Capture half: owned by the input callback
pub struct CaptureFeed {
    producer: Producer<f32>,
    stats: Arc<StreamStats>,
}

impl CaptureFeed {
    /// Push captured interleaved samples, dropping what does not fit.
    ///
    /// Returns the number of samples written.
    ///
    /// # Real-time Safety
    /// No allocations, never blocks.
    pub fn push(&mut self, data: &[f32]) -> usize {
        let writable = data.len().min(self.producer.slots());
        let written = match self.producer.write_chunk_uninit(writable) {
            Ok(chunk) => chunk.fill_from_iter(data.iter().copied()),
            Err(_) => 0,
        };

        if written < data.len() {
            self.stats
                .overrun_samples
                .fetch_add((data.len() - written) as u64, Ordering::Relaxed);
        }
        written
    }
}

/// Render half: owned by the output callback, runs the equalizer
pub struct RenderBridge {
    consumer: Consumer<f32>,
    equalizer: Equalizer,
    input_channels: usize,
    // One block of interleaved input, sized at construction
    scratch: Vec<f32>,
    stats: Arc<StreamStats>,
}

impl RenderBridge {
    pub fn equalizer(&self) -> &Equalizer {
        &self.equalizer
    }

    /// Fill an interleaved stereo output buffer of any length.
    ///
    /// Each block of output pulls its input from the ring; frames with no
    /// input available are processed as silence so filter state keeps
    /// advancing.
    ///
    /// # Real-time Safety
    /// No allocations, no locks, never blocks.
    pub fn render(&mut self, output: &mut [f32]) {
        let channels = self.input_channels;
        let block_frames = self.scratch.len() / channels;
        let mut peak = 0.0_f32;

        for out_block in output.chunks_mut(block_frames * OUTPUT_CHANNELS) {
            let frames = out_block.len() / OUTPUT_CHANNELS;
            let needed = frames * channels;
            let input = &mut self.scratch[..needed];

            // Whole frames only, so channels stay aligned
            let available = self.consumer.slots().min(needed) / channels * channels;
            let mut read = 0;
            if let Ok(chunk) = self.consumer.read_chunk(available) {
                let (first, second) = chunk.as_slices();
                input[..first.len()].copy_from_slice(first);
                input[first.len()..first.len() + second.len()].copy_from_slice(second);
                read = first.len() + second.len();
                chunk.commit_all();
            }

            if read < needed {
                input[read..].fill(0.0);
                self.stats
                    .underrun_frames
                    .fetch_add(((needed - read) / channels) as u64, Ordering::Relaxed);
            }

            self.equalizer.process(input, frames, channels, out_block);
            peak = out_block.iter().fold(peak, |p, s| p.max(s.abs()));
        }

        self.stats.blocks_rendered.fetch_add(1, Ordering::Relaxed);
        self.stats
            .output_peak_bits
            .store(peak.to_bits(), Ordering::Relaxed);
    }
}
