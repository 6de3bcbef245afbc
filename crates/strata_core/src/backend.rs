//! Audio Backends
//!
//! A backend turns an [`Equalizer`] into a running duplex stream. The
//! controller only sees the [`AudioBackend`] trait, so the lifecycle works
//! the same against real devices ([`CpalBackend`]) and a synthetic source
//! ([`ToneBackend`]) that needs no hardware.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize, SampleRate, Stream, StreamConfig as CpalStreamConfig};
use crossbeam_channel::Sender;
use tracing::{debug, info};

use strata_dsp::{Equalizer, OUTPUT_CHANNELS};

use crate::config::EngineConfig;
use crate::device::{open_device, DeviceDirection};
use crate::error::{EngineError, EngineResult};
use crate::message::Event;
use crate::stream::{duplex_bridge, StreamStats};

/// Everything a backend needs to report back while running
#[derive(Clone)]
pub struct StreamContext {
    pub events: Sender<Event>,
    pub stats: Arc<StreamStats>,
}

/// Source of running duplex streams
///
/// `open` is called on the controller's audio thread, which also owns the
/// returned stream until it is closed, so streams need not be `Send`.
pub trait AudioBackend: Send + Sync {
    /// Short name for logs and events
    fn name(&self) -> &str;

    /// Open and start a stream that runs `equalizer` once per block
    fn open(
        &self,
        config: &EngineConfig,
        equalizer: Equalizer,
        context: StreamContext,
    ) -> EngineResult<Box<dyn ActiveStream>>;
}

/// A running stream; closing it stops the callbacks
pub trait ActiveStream {
    fn close(self: Box<Self>) -> EngineResult<()>;
}

/// Real devices through cpal: a capture stream and a stereo playback stream
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalBackend;

impl CpalBackend {
    pub fn new() -> Self {
        Self
    }
}

impl AudioBackend for CpalBackend {
    fn name(&self) -> &str {
        "cpal"
    }

    fn open(
        &self,
        config: &EngineConfig,
        equalizer: Equalizer,
        context: StreamContext,
    ) -> EngineResult<Box<dyn ActiveStream>> {
        let input_device = open_device(DeviceDirection::Input, config.input_device.as_deref())?;
        let output_device = open_device(DeviceDirection::Output, config.output_device.as_deref())?;
        debug!(
            "Opening capture {:?} -> playback {:?}",
            input_device.name().ok(),
            output_device.name().ok()
        );

        let capture_config = CpalStreamConfig {
            channels: config.input_channels,
            sample_rate: SampleRate(config.sample_rate),
            buffer_size: BufferSize::Fixed(config.block_size),
        };
        let playback_config = CpalStreamConfig {
            channels: OUTPUT_CHANNELS as u16,
            ..capture_config.clone()
        };

        let (mut feed, mut bridge) = duplex_bridge(
            equalizer,
            usize::from(config.input_channels),
            Arc::clone(&context.stats),
        );

        let capture = input_device
            .build_input_stream(
                &capture_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    // Real-time audio callback - NO allocations allowed here
                    feed.push(data);
                },
                fault_reporter(&context),
                None,
            )
            .map_err(|e| EngineError::StreamBuildError(e.to_string()))?;

        let playback = output_device
            .build_output_stream(
                &playback_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    bridge.render(data);
                },
                fault_reporter(&context),
                None,
            )
            .map_err(|e| EngineError::StreamBuildError(e.to_string()))?;

        capture
            .play()
            .map_err(|e| EngineError::StreamPlayError(e.to_string()))?;
        playback
            .play()
            .map_err(|e| EngineError::StreamPlayError(e.to_string()))?;

        Ok(Box::new(CpalStream { capture, playback }))
    }
}

/// Error callback shared by both cpal streams
fn fault_reporter(context: &StreamContext) -> impl FnMut(cpal::StreamError) + Send + 'static {
    let events = context.events.clone();
    let stats = Arc::clone(&context.stats);
    move |err| {
        stats.record_fault();
        let _ = events.try_send(Event::fault(err));
    }
}

struct CpalStream {
    capture: Stream,
    playback: Stream,
}

impl ActiveStream for CpalStream {
    fn close(self: Box<Self>) -> EngineResult<()> {
        // Dropping the streams joins their callbacks; pausing first keeps the
        // playback side from rendering a last underrun block
        let paused = self
            .capture
            .pause()
            .and(self.playback.pause())
            .map_err(|e| EngineError::StreamPlayError(e.to_string()));
        drop(self);
        paused
    }
}

/// Synthetic duplex stream: a sine "captured" into the same bridge the cpal
/// backend uses, rendered on a worker thread
#[derive(Debug, Clone, Copy)]
pub struct ToneBackend {
    frequency_hz: f64,
    amplitude: f32,
    paced: bool,
}

impl ToneBackend {
    /// A tone rendered at the configured block rate
    pub fn new(frequency_hz: f64) -> Self {
        Self {
            frequency_hz,
            amplitude: 0.5,
            paced: true,
        }
    }

    pub fn with_amplitude(mut self, amplitude: f32) -> Self {
        self.amplitude = amplitude;
        self
    }

    /// Render blocks back to back instead of in real time
    pub fn unpaced(mut self) -> Self {
        self.paced = false;
        self
    }
}

impl AudioBackend for ToneBackend {
    fn name(&self) -> &str {
        "tone"
    }

    fn open(
        &self,
        config: &EngineConfig,
        equalizer: Equalizer,
        context: StreamContext,
    ) -> EngineResult<Box<dyn ActiveStream>> {
        let channels = usize::from(config.input_channels);
        let frames = config.block_size as usize;
        let sample_rate = f64::from(config.sample_rate);
        let period = Duration::from_secs_f64(frames as f64 / sample_rate);
        let step = std::f64::consts::TAU * self.frequency_hz / sample_rate;
        let (amplitude, paced) = (self.amplitude, self.paced);

        let (mut feed, mut bridge) = duplex_bridge(equalizer, channels, context.stats);
        let running = Arc::new(AtomicBool::new(true));
        let keep_running = Arc::clone(&running);

        let worker = thread::Builder::new()
            .name("strata-tone".into())
            .spawn(move || {
                let mut input = vec![0.0_f32; frames * channels];
                let mut output = vec![0.0_f32; frames * OUTPUT_CHANNELS];
                let mut phase = 0.0_f64;
                let mut deadline = Instant::now();

                while keep_running.load(Ordering::Relaxed) {
                    for frame in input.chunks_exact_mut(channels) {
                        frame.fill(amplitude * phase.sin() as f32);
                        phase = (phase + step) % std::f64::consts::TAU;
                    }
                    feed.push(&input);
                    bridge.render(&mut output);

                    if paced {
                        deadline += period;
                        if let Some(wait) = deadline.checked_duration_since(Instant::now()) {
                            thread::sleep(wait);
                        }
                    }
                }
            })
            .map_err(|e| EngineError::StreamBuildError(e.to_string()))?;

        info!(
            "Tone source at {:.1}Hz ({} blocks of {} frames)",
            self.frequency_hz,
            if paced { "paced" } else { "unpaced" },
            frames
        );
        Ok(Box::new(ToneStream {
            running,
            worker: Some(worker),
        }))
    }
}

struct ToneStream {
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl ActiveStream for ToneStream {
    fn close(mut self: Box<Self>) -> EngineResult<()> {
        self.running.store(false, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            worker
                .join()
                .map_err(|_| EngineError::StreamPlayError("tone worker panicked".into()))?;
        }
        Ok(())
    }
}

impl Drop for ToneStream {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
