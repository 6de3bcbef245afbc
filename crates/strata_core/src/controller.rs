//! Equalizer Controller
//!
//! Owns the engine lifecycle and everything the control side shares with the
//! audio side.
//!
//! # Lifecycle
//!
//! ```text
//!            start()                      stop()
//! Stopped ─────────────▶ Running ─────────────────▶ Stopped
//!    │ stop(): NotRunning   │ start(): AlreadyRunning
//! ```
//!
//! `start` spawns a dedicated `strata-audio` thread that opens the backend
//! stream and holds it until `stop` signals it, so backends whose streams
//! are not `Send` (cpal on some hosts) still work. `start` returns only
//! after the stream is open or has failed to open.
//!
//! The gain table and spectrum channel outlive individual streams: gains
//! set while stopped apply to the next start. Filter state does not; every
//! start builds a fresh `Equalizer`.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use strata_dsp::{Equalizer, GainTable, SpectrumChannel, SpectrumSnapshot};

use crate::backend::{AudioBackend, CpalBackend, StreamContext};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::message::Event;
use crate::stream::StreamStats;

/// Events buffered for the control side before new ones are dropped
const EVENT_CAPACITY: usize = 64;

/// Externally visible lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineState {
    Stopped,
    Running,
}

enum Lifecycle {
    Stopped,
    Running {
        audio_thread: JoinHandle<()>,
        stop_sender: Sender<()>,
    },
}

/// The one object that starts, stops and controls the equalizer
pub struct EqualizerController {
    config: EngineConfig,
    backend: Arc<dyn AudioBackend>,
    gains: Arc<GainTable>,
    spectrum: Arc<SpectrumChannel>,
    stats: Arc<StreamStats>,
    event_sender: Sender<Event>,
    event_receiver: Receiver<Event>,
    lifecycle: Lifecycle,
}

impl EqualizerController {
    /// Controller for real devices
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        Self::with_backend(config, Arc::new(CpalBackend::new()))
    }

    /// Controller driving any backend; the config is validated here
    pub fn with_backend(config: EngineConfig, backend: Arc<dyn AudioBackend>) -> EngineResult<Self> {
        config.validate().map_err(EngineError::ConfigError)?;
        let eq_config = config.eq_config()?;

        let gains = Arc::new(GainTable::new(eq_config.band_count(), eq_config.gain_bounds));
        let spectrum = Arc::new(SpectrumChannel::for_block(
            eq_config.spectrum_capacity,
            eq_config.block_size,
            eq_config.sample_rate,
        ));
        let (event_sender, event_receiver) = bounded(EVENT_CAPACITY);

        Ok(Self {
            config,
            backend,
            gains,
            spectrum,
            stats: Arc::new(StreamStats::new()),
            event_sender,
            event_receiver,
            lifecycle: Lifecycle::Stopped,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn state(&self) -> EngineState {
        match self.lifecycle {
            Lifecycle::Stopped => EngineState::Stopped,
            Lifecycle::Running { .. } => EngineState::Running,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == EngineState::Running
    }

    /// Stopped -> Running. Fails with `AlreadyRunning` if a stream is open.
    pub fn start(&mut self) -> EngineResult<()> {
        if self.is_running() {
            return Err(EngineError::AlreadyRunning);
        }

        let equalizer = Equalizer::new(
            &self.config.eq_config()?,
            Arc::clone(&self.gains),
            Arc::clone(&self.spectrum),
        )?;
        self.spectrum.clear();
        self.stats.reset();

        let (ready_sender, ready_receiver) = bounded::<EngineResult<()>>(1);
        let (stop_sender, stop_receiver) = bounded::<()>(1);
        let backend = Arc::clone(&self.backend);
        let config = self.config.clone();
        let context = StreamContext {
            events: self.event_sender.clone(),
            stats: Arc::clone(&self.stats),
        };

        let audio_thread = thread::Builder::new()
            .name("strata-audio".into())
            .spawn(move || {
                let events = context.events.clone();
                let stream = match backend.open(&config, equalizer, context) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_sender.send(Err(e));
                        return;
                    }
                };
                let _ = ready_sender.send(Ok(()));

                // Hold the stream until stop() or the controller goes away
                let _ = stop_receiver.recv();
                if let Err(e) = stream.close() {
                    warn!("Error closing stream: {}", e);
                    let _ = events.try_send(Event::error(format!("closing stream: {}", e)));
                }
            })
            .map_err(|e| EngineError::StreamBuildError(e.to_string()))?;

        let opened = ready_receiver
            .recv()
            .unwrap_or_else(|_| Err(EngineError::StreamBuildError("audio thread exited".into())));
        if let Err(e) = opened {
            let _ = audio_thread.join();
            error!("Failed to start {} stream: {}", self.backend.name(), e);
            return Err(e);
        }

        self.lifecycle = Lifecycle::Running {
            audio_thread,
            stop_sender,
        };
        info!(
            "Equalizer running on {} ({}Hz, {} frames, {:.1}ms)",
            self.backend.name(),
            self.config.sample_rate,
            self.config.block_size,
            self.config.latency_ms()
        );
        self.emit(Event::Started {
            backend: self.backend.name().to_string(),
            sample_rate: self.config.sample_rate,
            block_size: self.config.block_size,
        });
        Ok(())
    }

    /// Running -> Stopped. Fails with `NotRunning` if nothing is open.
    ///
    /// Returns once the stream is closed and no further callback will run.
    pub fn stop(&mut self) -> EngineResult<()> {
        let Lifecycle::Running {
            audio_thread,
            stop_sender,
        } = std::mem::replace(&mut self.lifecycle, Lifecycle::Stopped)
        else {
            return Err(EngineError::NotRunning);
        };

        let _ = stop_sender.send(());
        if audio_thread.join().is_err() {
            error!("Audio thread panicked during shutdown");
            self.emit(Event::error("audio thread panicked during shutdown"));
        }

        info!(
            "Equalizer stopped ({} blocks, {} underrun frames, {} faults)",
            self.stats.blocks_rendered(),
            self.stats.underrun_frames(),
            self.stats.faults()
        );
        self.emit(Event::Stopped);
        Ok(())
    }

    /// Set one band's gain; takes effect on the next processed block.
    ///
    /// Out-of-range values are clamped; the stored value is returned.
    pub fn set_gain(&self, band: usize, gain_db: f32) -> EngineResult<f32> {
        Ok(self.gains.set_gain(band, gain_db)?)
    }

    /// Set every band at once
    pub fn set_gains(&self, gains_db: &[f32]) -> EngineResult<()> {
        Ok(self.gains.set_all(gains_db)?)
    }

    pub fn gain(&self, band: usize) -> Option<f32> {
        self.gains.get_gain(band)
    }

    pub fn gains(&self) -> Vec<f32> {
        self.gains.gains()
    }

    /// Return every band to 0dB
    pub fn reset_gains(&self) {
        self.gains.reset();
    }

    /// Oldest queued spectrum snapshot, without blocking
    pub fn try_take_spectrum(&self) -> Option<SpectrumSnapshot> {
        self.spectrum.try_take()
    }

    /// Newest queued snapshot, discarding older ones
    pub fn latest_spectrum(&self) -> Option<SpectrumSnapshot> {
        self.spectrum.take_latest()
    }

    pub fn spectrum_channel(&self) -> &Arc<SpectrumChannel> {
        &self.spectrum
    }

    /// Get next event (non-blocking)
    pub fn poll_event(&self) -> Option<Event> {
        self.event_receiver.try_recv().ok()
    }

    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }

    fn emit(&self, event: Event) {
        if self.event_sender.try_send(event).is_err() {
            warn!("Event queue full, dropping event");
        }
    }
}

impl Drop for EqualizerController {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.stop();
        }
    }
}
