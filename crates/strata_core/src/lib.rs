//! Strata Core - Audio Engine
//!
//! This crate runs the equalizer against live audio:
//! - Engine configuration (JSON, validated up front)
//! - Audio device enumeration and selection (via CPAL)
//! - Duplex capture/playback bridge over a lock-free ring buffer
//! - A `{Stopped, Running}` lifecycle owned by one controller
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Control Thread                         │
//! │  EqualizerController ── set_gain ──▶ GainTable (atomics)    │
//! │          ▲  try_take_spectrum ◀── SpectrumChannel           │
//! │          └── poll_event ◀── Event (crossbeam-channel)       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ start / stop
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Audio Callbacks                        │
//! │   Capture ──rtrb──▶ Equalizer::process ──▶ Stereo output    │
//! │              (Zero allocation in this path)                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod backend;
mod config;
mod controller;
mod device;
mod error;
mod message;
mod stream;

pub use backend::{ActiveStream, AudioBackend, CpalBackend, StreamContext, ToneBackend};
pub use config::EngineConfig;
pub use controller::{EngineState, EqualizerController};
pub use device::{AudioDevice, DeviceDirection};
pub use error::{EngineError, EngineResult};
pub use message::Event;
pub use stream::{duplex_bridge, CaptureFeed, RenderBridge, StreamStats};

// Re-export DSP types for convenience
pub use strata_dsp::{EqConfig, Equalizer, GainBounds, SpectrumSnapshot};
