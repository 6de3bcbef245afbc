//! Engine Events
//!
//! Events flow from the audio side (stream callbacks, lifecycle) to whoever
//! drives the controller. Stream callbacks only ever `try_send`, so a slow
//! consumer loses events instead of stalling audio.

use serde::{Deserialize, Serialize};

/// Events reported by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Event {
    /// Stream opened and playing
    Started {
        backend: String,
        sample_rate: u32,
        block_size: u32,
    },

    /// Stream closed
    Stopped,

    /// The device reported an error during a callback; processing continues
    StreamFault { message: String },

    /// Error outside the audio path
    Error { message: String },
}

impl Event {
    /// Create an error event from any error type
    pub fn error<E: std::fmt::Display>(err: E) -> Self {
        Event::Error {
            message: err.to_string(),
        }
    }

    /// Create a stream fault event from a device error
    pub fn fault<E: std::fmt::Display>(err: E) -> Self {
        Event::StreamFault {
            message: err.to_string(),
        }
    }
}
