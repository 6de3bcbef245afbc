//! Audio Device Enumeration and Selection

use cpal::traits::{DeviceTrait, HostTrait};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Sample rates probed against each device's supported ranges
const PROBE_RATES: [u32; 6] = [44100, 48000, 88200, 96000, 176400, 192000];

/// Direction audio flows through a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceDirection {
    Input,
    Output,
}

/// Summary of a device, for listing and selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioDevice {
    /// Device name as reported by the host (also used to select it)
    pub name: String,

    pub direction: DeviceDirection,

    /// Whether this is the system default for its direction
    pub is_default: bool,

    /// Probed sample rates (may be empty if querying failed)
    pub sample_rates: Vec<u32>,

    /// Maximum supported channels
    pub max_channels: u16,
}

impl AudioDevice {
    /// Enumerate every input and output device on the default host
    pub fn enumerate_all() -> EngineResult<Vec<AudioDevice>> {
        let host = cpal::default_host();

        let default_input = host.default_input_device().and_then(|d| d.name().ok());
        let default_output = host.default_output_device().and_then(|d| d.name().ok());

        let mut devices = Vec::new();
        if let Ok(inputs) = host.input_devices() {
            devices.extend(inputs.filter_map(|device| {
                Self::describe(&device, DeviceDirection::Input, default_input.as_deref()).ok()
            }));
        }
        if let Ok(outputs) = host.output_devices() {
            devices.extend(outputs.filter_map(|device| {
                Self::describe(&device, DeviceDirection::Output, default_output.as_deref()).ok()
            }));
        }

        if devices.is_empty() {
            return Err(EngineError::NoDevicesFound);
        }
        Ok(devices)
    }

    /// Devices of one direction
    pub fn enumerate(direction: DeviceDirection) -> EngineResult<Vec<AudioDevice>> {
        Ok(Self::enumerate_all()?
            .into_iter()
            .filter(|d| d.direction == direction)
            .collect())
    }

    /// The system default device for `direction`
    pub fn default_for(direction: DeviceDirection) -> EngineResult<AudioDevice> {
        let device = open_device(direction, None)?;
        let mut described = Self::describe(&device, direction, None)?;
        described.is_default = true;
        Ok(described)
    }

    /// Whether `sample_rate` was among the probed rates
    pub fn supports_rate(&self, sample_rate: u32) -> bool {
        self.sample_rates.contains(&sample_rate)
    }

    fn describe(
        device: &cpal::Device,
        direction: DeviceDirection,
        default_name: Option<&str>,
    ) -> EngineResult<Self> {
        let name = device
            .name()
            .map_err(|e| EngineError::DeviceNotFound(e.to_string()))?;
        let is_default = default_name == Some(name.as_str());

        let (sample_rates, max_channels) = match direction {
            DeviceDirection::Input => device
                .supported_input_configs()
                .map(probe_ranges)
                .unwrap_or((vec![], 2)),
            DeviceDirection::Output => device
                .supported_output_configs()
                .map(probe_ranges)
                .unwrap_or((vec![], 2)),
        };

        Ok(Self {
            name,
            direction,
            is_default,
            sample_rates,
            max_channels,
        })
    }
}

/// Open a device by name on the default host, or the default device when
/// `name` is `None`
pub(crate) fn open_device(direction: DeviceDirection, name: Option<&str>) -> EngineResult<cpal::Device> {
    let host = cpal::default_host();

    let Some(wanted) = name else {
        return match direction {
            DeviceDirection::Input => host.default_input_device(),
            DeviceDirection::Output => host.default_output_device(),
        }
        .ok_or(EngineError::NoDevicesFound);
    };

    let devices = match direction {
        DeviceDirection::Input => host.input_devices(),
        DeviceDirection::Output => host.output_devices(),
    }
    .map_err(|e| EngineError::DeviceNotFound(e.to_string()))?;

    devices
        .into_iter()
        .find(|d| d.name().map(|n| n == wanted).unwrap_or(false))
        .ok_or_else(|| EngineError::DeviceNotFound(wanted.to_string()))
}

fn probe_ranges(ranges: impl Iterator<Item = cpal::SupportedStreamConfigRange>) -> (Vec<u32>, u16) {
    let mut sample_rates = Vec::new();
    let mut max_channels = 0u16;

    for range in ranges {
        max_channels = max_channels.max(range.channels());
        let (min, max) = (range.min_sample_rate().0, range.max_sample_rate().0);
        for rate in PROBE_RATES {
            if (min..=max).contains(&rate) && !sample_rates.contains(&rate) {
                sample_rates.push(rate);
            }
        }
    }

    sample_rates.sort_unstable();
    (sample_rates, max_channels)
}
