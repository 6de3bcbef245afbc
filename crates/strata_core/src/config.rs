//! Engine Configuration
//!
//! Fixed at controller construction; nothing here changes while a stream is
//! running. Stored as JSON.
//!
//! # Storage Location
//! - Linux: `~/.config/strata/engine.json`
//! - Windows: `%APPDATA%\strata\engine.json`
//! - macOS: `~/Library/Application Support/strata/engine.json`

use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use strata_dsp::{
    EqConfig, FilterSpec, GainBounds, REFERENCE_BLOCK_SIZE, REFERENCE_CENTERS_HZ, REFERENCE_Q,
    REFERENCE_SPECTRUM_CAPACITY,
};

use crate::error::{EngineError, EngineResult};

/// Overall engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Sample rate in Hz (e.g., 44100, 48000)
    pub sample_rate: u32,

    /// Frames per block (device buffer size and FFT size)
    pub block_size: u32,

    /// Channels captured from the input device (downmixed to mono)
    pub input_channels: u16,

    /// One band per entry, in index order (Hz)
    pub center_frequencies: Vec<f64>,

    /// Quality factor shared by every band
    pub quality_factor: f64,

    /// `(min, max)` gain range in dB
    pub gain_bounds_db: (f32, f32),

    /// Spectrum snapshots held before new ones are dropped
    pub spectrum_capacity: usize,

    /// How often a consumer should poll the spectrum channel
    pub spectrum_poll_ms: u64,

    /// Input device name, or the system default
    #[serde(default)]
    pub input_device: Option<String>,

    /// Output device name, or the system default
    #[serde(default)]
    pub output_device: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::reference()
    }
}

impl EngineConfig {
    /// The reference layout: 5 bands at Q 2, 44.1kHz, 1024-frame blocks
    pub fn reference() -> Self {
        Self {
            sample_rate: 44100,
            block_size: REFERENCE_BLOCK_SIZE as u32,
            input_channels: 1,
            center_frequencies: REFERENCE_CENTERS_HZ.to_vec(),
            quality_factor: REFERENCE_Q,
            gain_bounds_db: (-24.0, 24.0),
            spectrum_capacity: REFERENCE_SPECTRUM_CAPACITY,
            spectrum_poll_ms: 50,
            input_device: None,
            output_device: None,
        }
    }

    /// Same bands with a 256-frame block at 48kHz (~5.3ms)
    pub fn low_latency() -> Self {
        Self {
            sample_rate: 48000,
            block_size: 256,
            spectrum_poll_ms: 20,
            ..Self::reference()
        }
    }

    /// Calculate latency in milliseconds for one block
    pub fn latency_ms(&self) -> f32 {
        (self.block_size as f32 / self.sample_rate as f32) * 1000.0
    }

    pub fn band_count(&self) -> usize {
        self.center_frequencies.len()
    }

    /// Validate configuration, including every band's filter spec
    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate < 8000 || self.sample_rate > 192000 {
            return Err(format!("Invalid sample rate: {}", self.sample_rate));
        }
        if self.block_size < 32 || self.block_size > 8192 {
            return Err(format!("Invalid block size: {}", self.block_size));
        }
        if self.input_channels == 0 || self.input_channels > 8 {
            return Err(format!("Invalid input channel count: {}", self.input_channels));
        }
        if self.center_frequencies.is_empty() {
            return Err("At least one band is required".to_string());
        }
        let (min_db, max_db) = self.gain_bounds_db;
        GainBounds::new(min_db, max_db).map_err(|e| e.to_string())?;
        if self.spectrum_capacity == 0 {
            return Err("Spectrum capacity must be at least 1".to_string());
        }
        if self.spectrum_poll_ms == 0 {
            return Err("Spectrum poll interval must be at least 1ms".to_string());
        }
        for &center in &self.center_frequencies {
            FilterSpec::new(center, self.quality_factor, f64::from(self.sample_rate))
                .map_err(|e| e.to_string())?;
        }
        Ok(())
    }

    /// DSP-side configuration for building an `Equalizer`
    pub fn eq_config(&self) -> EngineResult<EqConfig> {
        let (min_db, max_db) = self.gain_bounds_db;
        Ok(EqConfig {
            sample_rate: f64::from(self.sample_rate),
            block_size: self.block_size as usize,
            center_frequencies: self.center_frequencies.clone(),
            quality_factor: self.quality_factor,
            gain_bounds: GainBounds::new(min_db, max_db)?,
            spectrum_capacity: self.spectrum_capacity,
        })
    }

    /// Load and validate a configuration file
    pub fn load(path: &Path) -> EngineResult<Self> {
        let file = fs::File::open(path)?;
        let config: Self = serde_json::from_reader(file)?;
        config.validate().map_err(EngineError::ConfigError)?;
        info!("Config loaded from {:?}", path);
        Ok(config)
    }

    /// Load from the platform config path, or fall back to the reference
    /// layout if the file is missing or invalid
    pub fn load_or_default() -> Self {
        if let Some(path) = Self::default_path() {
            if path.exists() {
                match Self::load(&path) {
                    Ok(config) => return config,
                    Err(e) => warn!("Ignoring config at {:?}: {}", path, e),
                }
            }
        }

        info!("Using reference config");
        Self::reference()
    }

    /// Save to `path`, creating parent directories as needed
    pub fn save(&self, path: &Path) -> EngineResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = fs::File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        info!("Config saved to {:?}", path);
        Ok(())
    }

    /// Platform-specific configuration file path
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "strata", "strata")
            .map(|proj| proj.config_dir().join("engine.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_config() {
        let config = EngineConfig::default();
        assert_eq!(config.sample_rate, 44100);
        assert_eq!(config.block_size, 1024);
        assert_eq!(config.band_count(), 5);
        assert_eq!(config.gain_bounds_db, (-24.0, 24.0));
        assert_eq!(config.spectrum_capacity, 5);
        assert_eq!(config.spectrum_poll_ms, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_latency_calculation() {
        let config = EngineConfig {
            sample_rate: 48000,
            block_size: 480, // Exactly 10ms at 48kHz
            ..EngineConfig::reference()
        };
        assert!((config.latency_ms() - 10.0).abs() < 0.01);
    }

    #[test]
    fn test_preset_configs() {
        let reference = EngineConfig::reference();
        let low_latency = EngineConfig::low_latency();

        assert!(low_latency.validate().is_ok());
        assert!(low_latency.block_size < reference.block_size);
        assert!(low_latency.latency_ms() < reference.latency_ms());
    }

    #[test]
    fn test_validation() {
        let invalid_rate = EngineConfig {
            sample_rate: 100,
            ..Default::default()
        };
        assert!(invalid_rate.validate().is_err());

        let invalid_block = EngineConfig {
            block_size: 10,
            ..Default::default()
        };
        assert!(invalid_block.validate().is_err());

        let invalid_channels = EngineConfig {
            input_channels: 0,
            ..Default::default()
        };
        assert!(invalid_channels.validate().is_err());

        let no_bands = EngineConfig {
            center_frequencies: vec![],
            ..Default::default()
        };
        assert!(no_bands.validate().is_err());

        let inverted_bounds = EngineConfig {
            gain_bounds_db: (12.0, -12.0),
            ..Default::default()
        };
        assert!(inverted_bounds.validate().is_err());

        let zero_capacity = EngineConfig {
            spectrum_capacity: 0,
            ..Default::default()
        };
        assert!(zero_capacity.validate().is_err());
    }

    #[test]
    fn test_band_above_nyquist_rejected() {
        let config = EngineConfig {
            sample_rate: 16000,
            ..Default::default()
        };
        // 14kHz band is above the 8kHz nyquist
        let err = config.validate().unwrap_err();
        assert!(err.contains("14000"));
    }

    #[test]
    fn test_eq_config_conversion() {
        let config = EngineConfig {
            gain_bounds_db: (-12.0, 6.0),
            ..EngineConfig::low_latency()
        };
        let eq = config.eq_config().unwrap();
        assert_eq!(eq.sample_rate, 48000.0);
        assert_eq!(eq.block_size, 256);
        assert_eq!(eq.center_frequencies, config.center_frequencies);
        assert_eq!(eq.gain_bounds, GainBounds::new(-12.0, 6.0).unwrap());
    }

    #[test]
    fn test_config_serialization() {
        let config = EngineConfig {
            output_device: Some("Speakers".to_string()),
            ..EngineConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_missing_device_fields_default_to_none() {
        let json = r#"{
            "sample_rate": 48000,
            "block_size": 512,
            "input_channels": 2,
            "center_frequencies": [100.0, 1000.0],
            "quality_factor": 1.0,
            "gain_bounds_db": [-24.0, 24.0],
            "spectrum_capacity": 3,
            "spectrum_poll_ms": 50
        }"#;
        let config: EngineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.input_device, None);
        assert_eq!(config.output_device, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = std::env::temp_dir().join(format!("strata-config-{}", std::process::id()));
        let path = dir.join("nested").join("engine.json");

        let config = EngineConfig::low_latency();
        config.save(&path).unwrap();
        let loaded = EngineConfig::load(&path).unwrap();
        assert_eq!(loaded, config);

        // Invalid content is rejected on load
        let bad = EngineConfig {
            block_size: 1,
            ..EngineConfig::reference()
        };
        bad.save(&path).unwrap();
        assert!(matches!(
            EngineConfig::load(&path),
            Err(EngineError::ConfigError(_))
        ));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_load_missing_file() {
        let path = std::env::temp_dir().join("strata-does-not-exist").join("engine.json");
        assert!(matches!(EngineConfig::load(&path), Err(EngineError::Io(_))));
    }
}
