//! Settings file format.
//!
//! Exposure values are written in milliseconds, as allsky settings files
//! traditionally are, and converted to microseconds for the controller.
//! `autoexposure` and `autogain` are never both enabled. With both off the
//! configured exposure and gain are held until the first transition.

use super::{PixelFormat, SensorSettings};
use crate::control::{
    AutoFlags, ControlState, ExposureGainController, Setpoint, SetpointCommand, SetpointLimits,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Sensor and controller settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Initial exposure in milliseconds.
    pub exposure: u32,
    /// Maximum exposure in milliseconds; pinned during the night.
    #[serde(rename = "maxexposure")]
    pub max_exposure: u32,
    /// Initial (daytime) gain.
    pub gain: u32,
    /// Ceiling for auto-gain.
    #[serde(rename = "maxgain")]
    pub max_gain: u32,
    #[serde(rename = "autoexposure")]
    pub auto_exposure: bool,
    #[serde(rename = "autogain")]
    pub auto_gain: bool,
    /// Target cycle period in daytime, milliseconds.
    #[serde(rename = "daytimeDelay")]
    pub daytime_delay_ms: u64,
    /// USB bandwidth overload setting.
    pub usb: u32,
    /// White balance, red channel.
    pub wbr: u32,
    /// White balance, blue channel.
    pub wbb: u32,
    pub gamma: u32,
    pub brightness: u32,
    pub flip: u32,
    /// On-sensor binning factor.
    pub bin: u32,
    pub image_type: PixelFormat,
    /// File name of the live preview image.
    pub filename: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            exposure: 1,
            max_exposure: 10_000,
            gain: 0,
            max_gain: 300,
            auto_exposure: true,
            auto_gain: false,
            daytime_delay_ms: 30_000,
            usb: 40,
            wbr: 52,
            wbb: 95,
            gamma: 50,
            brightness: 50,
            flip: 0,
            bin: 1,
            image_type: PixelFormat::Raw8,
            filename: "image.jpg".to_string(),
        }
    }
}

fn ms_to_us(ms: u32) -> Result<u32, ConfigError> {
    ms.checked_mul(1000).ok_or(ConfigError::InvalidExposure)
}

impl CaptureConfig {
    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_exposure == 0 {
            return Err(ConfigError::InvalidExposure);
        }
        ms_to_us(self.max_exposure)?;
        ms_to_us(self.exposure)?;
        if self.auto_exposure && self.auto_gain {
            return Err(ConfigError::ConflictingAutoMode);
        }
        if self.bin == 0 {
            return Err(ConfigError::InvalidBinning);
        }
        if self.filename.trim().is_empty() {
            return Err(ConfigError::InvalidFilename);
        }
        let extension = Path::new(&self.filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        if !matches!(extension.as_deref(), Some("jpg" | "jpeg" | "png")) {
            return Err(ConfigError::UnsupportedImageFormat(self.filename.clone()));
        }
        Ok(())
    }

    /// Neither axis is handed to the sensor's auto-algorithm.
    pub fn is_fixed(&self) -> bool {
        !self.auto_exposure && !self.auto_gain
    }

    /// Process-lifetime setpoint bounds.
    pub fn limits(&self) -> Result<SetpointLimits, ConfigError> {
        Ok(SetpointLimits::new(ms_to_us(self.max_exposure)?, self.max_gain))
    }

    /// Setpoint to start from, in microseconds.
    pub fn initial_setpoint(&self) -> Result<Setpoint, ConfigError> {
        Ok(Setpoint::new(ms_to_us(self.exposure)?, self.gain))
    }

    /// Seed state for the controller. `night` forces `NightSteady`.
    pub fn initial_state(&self, night: bool) -> ControlState {
        if night || self.auto_gain {
            ControlState::NightSteady
        } else {
            ControlState::DayAuto
        }
    }

    /// First command pushed to the sensor. In fixed mode the configured
    /// setpoint is held with both auto-algorithms off until the controller
    /// issues its first transition command.
    pub fn initial_command(&self, controller: &ExposureGainController) -> Result<SetpointCommand, ConfigError> {
        let mut command = controller.initial_command(self.initial_setpoint()?);
        if self.is_fixed() && controller.state() == ControlState::DayAuto {
            command.auto = AutoFlags::FIXED;
        }
        Ok(command)
    }

    pub fn daytime_delay(&self) -> Duration {
        Duration::from_millis(self.daytime_delay_ms)
    }

    /// Static settings for the sensor, starting from `initial`.
    pub fn sensor_settings(&self, initial: SetpointCommand) -> Result<SensorSettings, ConfigError> {
        Ok(SensorSettings {
            initial,
            limits: self.limits()?,
            format: self.image_type,
            binning: self.bin,
            usb_bandwidth: self.usb,
            white_balance_red: self.wbr,
            white_balance_blue: self.wbb,
            gamma: self.gamma,
            brightness: self.brightness,
            flip: self.flip,
        })
    }
}

/// Controller tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Consecutive cycles a transition guard must hold.
    pub guard_dwell_cycles: u32,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            guard_dwell_cycles: 1,
        }
    }
}

/// Text drawn on preview images.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Free-form first line.
    pub text: String,
    /// Add the capture timestamp.
    pub time: bool,
    /// Add temperature, exposure and gain.
    pub show_details: bool,
    /// TrueType font; without one no text is drawn.
    pub font_path: Option<PathBuf>,
    /// Font scale at binning 1; 0.7 gives a 30 px line pitch.
    pub font_size: f64,
    pub font_color: [u8; 3],
    pub small_font_color: [u8; 3],
    pub text_x: i32,
    pub text_y: i32,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            text: String::new(),
            time: true,
            show_details: true,
            font_path: None,
            font_size: 0.7,
            font_color: [255, 255, 255],
            small_font_color: [200, 200, 200],
            text_x: 15,
            text_y: 35,
        }
    }
}

/// Sky model for the simulated sensor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Full-resolution sensor width.
    pub width: u32,
    /// Full-resolution sensor height.
    pub height: u32,
    /// Noise RNG seed.
    pub seed: u64,
    /// Frames per simulated day.
    pub day_length_cycles: u64,
    /// Sky illuminance at noon (lux).
    pub peak_illuminance: f64,
    /// Sky illuminance at midnight (lux).
    pub night_illuminance: f64,
    /// Digital numbers per lux·µs at unity gain.
    pub response: f64,
    /// 8-bit level the auto-algorithms aim for.
    pub target_level: f64,
    /// Peak noise amplitude in 8-bit digital numbers.
    pub noise: f64,
    pub base_temperature_c: f64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            seed: 7,
            day_length_cycles: 2880,
            peak_illuminance: 1.0e4,
            night_illuminance: 1.0e-2,
            response: 1.0e-4,
            target_level: 110.0,
            noise: 4.0,
            base_temperature_c: 15.0,
        }
    }
}

impl SimulatorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width < 2 || self.height < 2 {
            return Err(ConfigError::InvalidDimensions);
        }
        if self.day_length_cycles == 0
            || self.night_illuminance <= 0.0
            || self.peak_illuminance < self.night_illuminance
            || self.response <= 0.0
            || self.target_level <= 0.0
        {
            return Err(ConfigError::InvalidSkyModel);
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid frame dimensions")]
    InvalidDimensions,
    #[error("invalid exposure time")]
    InvalidExposure,
    #[error("autoexposure and autogain cannot both be enabled")]
    ConflictingAutoMode,
    #[error("binning factor must be at least 1")]
    InvalidBinning,
    #[error("live image file name is empty")]
    InvalidFilename,
    #[error("live image must be .jpg, .jpeg or .png: {0}")]
    UnsupportedImageFormat(String),
    #[error("invalid simulator sky model")]
    InvalidSkyModel,
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}

/// Metrics/export settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct OutputConfig {
    /// Metrics server port (0 to disable).
    pub metrics_port: u16,
}

/// Full configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub overlay: OverlayConfig,
    #[serde(default)]
    pub simulator: SimulatorConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl FileConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: FileConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.capture.validate()?;
        config.simulator.validate()?;
        Ok(config)
    }
}
