//! Sensor input and frame handling.
//!
//! This module provides the [`SensorPort`] abstraction the capture loop
//! drives, the frame type it produces, the settings file format, and a
//! simulated sensor for running without hardware.

pub mod config;
mod frame;
mod sensor;
mod simulated;

pub use config::{CaptureConfig, ConfigError, FileConfig, OverlayConfig, SimulatorConfig};
pub use frame::{Frame, PixelData, PixelFormat};
pub use sensor::{Acquisition, SensorError, SensorPort, SensorSettings};
pub use simulated::SimulatedSensor;
