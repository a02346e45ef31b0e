//! Sensor abstraction.
//!
//! The controller and orchestrator only talk to hardware through
//! [`SensorPort`], so a vendor driver and the bundled simulator are
//! interchangeable.

use super::{Frame, PixelFormat};
use crate::control::{SetpointCommand, SetpointLimits};
use thiserror::Error;

/// Errors that can occur during sensor operations.
#[derive(Debug, Error)]
pub enum SensorError {
    #[error("no sensor found")]
    NoDevice,
    #[error("failed to configure sensor: {0}")]
    ConfigFailed(String),
    #[error("failed to acquire frame: {0}")]
    AcquisitionFailed(String),
    #[error("setpoint rejected: {0}")]
    CommandRejected(String),
    #[error("sensor not configured")]
    NotConfigured,
    #[error("acquisition not started")]
    NotStarted,
}

/// Static sensor settings applied once before acquisition starts.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorSettings {
    /// Setpoint and auto selection to start from.
    pub initial: SetpointCommand,
    /// Ceilings handed to the driver's auto-algorithms.
    pub limits: SetpointLimits,
    pub format: PixelFormat,
    pub binning: u32,
    pub usb_bandwidth: u32,
    pub white_balance_red: u32,
    pub white_balance_blue: u32,
    pub gamma: u32,
    pub brightness: u32,
    pub flip: u32,
}

/// Everything one cycle's readout produces.
#[derive(Debug, Clone)]
pub struct Acquisition {
    pub frame: Frame,
    /// Setpoint actually in effect for this frame.
    pub reported: crate::control::Setpoint,
    /// Sensor temperature in degrees Celsius.
    pub temperature_c: f64,
}

/// Trait for sensor drivers.
pub trait SensorPort {
    /// Applies static settings and the initial setpoint.
    fn configure(&mut self, settings: &SensorSettings) -> Result<(), SensorError>;

    /// Starts continuous acquisition.
    fn start_acquisition(&mut self) -> Result<(), SensorError>;

    /// Stops acquisition. Safe to call more than once.
    fn stop_acquisition(&mut self) -> Result<(), SensorError>;

    /// Blocks until the next frame is read out.
    fn acquire_frame(&mut self) -> Result<Acquisition, SensorError>;

    /// Requests a new setpoint. Takes effect on a later frame.
    fn command_setpoint(&mut self, command: &SetpointCommand) -> Result<(), SensorError>;
}
