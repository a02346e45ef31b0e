//! Day/night exposure and gain control.
//!
//! The controller owns the current [`ControlState`] and decides when the
//! sensor hands authority from auto-exposure to auto-gain and back. The
//! stability detector tells the rest of the pipeline whether the sensor has
//! settled on its setpoint.

mod controller;
mod setpoint;
mod stability;
mod state;

pub use controller::{Advance, ExposureGainController};
pub use setpoint::{AutoFlags, Setpoint, SetpointCommand, SetpointLimits};
pub use stability::StabilityDetector;
pub use state::ControlState;
