//! Exposure/gain setpoints and the commands that carry them to the sensor.

use std::fmt;

/// An (exposure, gain) pair, either commanded to or reported by the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Setpoint {
    /// Exposure time in microseconds.
    pub exposure_us: u32,
    /// Gain in sensor units.
    pub gain: u32,
}

impl Setpoint {
    /// Creates a setpoint from exposure (µs) and gain.
    pub const fn new(exposure_us: u32, gain: u32) -> Self {
        Self { exposure_us, gain }
    }

    /// Exposure time in seconds.
    #[inline]
    pub fn exposure_seconds(&self) -> f64 {
        f64::from(self.exposure_us) / 1_000_000.0
    }
}

impl fmt::Display for Setpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}us/gain {}", self.exposure_us, self.gain)
    }
}

/// Bounds fixed at startup for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetpointLimits {
    /// Longest exposure the controller will pin, in microseconds.
    pub exposure_max_us: u32,
    /// Highest gain the auto-gain algorithm may reach.
    pub gain_max: u32,
}

impl SetpointLimits {
    /// Lower gain bound. Not configurable.
    pub const GAIN_MIN: u32 = 0;

    pub const fn new(exposure_max_us: u32, gain_max: u32) -> Self {
        Self {
            exposure_max_us,
            gain_max,
        }
    }

    /// Returns true if `setpoint` lies inside the configured bounds.
    pub fn contains(&self, setpoint: Setpoint) -> bool {
        setpoint.exposure_us <= self.exposure_max_us && setpoint.gain <= self.gain_max
    }
}

/// Which axes are handed to the sensor's internal auto-algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AutoFlags {
    pub exposure: bool,
    pub gain: bool,
}

impl AutoFlags {
    /// Auto-exposure on, gain fixed.
    pub const AUTO_EXPOSURE: Self = Self {
        exposure: true,
        gain: false,
    };

    /// Auto-gain on, exposure fixed.
    pub const AUTO_GAIN: Self = Self {
        exposure: false,
        gain: true,
    };

    /// Both axes fixed at the commanded values.
    pub const FIXED: Self = Self {
        exposure: false,
        gain: false,
    };
}

/// A setpoint together with the auto-algorithm selection to apply with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetpointCommand {
    pub setpoint: Setpoint,
    pub auto: AutoFlags,
}

impl SetpointCommand {
    pub const fn new(setpoint: Setpoint, auto: AutoFlags) -> Self {
        Self { setpoint, auto }
    }
}
