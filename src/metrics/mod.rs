//! Prometheus metrics exporter for the capture loop.
//!
//! # Metrics Exposed
//!
//! ## Controller
//! - `allsky_control_state` - Controller state index (0..=3, cycle order)
//! - `allsky_night` - Nighttime regime (1=night, 0=day)
//! - `allsky_stable` - Last cycle stable (1) or in flight (0)
//!
//! ## Sensor
//! - `allsky_exposure_microseconds` - Reported exposure
//! - `allsky_gain` - Reported gain
//! - `allsky_temperature_celsius` - Sensor temperature
//!
//! ## Counters
//! - `allsky_cycles_total` - Capture cycles completed
//! - `allsky_stable_cycles_total` - Stable cycles
//! - `allsky_archived_frames_total` - Frames archived
//! - `allsky_setpoint_commands_total` - Setpoint commands issued
//!
//! # Example
//!
//! ```no_run
//! use allsky_capture::metrics::MetricsRegistry;
//!
//! let registry = MetricsRegistry::new().expect("Failed to create registry");
//! println!("{}", registry.encode().expect("Failed to encode"));
//! ```

mod collector;
#[cfg(feature = "metrics")]
mod server;

pub use collector::{MetricsError, MetricsRegistry};
#[cfg(feature = "metrics")]
pub use server::{MetricsServer, ServerError};
