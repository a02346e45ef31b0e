//! All-sky Capture Library
//!
//! Unattended capture for an all-sky camera. A single loop drives a sensor
//! through day and night, handing exposure authority to gain authority at
//! dusk and back at dawn, and persists what it sees.
//!
//! # Architecture
//!
//! The system follows an explicit data flow:
//!
//! ```text
//! capture → control → output
//!     ↑        │         ↓
//!     └─ command      log / archive / preview / live view
//! ```
//!
//! # Control Model
//!
//! - **Day**: auto-exposure with fixed gain, until exposure pins at its maximum
//! - **Dusk handoff**: exposure fixed at maximum, auto-gain takes over
//! - **Night**: auto-gain until gain falls back to zero
//! - **Dawn handoff**: auto-exposure resumes at zero gain
//!
//! A cycle is *stable* when the sensor reports exactly the setpoint it was
//! last seen or told to use. Only stable cycles are logged and previewed;
//! every nighttime frame is archived.
//!
//! # Example
//!
//! ```no_run
//! use allsky_capture::{
//!     capture::{CaptureConfig, SensorPort, SimulatedSensor, SimulatorConfig},
//!     control::{ControlState, ExposureGainController},
//! };
//!
//! let config = CaptureConfig::default();
//! let limits = config.limits().unwrap();
//! let controller = ExposureGainController::new(limits, ControlState::DayAuto);
//! let command = controller.initial_command(config.initial_setpoint().unwrap());
//!
//! let mut sensor = SimulatedSensor::new(SimulatorConfig::default());
//! sensor.configure(&config.sensor_settings(command).unwrap()).unwrap();
//! sensor.start_acquisition().unwrap();
//!
//! let acquisition = sensor.acquire_frame().unwrap();
//! println!("reported {}", acquisition.reported);
//! ```

#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod capture;
pub mod control;
pub mod metrics;
pub mod orchestrator;
pub mod output;

// Re-export commonly used types at crate root
pub use capture::{FileConfig, SensorPort, SimulatedSensor};
pub use control::{ControlState, ExposureGainController, Setpoint, StabilityDetector};
pub use orchestrator::{CaptureOrchestrator, CycleRecord, Shutdown};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
