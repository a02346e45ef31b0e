//! Per-cycle record handed to logging and archival.

use crate::control::{ControlState, Setpoint, SetpointCommand};
use chrono::{DateTime, Utc};

/// Format of cycle timestamps in logs, file names and headers.
pub const STAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

/// Days between the Modified Julian Date epoch and the Unix epoch.
const MJD_UNIX_EPOCH: f64 = 40_587.0;

/// What happened in one iteration of the capture loop.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleRecord {
    /// Cycle start (UTC).
    pub timestamp: DateTime<Utc>,
    /// Setpoint the sensor reported for this frame.
    pub reported: Setpoint,
    pub temperature_c: f64,
    /// Controller state after this cycle's update.
    pub state: ControlState,
    pub night: bool,
    pub stable: bool,
    /// Command pushed to the sensor this cycle, if any.
    pub command: Option<SetpointCommand>,
}

impl CycleRecord {
    /// Millisecond ISO-8601 timestamp, e.g. `2024-03-01T22:15:04.250`.
    pub fn stamp(&self) -> String {
        self.timestamp.format(STAMP_FORMAT).to_string()
    }

    /// Modified Julian Date of the timestamp.
    pub fn mjd(&self) -> f64 {
        self.timestamp.timestamp_millis() as f64 / 86_400_000.0 + MJD_UNIX_EPOCH
    }
}
