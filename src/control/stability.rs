//! Convergence detection for the sensor's auto-algorithms.

use super::Setpoint;

/// Tracks whether the sensor has confirmed the setpoint it was last told
/// to use.
///
/// Issuing a command puts the sensor in flight. Every cycle stays unstable
/// until a report equals the commanded setpoint on both axes; from then on
/// the sensor is stable until the next command, however the auto-algorithm
/// moves the reported values in between.
#[derive(Debug, Clone)]
pub struct StabilityDetector {
    target: Setpoint,
    in_flight: bool,
}

impl StabilityDetector {
    /// Starts in flight toward the setpoint the sensor was configured with.
    pub fn new(commanded: Setpoint) -> Self {
        Self {
            target: commanded,
            in_flight: true,
        }
    }

    /// Exact comparison on both axes. No tolerance window.
    #[inline]
    pub fn is_stable(commanded_before_cycle: Setpoint, reported_after_cycle: Setpoint) -> bool {
        commanded_before_cycle == reported_after_cycle
    }

    /// Judges one cycle's report. Returns whether the cycle is stable.
    pub fn observe(&mut self, reported: Setpoint) -> bool {
        if self.in_flight && Self::is_stable(self.target, reported) {
            self.in_flight = false;
            tracing::debug!(setpoint = %reported, "Setpoint confirmed");
        }
        !self.in_flight
    }

    /// Records a setpoint pushed to the sensor.
    pub fn commanded(&mut self, setpoint: Setpoint) {
        self.target = setpoint;
        self.in_flight = true;
    }

    /// Whether the last command is confirmed.
    pub fn last(&self) -> bool {
        !self.in_flight
    }

    /// The setpoint most recently commanded.
    pub fn target(&self) -> Setpoint {
        self.target
    }
}
