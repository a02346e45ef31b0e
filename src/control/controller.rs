//! Exposure/gain handoff controller.
//!
//! Decides, once per cycle, which of the sensor's two auto-algorithms is in
//! charge. Exposure is pinned at its maximum through both handoffs and the
//! whole night, so only one axis is ever auto-adjusted at a time.
//!
//! Guards are evaluated against the setpoint the sensor *reported* for the
//! cycle just completed, never against the last command. A transition
//! therefore only fires once the driver confirms the value is in effect.

use super::{AutoFlags, ControlState, Setpoint, SetpointCommand, SetpointLimits};

/// Result of one controller step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Advance {
    /// Command to push to the sensor. Only present on a transition that
    /// changes which axis is automatic.
    pub command: Option<SetpointCommand>,
    /// State after this step.
    pub state: ControlState,
}

/// Four-state day/night handoff machine.
#[derive(Debug, Clone)]
pub struct ExposureGainController {
    limits: SetpointLimits,
    state: ControlState,
    /// Consecutive cycles a guard must hold before its transition fires.
    dwell_cycles: u32,
    /// Consecutive cycles the current state's guard has held.
    guard_streak: u32,
    transitions: u64,
}

impl ExposureGainController {
    /// Creates a controller that transitions on the first cycle a guard holds.
    pub fn new(limits: SetpointLimits, initial: ControlState) -> Self {
        Self::with_dwell(limits, initial, 1)
    }

    /// Creates a controller requiring `dwell_cycles` consecutive qualifying
    /// reports before any transition. Values below 1 are treated as 1.
    pub fn with_dwell(limits: SetpointLimits, initial: ControlState, dwell_cycles: u32) -> Self {
        Self {
            limits,
            state: initial,
            dwell_cycles: dwell_cycles.max(1),
            guard_streak: 0,
            transitions: 0,
        }
    }

    /// Current state.
    #[inline]
    pub fn state(&self) -> ControlState {
        self.state
    }

    #[inline]
    pub fn limits(&self) -> SetpointLimits {
        self.limits
    }

    /// True in `HandoffToNight` and `NightSteady`.
    #[inline]
    pub fn is_night(&self) -> bool {
        self.state.is_night()
    }

    /// Number of transitions taken since construction.
    pub fn transitions(&self) -> u64 {
        self.transitions
    }

    /// The command that puts the sensor into the current state at startup.
    ///
    /// `configured` is the initial setpoint from the settings file; it is
    /// only used where the state leaves that axis free.
    pub fn initial_command(&self, configured: Setpoint) -> SetpointCommand {
        let max = self.limits.exposure_max_us;
        match self.state {
            ControlState::DayAuto => SetpointCommand::new(
                Setpoint::new(configured.exposure_us.min(max), configured.gain),
                AutoFlags::AUTO_EXPOSURE,
            ),
            ControlState::HandoffToNight => SetpointCommand::new(
                Setpoint::new(max, configured.gain.min(self.limits.gain_max)),
                AutoFlags::AUTO_GAIN,
            ),
            ControlState::NightSteady => SetpointCommand::new(
                Setpoint::new(max, self.limits.gain_max),
                AutoFlags::AUTO_GAIN,
            ),
            ControlState::HandoffToDay => SetpointCommand::new(
                Setpoint::new(max, SetpointLimits::GAIN_MIN),
                AutoFlags::AUTO_EXPOSURE,
            ),
        }
    }

    fn guard_holds(&self, reported: Setpoint) -> bool {
        let max = self.limits.exposure_max_us;
        match self.state {
            ControlState::DayAuto => {
                reported.exposure_us == max && reported.gain < self.limits.gain_max
            }
            ControlState::HandoffToNight => reported.gain > SetpointLimits::GAIN_MIN,
            ControlState::NightSteady => reported.gain == SetpointLimits::GAIN_MIN,
            ControlState::HandoffToDay => reported.exposure_us < max,
        }
    }

    /// Feeds the setpoint reported for the cycle just completed.
    pub fn advance(&mut self, reported: Setpoint) -> Advance {
        if !self.limits.contains(reported) {
            tracing::warn!(
                exposure_us = reported.exposure_us,
                gain = reported.gain,
                exposure_max_us = self.limits.exposure_max_us,
                gain_max = self.limits.gain_max,
                "Sensor reported setpoint outside configured limits"
            );
        }

        if !self.guard_holds(reported) {
            self.guard_streak = 0;
            return Advance {
                command: None,
                state: self.state,
            };
        }

        self.guard_streak += 1;
        if self.guard_streak < self.dwell_cycles {
            tracing::trace!(
                state = %self.state,
                streak = self.guard_streak,
                required = self.dwell_cycles,
                "Transition guard holding"
            );
            return Advance {
                command: None,
                state: self.state,
            };
        }

        let command = match self.state {
            ControlState::DayAuto => Some(SetpointCommand::new(
                Setpoint::new(self.limits.exposure_max_us, reported.gain),
                AutoFlags::AUTO_GAIN,
            )),
            ControlState::NightSteady => Some(SetpointCommand::new(
                Setpoint::new(self.limits.exposure_max_us, SetpointLimits::GAIN_MIN),
                AutoFlags::AUTO_EXPOSURE,
            )),
            ControlState::HandoffToNight | ControlState::HandoffToDay => None,
        };

        let from = self.state;
        self.state = from.next();
        self.guard_streak = 0;
        self.transitions += 1;

        match command {
            Some(cmd) if cmd.auto.gain => {
                tracing::info!(from = %from, to = %self.state, command = %cmd.setpoint, "Switching to auto gain")
            }
            Some(cmd) => {
                tracing::info!(from = %from, to = %self.state, command = %cmd.setpoint, "Switching to auto exposure")
            }
            None => tracing::info!(from = %from, to = %self.state, "Handoff settled"),
        }

        Advance {
            command,
            state: self.state,
        }
    }
}
