//! The four-state day/night control cycle.

use super::AutoFlags;
use std::fmt;

/// Which regime the controller is in, and which axis the sensor auto-adjusts.
///
/// The states form a closed cycle:
///
/// ```text
/// DayAuto → HandoffToNight → NightSteady → HandoffToDay → DayAuto
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlState {
    /// Auto-exposure active, gain fixed.
    DayAuto,
    /// Exposure pinned at its maximum, auto-gain just enabled.
    HandoffToNight,
    /// Auto-gain has moved gain off its minimum; exposure still pinned.
    NightSteady,
    /// Gain back at its minimum and pinned; auto-exposure re-enabled.
    HandoffToDay,
}

impl ControlState {
    /// All states in cycle order.
    pub const ALL: [ControlState; 4] = [
        ControlState::DayAuto,
        ControlState::HandoffToNight,
        ControlState::NightSteady,
        ControlState::HandoffToDay,
    ];

    /// The state that follows this one in the cycle.
    pub fn next(self) -> Self {
        match self {
            ControlState::DayAuto => ControlState::HandoffToNight,
            ControlState::HandoffToNight => ControlState::NightSteady,
            ControlState::NightSteady => ControlState::HandoffToDay,
            ControlState::HandoffToDay => ControlState::DayAuto,
        }
    }

    /// True while frames are eligible for archival.
    #[inline]
    pub fn is_night(self) -> bool {
        matches!(self, ControlState::HandoffToNight | ControlState::NightSteady)
    }

    /// The axis under sensor auto-control in this state.
    pub fn auto_flags(self) -> AutoFlags {
        if self.is_night() {
            AutoFlags::AUTO_GAIN
        } else {
            AutoFlags::AUTO_EXPOSURE
        }
    }

    /// Numeric index in cycle order, used for the metrics gauge.
    pub fn index(self) -> u8 {
        match self {
            ControlState::DayAuto => 0,
            ControlState::HandoffToNight => 1,
            ControlState::NightSteady => 2,
            ControlState::HandoffToDay => 3,
        }
    }
}

impl fmt::Display for ControlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControlState::DayAuto => "day-auto",
            ControlState::HandoffToNight => "handoff-to-night",
            ControlState::NightSteady => "night-steady",
            ControlState::HandoffToDay => "handoff-to-day",
        };
        f.write_str(name)
    }
}
