//! Lamp states and display patterns

use std::fmt;
use std::time::Duration;

/// Blink period of the validating pattern
pub const FAST_BLINK: Duration = Duration::from_millis(200);
/// Blink period of the updating pattern
pub const SLOW_BLINK: Duration = Duration::from_millis(500);

/// What the station wants the operator to see
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LampState {
    /// Ready
    Idle,
    /// Checking a volume or device
    Validating,
    /// Flashing
    Updating,
    /// Last operation succeeded
    Success,
    /// Last operation failed
    Error,
    /// All lamps dark
    #[default]
    Off,
}

/// One of the three lamps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LampColor {
    /// Green lamp
    Green,
    /// Yellow lamp
    Yellow,
    /// Red lamp
    Red,
}

/// How the lamps are driven
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LampPattern {
    /// All dark
    Dark,
    /// One color steadily on
    Solid(LampColor),
    /// One color toggling every `period`
    Blink {
        /// Blinking color
        color: LampColor,
        /// Time spent in each of the on and off phases
        period: Duration,
    },
}

impl LampState {
    /// Pattern shown for this state
    pub fn pattern(self) -> LampPattern {
        match self {
            LampState::Idle | LampState::Success => LampPattern::Solid(LampColor::Green),
            LampState::Validating => LampPattern::Blink {
                color: LampColor::Yellow,
                period: FAST_BLINK,
            },
            LampState::Updating => LampPattern::Blink {
                color: LampColor::Yellow,
                period: SLOW_BLINK,
            },
            LampState::Error => LampPattern::Solid(LampColor::Red),
            LampState::Off => LampPattern::Dark,
        }
    }
}

impl fmt::Display for LampState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LampState::Idle => "idle",
            LampState::Validating => "validating",
            LampState::Updating => "updating",
            LampState::Success => "success",
            LampState::Error => "error",
            LampState::Off => "off",
        };
        f.write_str(name)
    }
}
