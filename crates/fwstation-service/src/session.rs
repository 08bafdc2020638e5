//! Session model

use fwstation_hotplug::StorageVolume;
use fwstation_lamp::LampState;
use std::fmt;
use std::path::PathBuf;

/// Where the station is in its provisioning cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    /// No trusted firmware
    #[default]
    Idle,
    /// Verifying a freshly mounted volume
    ValidatingStorage,
    /// Firmware trusted, waiting for a target device
    AwaitingDevice,
    /// Volume rejected
    ErrorStorage,
    /// Checking a connected device
    ValidatingDevice,
    /// Flash in progress
    Flashing,
    /// Flash succeeded
    Success,
    /// Flash refused or failed
    Error,
}

/// Lamp shown in each session state
pub fn lamp_for(state: SessionState) -> LampState {
    match state {
        SessionState::Idle | SessionState::AwaitingDevice => LampState::Idle,
        SessionState::ValidatingStorage | SessionState::ValidatingDevice => LampState::Validating,
        SessionState::Flashing => LampState::Updating,
        SessionState::Success => LampState::Success,
        SessionState::ErrorStorage | SessionState::Error => LampState::Error,
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::ValidatingStorage => "validating-storage",
            SessionState::AwaitingDevice => "awaiting-device",
            SessionState::ErrorStorage => "error-storage",
            SessionState::ValidatingDevice => "validating-device",
            SessionState::Flashing => "flashing",
            SessionState::Success => "success",
            SessionState::Error => "error",
        };
        f.write_str(name)
    }
}

/// State owned by the orchestrator.
///
/// `trusted_firmware_path` is set only while the latest verification of
/// `active_volume` passed and nothing has invalidated it since.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    /// Firmware image accepted by the last verification
    pub trusted_firmware_path: Option<PathBuf>,
    /// Volume the trusted firmware lives on
    pub active_volume: Option<StorageVolume>,
    /// Current state
    pub state: SessionState,
}

impl Session {
    /// Forget the volume and its firmware
    pub fn clear(&mut self) {
        self.trusted_firmware_path = None;
        self.active_volume = None;
    }

    /// Whether firmware is ready to flash
    pub fn has_trusted_firmware(&self) -> bool {
        self.trusted_firmware_path.is_some()
    }

    /// State to settle in once an operation finishes
    pub fn resting_state(&self) -> SessionState {
        if self.has_trusted_firmware() {
            SessionState::AwaitingDevice
        } else {
            SessionState::Idle
        }
    }
}
