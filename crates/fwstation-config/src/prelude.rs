//! Convenience re-exports for configuration consumers

pub use crate::error::{ConfigError, ConfigIssue};
pub use crate::overrides::{AppliedOverride, ENV_TARGET_PID, ENV_TARGET_VID};
pub use crate::station::{
    DEFAULT_CONFIG_PATH, DeviceConfig, FirmwareConfig, GpioConfig, SecurityConfig,
    SessionConfig, SignatureScheme, StationConfig, StorageConfig, TargetDeviceConfig,
};
