//! Station configuration for fwstation.
//!
//! The configuration is a single YAML document mapped onto [`StationConfig`].
//! Values are layered in a fixed order:
//!
//! 1. built-in defaults (every section implements [`Default`])
//! 2. the YAML document
//! 3. environment overrides for the target identifiers (`TARGET_VID`, `TARGET_PID`)
//!
//! After layering, [`StationConfig::validate`] reports every problem at once so
//! an operator can fix the whole file in one pass.
//!
//! # Architecture
//!
//! - [`station`] - Section types and YAML loading
//! - [`overrides`] - Environment overrides for the target identifiers
//! - [`validate`] - Eager validation producing [`ConfigIssue`] lists
//! - [`error`] - Error types

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod error;
pub mod overrides;
pub mod prelude;
pub mod station;
pub mod validate;

pub use error::{ConfigError, ConfigIssue};
pub use overrides::{AppliedOverride, ENV_TARGET_PID, ENV_TARGET_VID};
pub use station::{
    DEFAULT_CONFIG_PATH, DeviceConfig, FirmwareConfig, GpioConfig, SecurityConfig,
    SessionConfig, SignatureScheme, StationConfig, StorageConfig, TargetDeviceConfig,
};
