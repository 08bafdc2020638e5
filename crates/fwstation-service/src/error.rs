//! Service error types

use fwstation_config::ConfigError;
use fwstation_hotplug::HotplugError;
use thiserror::Error;

/// Errors surfaced by the station service
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Device or storage handling failed
    #[error("Hotplug error: {0}")]
    Hotplug(#[from] HotplugError),

    /// An event source could not be started
    #[error("Event source error: {0}")]
    EventSource(String),
}
