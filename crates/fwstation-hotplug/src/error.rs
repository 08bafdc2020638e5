//! Error types for hotplug handling

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by buses, mounts and port resolution
#[derive(Error, Debug)]
pub enum HotplugError {
    /// Reading sysfs or the mount table failed
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path being accessed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// No serial node could be tied to the device
    #[error("no serial port found for {vendor_id}:{product_id}")]
    NoSerialPort {
        /// Vendor id of the device
        vendor_id: String,
        /// Product id of the device
        product_id: String,
    },

    /// An external command failed to start or exited non-zero
    #[error("command `{command}` failed: {reason}")]
    Command {
        /// Command line that was run
        command: String,
        /// Exit status or spawn error
        reason: String,
    },

    /// An external command exceeded its timeout
    #[error("command `{command}` timed out after {secs}s")]
    Timeout {
        /// Command line that was run
        command: String,
        /// Timeout in seconds
        secs: u64,
    },

    /// Every mount attempt failed
    #[error("failed to mount {device} after {attempts} attempts: {reason}")]
    MountFailed {
        /// Block device
        device: PathBuf,
        /// Attempts made
        attempts: u32,
        /// Last failure
        reason: String,
    },
}

impl HotplugError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        HotplugError::Io {
            path: path.into(),
            source,
        }
    }
}
