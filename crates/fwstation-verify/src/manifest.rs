//! Firmware manifest loading

use crate::error::VerifyError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Metadata describing the firmware package on a volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareManifest {
    /// Package identifier
    pub device_id: String,
    /// Human-readable package name
    pub device_name: String,
    /// Firmware version string
    pub firmware_version: String,
    /// Creation timestamp as written by the packaging tool
    pub created_at: String,
    /// Name of the device this package is built for
    #[serde(rename = "target_device")]
    pub target_device_name: String,
}

impl FirmwareManifest {
    /// Parse a manifest document
    pub fn from_slice(bytes: &[u8]) -> Result<Self, VerifyError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Read and parse the manifest at `path`
    pub async fn load(path: &Path) -> Result<Self, VerifyError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| VerifyError::io(path, e))?;
        Self::from_slice(&bytes)
    }
}
