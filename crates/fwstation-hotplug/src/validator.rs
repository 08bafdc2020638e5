//! Target device validation and serial port resolution

use crate::bus::DeviceBus;
use crate::error::HotplugError;
use crate::types::{TargetDevice, ids_match};
use fwstation_config::StationConfig;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info};

/// Decides whether a device is the target and finds its serial port
pub struct DeviceValidator {
    vendor_id: String,
    product_id: String,
    port_candidates: Vec<PathBuf>,
    settle_delay: Duration,
    dev_root: PathBuf,
    bus: Arc<dyn DeviceBus>,
}

impl std::fmt::Debug for DeviceValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceValidator")
            .field("vendor_id", &self.vendor_id)
            .field("product_id", &self.product_id)
            .field("port_candidates", &self.port_candidates)
            .field("settle_delay", &self.settle_delay)
            .finish_non_exhaustive()
    }
}

impl DeviceValidator {
    /// Validator for `vendor_id:product_id`.
    ///
    /// Candidates are written as `/dev/...` paths and looked up under
    /// `dev_root`.
    pub fn new(
        vendor_id: impl Into<String>,
        product_id: impl Into<String>,
        port_candidates: Vec<PathBuf>,
        settle_delay: Duration,
        dev_root: impl Into<PathBuf>,
        bus: Arc<dyn DeviceBus>,
    ) -> Self {
        Self {
            vendor_id: vendor_id.into(),
            product_id: product_id.into(),
            port_candidates,
            settle_delay,
            dev_root: dev_root.into(),
            bus,
        }
    }

    /// Validator built from the station configuration
    pub fn from_config(config: &StationConfig, bus: Arc<dyn DeviceBus>) -> Self {
        Self::new(
            config.target_device.vid.clone(),
            config.target_device.pid.clone(),
            config.device.port_candidates.clone(),
            Duration::from_millis(config.device.port_settle_delay_ms),
            config.device.dev_root.clone(),
            bus,
        )
    }

    /// Whether `device` carries the configured vendor and product ids
    pub fn is_target(&self, device: &TargetDevice) -> bool {
        ids_match(&device.vendor_id, &self.vendor_id)
            && ids_match(&device.product_id, &self.product_id)
    }

    /// Find the serial port the device enumerated.
    ///
    /// A device announced with a tty node uses it directly. Otherwise, after
    /// the settle delay, the candidate list is tried and then every tty
    /// node is scanned; either way the node must hang off a USB device with
    /// the same ids.
    pub async fn resolve_port(&self, device: &TargetDevice) -> Result<String, HotplugError> {
        if let Some(node) = device.node_path.as_deref().filter(|p| is_serial_node(p)) {
            debug!(port = %node.display(), "Device announced with a serial node");
            return Ok(node.display().to_string());
        }

        sleep(self.settle_delay).await;

        for candidate in &self.port_candidates {
            let path = self.under_dev_root(candidate);
            if !path.exists() {
                continue;
            }
            let parent = match self.bus.serial_parent(&path) {
                Ok(parent) => parent,
                Err(e) => {
                    debug!(port = %path.display(), error = %e, "Cannot resolve candidate, skipping");
                    continue;
                }
            };
            if parent.is_some_and(|p| p.matches(&device.vendor_id, &device.product_id)) {
                info!(port = %path.display(), device = %device.id_pair(), "Serial port found");
                return Ok(path.display().to_string());
            }
            debug!(port = %path.display(), "Candidate belongs to another device");
        }

        let scanned = self.bus.serial_nodes()?.into_iter().find(|node| {
            node.usb_parent
                .as_ref()
                .is_some_and(|p| p.matches(&device.vendor_id, &device.product_id))
        });
        if let Some(node) = scanned {
            info!(port = %node.devnode.display(), device = %device.id_pair(), "Serial port found by scan");
            return Ok(node.devnode.display().to_string());
        }

        Err(HotplugError::NoSerialPort {
            vendor_id: device.vendor_id.clone(),
            product_id: device.product_id.clone(),
        })
    }

    fn under_dev_root(&self, candidate: &Path) -> PathBuf {
        match candidate.strip_prefix("/dev") {
            Ok(relative) => self.dev_root.join(relative),
            Err(_) => candidate.to_path_buf(),
        }
    }
}

/// tty-style node names: `ttyUSB0`, `ttyACM0`, `ttyS0`
fn is_serial_node(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with("tty") && name.len() > 3)
}
