//! Device topology.
//!
//! [`DeviceBus`] answers the questions the station asks about attached
//! hardware: which USB devices are present, which tty and block nodes exist,
//! and which USB device each node hangs off. [`SysfsBus`] answers them from
//! a sysfs tree; tests point it at a fixture directory.

use crate::error::HotplugError;
use crate::types::{BlockPartition, SerialNode, UsbDeviceInfo, UsbIdentity};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::trace;

/// Read access to the device topology
pub trait DeviceBus: Send + Sync {
    /// USB devices currently on the bus. Interfaces are not listed.
    fn usb_devices(&self) -> Result<Vec<UsbDeviceInfo>, HotplugError>;

    /// All tty-class nodes
    fn serial_nodes(&self) -> Result<Vec<SerialNode>, HotplugError>;

    /// USB ancestor of a tty node, looked up by the node's name
    fn serial_parent(&self, devnode: &Path) -> Result<Option<UsbIdentity>, HotplugError>;

    /// All block-device partitions. Whole disks are not listed.
    fn block_partitions(&self) -> Result<Vec<BlockPartition>, HotplugError>;
}

/// [`DeviceBus`] backed by a sysfs tree
#[derive(Debug, Clone)]
pub struct SysfsBus {
    sysfs_root: PathBuf,
    dev_root: PathBuf,
}

impl SysfsBus {
    /// Bus over `sysfs_root`, reporting device nodes under `dev_root`
    pub fn new(sysfs_root: impl Into<PathBuf>, dev_root: impl Into<PathBuf>) -> Self {
        let sysfs_root = sysfs_root.into();
        // Class links resolve to canonical paths; compare against a canonical root.
        let sysfs_root = fs::canonicalize(&sysfs_root).unwrap_or(sysfs_root);
        Self {
            sysfs_root,
            dev_root: dev_root.into(),
        }
    }

    /// The live system: `/sys` and `/dev`
    pub fn system() -> Self {
        Self::new("/sys", "/dev")
    }

    /// sysfs root in use
    pub fn sysfs_root(&self) -> &Path {
        &self.sysfs_root
    }

    /// Device-node root in use
    pub fn dev_root(&self) -> &Path {
        &self.dev_root
    }

    /// Canonical targets of the entries in `dir`, by entry name. Dangling links are skipped.
    fn resolve_entries(&self, dir: &Path) -> Result<Vec<(String, PathBuf)>, HotplugError> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(HotplugError::io(dir, e)),
        };

        let mut resolved = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| HotplugError::io(dir, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            match fs::canonicalize(entry.path()) {
                Ok(target) => resolved.push((name, target)),
                Err(e) => trace!(entry = %name, error = %e, "Skipping unresolvable sysfs entry"),
            }
        }
        resolved.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(resolved)
    }

    fn usb_ancestor(&self, syspath: &Path) -> Option<UsbIdentity> {
        syspath
            .ancestors()
            .take_while(|dir| dir.starts_with(&self.sysfs_root))
            .find_map(|dir| {
                let vendor_id = read_attr(&dir.join("idVendor"))?;
                let product_id = read_attr(&dir.join("idProduct"))?;
                Some(UsbIdentity {
                    vendor_id,
                    product_id,
                    syspath: dir.to_path_buf(),
                })
            })
    }

    /// Vendor and model of the disk a partition belongs to
    fn disk_labels(&self, syspath: &Path, usb_parent: Option<&UsbIdentity>) -> (String, String) {
        let scsi = syspath
            .ancestors()
            .take_while(|dir| dir.starts_with(&self.sysfs_root))
            .find_map(|dir| Some((read_attr(&dir.join("vendor"))?, read_attr(&dir.join("model"))?)));
        if let Some(labels) = scsi {
            return labels;
        }

        let usb = usb_parent.map(|parent| {
            (
                read_attr(&parent.syspath.join("manufacturer")).unwrap_or_default(),
                read_attr(&parent.syspath.join("product")).unwrap_or_default(),
            )
        });
        usb.unwrap_or_default()
    }
}

impl DeviceBus for SysfsBus {
    fn usb_devices(&self) -> Result<Vec<UsbDeviceInfo>, HotplugError> {
        let dir = self.sysfs_root.join("bus/usb/devices");
        let mut devices = Vec::new();
        for (name, syspath) in self.resolve_entries(&dir)? {
            if name.contains(':') {
                continue;
            }
            let (Some(vendor_id), Some(product_id)) = (
                read_attr(&syspath.join("idVendor")),
                read_attr(&syspath.join("idProduct")),
            ) else {
                continue;
            };

            let busnum = read_attr(&syspath.join("busnum")).and_then(|v| v.parse::<u32>().ok());
            let devnum = read_attr(&syspath.join("devnum")).and_then(|v| v.parse::<u32>().ok());
            let devnode = match (busnum, devnum) {
                (Some(bus), Some(dev)) => Some(
                    self.dev_root
                        .join("bus/usb")
                        .join(format!("{bus:03}"))
                        .join(format!("{dev:03}")),
                ),
                _ => None,
            };

            devices.push(UsbDeviceInfo {
                sys_name: name,
                vendor_id,
                product_id,
                manufacturer: read_attr(&syspath.join("manufacturer")),
                product: read_attr(&syspath.join("product")),
                syspath,
                devnode,
            });
        }
        Ok(devices)
    }

    fn serial_nodes(&self) -> Result<Vec<SerialNode>, HotplugError> {
        let dir = self.sysfs_root.join("class/tty");
        Ok(self
            .resolve_entries(&dir)?
            .into_iter()
            .map(|(name, syspath)| SerialNode {
                devnode: self.dev_root.join(&name),
                usb_parent: self.usb_ancestor(&syspath),
                name,
            })
            .collect())
    }

    fn serial_parent(&self, devnode: &Path) -> Result<Option<UsbIdentity>, HotplugError> {
        let Some(name) = devnode.file_name() else {
            return Ok(None);
        };
        let link = self.sysfs_root.join("class/tty").join(name);
        match fs::canonicalize(&link) {
            Ok(syspath) => Ok(self.usb_ancestor(&syspath)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(HotplugError::io(link, e)),
        }
    }

    fn block_partitions(&self) -> Result<Vec<BlockPartition>, HotplugError> {
        let dir = self.sysfs_root.join("class/block");
        let mut partitions = Vec::new();
        for (name, syspath) in self.resolve_entries(&dir)? {
            if !syspath.join("partition").is_file() {
                continue;
            }
            let usb_parent = self.usb_ancestor(&syspath);
            let (vendor_label, model_label) = self.disk_labels(&syspath, usb_parent.as_ref());
            partitions.push(BlockPartition {
                devnode: self.dev_root.join(&name),
                name,
                usb_parent,
                vendor_label,
                model_label,
            });
        }
        Ok(partitions)
    }
}

/// Trimmed contents of a sysfs attribute; `None` when absent or empty
fn read_attr(path: &Path) -> Option<String> {
    let value = fs::read_to_string(path).ok()?;
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}
