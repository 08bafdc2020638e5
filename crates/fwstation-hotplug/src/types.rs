//! Hotplug data model

use std::path::PathBuf;

/// Vendor and product ids of a USB ancestor, with its sysfs location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbIdentity {
    /// Hex vendor id as reported by sysfs
    pub vendor_id: String,
    /// Hex product id as reported by sysfs
    pub product_id: String,
    /// Canonical sysfs directory of the USB device
    pub syspath: PathBuf,
}

impl UsbIdentity {
    /// True when both ids match, ignoring case and surrounding whitespace
    pub fn matches(&self, vendor_id: &str, product_id: &str) -> bool {
        ids_match(&self.vendor_id, vendor_id) && ids_match(&self.product_id, product_id)
    }
}

pub(crate) fn ids_match(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

/// A device on the USB bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbDeviceInfo {
    /// Kernel name, e.g. `1-1.2`
    pub sys_name: String,
    /// Hex vendor id
    pub vendor_id: String,
    /// Hex product id
    pub product_id: String,
    /// Canonical sysfs directory
    pub syspath: PathBuf,
    /// `/dev/bus/usb/BBB/DDD` node when bus and device numbers are known
    pub devnode: Option<PathBuf>,
    /// Manufacturer string, when the device reports one
    pub manufacturer: Option<String>,
    /// Product string, when the device reports one
    pub product: Option<String>,
}

/// A tty-class node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialNode {
    /// Kernel name, e.g. `ttyACM0`
    pub name: String,
    /// Device node path
    pub devnode: PathBuf,
    /// Nearest USB ancestor, if the node hangs off one
    pub usb_parent: Option<UsbIdentity>,
}

/// A block-device partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockPartition {
    /// Kernel name, e.g. `sda1`
    pub name: String,
    /// Device node path
    pub devnode: PathBuf,
    /// Nearest USB ancestor; `None` for internal disks
    pub usb_parent: Option<UsbIdentity>,
    /// Vendor label of the disk
    pub vendor_label: String,
    /// Model label of the disk
    pub model_label: String,
}

/// A USB device reported by the device watcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDevice {
    /// Hex vendor id
    pub vendor_id: String,
    /// Hex product id
    pub product_id: String,
    /// Kernel name
    pub system_name: String,
    /// Node the device was announced with
    pub node_path: Option<PathBuf>,
    /// Serial port, filled in after resolution
    pub comm_port: Option<String>,
}

impl TargetDevice {
    /// Build the event payload for a bus device
    pub fn from_usb(info: &UsbDeviceInfo) -> Self {
        Self {
            vendor_id: info.vendor_id.clone(),
            product_id: info.product_id.clone(),
            system_name: info.sys_name.clone(),
            node_path: info.devnode.clone(),
            comm_port: None,
        }
    }

    /// Copy of the device with its serial port resolved
    pub fn with_port(&self, port: impl Into<String>) -> Self {
        Self {
            comm_port: Some(port.into()),
            ..self.clone()
        }
    }

    /// `vid:pid` for log lines
    pub fn id_pair(&self) -> String {
        format!("{}:{}", self.vendor_id, self.product_id)
    }
}

/// Target device arrival or departure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// A device appeared on the bus
    Connected(TargetDevice),
    /// A device left the bus
    Disconnected(TargetDevice),
}

/// A mounted removable volume
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageVolume {
    /// Partition device node
    pub block_device: PathBuf,
    /// Where the partition is mounted
    pub mount_point: PathBuf,
    /// Vendor label of the disk
    pub vendor_label: String,
    /// Model label of the disk
    pub model_label: String,
}

/// Storage arrival or removal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageEvent {
    /// A USB partition was mounted
    Mounted(StorageVolume),
    /// A previously reported partition disappeared
    Removed {
        /// Device node of the removed partition
        block_device: PathBuf,
    },
}
