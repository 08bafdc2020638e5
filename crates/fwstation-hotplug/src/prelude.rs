//! Convenience re-exports for hotplug handling

pub use crate::bus::{DeviceBus, SysfsBus};
pub use crate::error::HotplugError;
pub use crate::lifecycle::{StorageLifecycle, StorageSettings};
pub use crate::mounts::{MountEntry, MountService, MountTable, SystemMountService, UnmountMode};
pub use crate::types::{
    BlockPartition, DeviceEvent, SerialNode, StorageEvent, StorageVolume, TargetDevice,
    UsbDeviceInfo, UsbIdentity,
};
pub use crate::validator::DeviceValidator;
pub use crate::watcher::{DeviceWatcher, StorageWatcher, WatcherHandle};
