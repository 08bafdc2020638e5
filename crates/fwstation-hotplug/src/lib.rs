//! Hotplug handling for fwstation.
//!
//! Two hardware sources feed the station: the target device appearing on the
//! USB bus, and a removable volume carrying firmware. This crate turns both
//! into typed events on bounded queues and owns the pieces around them:
//! identifying the target device, finding its serial port, and mounting and
//! unmounting storage.
//!
//! # Architecture
//!
//! - [`types`] - [`TargetDevice`], [`StorageVolume`] and their events
//! - [`bus`] - The [`DeviceBus`] topology seam and its sysfs implementation
//! - [`validator`] - [`DeviceValidator`]: target matching and port resolution
//! - [`mounts`] - Mount table parsing and the [`MountService`] seam
//! - [`lifecycle`] - [`StorageLifecycle`]: attach and unmount of volumes
//! - [`watcher`] - Polling producers for device and storage events
//! - [`error`] - Error types

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod bus;
pub mod error;
pub mod lifecycle;
pub mod mounts;
pub mod prelude;
pub mod types;
pub mod validator;
pub mod watcher;

pub use bus::{DeviceBus, SysfsBus};
pub use error::HotplugError;
pub use lifecycle::{StorageLifecycle, StorageSettings};
pub use mounts::{MountEntry, MountService, MountTable, SystemMountService, UnmountMode};
pub use types::{
    BlockPartition, DeviceEvent, SerialNode, StorageEvent, StorageVolume, TargetDevice,
    UsbDeviceInfo, UsbIdentity,
};
pub use validator::DeviceValidator;
pub use watcher::{DeviceWatcher, StorageWatcher, WatcherHandle};
