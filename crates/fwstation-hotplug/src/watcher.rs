//! Polling event producers.
//!
//! Each watcher snapshots the bus at a fixed interval, diffs the snapshot
//! against the last one and publishes the differences on a bounded queue
//! with `try_send`. A full queue never blocks the watcher: unsent changes
//! stay out of the snapshot (device watcher) or in a pending list (storage
//! watcher) and go out on a later tick. A closed queue ends the watcher.

use crate::bus::DeviceBus;
use crate::error::HotplugError;
use crate::lifecycle::StorageLifecycle;
use crate::types::{DeviceEvent, StorageEvent, TargetDevice, UsbDeviceInfo};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Handle to a running watcher task. Dropping it stops the task.
#[derive(Debug)]
pub struct WatcherHandle {
    name: &'static str,
    running: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl WatcherHandle {
    fn spawn<F>(name: &'static str, body: impl FnOnce(Arc<AtomicBool>) -> F) -> Self
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn(body(running.clone()));
        Self {
            name,
            running,
            task: Some(task),
        }
    }

    /// Whether the watcher loop is still going
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
            && self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Ask the watcher to stop after its current tick
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    /// Stop and wait for the task, aborting it after a short grace period
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(mut task) = self.task.take()
            && timeout(SHUTDOWN_GRACE, &mut task).await.is_err()
        {
            warn!(watcher = self.name, "Watcher did not stop in time, aborting");
            task.abort();
        }
        debug!(watcher = self.name, "Watcher stopped");
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Publishes [`DeviceEvent`]s for USB devices coming and going
#[derive(Debug)]
pub struct DeviceWatcher;

impl DeviceWatcher {
    /// Start watching.
    ///
    /// Devices already present are taken as the baseline and not announced.
    pub fn spawn(
        bus: Arc<dyn DeviceBus>,
        interval: Duration,
        sender: mpsc::Sender<DeviceEvent>,
    ) -> Result<WatcherHandle, HotplugError> {
        let baseline = snapshot(bus.usb_devices()?);
        info!(devices = baseline.len(), "Device watcher started");

        Ok(WatcherHandle::spawn("device", move |running| async move {
            let mut last = baseline;
            while running.load(Ordering::Relaxed) {
                sleep(interval).await;
                if !running.load(Ordering::Relaxed) {
                    break;
                }

                let current = match off_runtime(&bus, |bus| bus.usb_devices()).await {
                    Ok(devices) => snapshot(devices),
                    Err(e) => {
                        warn!(error = %e, "USB scan failed");
                        continue;
                    }
                };

                match publish_device_changes(&last, &current, &sender) {
                    Ok(next) => last = next,
                    Err(Closed) => {
                        debug!("Device event queue closed, stopping watcher");
                        break;
                    }
                }
            }
            running.store(false, Ordering::Relaxed);
        }))
    }
}

struct Closed;

/// Run a sysfs read on the blocking pool.
async fn off_runtime<T, F>(bus: &Arc<dyn DeviceBus>, read: F) -> Result<T, HotplugError>
where
    T: Send + 'static,
    F: FnOnce(&dyn DeviceBus) -> Result<T, HotplugError> + Send + 'static,
{
    let bus = Arc::clone(bus);
    tokio::task::spawn_blocking(move || read(bus.as_ref()))
        .await
        .map_err(|e| HotplugError::Command {
            command: "sysfs scan".to_string(),
            reason: e.to_string(),
        })?
}

fn snapshot(devices: Vec<UsbDeviceInfo>) -> HashMap<String, UsbDeviceInfo> {
    devices
        .into_iter()
        .map(|device| (device.sys_name.clone(), device))
        .collect()
}

/// Send the diff between two snapshots; returns the snapshot the receiver now agrees with
fn publish_device_changes(
    last: &HashMap<String, UsbDeviceInfo>,
    current: &HashMap<String, UsbDeviceInfo>,
    sender: &mpsc::Sender<DeviceEvent>,
) -> Result<HashMap<String, UsbDeviceInfo>, Closed> {
    let mut agreed = last.clone();
    let mut dropped = 0usize;

    let mut added: Vec<&UsbDeviceInfo> = current
        .iter()
        .filter(|(name, _)| !last.contains_key(*name))
        .map(|(_, device)| device)
        .collect();
    added.sort_by(|a, b| a.sys_name.cmp(&b.sys_name));
    for device in added {
        match sender.try_send(DeviceEvent::Connected(TargetDevice::from_usb(device))) {
            Ok(()) => {
                debug!(device = %device.sys_name, "USB device connected");
                agreed.insert(device.sys_name.clone(), device.clone());
            }
            Err(TrySendError::Full(_)) => dropped += 1,
            Err(TrySendError::Closed(_)) => return Err(Closed),
        }
    }

    let mut removed: Vec<&UsbDeviceInfo> = last
        .iter()
        .filter(|(name, _)| !current.contains_key(*name))
        .map(|(_, device)| device)
        .collect();
    removed.sort_by(|a, b| a.sys_name.cmp(&b.sys_name));
    for device in removed {
        match sender.try_send(DeviceEvent::Disconnected(TargetDevice::from_usb(device))) {
            Ok(()) => {
                debug!(device = %device.sys_name, "USB device disconnected");
                agreed.remove(&device.sys_name);
            }
            Err(TrySendError::Full(_)) => dropped += 1,
            Err(TrySendError::Closed(_)) => return Err(Closed),
        }
    }

    if dropped > 0 {
        warn!(dropped, "Device event queue full, deferring events");
    }
    Ok(agreed)
}

/// Mounts USB partitions as they appear and publishes [`StorageEvent`]s
#[derive(Debug)]
pub struct StorageWatcher;

#[derive(Debug)]
struct KnownPartition {
    devnode: PathBuf,
    reported: bool,
}

struct StorageState {
    lifecycle: Arc<StorageLifecycle>,
    known: HashMap<String, KnownPartition>,
    pending: VecDeque<StorageEvent>,
}

impl StorageState {
    async fn scan(&mut self, bus: &Arc<dyn DeviceBus>) -> Result<(), HotplugError> {
        let partitions = off_runtime(bus, |bus| bus.block_partitions()).await?;

        let present: Vec<String> = partitions.iter().map(|p| p.name.clone()).collect();
        let gone: Vec<String> = self
            .known
            .keys()
            .filter(|name| !present.contains(name))
            .cloned()
            .collect();
        for name in gone {
            if let Some(known) = self.known.remove(&name)
                && known.reported
            {
                info!(device = %known.devnode.display(), "Storage removed");
                self.pending.push_back(StorageEvent::Removed {
                    block_device: known.devnode,
                });
            }
        }

        for partition in partitions {
            if self.known.contains_key(&partition.name) {
                continue;
            }
            let reported = match self.lifecycle.attach(&partition).await {
                Ok(Some(volume)) => {
                    self.pending.push_back(StorageEvent::Mounted(volume));
                    true
                }
                Ok(None) => false,
                Err(e) => {
                    warn!(device = %partition.devnode.display(), error = %e, "Storage mount failed");
                    false
                }
            };
            self.known.insert(
                partition.name,
                KnownPartition {
                    devnode: partition.devnode,
                    reported,
                },
            );
        }
        Ok(())
    }

    fn flush(&mut self, sender: &mpsc::Sender<StorageEvent>) -> Result<(), Closed> {
        while let Some(event) = self.pending.pop_front() {
            match sender.try_send(event) {
                Ok(()) => {}
                Err(TrySendError::Full(event)) => {
                    self.pending.push_front(event);
                    warn!(
                        pending = self.pending.len(),
                        "Storage event queue full, deferring events"
                    );
                    break;
                }
                Err(TrySendError::Closed(_)) => return Err(Closed),
            }
        }
        Ok(())
    }
}

impl StorageWatcher {
    /// Start watching.
    ///
    /// USB partitions present at startup are mounted and announced before
    /// this returns.
    pub async fn spawn(
        bus: Arc<dyn DeviceBus>,
        lifecycle: Arc<StorageLifecycle>,
        interval: Duration,
        sender: mpsc::Sender<StorageEvent>,
    ) -> Result<WatcherHandle, HotplugError> {
        let mut state = StorageState {
            lifecycle,
            known: HashMap::new(),
            pending: VecDeque::new(),
        };
        state.scan(&bus).await?;
        let startup_mounts = state.pending.len();
        if state.flush(&sender).is_err() {
            debug!("Storage event queue closed during startup scan");
        }
        info!(
            partitions = state.known.len(),
            mounted = startup_mounts,
            "Storage watcher started"
        );

        Ok(WatcherHandle::spawn("storage", move |running| async move {
            while running.load(Ordering::Relaxed) {
                sleep(interval).await;
                if !running.load(Ordering::Relaxed) {
                    break;
                }
                if let Err(e) = state.scan(&bus).await {
                    warn!(error = %e, "Block device scan failed");
                }
                if state.flush(&sender).is_err() {
                    debug!("Storage event queue closed, stopping watcher");
                    break;
                }
            }
            running.store(false, Ordering::Relaxed);
        }))
    }
}
