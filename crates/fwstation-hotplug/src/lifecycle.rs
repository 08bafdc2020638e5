//! Removable storage lifecycle.
//!
//! [`StorageLifecycle::attach`] turns a freshly seen USB partition into a
//! mounted [`StorageVolume`]: it reuses an existing mount when the partition
//! is already mounted, otherwise clears any stale mount point under the
//! configured base and mounts with retries. [`StorageLifecycle::unmount`]
//! undoes that and is safe to call more than once.

use crate::error::HotplugError;
use crate::mounts::{MountService, MountTable, UnmountMode};
use crate::types::{BlockPartition, StorageVolume};
use fwstation_config::StorageConfig;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Mount parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageSettings {
    /// Directory mount points are created under
    pub mount_base: PathBuf,
    /// Options handed to the mount command
    pub mount_options: String,
    /// Mount attempts per partition
    pub mount_attempts: u32,
    /// Wait between failed mount attempts
    pub mount_retry_delay: Duration,
    /// Wait after a partition appears before touching it
    pub settle_delay: Duration,
    /// Wait after unmounting before removing the mount point
    pub unmount_settle: Duration,
}

impl StorageSettings {
    /// Settings from the `storage` configuration section
    pub fn from_config(storage: &StorageConfig) -> Self {
        Self {
            mount_base: storage.mount_base.clone(),
            mount_options: storage.mount_options.clone(),
            mount_attempts: storage.mount_attempts.max(1),
            mount_retry_delay: Duration::from_millis(storage.mount_retry_delay_ms),
            settle_delay: Duration::from_millis(storage.settle_delay_ms),
            unmount_settle: Duration::from_millis(storage.unmount_settle_ms),
        }
    }
}

/// Mounts and unmounts removable volumes
pub struct StorageLifecycle {
    settings: StorageSettings,
    table: MountTable,
    service: Arc<dyn MountService>,
}

impl std::fmt::Debug for StorageLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageLifecycle")
            .field("settings", &self.settings)
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

impl StorageLifecycle {
    /// Create a lifecycle manager
    pub fn new(settings: StorageSettings, table: MountTable, service: Arc<dyn MountService>) -> Self {
        Self {
            settings,
            table,
            service,
        }
    }

    /// Mount parameters
    pub fn settings(&self) -> &StorageSettings {
        &self.settings
    }

    /// Mount a USB partition.
    ///
    /// Returns `Ok(None)` for partitions without a USB ancestor.
    pub async fn attach(
        &self,
        partition: &BlockPartition,
    ) -> Result<Option<StorageVolume>, HotplugError> {
        if partition.usb_parent.is_none() {
            debug!(device = %partition.devnode.display(), "Ignoring non-USB partition");
            return Ok(None);
        }

        sleep(self.settings.settle_delay).await;

        if let Some(mount_point) = self.table.mount_point_of(&partition.devnode)? {
            info!(
                device = %partition.devnode.display(),
                mount_point = %mount_point.display(),
                "Partition already mounted, reusing"
            );
            return Ok(Some(self.volume(partition, mount_point)));
        }

        let mount_point = self.settings.mount_base.join(&partition.name);
        self.clear_stale(&mount_point).await;
        tokio::fs::create_dir_all(&mount_point)
            .await
            .map_err(|e| HotplugError::io(&mount_point, e))?;

        let attempts = self.settings.mount_attempts.max(1);
        let mut last_error = String::new();
        for attempt in 1..=attempts {
            match self
                .service
                .mount(&partition.devnode, &mount_point, &self.settings.mount_options)
                .await
            {
                Ok(()) => {
                    info!(
                        device = %partition.devnode.display(),
                        mount_point = %mount_point.display(),
                        attempt,
                        "Mounted storage"
                    );
                    return Ok(Some(self.volume(partition, mount_point)));
                }
                Err(e) => {
                    warn!(device = %partition.devnode.display(), attempt, attempts, error = %e, "Mount attempt failed");
                    last_error = e.to_string();
                }
            }

            // Another mounter may have won the race.
            if let Some(existing) = self.table.mount_point_of(&partition.devnode)? {
                info!(mount_point = %existing.display(), "Partition mounted elsewhere, reusing");
                remove_mount_dir(&mount_point).await;
                return Ok(Some(self.volume(partition, existing)));
            }

            if attempt < attempts {
                sleep(self.settings.mount_retry_delay).await;
            }
        }

        remove_mount_dir(&mount_point).await;
        Err(HotplugError::MountFailed {
            device: partition.devnode.clone(),
            attempts,
            reason: last_error,
        })
    }

    /// Unmount a volume and remove its mount point.
    ///
    /// Tries a lazy unmount first, then a forced one. Returns whether the
    /// mount point is no longer in the mount table.
    pub async fn unmount(&self, mount_point: &Path) -> bool {
        let mounted = match self.table.is_mounted(mount_point) {
            Ok(mounted) => mounted,
            Err(e) => {
                warn!(error = %e, "Cannot read mount table");
                true
            }
        };

        if mounted {
            if let Err(e) = self.service.unmount(mount_point, UnmountMode::Lazy).await {
                warn!(mount_point = %mount_point.display(), error = %e, "Lazy unmount failed, forcing");
                if let Err(e) = self.service.unmount(mount_point, UnmountMode::Force).await {
                    warn!(mount_point = %mount_point.display(), error = %e, "Forced unmount failed");
                }
            }
            sleep(self.settings.unmount_settle).await;
        }

        if mount_point.starts_with(&self.settings.mount_base) {
            remove_mount_dir(mount_point).await;
        }

        match self.table.is_mounted(mount_point) {
            Ok(still_mounted) => {
                if !still_mounted {
                    info!(mount_point = %mount_point.display(), "Storage unmounted");
                }
                !still_mounted
            }
            Err(e) => {
                warn!(error = %e, "Cannot confirm unmount");
                false
            }
        }
    }

    /// Detach anything left at `mount_point` by an earlier session
    async fn clear_stale(&self, mount_point: &Path) {
        if matches!(self.table.is_mounted(mount_point), Ok(true)) {
            debug!(mount_point = %mount_point.display(), "Clearing stale mount");
            if let Err(e) = self.service.unmount(mount_point, UnmountMode::Lazy).await {
                warn!(mount_point = %mount_point.display(), error = %e, "Stale unmount failed");
            }
        }
        remove_mount_dir(mount_point).await;
    }

    fn volume(&self, partition: &BlockPartition, mount_point: PathBuf) -> StorageVolume {
        StorageVolume {
            block_device: partition.devnode.clone(),
            mount_point,
            vendor_label: partition.vendor_label.clone(),
            model_label: partition.model_label.clone(),
        }
    }
}

/// Remove an empty mount directory; absence is fine
async fn remove_mount_dir(path: &Path) {
    match tokio::fs::remove_dir(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => debug!(path = %path.display(), error = %e, "Could not remove mount directory"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_from_config_clamp_attempts() {
        let mut storage = StorageConfig::default();
        storage.mount_attempts = 0;
        let settings = StorageSettings::from_config(&storage);
        assert_eq!(settings.mount_attempts, 1);
        assert_eq!(settings.mount_retry_delay, Duration::from_millis(1000));
        assert_eq!(settings.unmount_settle, Duration::from_millis(500));
        assert_eq!(settings.mount_base, PathBuf::from("/media/fwstation"));
    }
}
