//! Shared doubles for hotplug integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use fwstation_hotplug::prelude::*;
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

/// Mount service that edits a mount table file instead of mounting
#[derive(Debug)]
pub struct FakeMounts {
    table: PathBuf,
    failures_left: AtomicU32,
    fail_lazy_unmount: bool,
    pub calls: Mutex<Vec<String>>,
}

impl FakeMounts {
    pub fn new(table: PathBuf) -> Self {
        Self::failing(table, 0)
    }

    pub fn failing(table: PathBuf, mount_failures: u32) -> Self {
        Self {
            table,
            failures_left: AtomicU32::new(mount_failures),
            fail_lazy_unmount: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_stuck_lazy_unmount(mut self) -> Self {
        self.fail_lazy_unmount = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn mount_calls(&self) -> usize {
        self.calls().iter().filter(|c| c.starts_with("mount ")).count()
    }

    fn lines(&self) -> Vec<String> {
        fs::read_to_string(&self.table)
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn write(&self, lines: &[String]) -> Result<(), HotplugError> {
        let mut contents = lines.join("\n");
        if !contents.is_empty() {
            contents.push('\n');
        }
        fs::write(&self.table, contents).map_err(|e| HotplugError::Command {
            command: "write mounts".to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl MountService for FakeMounts {
    async fn mount(
        &self,
        device: &Path,
        mount_point: &Path,
        options: &str,
    ) -> Result<(), HotplugError> {
        self.calls.lock().push(format!(
            "mount {} {} {options}",
            device.display(),
            mount_point.display()
        ));
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(HotplugError::Command {
                command: "mount".to_string(),
                reason: "exit code 32".to_string(),
            });
        }
        let mut lines = self.lines();
        lines.push(format!(
            "{} {} vfat rw 0 0",
            device.display(),
            mount_point.display()
        ));
        self.write(&lines)
    }

    async fn unmount(&self, mount_point: &Path, mode: UnmountMode) -> Result<(), HotplugError> {
        self.calls
            .lock()
            .push(format!("umount {mode:?} {}", mount_point.display()));
        if mode == UnmountMode::Lazy && self.fail_lazy_unmount {
            return Err(HotplugError::Command {
                command: "umount -l".to_string(),
                reason: "exit code 16".to_string(),
            });
        }
        let target = mount_point.display().to_string();
        let lines: Vec<String> = self
            .lines()
            .into_iter()
            .filter(|line| line.split_whitespace().nth(1) != Some(target.as_str()))
            .collect();
        self.write(&lines)
    }
}
