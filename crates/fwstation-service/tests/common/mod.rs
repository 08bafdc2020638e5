//! Doubles for orchestrator tests

#![allow(dead_code)]

use async_trait::async_trait;
use fwstation_flash::{FirmwareFlasher, FlashOutcome};
use fwstation_hotplug::prelude::*;
use fwstation_lamp::{LampState, StatusLamp};
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

/// Mount service that drops entries from a mount table file
#[derive(Debug)]
pub struct FakeMounts {
    table: PathBuf,
    calls: Mutex<Vec<String>>,
}

impl FakeMounts {
    pub fn new(table: PathBuf) -> Self {
        Self {
            table,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn unmounted(&self, mount_point: &Path) -> bool {
        let line = format!("umount Lazy {}", mount_point.display());
        self.calls().contains(&line)
    }
}

#[async_trait]
impl MountService for FakeMounts {
    async fn mount(
        &self,
        device: &Path,
        mount_point: &Path,
        _options: &str,
    ) -> Result<(), HotplugError> {
        self.calls.lock().push(format!(
            "mount {} {}",
            device.display(),
            mount_point.display()
        ));
        Ok(())
    }

    async fn unmount(&self, mount_point: &Path, mode: UnmountMode) -> Result<(), HotplugError> {
        self.calls
            .lock()
            .push(format!("umount {mode:?} {}", mount_point.display()));
        let target = mount_point.display().to_string();
        let kept: String = fs::read_to_string(&self.table)
            .unwrap_or_default()
            .lines()
            .filter(|line| line.split_whitespace().nth(1) != Some(target.as_str()))
            .map(|line| format!("{line}\n"))
            .collect();
        fs::write(&self.table, kept).map_err(|e| HotplugError::Command {
            command: "write mounts".to_string(),
            reason: e.to_string(),
        })
    }
}

/// Lamp that remembers every state it was asked to show
#[derive(Debug, Default)]
pub struct RecordingLamp {
    shown: Mutex<Vec<LampState>>,
    released: Mutex<bool>,
}

impl RecordingLamp {
    pub fn history(&self) -> Vec<LampState> {
        self.shown.lock().clone()
    }

    /// History with consecutive repeats collapsed
    pub fn transitions(&self) -> Vec<LampState> {
        let mut out = self.history();
        out.dedup();
        out
    }

    pub fn clear_history(&self) {
        self.shown.lock().clear();
    }

    pub fn is_released(&self) -> bool {
        *self.released.lock()
    }
}

impl StatusLamp for RecordingLamp {
    fn show(&self, state: LampState) {
        self.shown.lock().push(state);
    }

    fn current(&self) -> LampState {
        self.shown.lock().last().copied().unwrap_or_default()
    }

    fn release(&self) {
        *self.released.lock() = true;
    }
}

/// Flasher that records its calls and reports a fixed outcome
#[derive(Debug)]
pub struct MockFlasher {
    ok: bool,
    delay: Duration,
    calls: Mutex<Vec<(String, PathBuf)>>,
    during_flash: Mutex<Option<(mpsc::Sender<StorageEvent>, StorageEvent)>>,
}

impl MockFlasher {
    pub fn succeeding() -> Self {
        Self::with_result(true)
    }

    pub fn failing() -> Self {
        Self::with_result(false)
    }

    fn with_result(ok: bool) -> Self {
        Self {
            ok,
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
            during_flash: Mutex::new(None),
        }
    }

    pub fn taking(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Queue `event` on `sender` while the next flash is running
    pub fn inject_during_flash(&self, sender: mpsc::Sender<StorageEvent>, event: StorageEvent) {
        *self.during_flash.lock() = Some((sender, event));
    }

    pub fn calls(&self) -> Vec<(String, PathBuf)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl FirmwareFlasher for MockFlasher {
    async fn flash(&self, port: &str, firmware: &Path) -> FlashOutcome {
        self.calls
            .lock()
            .push((port.to_string(), firmware.to_path_buf()));
        let hook = self.during_flash.lock().take();
        if let Some((sender, event)) = hook {
            let _ = sender.try_send(event);
        }
        tokio::time::sleep(self.delay).await;
        FlashOutcome {
            ok: self.ok,
            reason: if self.ok {
                "flash succeeded".to_string()
            } else {
                "avrdude exited with code 1".to_string()
            },
            elapsed_seconds: self.delay.as_secs_f64(),
            attempts_used: if self.ok { 1 } else { 3 },
        }
    }
}
