//! The session state machine.
//!
//! One [`Orchestrator`] owns the [`Session`] and is the only consumer of the
//! storage and device queues. Every [`Orchestrator::step`] polls the storage
//! queue first; a storage event is handled completely and ends the step, so
//! a device event is only looked at when no storage event is waiting.
//! Verification and flashing run inside the step: events arriving meanwhile
//! wait in their queues.

use crate::session::{Session, SessionState, lamp_for};
use fwstation_config::SessionConfig;
use fwstation_flash::FirmwareFlasher;
use fwstation_hotplug::{
    DeviceEvent, DeviceValidator, StorageEvent, StorageLifecycle, StorageVolume,
    TargetDevice, WatcherHandle,
};
use fwstation_lamp::StatusLamp;
use fwstation_verify::VerificationPipeline;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, trace, warn};

/// Timing and policy of the session loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// Wait on each queue per step
    pub poll_interval: Duration,
    /// How long success and failure of a flash stay on the lamp
    pub result_dwell: Duration,
    /// How long a rejection stays on the lamp
    pub rejection_dwell: Duration,
    /// Forget the trusted firmware after one successful flash
    pub consume_on_success: bool,
}

impl SessionSettings {
    /// Settings from the `session` configuration section
    pub fn from_config(session: &SessionConfig) -> Self {
        Self {
            poll_interval: session.poll_interval(),
            result_dwell: session.result_dwell(),
            rejection_dwell: session.rejection_dwell(),
            consume_on_success: session.consume_on_success,
        }
    }
}

/// Services the orchestrator drives
pub struct Collaborators {
    /// Volume verification
    pub pipeline: VerificationPipeline,
    /// Target matching and port resolution
    pub validator: DeviceValidator,
    /// Flash engine
    pub flasher: Arc<dyn FirmwareFlasher>,
    /// Mount handling, used for unmounting removed volumes
    pub storage: Arc<StorageLifecycle>,
    /// Status lamp
    pub lamp: Arc<dyn StatusLamp>,
}

/// What a single step did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// A storage event was handled
    Storage(StorageEvent),
    /// A device event was handled
    Device(DeviceEvent),
    /// Neither queue had an event
    Idle,
}

struct EventQueue<T> {
    name: &'static str,
    receiver: mpsc::Receiver<T>,
    open: bool,
}

impl<T> EventQueue<T> {
    fn new(name: &'static str, receiver: mpsc::Receiver<T>) -> Self {
        Self {
            name,
            receiver,
            open: true,
        }
    }

    async fn poll(&mut self, wait: Duration) -> Option<T> {
        if !self.open {
            return None;
        }
        match timeout(wait, self.receiver.recv()).await {
            Ok(Some(event)) => Some(event),
            Ok(None) => {
                warn!(queue = self.name, "Event source closed");
                self.open = false;
                None
            }
            Err(_elapsed) => None,
        }
    }
}

/// Session state machine
pub struct Orchestrator {
    settings: SessionSettings,
    session: Session,
    storage_events: EventQueue<StorageEvent>,
    device_events: EventQueue<DeviceEvent>,
    parts: Collaborators,
    sources: Vec<WatcherHandle>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("settings", &self.settings)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Create an orchestrator consuming the two queues
    pub fn new(
        settings: SessionSettings,
        parts: Collaborators,
        storage_events: mpsc::Receiver<StorageEvent>,
        device_events: mpsc::Receiver<DeviceEvent>,
    ) -> Self {
        Self {
            settings,
            session: Session::default(),
            storage_events: EventQueue::new("storage", storage_events),
            device_events: EventQueue::new("device", device_events),
            parts,
            sources: Vec::new(),
        }
    }

    /// Hand over the producers feeding the queues; they are stopped on shutdown
    pub fn attach_sources(&mut self, sources: Vec<WatcherHandle>) {
        self.sources.extend(sources);
    }

    /// Current session
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        self.session.state
    }

    /// Show the lamp for the current state
    pub fn announce(&self) {
        self.parts.lamp.show(lamp_for(self.session.state));
    }

    /// One poll iteration: storage first, then device
    pub async fn step(&mut self) -> StepOutcome {
        let wait = self.settings.poll_interval;

        if let Some(event) = self.storage_events.poll(wait).await {
            self.handle_storage(event.clone()).await;
            return StepOutcome::Storage(event);
        }

        if let Some(event) = self.device_events.poll(wait).await {
            self.handle_device(event.clone()).await;
            return StepOutcome::Device(event);
        }

        if !self.storage_events.open && !self.device_events.open {
            sleep(wait).await;
        }
        StepOutcome::Idle
    }

    /// Step until `shutdown` turns true or its sender goes away, then shut down
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(state = %self.session.state, "Station ready");
        self.announce();

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                outcome = self.step() => {
                    if outcome != StepOutcome::Idle {
                        trace!(?outcome, "Step complete");
                    }
                }
            }
        }

        self.shutdown().await;
    }

    /// Stop the sources, unmount the active volume and release the lamp
    pub async fn shutdown(&mut self) {
        info!("Shutting down station");
        for source in self.sources.drain(..) {
            source.shutdown().await;
        }
        if let Some(volume) = self.session.active_volume.take() {
            let unmounted = self.parts.storage.unmount(&volume.mount_point).await;
            info!(mount_point = %volume.mount_point.display(), unmounted, "Released storage");
        }
        self.session.clear();
        self.session.state = SessionState::Idle;
        self.parts.lamp.show(fwstation_lamp::LampState::Off);
        self.parts.lamp.release();
        info!("Station stopped");
    }

    fn enter(&mut self, state: SessionState) {
        if self.session.state != state {
            debug!(from = %self.session.state, to = %state, "Session transition");
        }
        self.session.state = state;
        self.parts.lamp.show(lamp_for(state));
    }

    fn settle(&mut self) {
        let resting = self.session.resting_state();
        self.enter(resting);
    }

    async fn hold(&self, dwell: Duration) {
        if !dwell.is_zero() {
            sleep(dwell).await;
        }
    }

    async fn handle_storage(&mut self, event: StorageEvent) {
        match event {
            StorageEvent::Mounted(volume) => self.on_volume_mounted(volume).await,
            StorageEvent::Removed { block_device } => self.on_volume_removed(&block_device).await,
        }
    }

    async fn on_volume_mounted(&mut self, volume: StorageVolume) {
        info!(
            device = %volume.block_device.display(),
            mount_point = %volume.mount_point.display(),
            vendor = %volume.vendor_label,
            model = %volume.model_label,
            "Storage inserted"
        );

        if let Some(previous) = self.session.active_volume.take()
            && previous.mount_point != volume.mount_point
        {
            info!(mount_point = %previous.mount_point.display(), "Replacing active storage");
            self.parts.storage.unmount(&previous.mount_point).await;
        }
        self.session.trusted_firmware_path = None;
        self.session.active_volume = Some(volume.clone());
        self.enter(SessionState::ValidatingStorage);

        let verdict = self.parts.pipeline.verify(&volume.mount_point).await;
        if verdict.ok {
            if let Some(firmware) = verdict.firmware_path {
                let version = verdict
                    .manifest
                    .as_ref()
                    .map(|m| m.firmware_version.clone())
                    .unwrap_or_default();
                info!(firmware = %firmware.display(), %version, "Firmware trusted, waiting for device");
                self.session.trusted_firmware_path = Some(firmware);
            }
            self.settle();
            return;
        }

        warn!(reason = %verdict.reason, "Storage rejected");
        self.enter(SessionState::ErrorStorage);
        self.hold(self.settings.rejection_dwell).await;
        self.settle();
    }

    async fn on_volume_removed(&mut self, block_device: &Path) {
        let is_active = self
            .session
            .active_volume
            .as_ref()
            .is_some_and(|v| v.block_device == block_device);
        if !is_active {
            debug!(device = %block_device.display(), "Ignoring removal of inactive storage");
            return;
        }

        if let Some(volume) = self.session.active_volume.take() {
            let unmounted = self.parts.storage.unmount(&volume.mount_point).await;
            if !unmounted {
                warn!(mount_point = %volume.mount_point.display(), "Storage still mounted after removal");
            }
        }
        self.session.clear();
        info!(device = %block_device.display(), "Storage removed, session cleared");
        self.enter(SessionState::Idle);
    }

    async fn handle_device(&mut self, event: DeviceEvent) {
        match event {
            DeviceEvent::Connected(device) => self.on_device_connected(device).await,
            DeviceEvent::Disconnected(device) => {
                debug!(device = %device.system_name, ids = %device.id_pair(), "Device disconnected");
            }
        }
    }

    async fn on_device_connected(&mut self, device: TargetDevice) {
        if !self.parts.validator.is_target(&device) {
            debug!(device = %device.system_name, ids = %device.id_pair(), "Ignoring non-target device");
            return;
        }
        info!(device = %device.system_name, ids = %device.id_pair(), "Target device connected");
        self.enter(SessionState::ValidatingDevice);

        let Some(firmware) = self.session.trusted_firmware_path.clone() else {
            warn!("No verified firmware, refusing to flash");
            self.enter(SessionState::Error);
            self.hold(self.settings.rejection_dwell).await;
            self.settle();
            return;
        };

        let port = match self.parts.validator.resolve_port(&device).await {
            Ok(port) => port,
            Err(e) => {
                warn!(error = %e, "Cannot flash device");
                self.enter(SessionState::Error);
                self.hold(self.settings.rejection_dwell).await;
                self.settle();
                return;
            }
        };
        let device = device.with_port(&port);

        self.enter(SessionState::Flashing);
        let outcome = self.parts.flasher.flash(&port, &firmware).await;

        if outcome.ok {
            info!(
                device = %device.system_name,
                port = device.comm_port.as_deref().unwrap_or_default(),
                attempts = outcome.attempts_used,
                elapsed_seconds = outcome.elapsed_seconds,
                "Flash successful"
            );
            self.enter(SessionState::Success);
            self.hold(self.settings.result_dwell).await;
            if self.settings.consume_on_success {
                debug!("Trusted firmware consumed");
                self.session.trusted_firmware_path = None;
            }
        } else {
            warn!(
                device = %device.system_name,
                reason = %outcome.reason,
                attempts = outcome.attempts_used,
                "Flash failed"
            );
            self.enter(SessionState::Error);
            self.hold(self.settings.result_dwell).await;
        }
        self.settle();
    }
}
