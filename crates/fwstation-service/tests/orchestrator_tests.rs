//! Session state machine behavior against recorded collaborators

#![cfg(unix)]

mod common;

use common::{FakeMounts, MockFlasher, RecordingLamp};
use fwstation_config::{SignatureScheme, StationConfig};
use fwstation_hotplug::prelude::*;
use fwstation_lamp::LampState;
use fwstation_service::prelude::*;
use fwstation_test_helpers::prelude::*;
use fwstation_verify::{VerificationPipeline, VerificationPolicy};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

const BLOCK_DEVICE: &str = "/dev/sdb1";

struct Options {
    serial_port: bool,
    consume_on_success: bool,
    flasher: MockFlasher,
    volume: VolumeFixture,
}

impl Options {
    fn new() -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self {
            serial_port: true,
            consume_on_success: false,
            flasher: MockFlasher::succeeding(),
            volume: VolumeFixture::builder().build()?,
        })
    }
}

struct Rig {
    sys: SysfsFixture,
    _media: tempfile::TempDir,
    volume: VolumeFixture,
    mounts: Arc<FakeMounts>,
    lamp: Arc<RecordingLamp>,
    flasher: Arc<MockFlasher>,
    storage_tx: mpsc::Sender<StorageEvent>,
    device_tx: mpsc::Sender<DeviceEvent>,
    orchestrator: Orchestrator,
}

impl Rig {
    fn new() -> Result<Self, Box<dyn std::error::Error>> {
        Self::with(Options::new()?)
    }

    fn with(options: Options) -> Result<Self, Box<dyn std::error::Error>> {
        let sys = SysfsFixture::new()?;
        sys.add_usb_device("1-1", "2341", "0043")?;
        if options.serial_port {
            sys.add_serial_port("1-1", "ttyACM0")?;
        }
        let volume = options.volume;
        let root = volume.root().display().to_string();
        sys.write_mounts(&[(BLOCK_DEVICE, root.as_str())])?;

        let mut config = StationConfig::default();
        config.security.scheme = SignatureScheme::Ed25519;
        config.security.public_key_path = volume.public_key_path().to_path_buf();

        let media = tempfile::tempdir()?;
        let mounts = Arc::new(FakeMounts::new(sys.mounts_path()));
        let storage = Arc::new(StorageLifecycle::new(
            StorageSettings {
                mount_base: media.path().join("fwstation"),
                mount_options: "rw".to_string(),
                mount_attempts: 1,
                mount_retry_delay: Duration::ZERO,
                settle_delay: Duration::ZERO,
                unmount_settle: Duration::ZERO,
            },
            MountTable::new(sys.mounts_path()),
            mounts.clone(),
        ));

        let bus: Arc<dyn DeviceBus> = Arc::new(SysfsBus::new(sys.sysfs_root(), sys.dev_root()));
        let validator =
            DeviceValidator::new("2341", "0043", Vec::new(), Duration::ZERO, sys.dev_root(), bus);

        let lamp = Arc::new(RecordingLamp::default());
        let flasher = Arc::new(options.flasher);
        let (storage_tx, storage_rx) = mpsc::channel(8);
        let (device_tx, device_rx) = mpsc::channel(8);

        let orchestrator = Orchestrator::new(
            SessionSettings {
                poll_interval: Duration::from_millis(10),
                result_dwell: Duration::ZERO,
                rejection_dwell: Duration::ZERO,
                consume_on_success: options.consume_on_success,
            },
            Collaborators {
                pipeline: VerificationPipeline::new(VerificationPolicy::from_config(&config)),
                validator,
                flasher: flasher.clone(),
                storage,
                lamp: lamp.clone(),
            },
            storage_rx,
            device_rx,
        );

        Ok(Self {
            sys,
            _media: media,
            volume,
            mounts,
            lamp,
            flasher,
            storage_tx,
            device_tx,
            orchestrator,
        })
    }

    fn inserted(&self) -> StorageEvent {
        StorageEvent::Mounted(StorageVolume {
            block_device: PathBuf::from(BLOCK_DEVICE),
            mount_point: self.volume.root().to_path_buf(),
            vendor_label: "SanDisk".to_string(),
            model_label: "Cruzer Blade".to_string(),
        })
    }

    fn removed(&self) -> StorageEvent {
        StorageEvent::Removed {
            block_device: PathBuf::from(BLOCK_DEVICE),
        }
    }

    async fn insert_volume(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.storage_tx.send(self.inserted()).await?;
        let outcome = self.orchestrator.step().await;
        assert!(matches!(outcome, StepOutcome::Storage(StorageEvent::Mounted(_))));
        Ok(())
    }

    async fn connect(&mut self, device: TargetDevice) -> Result<(), Box<dyn std::error::Error>> {
        self.device_tx.send(DeviceEvent::Connected(device)).await?;
        let outcome = self.orchestrator.step().await;
        assert!(matches!(outcome, StepOutcome::Device(DeviceEvent::Connected(_))));
        Ok(())
    }
}

fn target() -> TargetDevice {
    device("2341", "0043")
}

fn device(vid: &str, pid: &str) -> TargetDevice {
    TargetDevice {
        vendor_id: vid.to_string(),
        product_id: pid.to_string(),
        system_name: "1-1".to_string(),
        node_path: Some(PathBuf::from("/dev/bus/usb/001/002")),
        comm_port: None,
    }
}

#[tokio::test]
async fn verified_volume_waits_for_device() -> TestResult {
    let mut rig = Rig::new()?;
    rig.insert_volume().await?;

    let session = rig.orchestrator.session();
    assert_eq!(rig.orchestrator.state(), SessionState::AwaitingDevice);
    assert_eq!(session.trusted_firmware_path, Some(rig.volume.image_path()));
    assert_eq!(
        session.active_volume.as_ref().map(|v| v.mount_point.clone()),
        Some(rig.volume.root().to_path_buf())
    );
    assert_eq!(rig.lamp.transitions(), vec![LampState::Validating, LampState::Idle]);
    Ok(())
}

#[tokio::test]
async fn target_without_firmware_is_refused() -> TestResult {
    let mut rig = Rig::new()?;
    rig.connect(target()).await?;

    assert!(rig.flasher.calls().is_empty());
    assert_eq!(rig.orchestrator.state(), SessionState::Idle);
    assert_eq!(
        rig.lamp.transitions(),
        vec![LampState::Validating, LampState::Error, LampState::Idle]
    );
    Ok(())
}

#[tokio::test]
async fn trusted_firmware_is_flashed_to_resolved_port() -> TestResult {
    let mut rig = Rig::new()?;
    rig.insert_volume().await?;
    rig.lamp.clear_history();

    rig.connect(target()).await?;

    let calls = rig.flasher.calls();
    assert_eq!(calls.len(), 1);
    let (port, firmware) = must_some(calls.first().cloned(), "one flash call");
    assert!(port.ends_with("ttyACM0"), "unexpected port {port}");
    assert_eq!(firmware, rig.volume.image_path());

    assert_eq!(
        rig.lamp.transitions(),
        vec![
            LampState::Validating,
            LampState::Updating,
            LampState::Success,
            LampState::Idle
        ]
    );
    // firmware stays trusted for the next device
    assert_eq!(rig.orchestrator.state(), SessionState::AwaitingDevice);
    assert!(rig.orchestrator.session().has_trusted_firmware());
    Ok(())
}

#[tokio::test]
async fn consumed_firmware_needs_new_volume() -> TestResult {
    let mut options = Options::new()?;
    options.consume_on_success = true;
    let mut rig = Rig::with(options)?;
    rig.insert_volume().await?;

    rig.connect(target()).await?;
    assert_eq!(rig.flasher.calls().len(), 1);
    assert_eq!(rig.orchestrator.state(), SessionState::Idle);
    assert!(!rig.orchestrator.session().has_trusted_firmware());

    rig.connect(target()).await?;
    assert_eq!(rig.flasher.calls().len(), 1);
    Ok(())
}

#[tokio::test]
async fn failed_flash_keeps_firmware() -> TestResult {
    let mut options = Options::new()?;
    options.flasher = MockFlasher::failing();
    let mut rig = Rig::with(options)?;
    rig.insert_volume().await?;
    rig.lamp.clear_history();

    rig.connect(target()).await?;

    assert_eq!(
        rig.lamp.transitions(),
        vec![
            LampState::Validating,
            LampState::Updating,
            LampState::Error,
            LampState::Idle
        ]
    );
    assert_eq!(rig.orchestrator.state(), SessionState::AwaitingDevice);
    Ok(())
}

#[tokio::test]
async fn missing_serial_port_is_an_error_without_flashing() -> TestResult {
    let mut options = Options::new()?;
    options.serial_port = false;
    let mut rig = Rig::with(options)?;
    rig.insert_volume().await?;
    rig.lamp.clear_history();

    rig.connect(target()).await?;

    assert!(rig.flasher.calls().is_empty());
    assert_eq!(
        rig.lamp.transitions(),
        vec![LampState::Validating, LampState::Error, LampState::Idle]
    );
    assert_eq!(rig.orchestrator.state(), SessionState::AwaitingDevice);
    assert!(rig.orchestrator.session().has_trusted_firmware());
    Ok(())
}

#[tokio::test]
async fn unreadable_sysfs_is_a_device_rejection() -> TestResult {
    let mut options = Options::new()?;
    options.serial_port = false;
    let mut rig = Rig::with(options)?;
    let tty_class = rig.sys.sysfs_root().join("class/tty");
    std::fs::remove_dir_all(&tty_class)?;
    std::fs::write(&tty_class, b"")?;
    rig.insert_volume().await?;
    rig.lamp.clear_history();

    rig.connect(target()).await?;

    assert!(rig.flasher.calls().is_empty());
    assert_eq!(
        rig.lamp.transitions(),
        vec![LampState::Validating, LampState::Error, LampState::Idle]
    );
    assert_eq!(rig.orchestrator.state(), SessionState::AwaitingDevice);
    Ok(())
}

#[tokio::test]
async fn other_devices_are_ignored() -> TestResult {
    let mut rig = Rig::new()?;
    rig.insert_volume().await?;
    rig.lamp.clear_history();

    rig.connect(device("046d", "c52b")).await?;

    assert!(rig.flasher.calls().is_empty());
    assert!(rig.lamp.history().is_empty());
    assert_eq!(rig.orchestrator.state(), SessionState::AwaitingDevice);
    Ok(())
}

#[tokio::test]
async fn tampered_volume_is_rejected() -> TestResult {
    let mut options = Options::new()?;
    options.volume.flip_image_bit(5, 2)?;
    let mut rig = Rig::with(options)?;

    rig.insert_volume().await?;

    assert_eq!(
        rig.lamp.transitions(),
        vec![LampState::Validating, LampState::Error, LampState::Idle]
    );
    assert_eq!(rig.orchestrator.state(), SessionState::Idle);
    assert!(!rig.orchestrator.session().has_trusted_firmware());

    rig.connect(target()).await?;
    assert!(rig.flasher.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn second_volume_replaces_the_active_one() -> TestResult {
    let mut rig = Rig::new()?;
    rig.insert_volume().await?;
    assert!(rig.orchestrator.session().has_trusted_firmware());

    let replacement = VolumeFixture::builder().build()?;
    replacement.flip_image_bit(5, 2)?;
    rig.storage_tx
        .send(StorageEvent::Mounted(StorageVolume {
            block_device: PathBuf::from("/dev/sdc1"),
            mount_point: replacement.root().to_path_buf(),
            vendor_label: "Kingston".to_string(),
            model_label: "DataTraveler".to_string(),
        }))
        .await?;
    let outcome = rig.orchestrator.step().await;
    assert!(matches!(outcome, StepOutcome::Storage(StorageEvent::Mounted(_))));

    assert!(rig.mounts.unmounted(rig.volume.root()));
    let session = rig.orchestrator.session();
    assert!(!session.has_trusted_firmware());
    assert_eq!(
        session.active_volume.as_ref().map(|v| v.block_device.clone()),
        Some(PathBuf::from("/dev/sdc1"))
    );
    // the rejected replacement decides the state
    assert_eq!(rig.orchestrator.state(), SessionState::Idle);

    rig.connect(target()).await?;
    assert!(rig.flasher.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn second_valid_volume_becomes_trusted() -> TestResult {
    let mut rig = Rig::new()?;
    rig.insert_volume().await?;

    let replacement = VolumeFixture::builder().build()?;
    rig.storage_tx
        .send(StorageEvent::Mounted(StorageVolume {
            block_device: PathBuf::from("/dev/sdc1"),
            mount_point: replacement.root().to_path_buf(),
            vendor_label: "Kingston".to_string(),
            model_label: "DataTraveler".to_string(),
        }))
        .await?;
    rig.orchestrator.step().await;

    assert!(rig.mounts.unmounted(rig.volume.root()));
    assert_eq!(rig.orchestrator.state(), SessionState::AwaitingDevice);
    assert_eq!(
        rig.orchestrator.session().trusted_firmware_path,
        Some(replacement.image_path())
    );
    Ok(())
}

#[tokio::test]
async fn storage_is_handled_before_waiting_devices() -> TestResult {
    let mut rig = Rig::new()?;
    rig.device_tx.send(DeviceEvent::Connected(target())).await?;
    rig.storage_tx.send(rig.inserted()).await?;

    let first = rig.orchestrator.step().await;
    assert!(matches!(first, StepOutcome::Storage(StorageEvent::Mounted(_))));
    assert!(rig.flasher.calls().is_empty());

    let second = rig.orchestrator.step().await;
    assert!(matches!(second, StepOutcome::Device(DeviceEvent::Connected(_))));
    assert_eq!(rig.flasher.calls().len(), 1);
    Ok(())
}

#[tokio::test]
async fn removal_during_flash_waits_for_the_flash() -> TestResult {
    let mut options = Options::new()?;
    options.flasher = MockFlasher::succeeding().taking(Duration::from_millis(100));
    let mut rig = Rig::with(options)?;
    rig.insert_volume().await?;
    rig.flasher
        .inject_during_flash(rig.storage_tx.clone(), rig.removed());

    rig.connect(target()).await?;

    // the flash ran to completion with the volume still attached
    assert_eq!(rig.flasher.calls().len(), 1);
    assert!(rig.lamp.history().contains(&LampState::Success));
    assert_eq!(rig.orchestrator.state(), SessionState::AwaitingDevice);
    assert!(!rig.mounts.unmounted(rig.volume.root()));

    let next = rig.orchestrator.step().await;
    assert!(matches!(next, StepOutcome::Storage(StorageEvent::Removed { .. })));
    assert_eq!(rig.orchestrator.state(), SessionState::Idle);
    assert!(!rig.orchestrator.session().has_trusted_firmware());
    assert_eq!(rig.orchestrator.session().active_volume, None);
    assert!(rig.mounts.unmounted(rig.volume.root()));
    Ok(())
}

#[tokio::test]
async fn removal_of_other_storage_is_ignored() -> TestResult {
    let mut rig = Rig::new()?;
    rig.insert_volume().await?;

    rig.storage_tx
        .send(StorageEvent::Removed {
            block_device: PathBuf::from("/dev/sdc1"),
        })
        .await?;
    let outcome = rig.orchestrator.step().await;
    assert!(matches!(outcome, StepOutcome::Storage(StorageEvent::Removed { .. })));

    assert_eq!(rig.orchestrator.state(), SessionState::AwaitingDevice);
    assert!(rig.orchestrator.session().has_trusted_firmware());
    assert!(rig.mounts.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn empty_queues_step_idle() -> TestResult {
    let mut rig = Rig::new()?;
    assert_eq!(rig.orchestrator.step().await, StepOutcome::Idle);
    assert_eq!(rig.orchestrator.state(), SessionState::Idle);
    Ok(())
}

#[tokio::test]
async fn shutdown_releases_storage_and_lamp() -> TestResult {
    let rig = Rig::new()?;
    rig.storage_tx.send(rig.inserted()).await?;

    let Rig {
        orchestrator,
        lamp,
        mounts,
        volume,
        storage_tx,
        device_tx,
        sys: _sys,
        _media,
        ..
    } = rig;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(orchestrator.run(shutdown_rx));

    tokio::time::sleep(Duration::from_millis(200)).await;
    shutdown_tx.send(true)?;
    tokio::time::timeout(Duration::from_secs(5), task).await??;

    assert!(mounts.unmounted(volume.root()));
    assert!(lamp.is_released());
    assert_eq!(lamp.history().last(), Some(&LampState::Off));
    assert!(lamp.history().contains(&LampState::Validating));
    drop((storage_tx, device_tx));
    Ok(())
}
