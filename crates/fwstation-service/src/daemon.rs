//! Station daemon: builds the orchestrator from configuration and runs it
//! until a shutdown signal arrives.

use crate::error::ServiceError;
use crate::orchestrator::{Collaborators, Orchestrator, SessionSettings};
use fwstation_config::{GpioConfig, StationConfig};
use fwstation_flash::{FlashEngine, FlashSettings};
use fwstation_hotplug::{
    DeviceBus, DeviceValidator, DeviceWatcher, MountTable, StorageLifecycle, StorageSettings,
    StorageWatcher, SysfsBus, SystemMountService,
};
use fwstation_lamp::{GpioLamp, LogLamp, StatusLamp};
use fwstation_verify::{VerificationPipeline, VerificationPolicy};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

/// Lamp for the station: GPIO unless disabled or unavailable
pub fn open_lamp(gpio: &GpioConfig, no_gpio: bool) -> Arc<dyn StatusLamp> {
    if no_gpio {
        info!("GPIO disabled, lamp states are only logged");
        return Arc::new(LogLamp::new());
    }
    match GpioLamp::open(gpio) {
        Ok(lamp) => Arc::new(lamp),
        Err(e) => {
            warn!(error = %e, "GPIO unavailable, lamp states are only logged");
            Arc::new(LogLamp::new())
        }
    }
}

/// The provisioning station process
#[derive(Debug)]
pub struct StationDaemon {
    config: StationConfig,
    no_gpio: bool,
}

impl StationDaemon {
    /// Daemon for a loaded and validated configuration
    pub fn new(config: StationConfig, no_gpio: bool) -> Self {
        Self { config, no_gpio }
    }

    /// Open the event sources and assemble the orchestrator.
    ///
    /// Fails only when an event source cannot be started.
    pub async fn build(&self) -> Result<Orchestrator, ServiceError> {
        let config = &self.config;
        let lamp = open_lamp(&config.gpio, self.no_gpio);

        let bus: Arc<dyn DeviceBus> = Arc::new(SysfsBus::new(
            config.device.sysfs_root.clone(),
            config.device.dev_root.clone(),
        ));
        let storage = Arc::new(StorageLifecycle::new(
            StorageSettings::from_config(&config.storage),
            MountTable::new(config.storage.mounts_path.clone()),
            Arc::new(SystemMountService::new(
                config.storage.use_sudo,
                Duration::from_secs(config.storage.mount_timeout),
            )),
        ));

        let engine = FlashEngine::new(FlashSettings::from_config(&config.firmware));
        match engine.tool_version().await {
            Ok(banner) => info!(tool = %banner, "Flash tool available"),
            Err(e) => warn!(error = %e, "Flash tool not available, make sure it is installed"),
        }

        let capacity = config.session.queue_capacity.max(1);
        let (storage_tx, storage_rx) = mpsc::channel(capacity);
        let (device_tx, device_rx) = mpsc::channel(capacity);

        let mut orchestrator = Orchestrator::new(
            SessionSettings::from_config(&config.session),
            Collaborators {
                pipeline: VerificationPipeline::new(VerificationPolicy::from_config(config)),
                validator: DeviceValidator::from_config(config, bus.clone()),
                flasher: Arc::new(engine),
                storage: storage.clone(),
                lamp,
            },
            storage_rx,
            device_rx,
        );

        let scan_interval = config.session.scan_interval();
        let storage_source =
            StorageWatcher::spawn(bus.clone(), storage, scan_interval, storage_tx)
                .await
                .map_err(|e| ServiceError::EventSource(format!("storage: {e}")))?;
        let device_source = DeviceWatcher::spawn(bus, scan_interval, device_tx)
            .map_err(|e| ServiceError::EventSource(format!("device: {e}")))?;
        orchestrator.attach_sources(vec![storage_source, device_source]);

        info!(
            target_vid = %config.target_device.vid,
            target_pid = %config.target_device.pid,
            target = %config.target_device.name,
            mount_base = %config.storage.mount_base.display(),
            "Station assembled"
        );
        Ok(orchestrator)
    }

    /// Run until SIGINT, SIGTERM or SIGHUP
    pub async fn run(self) -> Result<(), ServiceError> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(wait_for_shutdown_signal(shutdown_tx));

        let orchestrator = self.build().await?;
        orchestrator.run(shutdown_rx).await;
        Ok(())
    }
}

/// Wait for a termination signal and flip `shutdown` to `true`
pub async fn wait_for_shutdown_signal(shutdown: watch::Sender<bool>) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
            signal(SignalKind::hangup()),
        ) {
            (Ok(mut sigterm), Ok(mut sigint), Ok(mut sighup)) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                    _ = sigint.recv() => info!("Received SIGINT"),
                    _ = sighup.recv() => info!("Received SIGHUP"),
                }
            }
            _ => {
                error!("Failed to register signal handlers, falling back to Ctrl+C");
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!(error = %e, "Error waiting for Ctrl+C");
                    return;
                }
                info!("Received Ctrl+C");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Error waiting for Ctrl+C");
            return;
        }
        info!("Received Ctrl+C");
    }

    let _ = shutdown.send(true);
}
