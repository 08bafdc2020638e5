//! Configuration sections and YAML loading

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Default location of the station configuration file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/fwstation/config.yaml";

/// Complete station configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    /// Identity of the device being provisioned
    pub target_device: TargetDeviceConfig,
    /// Firmware package layout and flashing parameters
    pub firmware: FirmwareConfig,
    /// Trust checks applied to the storage volume
    pub security: SecurityConfig,
    /// Status lamp wiring
    pub gpio: GpioConfig,
    /// Removable storage handling
    pub storage: StorageConfig,
    /// Target device discovery
    pub device: DeviceConfig,
    /// Orchestrator timing
    pub session: SessionConfig,
}

/// Identity of the device being provisioned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetDeviceConfig {
    /// USB vendor id as hex, e.g. `2341`
    pub vid: String,
    /// USB product id as hex, e.g. `0043`
    pub pid: String,
    /// Human-readable name, also compared against the manifest
    pub name: String,
}

impl Default for TargetDeviceConfig {
    fn default() -> Self {
        Self {
            vid: "2341".to_string(),
            pid: "0043".to_string(),
            name: "Target Device".to_string(),
        }
    }
}

/// Firmware package layout on the volume plus flashing parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FirmwareConfig {
    /// Manifest path, relative to the volume root
    pub device_info_path: PathBuf,
    /// Firmware image path, relative to the volume root
    pub path: PathBuf,
    /// Detached signature over the manifest, relative to the volume root
    pub certificate_path: PathBuf,
    /// File holding the expected image digest, relative to the volume root
    pub checksum_path: PathBuf,
    /// Flash tool command template with `{port}`, `{firmware}` and `{baudrate}`
    pub command: String,
    /// Per-attempt timeout in seconds
    pub timeout: u64,
    /// Serial baud rate substituted into the command
    pub baudrate: u32,
    /// Maximum number of flash attempts
    pub retry_count: u32,
    /// Delay between attempts in seconds
    pub retry_delay: u64,
    /// Settle delay before the first attempt in milliseconds
    pub settle_delay_ms: u64,
    /// Stop retrying as soon as the flash tool is missing
    pub abort_on_missing_tool: bool,
}

impl Default for FirmwareConfig {
    fn default() -> Self {
        Self {
            device_info_path: PathBuf::from("device_info.json"),
            path: PathBuf::from("firmware.bin"),
            certificate_path: PathBuf::from("device_info.sig"),
            checksum_path: PathBuf::from("firmware.sha256"),
            command: "avrdude -p m328p -c arduino -P {port} -b {baudrate} -U flash:w:{firmware}:i"
                .to_string(),
            timeout: 60,
            baudrate: 115_200,
            retry_count: 3,
            retry_delay: 2,
            settle_delay_ms: 200,
            abort_on_missing_tool: false,
        }
    }
}

impl FirmwareConfig {
    /// Per-attempt timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Delay between attempts
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay)
    }

    /// Settle delay before the first attempt
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// Signature scheme used for the manifest signature
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureScheme {
    /// RSA or EC key checked by `openssl dgst -sha256 -verify`
    #[default]
    Openssl,
    /// Ed25519 key checked in-process
    Ed25519,
}

/// Trust checks applied to the storage volume
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Require a valid manifest signature
    pub require_certificate: bool,
    /// Require the image digest to match the checksum file
    pub verify_checksum: bool,
    /// Public key used for signature checks
    pub public_key_path: PathBuf,
    /// Signature scheme of `public_key_path`
    pub scheme: SignatureScheme,
    /// Executable used by the openssl scheme
    pub verifier_tool: String,
    /// Signature check timeout in seconds
    pub verify_timeout: u64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            require_certificate: true,
            verify_checksum: true,
            public_key_path: PathBuf::from("/etc/fwstation/public_key.pem"),
            scheme: SignatureScheme::Openssl,
            verifier_tool: "openssl".to_string(),
            verify_timeout: 10,
        }
    }
}

impl SecurityConfig {
    /// Whether the configured public key file exists
    pub fn key_present(&self) -> bool {
        self.public_key_path.is_file()
    }

    /// Signature checking as it will actually run.
    ///
    /// A missing public key disables the check instead of failing every volume.
    pub fn effective_require_certificate(&self) -> bool {
        self.require_certificate && self.key_present()
    }

    /// Signature check timeout
    pub fn verify_timeout(&self) -> Duration {
        Duration::from_secs(self.verify_timeout)
    }
}

/// Status lamp wiring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpioConfig {
    /// Green lamp line
    pub led_green: u32,
    /// Yellow lamp line
    pub led_yellow: u32,
    /// Red lamp line
    pub led_red: u32,
    /// Root of the sysfs GPIO interface
    pub chip_path: PathBuf,
}

impl Default for GpioConfig {
    fn default() -> Self {
        Self {
            led_green: 17,
            led_yellow: 27,
            led_red: 22,
            chip_path: PathBuf::from("/sys/class/gpio"),
        }
    }
}

/// Removable storage handling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory under which volumes are mounted
    pub mount_base: PathBuf,
    /// Options passed to `mount -o`
    pub mount_options: String,
    /// Mount attempts per volume
    pub mount_attempts: u32,
    /// Delay between mount attempts in milliseconds
    pub mount_retry_delay_ms: u64,
    /// Wait after a partition appears before mounting, in milliseconds
    pub settle_delay_ms: u64,
    /// Wait after unmounting before removing the directory, in milliseconds
    pub unmount_settle_ms: u64,
    /// Run mount commands through `sudo -n`
    pub use_sudo: bool,
    /// Timeout for a single mount or unmount command in seconds
    pub mount_timeout: u64,
    /// Live mount table
    pub mounts_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            mount_base: PathBuf::from("/media/fwstation"),
            mount_options: "rw,umask=000".to_string(),
            mount_attempts: 3,
            mount_retry_delay_ms: 1000,
            settle_delay_ms: 1000,
            unmount_settle_ms: 500,
            use_sudo: false,
            mount_timeout: 15,
            mounts_path: PathBuf::from("/proc/mounts"),
        }
    }
}

/// Target device discovery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Serial nodes tried when the connect notification carries no tty node
    pub port_candidates: Vec<PathBuf>,
    /// Wait before probing serial nodes, in milliseconds
    pub port_settle_delay_ms: u64,
    /// Root of sysfs
    pub sysfs_root: PathBuf,
    /// Root of device nodes
    pub dev_root: PathBuf,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            port_candidates: [
                "/dev/ttyUSB0",
                "/dev/ttyUSB1",
                "/dev/ttyUSB2",
                "/dev/ttyACM0",
                "/dev/ttyACM1",
            ]
            .iter()
            .map(PathBuf::from)
            .collect(),
            port_settle_delay_ms: 1000,
            sysfs_root: PathBuf::from("/sys"),
            dev_root: PathBuf::from("/dev"),
        }
    }
}

/// Orchestrator timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Poll timeout per queue, in milliseconds
    pub poll_interval_ms: u64,
    /// Capacity of each event queue
    pub queue_capacity: usize,
    /// Interval between hotplug scans, in milliseconds
    pub scan_interval_ms: u64,
    /// How long the success or error lamp is held after a flash, in seconds
    pub result_dwell: u64,
    /// How long the error lamp is held after a refused device, in seconds
    pub rejection_dwell: u64,
    /// Forget the trusted firmware after one successful flash
    pub consume_on_success: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            queue_capacity: 32,
            scan_interval_ms: 500,
            result_dwell: 5,
            rejection_dwell: 3,
            consume_on_success: false,
        }
    }
}

impl SessionConfig {
    /// Poll timeout per queue
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Hotplug scan interval
    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }

    /// Lamp hold after a flash outcome
    pub fn result_dwell(&self) -> Duration {
        Duration::from_secs(self.result_dwell)
    }

    /// Lamp hold after a refused device
    pub fn rejection_dwell(&self) -> Duration {
        Duration::from_secs(self.rejection_dwell)
    }
}

impl StationConfig {
    /// Parse a YAML document. Missing sections and fields take their defaults.
    pub fn from_yaml_str(document: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(document)?)
    }

    /// Read and parse a YAML file without applying overrides or validation
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let document = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&document)
    }

    /// Load `path`, apply process environment overrides, then validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_path(path)?;
        for applied in config.apply_env_overrides(|key| std::env::var(key).ok()) {
            info!(variable = applied.variable, value = %applied.value, "Applied environment override");
        }
        config.validate()?;
        config.log_security_posture();
        Ok(config)
    }

    /// Serialize back to YAML, used to print the effective configuration
    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Report checks that will not run as configured
    pub fn log_security_posture(&self) {
        let security = &self.security;
        if security.require_certificate && !security.key_present() {
            warn!(
                key = %security.public_key_path.display(),
                "Public key not found, signature verification is disabled"
            );
        }
        if !security.require_certificate {
            warn!("Signature verification disabled by configuration");
        }
        if !security.verify_checksum {
            warn!("Checksum verification disabled by configuration");
        }
    }
}
