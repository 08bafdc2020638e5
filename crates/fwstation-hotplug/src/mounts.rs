//! Mount table lookups and mount commands

use crate::error::HotplugError;
use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

/// One line of the mount table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    /// Mounted device or source
    pub device: PathBuf,
    /// Mount point, octal escapes decoded
    pub mount_point: PathBuf,
}

/// Parse `/proc/mounts` content. Malformed lines are skipped.
pub fn parse_mounts(contents: &str) -> Vec<MountEntry> {
    contents
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let device = fields.next()?;
            let mount_point = fields.next()?;
            Some(MountEntry {
                device: PathBuf::from(unescape_mount_field(device)),
                mount_point: PathBuf::from(unescape_mount_field(mount_point)),
            })
        })
        .collect()
}

/// Decode the `\ooo` escapes the kernel uses for spaces, tabs and backslashes
fn unescape_mount_field(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut output = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while let Some(&byte) = bytes.get(i) {
        if byte == b'\\' {
            let digits = bytes.get(i + 1..i + 4);
            let value = digits
                .filter(|d| d.iter().all(|c| (b'0'..=b'7').contains(c)))
                .and_then(|d| std::str::from_utf8(d).ok())
                .and_then(|d| u8::from_str_radix(d, 8).ok());
            if let Some(value) = value {
                output.push(value);
                i += 4;
                continue;
            }
        }
        output.push(byte);
        i += 1;
    }
    String::from_utf8_lossy(&output).into_owned()
}

/// Reader over a mount table file
#[derive(Debug, Clone)]
pub struct MountTable {
    path: PathBuf,
}

impl MountTable {
    /// Table read from `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `/proc/mounts`
    pub fn proc() -> Self {
        Self::new("/proc/mounts")
    }

    /// Current entries. A missing table reads as empty.
    pub fn entries(&self) -> Result<Vec<MountEntry>, HotplugError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(parse_mounts(&contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(HotplugError::io(&self.path, e)),
        }
    }

    /// Where `device` is mounted, if anywhere
    pub fn mount_point_of(&self, device: &Path) -> Result<Option<PathBuf>, HotplugError> {
        Ok(self
            .entries()?
            .into_iter()
            .find(|entry| entry.device == device)
            .map(|entry| entry.mount_point))
    }

    /// Whether anything is mounted at `mount_point`
    pub fn is_mounted(&self, mount_point: &Path) -> Result<bool, HotplugError> {
        Ok(self
            .entries()?
            .iter()
            .any(|entry| entry.mount_point == mount_point))
    }
}

/// How an unmount should treat a busy filesystem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnmountMode {
    /// Detach now, clean up when no longer busy (`umount -l`)
    Lazy,
    /// Force the unmount (`umount -f`)
    Force,
}

/// Mount and unmount operations
#[async_trait]
pub trait MountService: Send + Sync {
    /// Mount `device` at `mount_point` with comma-separated `options`
    async fn mount(
        &self,
        device: &Path,
        mount_point: &Path,
        options: &str,
    ) -> Result<(), HotplugError>;

    /// Unmount whatever is mounted at `mount_point`
    async fn unmount(&self, mount_point: &Path, mode: UnmountMode) -> Result<(), HotplugError>;
}

/// [`MountService`] running the system `mount` and `umount` binaries
#[derive(Debug, Clone)]
pub struct SystemMountService {
    use_sudo: bool,
    limit: Duration,
}

impl SystemMountService {
    /// Service with a per-command timeout; `use_sudo` prefixes `sudo -n`
    pub fn new(use_sudo: bool, limit: Duration) -> Self {
        Self { use_sudo, limit }
    }

    async fn run(&self, program: &str, args: Vec<String>) -> Result<(), HotplugError> {
        let (program, args) = if self.use_sudo {
            let mut full = vec!["-n".to_string(), program.to_string()];
            full.extend(args);
            ("sudo", full)
        } else {
            (program, args)
        };
        let line = format!("{program} {}", args.join(" "));
        debug!(command = %line, "Running mount command");

        let mut command = Command::new(program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = timeout(self.limit, command.output())
            .await
            .map_err(|_elapsed| HotplugError::Timeout {
                command: line.clone(),
                secs: self.limit.as_secs(),
            })?
            .map_err(|e| HotplugError::Command {
                command: line.clone(),
                reason: e.to_string(),
            })?;

        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        let reason = match output.status.code() {
            Some(code) => format!("exit code {code}: {}", stderr.trim()),
            None => format!("terminated by signal: {}", stderr.trim()),
        };
        Err(HotplugError::Command {
            command: line,
            reason,
        })
    }
}

#[async_trait]
impl MountService for SystemMountService {
    async fn mount(
        &self,
        device: &Path,
        mount_point: &Path,
        options: &str,
    ) -> Result<(), HotplugError> {
        let mut args = Vec::new();
        if !options.is_empty() {
            args.push("-o".to_string());
            args.push(options.to_string());
        }
        args.push(device.display().to_string());
        args.push(mount_point.display().to_string());
        self.run("mount", args).await
    }

    async fn unmount(&self, mount_point: &Path, mode: UnmountMode) -> Result<(), HotplugError> {
        let flag = match mode {
            UnmountMode::Lazy => "-l",
            UnmountMode::Force => "-f",
        };
        self.run(
            "umount",
            vec![flag.to_string(), mount_point.display().to_string()],
        )
        .await
    }
}
