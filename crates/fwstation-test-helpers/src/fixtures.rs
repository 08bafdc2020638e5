//! Fixture builders for firmware volumes and fake sysfs trees.

use ed25519_dalek::{Signer, SigningKey};
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Seed of the signing key used by [`VolumeFixture`]
pub const TEST_SIGNING_SEED: [u8; 32] = [7u8; 32];

/// Default manifest file name on a fixture volume
pub const MANIFEST_NAME: &str = "device_info.json";
/// Default image file name on a fixture volume
pub const IMAGE_NAME: &str = "firmware.bin";
/// Default signature file name on a fixture volume
pub const SIGNATURE_NAME: &str = "device_info.sig";
/// Default checksum file name on a fixture volume
pub const CHECKSUM_NAME: &str = "firmware.sha256";

/// Signing key matching [`TEST_SIGNING_SEED`]
pub fn test_signing_key() -> SigningKey {
    SigningKey::from_bytes(&TEST_SIGNING_SEED)
}

/// Manifest JSON with every field populated
pub fn sample_manifest(target_name: &str) -> String {
    serde_json::json!({
        "device_id": "FW-0001",
        "device_name": "Line 3 controller",
        "firmware_version": "1.4.2",
        "created_at": "2024-05-01T12:00:00Z",
        "target_device": target_name,
    })
    .to_string()
}

/// Hex SHA-256 of `data`
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Builder for [`VolumeFixture`]
#[derive(Debug, Clone)]
pub struct VolumeFixtureBuilder {
    manifest: Option<String>,
    image: Option<Vec<u8>>,
    checksum: ChecksumMode,
    signed: bool,
}

#[derive(Debug, Clone)]
enum ChecksumMode {
    None,
    Correct,
    Literal(String),
}

impl Default for VolumeFixtureBuilder {
    fn default() -> Self {
        Self {
            manifest: Some(sample_manifest("Target Device")),
            image: Some(b":100000000C9434000C9446000C9446000C944600A4\n".to_vec()),
            checksum: ChecksumMode::Correct,
            signed: true,
        }
    }
}

impl VolumeFixtureBuilder {
    /// Replace the manifest contents, or omit the file with `None`
    pub fn manifest(mut self, contents: Option<&str>) -> Self {
        self.manifest = contents.map(str::to_string);
        self
    }

    /// Replace the image contents, or omit the file with `None`
    pub fn image(mut self, contents: Option<&[u8]>) -> Self {
        self.image = contents.map(<[u8]>::to_vec);
        self
    }

    /// Omit the checksum file
    pub fn without_checksum(mut self) -> Self {
        self.checksum = ChecksumMode::None;
        self
    }

    /// Write `contents` verbatim as the checksum file
    pub fn checksum_contents(mut self, contents: &str) -> Self {
        self.checksum = ChecksumMode::Literal(contents.to_string());
        self
    }

    /// Omit the signature file
    pub fn unsigned(mut self) -> Self {
        self.signed = false;
        self
    }

    /// Write the volume and key files into a fresh temporary directory
    pub fn build(self) -> io::Result<VolumeFixture> {
        let dir = tempfile::tempdir()?;
        let root = dir.path().join("volume");
        let keys = dir.path().join("keys");
        fs::create_dir_all(&root)?;
        fs::create_dir_all(&keys)?;

        let signing_key = test_signing_key();
        let public_key_path = keys.join("public_key.hex");
        fs::write(
            &public_key_path,
            hex::encode(signing_key.verifying_key().to_bytes()),
        )?;

        if let Some(manifest) = &self.manifest {
            fs::write(root.join(MANIFEST_NAME), manifest)?;
            if self.signed {
                let signature = signing_key.sign(manifest.as_bytes());
                fs::write(root.join(SIGNATURE_NAME), hex::encode(signature.to_bytes()))?;
            }
        }

        if let Some(image) = &self.image {
            fs::write(root.join(IMAGE_NAME), image)?;
            match &self.checksum {
                ChecksumMode::None => {}
                ChecksumMode::Correct => {
                    fs::write(root.join(CHECKSUM_NAME), format!("{}\n", sha256_hex(image)))?;
                }
                ChecksumMode::Literal(contents) => {
                    fs::write(root.join(CHECKSUM_NAME), contents)?;
                }
            }
        } else if let ChecksumMode::Literal(contents) = &self.checksum {
            fs::write(root.join(CHECKSUM_NAME), contents)?;
        }

        Ok(VolumeFixture {
            _dir: dir,
            root,
            public_key_path,
        })
    }
}

/// A firmware volume laid out in a temporary directory.
///
/// The directory is removed when the fixture is dropped.
#[derive(Debug)]
pub struct VolumeFixture {
    _dir: TempDir,
    root: PathBuf,
    public_key_path: PathBuf,
}

impl VolumeFixture {
    /// Start building a volume with every file present and valid
    pub fn builder() -> VolumeFixtureBuilder {
        VolumeFixtureBuilder::default()
    }

    /// Volume root, what would be the mount point
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Hex-encoded Ed25519 public key matching the volume signature
    pub fn public_key_path(&self) -> &Path {
        &self.public_key_path
    }

    /// Absolute path of the image file
    pub fn image_path(&self) -> PathBuf {
        self.root.join(IMAGE_NAME)
    }

    /// Absolute path of the manifest file
    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_NAME)
    }

    /// Absolute path of the signature file
    pub fn signature_path(&self) -> PathBuf {
        self.root.join(SIGNATURE_NAME)
    }

    /// Absolute path of the checksum file
    pub fn checksum_path(&self) -> PathBuf {
        self.root.join(CHECKSUM_NAME)
    }

    /// Flip one bit of the image at `byte`
    pub fn flip_image_bit(&self, byte: usize, bit: u8) -> io::Result<()> {
        flip_bit(&self.image_path(), byte, bit)
    }

    /// Flip one bit of the manifest at `byte`
    pub fn flip_manifest_bit(&self, byte: usize, bit: u8) -> io::Result<()> {
        flip_bit(&self.manifest_path(), byte, bit)
    }

    /// Remove a file from the volume
    pub fn remove(&self, relative: &str) -> io::Result<()> {
        fs::remove_file(self.root.join(relative))
    }
}

fn flip_bit(path: &Path, byte: usize, bit: u8) -> io::Result<()> {
    let mut data = fs::read(path)?;
    let len = data.len();
    let Some(target) = data.get_mut(byte % len.max(1)) else {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty file"));
    };
    *target ^= 1 << (bit % 8);
    fs::write(path, data)
}

/// A fake sysfs and `/dev` tree for hotplug tests.
///
/// USB devices live under `sys/devices/usb1/<name>` with `bus/usb/devices`,
/// `class/tty` and `class/block` symlinks pointing into them, mirroring the
/// kernel layout closely enough for topology walks.
#[derive(Debug)]
pub struct SysfsFixture {
    dir: TempDir,
    next_devnum: std::cell::Cell<u32>,
}

impl SysfsFixture {
    /// Create an empty tree
    pub fn new() -> io::Result<Self> {
        let dir = tempfile::tempdir()?;
        for sub in [
            "sys/devices/usb1",
            "sys/devices/virtual/tty",
            "sys/devices/pci0000:00/ata1/host0/target0:0:0/0:0:0:0/block",
            "sys/bus/usb/devices",
            "sys/class/tty",
            "sys/class/block",
            "dev",
        ] {
            fs::create_dir_all(dir.path().join(sub))?;
        }
        Ok(Self {
            dir,
            next_devnum: std::cell::Cell::new(2),
        })
    }

    /// Root to hand to the bus as its sysfs root
    pub fn sysfs_root(&self) -> PathBuf {
        self.dir.path().join("sys")
    }

    /// Root to hand to the validator as its device-node root
    pub fn dev_root(&self) -> PathBuf {
        self.dir.path().join("dev")
    }

    /// Path for a mount table file inside the fixture
    pub fn mounts_path(&self) -> PathBuf {
        self.dir.path().join("mounts")
    }

    fn usb_device_dir(&self, name: &str) -> PathBuf {
        self.sysfs_root().join("devices/usb1").join(name)
    }

    /// Add a USB device with the given identifiers
    pub fn add_usb_device(&self, name: &str, vid: &str, pid: &str) -> io::Result<PathBuf> {
        let device = self.usb_device_dir(name);
        fs::create_dir_all(&device)?;
        let devnum = self.next_devnum.get();
        self.next_devnum.set(devnum + 1);
        fs::write(device.join("idVendor"), format!("{vid}\n"))?;
        fs::write(device.join("idProduct"), format!("{pid}\n"))?;
        fs::write(device.join("busnum"), "1\n")?;
        fs::write(device.join("devnum"), format!("{devnum}\n"))?;
        fs::write(device.join("manufacturer"), "Fixture Corp\n")?;
        fs::write(device.join("product"), format!("Device {name}\n"))?;
        symlink(&device, &self.sysfs_root().join("bus/usb/devices").join(name))?;
        Ok(device)
    }

    /// Add a USB-serial node under an existing USB device and create its `/dev` entry
    pub fn add_serial_port(&self, usb_name: &str, tty: &str) -> io::Result<PathBuf> {
        let node = self
            .usb_device_dir(usb_name)
            .join(format!("{usb_name}:1.0"))
            .join(tty)
            .join("tty")
            .join(tty);
        fs::create_dir_all(&node)?;
        symlink(&node, &self.sysfs_root().join("class/tty").join(tty))?;
        let devnode = self.dev_root().join(tty);
        fs::write(&devnode, b"")?;
        Ok(devnode)
    }

    /// Add a tty with no USB ancestor, like a virtual console
    pub fn add_virtual_tty(&self, tty: &str) -> io::Result<()> {
        let node = self.sysfs_root().join("devices/virtual/tty").join(tty);
        fs::create_dir_all(&node)?;
        symlink(&node, &self.sysfs_root().join("class/tty").join(tty))?;
        fs::write(self.dev_root().join(tty), b"")
    }

    /// Add a partition of a USB mass-storage disk under an existing USB device
    pub fn add_usb_partition(
        &self,
        usb_name: &str,
        disk: &str,
        partition: &str,
        vendor: &str,
        model: &str,
    ) -> io::Result<PathBuf> {
        let scsi = self
            .usb_device_dir(usb_name)
            .join(format!("{usb_name}:1.0"))
            .join("host6/target6:0:0/6:0:0:0");
        fs::create_dir_all(&scsi)?;
        fs::write(scsi.join("vendor"), format!("{vendor}  \n"))?;
        fs::write(scsi.join("model"), format!("{model}  \n"))?;
        self.add_partition_under(&scsi.join("block"), disk, partition)
    }

    /// Add a partition of an internal disk, with no USB ancestor
    pub fn add_internal_partition(&self, disk: &str, partition: &str) -> io::Result<PathBuf> {
        let block = self
            .sysfs_root()
            .join("devices/pci0000:00/ata1/host0/target0:0:0/0:0:0:0/block");
        self.add_partition_under(&block, disk, partition)
    }

    fn add_partition_under(&self, block: &Path, disk: &str, partition: &str) -> io::Result<PathBuf> {
        let disk_dir = block.join(disk);
        let part_dir = disk_dir.join(partition);
        fs::create_dir_all(&part_dir)?;
        fs::write(part_dir.join("partition"), "1\n")?;
        let disk_link = self.sysfs_root().join("class/block").join(disk);
        if fs::symlink_metadata(&disk_link).is_err() {
            symlink(&disk_dir, &disk_link)?;
        }
        symlink(&part_dir, &self.sysfs_root().join("class/block").join(partition))?;
        let devnode = self.dev_root().join(partition);
        fs::write(&devnode, b"")?;
        Ok(devnode)
    }

    /// Remove a USB device and everything below it. Class links are left dangling.
    pub fn remove_usb_device(&self, name: &str) -> io::Result<()> {
        fs::remove_file(self.sysfs_root().join("bus/usb/devices").join(name))?;
        fs::remove_dir_all(self.usb_device_dir(name))
    }

    /// Write a mount table in `/proc/mounts` format
    pub fn write_mounts(&self, entries: &[(&str, &str)]) -> io::Result<()> {
        let contents: String = entries
            .iter()
            .map(|(device, mount_point)| {
                format!("{device} {} vfat rw,relatime 0 0\n", mount_point.replace(' ', "\\040"))
            })
            .collect();
        fs::write(self.mounts_path(), contents)
    }
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
fn symlink(_target: &Path, _link: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "sysfs fixtures require unix symlinks",
    ))
}
