//! Output pins

use crate::error::LampError;
use parking_lot::Mutex;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// A single digital output
pub trait OutputPin: Send + 'static {
    /// Drive the pin high (`true`) or low
    fn set(&mut self, high: bool) -> Result<(), LampError>;

    /// Give the pin back to the system
    fn release(&mut self) -> Result<(), LampError>;
}

/// GPIO line driven through the sysfs interface (`/sys/class/gpio`)
#[derive(Debug)]
pub struct SysfsPin {
    chip_path: PathBuf,
    line: u32,
    value_path: PathBuf,
}

impl SysfsPin {
    /// Export `line` under `chip_path` and configure it as an output, initially low
    pub fn export(chip_path: &Path, line: u32) -> Result<Self, LampError> {
        let pin_dir = chip_path.join(format!("gpio{line}"));
        if !pin_dir.exists() {
            write_file(&chip_path.join("export"), &line.to_string())?;
        }
        write_file(&pin_dir.join("direction"), "out")?;
        let value_path = pin_dir.join("value");
        write_file(&value_path, "0")?;
        debug!(line, "GPIO line exported");
        Ok(Self {
            chip_path: chip_path.to_path_buf(),
            line,
            value_path,
        })
    }
}

impl OutputPin for SysfsPin {
    fn set(&mut self, high: bool) -> Result<(), LampError> {
        write_file(&self.value_path, if high { "1" } else { "0" })
    }

    fn release(&mut self) -> Result<(), LampError> {
        self.set(false)?;
        match fs::write(self.chip_path.join("unexport"), self.line.to_string()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(LampError::Io {
                path: self.chip_path.join("unexport"),
                source,
            }),
        }
    }
}

fn write_file(path: &Path, value: &str) -> Result<(), LampError> {
    fs::write(path, value).map_err(|source| LampError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Pin that records its level history in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryPin {
    levels: Arc<Mutex<Vec<bool>>>,
    released: Arc<Mutex<bool>>,
}

impl MemoryPin {
    /// New pin, initially low with no history
    pub fn new() -> Self {
        Self::default()
    }

    /// Current level
    pub fn is_high(&self) -> bool {
        self.levels.lock().last().copied().unwrap_or(false)
    }

    /// Every level written so far
    pub fn history(&self) -> Vec<bool> {
        self.levels.lock().clone()
    }

    /// Whether [`OutputPin::release`] was called
    pub fn is_released(&self) -> bool {
        *self.released.lock()
    }
}

impl OutputPin for MemoryPin {
    fn set(&mut self, high: bool) -> Result<(), LampError> {
        self.levels.lock().push(high);
        Ok(())
    }

    fn release(&mut self) -> Result<(), LampError> {
        self.levels.lock().push(false);
        *self.released.lock() = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sysfs_pin_exports_and_drives_value() -> Result<(), Box<dyn std::error::Error>> {
        let chip = tempfile::tempdir()?;
        // Stand in for the kernel creating the line directory on export.
        fs::create_dir_all(chip.path().join("gpio17"))?;

        let mut pin = SysfsPin::export(chip.path(), 17)?;
        assert_eq!(fs::read_to_string(chip.path().join("gpio17/direction"))?, "out");
        pin.set(true)?;
        assert_eq!(fs::read_to_string(chip.path().join("gpio17/value"))?, "1");
        pin.release()?;
        assert_eq!(fs::read_to_string(chip.path().join("gpio17/value"))?, "0");
        assert_eq!(fs::read_to_string(chip.path().join("unexport"))?, "17");
        Ok(())
    }

    #[test]
    fn export_fails_without_gpio_interface() {
        let result = SysfsPin::export(Path::new("/nonexistent/fwstation/gpio"), 17);
        assert!(matches!(result, Err(LampError::Io { .. })));
    }
}
