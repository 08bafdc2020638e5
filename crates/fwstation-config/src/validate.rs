//! Eager validation of a layered configuration

use crate::error::{ConfigError, ConfigIssue};
use crate::station::StationConfig;

const REQUIRED_PLACEHOLDERS: [&str; 2] = ["{port}", "{firmware}"];

impl StationConfig {
    /// Validate every field and report all problems together.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let issues = self.collect_issues();
        if issues.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(issues))
        }
    }

    /// Collect validation problems without failing
    pub fn collect_issues(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        check_usb_id(&mut issues, "target_device.vid", &self.target_device.vid);
        check_usb_id(&mut issues, "target_device.pid", &self.target_device.pid);

        let firmware = &self.firmware;
        for (field, path) in [
            ("firmware.device_info_path", &firmware.device_info_path),
            ("firmware.path", &firmware.path),
            ("firmware.certificate_path", &firmware.certificate_path),
            ("firmware.checksum_path", &firmware.checksum_path),
        ] {
            if path.as_os_str().is_empty() {
                issues.push(ConfigIssue::new(field, "must not be empty"));
            } else if path.is_absolute() {
                issues.push(ConfigIssue::new(field, "must be relative to the volume root"));
            }
        }

        if firmware.command.split_whitespace().next().is_none() {
            issues.push(ConfigIssue::new("firmware.command", "must not be empty"));
        }
        for placeholder in REQUIRED_PLACEHOLDERS {
            if !firmware.command.contains(placeholder) {
                issues.push(ConfigIssue::new(
                    "firmware.command",
                    format!("missing placeholder {placeholder}"),
                ));
            }
        }
        if firmware.timeout == 0 {
            issues.push(ConfigIssue::new("firmware.timeout", "must be greater than zero"));
        }
        if firmware.retry_count == 0 {
            issues.push(ConfigIssue::new("firmware.retry_count", "must be at least 1"));
        }
        if firmware.baudrate == 0 {
            issues.push(ConfigIssue::new("firmware.baudrate", "must be greater than zero"));
        }

        if self.security.verify_timeout == 0 {
            issues.push(ConfigIssue::new(
                "security.verify_timeout",
                "must be greater than zero",
            ));
        }
        if self.security.verifier_tool.trim().is_empty() {
            issues.push(ConfigIssue::new("security.verifier_tool", "must not be empty"));
        }

        let gpio = &self.gpio;
        if gpio.led_green == gpio.led_yellow
            || gpio.led_green == gpio.led_red
            || gpio.led_yellow == gpio.led_red
        {
            issues.push(ConfigIssue::new("gpio", "lamp lines must be distinct"));
        }

        if self.storage.mount_base.as_os_str().is_empty() {
            issues.push(ConfigIssue::new("storage.mount_base", "must not be empty"));
        }
        if self.storage.mount_attempts == 0 {
            issues.push(ConfigIssue::new("storage.mount_attempts", "must be at least 1"));
        }
        if self.storage.mount_timeout == 0 {
            issues.push(ConfigIssue::new(
                "storage.mount_timeout",
                "must be greater than zero",
            ));
        }

        if self.session.poll_interval_ms == 0 {
            issues.push(ConfigIssue::new(
                "session.poll_interval_ms",
                "must be greater than zero",
            ));
        }
        if self.session.scan_interval_ms == 0 {
            issues.push(ConfigIssue::new(
                "session.scan_interval_ms",
                "must be greater than zero",
            ));
        }
        if self.session.queue_capacity == 0 {
            issues.push(ConfigIssue::new("session.queue_capacity", "must be at least 1"));
        }

        issues
    }
}

fn check_usb_id(issues: &mut Vec<ConfigIssue>, field: &str, value: &str) {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        issues.push(ConfigIssue::new(field, "is required"));
    } else if trimmed.len() > 4 || u16::from_str_radix(trimmed, 16).is_err() {
        issues.push(ConfigIssue::new(
            field,
            format!("{trimmed:?} is not a 16-bit hex identifier"),
        ));
    }
}
