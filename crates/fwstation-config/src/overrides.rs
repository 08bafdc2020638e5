//! Environment overrides for the target identifiers
//!
//! Only the vendor and product identifiers can be overridden. Overrides are
//! read through a caller-supplied lookup so they can be exercised without
//! touching the process environment.

use crate::station::StationConfig;

/// Overrides `target_device.vid`
pub const ENV_TARGET_VID: &str = "TARGET_VID";

/// Overrides `target_device.pid`
pub const ENV_TARGET_PID: &str = "TARGET_PID";

/// Record of one override that took effect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedOverride {
    /// Environment variable name
    pub variable: &'static str,
    /// Value that replaced the file value
    pub value: String,
}

impl StationConfig {
    /// Apply `TARGET_VID` then `TARGET_PID` from `lookup`.
    ///
    /// Empty or whitespace-only values are ignored. Returns the overrides that
    /// were applied, in application order.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Vec<AppliedOverride>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut applied = Vec::new();

        if let Some(vid) = non_empty(lookup(ENV_TARGET_VID)) {
            self.target_device.vid = vid.clone();
            applied.push(AppliedOverride {
                variable: ENV_TARGET_VID,
                value: vid,
            });
        }

        if let Some(pid) = non_empty(lookup(ENV_TARGET_PID)) {
            self.target_device.pid = pid.clone();
            applied.push(AppliedOverride {
                variable: ENV_TARGET_PID,
                value: pid,
            });
        }

        applied
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
