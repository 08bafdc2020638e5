//! The fail-fast verification pipeline

use crate::checksum::checksum_matches;
use crate::manifest::FirmwareManifest;
use crate::signature::{Ed25519Verifier, OpensslVerifier, SignatureVerifier};
use fwstation_config::{SignatureScheme, StationConfig};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Reason for a manifest that cannot be loaded
pub const REASON_MANIFEST_LOAD: &str = "failed to load manifest";
/// Reason for a bad signature or a verifier tool error
pub const REASON_INVALID_SIGNATURE: &str = "invalid certificate signature";
/// Reason for an image whose digest does not match
pub const REASON_CHECKSUM_MISMATCH: &str = "checksum mismatch";

/// Pipeline steps, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationStep {
    /// Required files exist
    FileStructure,
    /// Manifest parses
    Manifest,
    /// Manifest signature verifies
    Signature,
    /// Image digest matches
    Checksum,
}

impl fmt::Display for VerificationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VerificationStep::FileStructure => "file structure",
            VerificationStep::Manifest => "manifest",
            VerificationStep::Signature => "signature",
            VerificationStep::Checksum => "checksum",
        };
        f.write_str(name)
    }
}

/// Outcome of one verification run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationVerdict {
    /// Whether every enabled step passed
    pub ok: bool,
    /// Operator-facing reason
    pub reason: String,
    /// Step that failed, `None` on success
    pub failed_step: Option<VerificationStep>,
    /// Parsed manifest, on success
    pub manifest: Option<FirmwareManifest>,
    /// Absolute firmware image path, on success
    pub firmware_path: Option<PathBuf>,
    /// Volume that was verified, on success
    pub mount_point: Option<PathBuf>,
}

impl VerificationVerdict {
    fn passed(manifest: FirmwareManifest, firmware_path: PathBuf, mount_point: PathBuf) -> Self {
        Self {
            ok: true,
            reason: "verification passed".to_string(),
            failed_step: None,
            manifest: Some(manifest),
            firmware_path: Some(firmware_path),
            mount_point: Some(mount_point),
        }
    }

    fn failed(step: VerificationStep, reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            reason: reason.into(),
            failed_step: Some(step),
            manifest: None,
            firmware_path: None,
            mount_point: None,
        }
    }
}

/// What to check and where to find it on the volume
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationPolicy {
    /// Manifest path relative to the volume root
    pub manifest_path: PathBuf,
    /// Image path relative to the volume root
    pub image_path: PathBuf,
    /// Signature path relative to the volume root
    pub signature_path: PathBuf,
    /// Checksum path relative to the volume root
    pub checksum_path: PathBuf,
    /// Verify the manifest signature
    pub require_certificate: bool,
    /// Verify the image digest
    pub verify_checksum: bool,
    /// Public key for signature checks
    pub public_key_path: PathBuf,
    /// Signature backend
    pub scheme: SignatureScheme,
    /// Program for the openssl backend
    pub verifier_tool: String,
    /// Bound on the signature check
    pub verify_timeout: Duration,
    /// Expected `target_device` in the manifest; a mismatch only warns
    pub expected_target_name: Option<String>,
}

impl VerificationPolicy {
    /// Derive a policy from station configuration.
    ///
    /// Signature checking is disabled when the public key file is missing.
    pub fn from_config(config: &StationConfig) -> Self {
        let firmware = &config.firmware;
        let security = &config.security;
        Self {
            manifest_path: firmware.device_info_path.clone(),
            image_path: firmware.path.clone(),
            signature_path: firmware.certificate_path.clone(),
            checksum_path: firmware.checksum_path.clone(),
            require_certificate: security.effective_require_certificate(),
            verify_checksum: security.verify_checksum,
            public_key_path: security.public_key_path.clone(),
            scheme: security.scheme,
            verifier_tool: security.verifier_tool.clone(),
            verify_timeout: security.verify_timeout(),
            expected_target_name: Some(config.target_device.name.clone()),
        }
    }

    fn required_files(&self) -> Vec<&Path> {
        let mut files = vec![self.manifest_path.as_path(), self.image_path.as_path()];
        if self.require_certificate {
            files.push(self.signature_path.as_path());
        }
        if self.verify_checksum {
            files.push(self.checksum_path.as_path());
        }
        files
    }
}

/// Runs the ordered checks against a mounted volume
#[derive(Clone)]
pub struct VerificationPipeline {
    policy: VerificationPolicy,
    verifier: Arc<dyn SignatureVerifier>,
}

impl fmt::Debug for VerificationPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationPipeline")
            .field("policy", &self.policy)
            .field("verifier", &self.verifier.name())
            .finish()
    }
}

impl VerificationPipeline {
    /// Create a pipeline using the backend named by the policy
    pub fn new(policy: VerificationPolicy) -> Self {
        let verifier: Arc<dyn SignatureVerifier> = match policy.scheme {
            SignatureScheme::Openssl => Arc::new(OpensslVerifier::new(&policy.verifier_tool)),
            SignatureScheme::Ed25519 => Arc::new(Ed25519Verifier),
        };
        Self { policy, verifier }
    }

    /// Create a pipeline with an explicit signature backend
    pub fn with_verifier(policy: VerificationPolicy, verifier: Arc<dyn SignatureVerifier>) -> Self {
        Self { policy, verifier }
    }

    /// Policy in effect
    pub fn policy(&self) -> &VerificationPolicy {
        &self.policy
    }

    /// Verify the volume mounted at `mount_point`.
    pub async fn verify(&self, mount_point: &Path) -> VerificationVerdict {
        info!(mount_point = %mount_point.display(), "Verifying storage volume");
        let verdict = self.run_steps(mount_point).await;
        if verdict.ok {
            info!(mount_point = %mount_point.display(), "Storage volume verified");
        } else {
            warn!(
                mount_point = %mount_point.display(),
                step = ?verdict.failed_step,
                reason = %verdict.reason,
                "Storage volume rejected"
            );
        }
        verdict
    }

    async fn run_steps(&self, mount_point: &Path) -> VerificationVerdict {
        let policy = &self.policy;

        let missing: Vec<String> = policy
            .required_files()
            .into_iter()
            .filter(|relative| !mount_point.join(relative).is_file())
            .map(|relative| relative.display().to_string())
            .collect();
        if !missing.is_empty() {
            return VerificationVerdict::failed(
                VerificationStep::FileStructure,
                format!("missing required files: {}", missing.join(", ")),
            );
        }

        let manifest_file = mount_point.join(&policy.manifest_path);
        let manifest = match FirmwareManifest::load(&manifest_file).await {
            Ok(manifest) => manifest,
            Err(e) => {
                debug!(error = %e, "Manifest rejected");
                return VerificationVerdict::failed(VerificationStep::Manifest, REASON_MANIFEST_LOAD);
            }
        };
        info!(
            device_id = %manifest.device_id,
            version = %manifest.firmware_version,
            "Loaded firmware manifest"
        );
        if let Some(expected) = &policy.expected_target_name {
            if &manifest.target_device_name != expected {
                warn!(
                    manifest_target = %manifest.target_device_name,
                    configured_target = %expected,
                    "Manifest target does not match configured device name"
                );
            }
        }

        if policy.require_certificate {
            let signature_file = mount_point.join(&policy.signature_path);
            let check = self.verifier.verify(
                &policy.public_key_path,
                &signature_file,
                &manifest_file,
            );
            match timeout(policy.verify_timeout, check).await {
                Ok(Ok(true)) => {
                    info!(backend = self.verifier.name(), "Manifest signature valid");
                }
                Ok(Ok(false)) => {
                    return VerificationVerdict::failed(
                        VerificationStep::Signature,
                        REASON_INVALID_SIGNATURE,
                    );
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "Signature check could not complete");
                    return VerificationVerdict::failed(
                        VerificationStep::Signature,
                        REASON_INVALID_SIGNATURE,
                    );
                }
                Err(_elapsed) => {
                    return VerificationVerdict::failed(
                        VerificationStep::Signature,
                        format!(
                            "signature verification timed out after {}s",
                            policy.verify_timeout.as_secs()
                        ),
                    );
                }
            }
        } else {
            debug!("Signature check disabled");
        }

        let firmware_file = mount_point.join(&policy.image_path);
        if policy.verify_checksum {
            let checksum_file = mount_point.join(&policy.checksum_path);
            match checksum_matches(&firmware_file, &checksum_file).await {
                Ok(true) => info!("Firmware checksum matches"),
                Ok(false) => {
                    return VerificationVerdict::failed(
                        VerificationStep::Checksum,
                        REASON_CHECKSUM_MISMATCH,
                    );
                }
                Err(e) => {
                    return VerificationVerdict::failed(VerificationStep::Checksum, e.to_string());
                }
            }
        } else {
            debug!("Checksum check disabled");
        }

        let firmware_path = std::path::absolute(&firmware_file).unwrap_or(firmware_file);
        VerificationVerdict::passed(manifest, firmware_path, mount_point.to_path_buf())
    }
}
