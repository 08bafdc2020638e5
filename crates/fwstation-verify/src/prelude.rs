//! Convenience re-exports for verification consumers

pub use crate::checksum::{checksum_matches, compute_file_sha256, read_expected_digest};
pub use crate::error::VerifyError;
pub use crate::manifest::FirmwareManifest;
pub use crate::pipeline::{
    REASON_CHECKSUM_MISMATCH, REASON_INVALID_SIGNATURE, REASON_MANIFEST_LOAD,
    VerificationPipeline, VerificationPolicy, VerificationStep, VerificationVerdict,
};
pub use crate::signature::{Ed25519Verifier, OpensslVerifier, SignatureVerifier};
