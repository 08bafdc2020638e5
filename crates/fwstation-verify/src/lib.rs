//! Verification of firmware volumes for fwstation.
//!
//! A mounted volume is trusted only after an ordered, fail-fast sequence of
//! checks passes:
//!
//! 1. required files exist (all missing files are reported together)
//! 2. the manifest parses
//! 3. the manifest signature verifies against the configured public key
//! 4. the image digest matches the checksum file
//!
//! Steps 3 and 4 are individually switchable. The first failing step decides
//! the verdict and later steps do not run. Verification never writes to the
//! volume.
//!
//! # Architecture
//!
//! - [`pipeline`] - [`VerificationPipeline`], [`VerificationPolicy`] and [`VerificationVerdict`]
//! - [`manifest`] - [`FirmwareManifest`] loading
//! - [`checksum`] - Streamed SHA-256 hashing and digest comparison
//! - [`signature`] - [`SignatureVerifier`] backends (openssl, Ed25519)
//! - [`error`] - Error types

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod checksum;
pub mod error;
pub mod manifest;
pub mod pipeline;
pub mod prelude;
pub mod signature;

pub use checksum::{compute_file_sha256, read_expected_digest};
pub use error::VerifyError;
pub use manifest::FirmwareManifest;
pub use pipeline::{
    REASON_CHECKSUM_MISMATCH, REASON_INVALID_SIGNATURE, REASON_MANIFEST_LOAD,
    VerificationPipeline, VerificationPolicy, VerificationStep, VerificationVerdict,
};
pub use signature::{Ed25519Verifier, OpensslVerifier, SignatureVerifier};
