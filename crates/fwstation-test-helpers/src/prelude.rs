//! Convenience re-exports for common test utilities.
//!
//! ```rust,ignore
//! use fwstation_test_helpers::prelude::*;
//! ```

pub use crate::must::{must, must_async, must_some, must_with};

#[cfg(feature = "fixtures")]
pub use crate::fixtures::{
    CHECKSUM_NAME, IMAGE_NAME, MANIFEST_NAME, SIGNATURE_NAME, SysfsFixture, VolumeFixture,
    VolumeFixtureBuilder, sample_manifest, sha256_hex, test_signing_key,
};

#[cfg(all(unix, feature = "stubs"))]
pub use crate::stubs::ToolStub;

/// Result type for tests that propagate any error
pub type TestResult = Result<(), Box<dyn std::error::Error>>;
