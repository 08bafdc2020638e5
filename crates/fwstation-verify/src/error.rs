//! Error types for verification operations

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised inside individual verification steps.
///
/// The pipeline converts these into failed verdicts; they never escape
/// [`crate::VerificationPipeline::verify`].
#[derive(Error, Debug)]
pub enum VerifyError {
    /// Reading a file on the volume failed
    #[error("I/O error reading {path}: {source}")]
    Io {
        /// File being read
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The manifest is not a valid document
    #[error("Manifest parse error: {0}")]
    ManifestParse(String),

    /// A key or signature file has an unusable encoding
    #[error("Key format error: {0}")]
    KeyFormat(String),

    /// The external signature tool could not be run
    #[error("Signature tool error: {0}")]
    Tool(String),
}

impl VerifyError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        VerifyError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<serde_json::Error> for VerifyError {
    fn from(e: serde_json::Error) -> Self {
        VerifyError::ManifestParse(e.to_string())
    }
}
