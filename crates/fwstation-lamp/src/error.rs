//! Error types for the status lamp

use std::path::PathBuf;
use thiserror::Error;

/// GPIO failures
#[derive(Error, Debug)]
pub enum LampError {
    /// A sysfs GPIO file could not be written
    #[error("GPIO I/O error on {path}: {source}")]
    Io {
        /// File being written
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The blink thread could not be started
    #[error("blink thread error: {0}")]
    Thread(String),
}
