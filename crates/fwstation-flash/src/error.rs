//! Error types for flashing

use thiserror::Error;

/// Failure of a single flash attempt.
///
/// The display strings double as operator-facing outcome reasons.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlashAttemptError {
    /// The flashing tool executable does not exist
    #[error("flash tool not found: {0}")]
    ToolNotFound(String),

    /// The tool ran and exited non-zero
    #[error("tool returned error code {0}")]
    ExitCode(i32),

    /// The tool was killed by a signal
    #[error("tool terminated by signal")]
    Terminated,

    /// The attempt exceeded its timeout
    #[error("flash timeout after {0}s")]
    Timeout(u64),

    /// The tool could not be started for another reason
    #[error("failed to start flash tool: {0}")]
    Spawn(String),
}

impl FlashAttemptError {
    /// Whether this is the missing-tool case
    pub fn is_tool_missing(&self) -> bool {
        matches!(self, FlashAttemptError::ToolNotFound(_))
    }
}

/// Errors outside a flash attempt sequence
#[derive(Error, Debug)]
pub enum FlashError {
    /// The command template has no program
    #[error("Flash command template is empty")]
    EmptyTemplate,

    /// The version check could not run or failed
    #[error("Flash tool unavailable: {0}")]
    ToolUnavailable(String),
}
