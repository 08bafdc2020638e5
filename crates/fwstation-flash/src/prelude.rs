//! Convenience re-exports for flashing

pub use crate::command::FlashCommand;
pub use crate::engine::{FirmwareFlasher, FlashEngine, FlashOutcome, FlashSettings};
pub use crate::error::{FlashAttemptError, FlashError};
pub use crate::policy::{RetryDecision, RetryPolicy, decide};
