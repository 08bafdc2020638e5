//! Retry-flash engine for fwstation.
//!
//! The engine never looks at firmware bytes. It builds a command line from a
//! template, runs the external flashing tool with a hard per-attempt timeout,
//! classifies the result, and asks a pure [`decide`] function whether to try
//! again.
//!
//! # Architecture
//!
//! - [`policy`] - [`RetryPolicy`] and the pure [`decide`] function
//! - [`command`] - Command template expansion
//! - [`engine`] - [`FlashEngine`], [`FlashOutcome`] and the [`FirmwareFlasher`] seam
//! - [`error`] - Error types

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod command;
pub mod engine;
pub mod error;
pub mod policy;
pub mod prelude;

pub use command::FlashCommand;
pub use engine::{FirmwareFlasher, FlashEngine, FlashOutcome, FlashSettings};
pub use error::{FlashAttemptError, FlashError};
pub use policy::{RetryDecision, RetryPolicy, decide};
