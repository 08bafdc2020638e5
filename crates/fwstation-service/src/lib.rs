//! Firmware provisioning station service.
//!
//! Ties the station together: storage and device events come in on two
//! bounded queues, the [`Orchestrator`] drains them with storage first,
//! verifies firmware volumes, flashes target devices and keeps the lamp in
//! step with the [`Session`].
//!
//! # Architecture
//!
//! - [`session`] - [`SessionState`], [`Session`] and the state to lamp mapping
//! - [`orchestrator`] - The session state machine and its poll loop
//! - [`daemon`] - Wiring from configuration, signal handling
//! - [`error`] - Error types
//! - [`prelude`] - Common re-exports

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod daemon;
pub mod error;
pub mod orchestrator;
pub mod prelude;
pub mod session;

pub use daemon::{StationDaemon, open_lamp, wait_for_shutdown_signal};
pub use error::ServiceError;
pub use orchestrator::{Collaborators, Orchestrator, SessionSettings, StepOutcome};
pub use session::{Session, SessionState, lamp_for};
