//! Convenience re-exports for embedding the station

pub use crate::daemon::{StationDaemon, open_lamp, wait_for_shutdown_signal};
pub use crate::error::ServiceError;
pub use crate::orchestrator::{Collaborators, Orchestrator, SessionSettings, StepOutcome};
pub use crate::session::{Session, SessionState, lamp_for};
