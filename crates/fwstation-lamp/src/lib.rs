//! Status lamp for fwstation.
//!
//! The station reports everything through three lamps: green, yellow and
//! red. Each [`LampState`] maps to one pattern, either a solid color or a
//! blinking one; at most one color is lit at a time.
//!
//! # Architecture
//!
//! - [`state`] - [`LampState`] and the patterns it maps to
//! - [`pin`] - The [`OutputPin`] seam, sysfs GPIO and in-memory pins
//! - [`lamp`] - The [`StatusLamp`] trait, [`GpioLamp`] and [`LogLamp`]
//! - [`error`] - Error types
//! - [`prelude`] - Common re-exports

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod error;
pub mod lamp;
pub mod pin;
pub mod prelude;
pub mod state;

pub use error::LampError;
pub use lamp::{GpioLamp, LogLamp, StatusLamp};
pub use pin::{MemoryPin, OutputPin, SysfsPin};
pub use state::{LampColor, LampPattern, LampState};
