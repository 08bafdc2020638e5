//! Convenience re-exports for lamp drivers

pub use crate::error::LampError;
pub use crate::lamp::{GpioLamp, LogLamp, StatusLamp};
pub use crate::pin::{MemoryPin, OutputPin, SysfsPin};
pub use crate::state::{FAST_BLINK, LampColor, LampPattern, LampState, SLOW_BLINK};
