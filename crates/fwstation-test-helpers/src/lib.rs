//! Shared test utilities for fwstation.
//!
//! # Modules
//!
//! - [`mod@must`] - Unwrap helpers with good error messages and `#[track_caller]`
//! - [`fixtures`] - Firmware volume and fake sysfs builders
//! - [`stubs`] - Executable shell-script stand-ins for external tools
//! - [`prelude`] - Convenience re-exports
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! fwstation-test-helpers = { workspace = true }
//! ```
//!
//! ```rust,ignore
//! use fwstation_test_helpers::prelude::*;
//! ```

#![deny(unsafe_op_in_unsafe_fn)]
#![allow(clippy::unwrap_used, clippy::panic)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod must;
pub mod prelude;

#[cfg(feature = "fixtures")]
#[cfg_attr(docsrs, doc(cfg(feature = "fixtures")))]
pub mod fixtures;

#[cfg(all(unix, feature = "stubs"))]
#[cfg_attr(docsrs, doc(cfg(feature = "stubs")))]
pub mod stubs;

pub use must::*;
