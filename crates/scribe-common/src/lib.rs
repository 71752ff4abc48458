//! Scribe Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Error taxonomy and logging setup shared by the scribe workspace members.
//!
//! # Example
//!
//! ```no_run
//! use scribe_common::logging::{init_logging, LogConfig};
//! use scribe_common::{Result, ScribeError};
//!
//! fn job_number(name: &str) -> Result<&str> {
//!     name.strip_prefix("job-")
//!         .ok_or_else(|| ScribeError::Parse(format!("unexpected job name {}", name)))
//! }
//!
//! let _guard = init_logging(&LogConfig::default()).unwrap();
//! job_number("job-42").unwrap();
//! ```

pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{Result, ScribeError};
