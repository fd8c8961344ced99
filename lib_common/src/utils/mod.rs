//! # Utilities Module
//!
//! A collection point for small general-purpose helpers shared across the
//! `lib_common` crate and the ENC workspace binaries.
//!
//! ## Contained Modules:
//!
//! - **`misc`**: miscellaneous functions, currently timestamp formatting used by
//!   the loggers.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Miscellaneous utility functions.
pub mod misc;
