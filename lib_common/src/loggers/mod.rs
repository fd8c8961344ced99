//! # Loggers Module
//!
//! Process-wide structured logging built on `tracing`.

/// Console + rotated file logging.
pub mod loggerlocal;
