//! # lib_common
//!
//! Shared building blocks for the ENC node classifier workspace. Each folder is
//! gated behind a cargo feature of the same name so a binary only pulls in the
//! dependencies it needs.

// Declare the modules to re-export
#[cfg(feature = "configs")]
pub mod configs;
#[cfg(feature = "connections")]
pub mod connections;
#[cfg(feature = "loggers")]
pub mod loggers;
#[cfg(feature = "protocols")]
pub mod protocols;
#[cfg(feature = "utils")]
pub mod utils;

// Re-export everything
#[cfg(feature = "configs")]
pub use configs::config_sys::*;
#[cfg(feature = "connections")]
pub use connections::db_sqlite::*;
#[cfg(feature = "loggers")]
pub use loggers::loggerlocal::*;
#[cfg(feature = "utils")]
pub use utils::misc::utils::*;
