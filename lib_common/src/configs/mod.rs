//! # Configuration Modules
//!
//! Layered configuration: built-in defaults, then an optional JSON file, then
//! command line / environment values, each layer overriding the previous one.

/// Loading and merging of JSON configuration layers.
pub mod config_sys;
