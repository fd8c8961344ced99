//! # Connections Module
//!
//! This module handles persistent connections to storage backends.

/// Module for the embedded SQLite database used as a private per-plugin store.
pub mod db_sqlite;
