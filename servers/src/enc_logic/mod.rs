pub mod config;
pub mod error;
pub mod model;
pub mod store;
pub mod resolver;
pub mod formatter;
pub mod handler;
pub mod state;
pub mod listener;
