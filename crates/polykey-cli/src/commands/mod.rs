//! CLI command implementations.

pub mod common;
pub mod config;
pub mod play;
pub mod scenario;
pub mod script;
pub mod templates;
