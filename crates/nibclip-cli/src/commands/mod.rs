//! CLI command implementations

pub mod clip;
pub mod config;
