//! CLI command implementations for sysmon-stream.
//!
//! This module provides implementations for all CLI subcommands:
//! - `check`: One-shot stream connectivity check
//! - `config`: Configuration file generation

pub mod check;
pub mod config;

// Re-export command functions
pub use check::command_check;
pub use config::command_config;
