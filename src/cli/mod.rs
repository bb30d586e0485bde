//! CLI module for RagBuddy
//!
//! Handles command-line argument parsing and configuration management.

pub mod args;
pub mod config;

pub use args::{Args, Commands, QueryOverrides, Verbosity};
pub use config::{Config, Provider};
