//! vaultbuild CLI library.
//!
//! Exposes the command-line definitions, configuration loading, and command
//! implementations behind the `vaultbuild` binary so they can be tested.

#![deny(unsafe_code)]
#![warn(missing_docs, missing_debug_implementations)]
#![allow(clippy::missing_errors_doc)]

pub mod cli;
pub mod commands;
pub mod config;
pub mod formatters;
pub mod runner;

pub use cli::{Cli, Commands, LogFormat, OutputFormat};
pub use config::CliConfig;
