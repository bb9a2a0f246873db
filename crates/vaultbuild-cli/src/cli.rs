//! Command-line definitions.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// vaultbuild - build plugin projects stored in a vault.
///
/// Works on a local directory acting as host storage. Projects, engine, and
/// build settings come from `vaultbuild.toml`.
#[derive(Parser, Debug)]
#[command(name = "vaultbuild")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Directory used as host storage (overrides `root` from the config)
    #[arg(long, global = true, env = "VAULTBUILD_ROOT")]
    pub root: Option<PathBuf>,

    /// Configuration file
    #[arg(short, long, global = true, env = "VAULTBUILD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log line format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Output format of command results
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Pretty)]
    pub format: OutputFormat,
}

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Output format of command results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Colored tables
    #[default]
    Pretty,
    /// Pretty-printed JSON
    Json,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate the configuration and every configured project.
    ///
    /// Exits with status 1 if anything is invalid.
    Check,

    /// Collect a project's files as a build would and list them.
    Assets {
        /// Project id
        project: String,
    },

    /// Fetch a project's declared dependencies.
    Deps {
        /// Project id
        project: String,
    },

    /// Inspect or clear the engine asset cache.
    Cache {
        /// Cache action
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Manage the bundling engine.
    Engine {
        /// Engine action
        #[command(subcommand)]
        action: EngineAction,
    },
}

/// Cache subcommands.
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheAction {
    /// Show presence, size, and verification state
    Status,
    /// Delete the cache directory
    Clear,
}

/// Engine subcommands.
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineAction {
    /// Download and compile the engine, filling the cache
    Fetch,
}
