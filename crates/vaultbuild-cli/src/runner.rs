//! Logging setup and command dispatch.

use anyhow::Result;
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Commands, LogFormat};
use crate::commands::{self, common::Workspace};

/// Installs the tracing subscriber.
///
/// `RUST_LOG` selects the filter, `info` when unset; `verbose` forces
/// `debug`. Logs go to stderr so that command output stays pipeable.
pub fn init_logging(verbose: bool, format: LogFormat) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()?,
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()?,
    }
    Ok(())
}

/// Runs the parsed command line.
pub async fn execute(cli: Cli) -> Result<ExitCode> {
    let workspace = Workspace::open(cli.root.as_deref(), cli.config.as_deref())?;
    tracing::debug!(root = %workspace.root.display(), "Workspace opened");

    let result = match cli.command {
        Commands::Check => commands::check::run(&workspace, cli.format).await,
        Commands::Assets { project } => {
            commands::assets::run(&workspace, &project, cli.format).await
        }
        Commands::Deps { project } => commands::deps::run(&workspace, &project, cli.format).await,
        Commands::Cache { action } => commands::cache::run(&workspace, action, cli.format).await,
        Commands::Engine { action } => commands::engine::run(&workspace, action, cli.format).await,
    };
    workspace.close().await;
    result
}
