//! `vaultbuild cache status|clear`.
//!
//! Operates on the engine asset cache at `engine.cache_dir` under the
//! storage root.

use super::common::Workspace;
use crate::cli::{CacheAction, OutputFormat};
use crate::formatters::{self, human_size};
use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;
use std::process::ExitCode;
use vaultbuild_cache::CacheStatus;

/// Serializable view of [`CacheStatus`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheReport {
    /// Cache directory relative to the storage root
    pub dir: String,
    /// Whether a manifest exists
    pub present: bool,
    /// Whether every digest verified
    pub verified: bool,
    /// RFC 3339 creation time
    pub created_at: Option<String>,
    /// Size of the cached binary
    pub total_size: u64,
    /// Number of binary chunks
    pub chunk_count: usize,
    /// Why verification failed
    pub problem: Option<String>,
}

impl CacheReport {
    fn new(dir: &str, status: CacheStatus) -> Self {
        Self {
            dir: dir.to_string(),
            present: status.present,
            verified: status.verified,
            created_at: status.created_at.map(|at| at.to_rfc3339()),
            total_size: status.total_size,
            chunk_count: status.chunk_count,
            problem: status.problem,
        }
    }
}

/// Handles a cache action.
pub async fn run(workspace: &Workspace, action: CacheAction, format: OutputFormat) -> Result<ExitCode> {
    workspace.require_root()?;
    match action {
        CacheAction::Status => show_status(workspace, format).await,
        CacheAction::Clear => clear(workspace, format).await,
    }
}

/// Reads the cache state.
pub async fn status(workspace: &Workspace) -> CacheReport {
    let cache = workspace.engine_cache();
    let status = cache.status().await;
    CacheReport::new(cache.dir(), status)
}

async fn show_status(workspace: &Workspace, format: OutputFormat) -> Result<ExitCode> {
    let report = status(workspace).await;
    match format {
        OutputFormat::Json => println!("{}", formatters::json(&report)?),
        OutputFormat::Pretty => {
            println!("{}", formatters::heading("Engine cache"));
            let location = workspace.root.join(&report.dir);
            println!("{}", formatters::field("Location", location.display()));
            if !report.present {
                println!();
                println!("{}", "  Cache is empty".dimmed());
                return Ok(ExitCode::SUCCESS);
            }
            let state = if report.verified {
                "verified".green()
            } else {
                "invalid".red()
            };
            println!("{}", formatters::field("State", state));
            if let Some(created_at) = &report.created_at {
                println!("{}", formatters::field("Created", created_at));
            }
            println!("{}", formatters::field("Binary size", human_size(report.total_size).green()));
            println!("{}", formatters::field("Chunks", report.chunk_count.to_string().yellow()));
            if let Some(problem) = &report.problem {
                println!("{}", formatters::field("Problem", problem.red()));
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn clear(workspace: &Workspace, format: OutputFormat) -> Result<ExitCode> {
    let cache = workspace.engine_cache();
    cache.clear().await.context("Failed to clear engine cache")?;
    tracing::info!(dir = %cache.dir(), "Engine cache cleared");
    match format {
        OutputFormat::Json => {
            let cleared = serde_json::json!({ "cleared": cache.dir() });
            println!("{}", formatters::json(&cleared)?);
        }
        OutputFormat::Pretty => println!("{} {}", "✓".green(), "Engine cache cleared".bold()),
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CliConfig;

    #[tokio::test]
    async fn test_status_of_missing_cache() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::with_config(CliConfig::default(), None, dir.path().to_path_buf());
        let report = status(&workspace).await;
        assert!(!report.present);
        assert_eq!(report.dir, ".vaultbuild/engine-cache");
        assert_eq!(report.chunk_count, 0);
    }

    #[tokio::test]
    async fn test_saved_cache_is_reported_then_cleared() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::with_config(CliConfig::default(), None, dir.path().to_path_buf());
        workspace
            .engine_cache()
            .save("globalThis.engine = {}", b"\0asm\x01\0\0\0")
            .await
            .unwrap();

        let report = status(&workspace).await;
        assert!(report.present);
        assert!(report.verified, "{report:?}");
        assert_eq!(report.total_size, 8);
        assert!(report.created_at.is_some());

        workspace.engine_cache().clear().await.unwrap();
        assert!(!status(&workspace).await.present);
    }
}
