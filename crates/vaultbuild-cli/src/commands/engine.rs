//! `vaultbuild engine fetch`.

use super::common::Workspace;
use crate::cli::{EngineAction, OutputFormat};
use crate::formatters::{self, human_size};
use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;
use std::process::ExitCode;
use std::sync::Arc;
use vaultbuild_core::{HostStorage, NetworkClient};
use vaultbuild_engine::{
    AssetAcquirer, AssetSource, GenerationCounter, ModuleCache, ModuleCompiler,
};

/// What `engine fetch` obtained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchReport {
    /// `cache` or `network`
    pub source: String,
    /// Bootstrap script size
    pub script_bytes: usize,
    /// Engine binary size
    pub binary_bytes: usize,
    /// Whether the result was written to the cache
    pub cached: bool,
}

/// Handles an engine action.
pub async fn run(
    workspace: &Workspace,
    action: EngineAction,
    format: OutputFormat,
) -> Result<ExitCode> {
    match action {
        EngineAction::Fetch => fetch(workspace, format).await,
    }
}

/// Acquires and compiles the engine assets, filling the cache when enabled.
pub async fn acquire(
    workspace: &Workspace,
    network: Arc<dyn NetworkClient>,
) -> Result<FetchReport> {
    let config = &workspace.config.engine;
    config.validate()?;
    let compiler = Arc::new(ModuleCompiler::new(Arc::new(ModuleCache::new(1)))?);
    let acquirer = AssetAcquirer::new(
        network,
        Arc::clone(&workspace.storage) as Arc<dyn HostStorage>,
        Arc::clone(&workspace.hasher),
        compiler,
    )
    .with_request_timeout(workspace.config.build.request_timeout());

    let generations = GenerationCounter::new();
    let guard = generations.guard(generations.advance());
    let assets = acquirer
        .get_assets(config, &guard)
        .await
        .context("Failed to acquire engine assets")?;

    Ok(FetchReport {
        source: match assets.source {
            AssetSource::Cache => "cache",
            AssetSource::Network => "network",
        }
        .to_string(),
        script_bytes: assets.script_text.len(),
        binary_bytes: assets.module.size(),
        cached: config.cache_enabled,
    })
}

async fn fetch(workspace: &Workspace, format: OutputFormat) -> Result<ExitCode> {
    workspace.require_root()?;
    if !workspace.config.engine.cache_enabled {
        tracing::warn!("Engine cache is disabled, assets are downloaded but not kept");
    }
    let network = workspace.network()?;
    let report = acquire(workspace, Arc::clone(&network) as Arc<dyn NetworkClient>).await?;
    network.shutdown().await;

    match format {
        OutputFormat::Json => println!("{}", formatters::json(&report)?),
        OutputFormat::Pretty => {
            println!("{} {}", "✓".green(), "Engine ready".bold());
            println!("{}", formatters::field("Source", &report.source));
            println!("{}", formatters::field("Script", human_size(to_u64(report.script_bytes))));
            println!("{}", formatters::field("Binary", human_size(to_u64(report.binary_bytes))));
            if report.cached {
                let location = workspace.root.join(&workspace.config.engine.cache_dir);
                println!("{}", formatters::field("Cache", location.display()));
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn to_u64(bytes: usize) -> u64 {
    u64::try_from(bytes).unwrap_or(u64::MAX)
}
