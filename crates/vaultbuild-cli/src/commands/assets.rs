//! `vaultbuild assets <project>`.

use super::common::Workspace;
use crate::cli::OutputFormat;
use crate::formatters::{self, human_size};
use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;
use std::process::ExitCode;
use std::sync::Arc;
use vaultbuild_build::report::FileDigest;
use vaultbuild_core::{CancellationToken, HostStorage};
use vaultbuild_vfs::{AssetCollector, CollectionLimits};

/// Collected files of one project.
#[derive(Debug, Clone, Serialize)]
pub struct AssetListing {
    /// Project id
    pub project: String,
    /// Files sorted by path
    pub files: Vec<FileDigest>,
    /// Bytes read
    pub total_bytes: u64,
    /// Collection warnings
    pub warnings: Vec<String>,
}

/// Collects `project_id` the way a build would.
pub async fn collect(workspace: &Workspace, project_id: &str) -> Result<AssetListing> {
    workspace.require_root()?;
    let project = workspace.config.project(project_id)?;
    let collector = AssetCollector::new(
        Arc::clone(&workspace.storage) as Arc<dyn HostStorage>,
        Arc::clone(&workspace.hasher),
        CollectionLimits::from(&workspace.config.build),
    );
    let outcome = collector
        .collect(project, &CancellationToken::new())
        .await
        .with_context(|| format!("Failed to collect project '{project_id}'"))?;

    Ok(AssetListing {
        project: project.id.to_string(),
        files: outcome
            .files
            .sorted()
            .into_iter()
            .map(|asset| FileDigest {
                path: asset.path().to_string(),
                hash: asset.content_hash().to_string(),
                size: asset.size(),
                read_error: asset.read_error().map(str::to_string),
            })
            .collect(),
        total_bytes: outcome.total_bytes,
        warnings: outcome.warnings.iter().map(ToString::to_string).collect(),
    })
}

/// Collects and prints the project's files.
pub async fn run(workspace: &Workspace, project_id: &str, format: OutputFormat) -> Result<ExitCode> {
    let listing = collect(workspace, project_id).await?;
    match format {
        OutputFormat::Json => println!("{}", formatters::json(&listing)?),
        OutputFormat::Pretty => {
            println!("{}", formatters::heading(&format!("Assets of {}", listing.project)));
            for file in &listing.files {
                match &file.read_error {
                    Some(err) => println!("  {:>12}  {}  {}", "-".dimmed(), file.path, err.red()),
                    None => println!(
                        "  {:>12}  {}  {}",
                        human_size(file.size),
                        file.path,
                        file.hash.dimmed()
                    ),
                }
            }
            println!();
            println!("{}", formatters::field("Files", listing.files.len().to_string().yellow()));
            println!("{}", formatters::field("Total size", human_size(listing.total_bytes).green()));
            for warning in &listing.warnings {
                println!("  {} {warning}", "warning:".yellow().bold());
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}
