//! `vaultbuild deps <project>`.

use super::common::Workspace;
use crate::cli::OutputFormat;
use crate::formatters::{self, human_size};
use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;
use std::process::ExitCode;
use std::sync::Arc;
use vaultbuild_bridge::DependencyFetcher;
use vaultbuild_build::report::DependencyDigest;
use vaultbuild_core::{CancellationToken, NetworkClient, ProjectDescriptor};

/// Fetch result for one project.
#[derive(Debug, Clone, Serialize)]
pub struct DependencyListing {
    /// Project id
    pub project: String,
    /// Fetched dependencies
    pub fetched: Vec<DependencyDigest>,
    /// Declared names provided by the host and never fetched
    pub host_api: Vec<String>,
}

/// Declared names of `project` that the host provides.
#[must_use]
pub fn host_api_names(workspace: &Workspace, project: &ProjectDescriptor) -> Vec<String> {
    project
        .dependencies
        .iter()
        .filter(|dep| workspace.config.build.is_host_api(&dep.name))
        .map(|dep| dep.name.clone())
        .collect()
}

/// Fetches and prints the project's dependencies.
pub async fn run(workspace: &Workspace, project_id: &str, format: OutputFormat) -> Result<ExitCode> {
    let project = workspace.config.project(project_id)?;
    let network = workspace.network()?;
    let fetcher = DependencyFetcher::new(
        Arc::clone(&network) as Arc<dyn NetworkClient>,
        workspace.config.build.clone(),
    );
    let set = fetcher
        .fetch(project, &CancellationToken::new())
        .await
        .with_context(|| format!("Failed to fetch dependencies of '{project_id}'"))?;
    network.shutdown().await;

    let listing = DependencyListing {
        project: project.id.to_string(),
        fetched: set
            .names()
            .map(|(name, url)| DependencyDigest {
                name: name.to_string(),
                url: url.to_string(),
                bytes: set.content(url).map(str::len),
            })
            .collect(),
        host_api: host_api_names(workspace, project),
    };

    match format {
        OutputFormat::Json => println!("{}", formatters::json(&listing)?),
        OutputFormat::Pretty => {
            println!("{}", formatters::heading(&format!("Dependencies of {}", listing.project)));
            for dep in &listing.fetched {
                let size = dep.bytes.map_or_else(
                    || "-".to_string(),
                    |bytes| human_size(u64::try_from(bytes).unwrap_or(u64::MAX)),
                );
                println!("  {:>12}  {} {}", size, dep.name.bold(), dep.url.dimmed());
            }
            for name in &listing.host_api {
                println!("  {:>12}  {} {}", "host", name.bold(), "(provided at runtime)".dimmed());
            }
            if listing.fetched.is_empty() && listing.host_api.is_empty() {
                println!("{}", "  No dependencies declared".dimmed());
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}
