//! `vaultbuild check`.

use super::common::Workspace;
use crate::cli::OutputFormat;
use crate::formatters;
use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use std::process::ExitCode;
use vaultbuild_build::ProjectRegistry;

/// Outcome of one check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckItem {
    /// What was checked
    pub subject: String,
    /// Whether it passed
    pub ok: bool,
    /// Failure reason
    pub message: Option<String>,
}

impl CheckItem {
    fn from_result(subject: impl Into<String>, result: vaultbuild_core::Result<()>) -> Self {
        Self {
            subject: subject.into(),
            ok: result.is_ok(),
            message: result.err().map(|err| err.to_string()),
        }
    }
}

/// Validates the storage root, the engine and build settings, and every
/// project, including id uniqueness.
pub async fn checks(workspace: &Workspace) -> Vec<CheckItem> {
    let mut items = vec![
        CheckItem {
            subject: format!("storage root {}", workspace.root.display()),
            ok: workspace.root.is_dir(),
            message: (!workspace.root.is_dir()).then(|| "Not a directory".to_string()),
        },
        CheckItem::from_result("engine settings", workspace.config.engine.validate()),
        CheckItem::from_result("build settings", workspace.config.build.validate()),
    ];

    let registry = ProjectRegistry::new();
    for project in &workspace.config.projects {
        let result = registry.add(project.clone()).await;
        items.push(CheckItem::from_result(format!("project {}", project.id), result));
    }
    registry.shutdown().await;
    items
}

/// Runs the checks and prints them.
pub async fn run(workspace: &Workspace, format: OutputFormat) -> Result<ExitCode> {
    let items = checks(workspace).await;
    let failed = items.iter().filter(|item| !item.ok).count();
    tracing::debug!(checks = items.len(), failed, "Configuration checked");

    match format {
        OutputFormat::Json => println!("{}", formatters::json(&items)?),
        OutputFormat::Pretty => {
            let title = workspace.source.as_ref().map_or_else(
                || "Configuration (defaults)".to_string(),
                |path| format!("Configuration {}", path.display()),
            );
            println!("{}", formatters::heading(&title));
            for item in &items {
                match &item.message {
                    None => println!("  {} {}", "✓".green(), item.subject),
                    Some(message) => {
                        println!("  {} {}: {}", "✗".red(), item.subject, message.red());
                    }
                }
            }
            if workspace.config.projects.is_empty() {
                println!("{}", "  No projects configured".dimmed());
            }
        }
    }

    Ok(if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CliConfig;
    use vaultbuild_core::ProjectDescriptor;

    fn workspace(config: CliConfig) -> (tempfile::TempDir, Workspace) {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::with_config(config, None, dir.path().to_path_buf());
        (dir, workspace)
    }

    #[tokio::test]
    async fn test_valid_configuration_passes() {
        let mut config = CliConfig::default();
        config
            .projects
            .push(ProjectDescriptor::new("a", "plugins/a", "main.ts", "main.js"));
        let (_dir, workspace) = workspace(config);

        let items = checks(&workspace).await;
        assert_eq!(items.len(), 4);
        assert!(items.iter().all(|item| item.ok), "{items:?}");
    }

    #[tokio::test]
    async fn test_invalid_and_duplicate_projects_fail() {
        let mut config = CliConfig::default();
        config
            .projects
            .push(ProjectDescriptor::new("a", "plugins/a", "main.ts", "main.js"));
        config
            .projects
            .push(ProjectDescriptor::new("a", "plugins/b", "main.ts", "main.js"));
        config
            .projects
            .push(ProjectDescriptor::new("c", "plugins/c", "main.ts", "../../out.js"));
        config.engine.script_url = "ftp://nowhere".into();
        let (_dir, workspace) = workspace(config);

        let items = checks(&workspace).await;
        let failed: Vec<&str> = items
            .iter()
            .filter(|item| !item.ok)
            .map(|item| item.subject.as_str())
            .collect();
        assert_eq!(failed, ["engine settings", "project a", "project c"]);
        assert!(items[4].message.as_deref().unwrap().contains("already exists"));
    }
}
