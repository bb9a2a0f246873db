//! Integration tests for configuration loading and the read-only commands.

use clap::Parser;
use std::fs;
use tempfile::TempDir;
use vaultbuild_cli::commands::{assets, check, common::Workspace};
use vaultbuild_cli::{Cli, Commands};

const CONFIG: &str = r#"
root = "vault"

[[projects]]
id = "hello"
root = "plugins/hello"
entry = "main.ts"
output = "dist/main.js"
"#;

fn fixture() -> TempDir {
    let dir = TempDir::new().unwrap();
    let project = dir.path().join("vault").join("plugins").join("hello");
    fs::create_dir_all(&project).unwrap();
    fs::write(project.join("main.ts"), "console.log('hello');\n").unwrap();
    fs::write(dir.path().join("vaultbuild.toml"), CONFIG).unwrap();
    dir
}

/// Tests that `--config` drives the storage root and project list.
#[tokio::test]
async fn test_config_file_opens_workspace() {
    let dir = fixture();
    let config = dir.path().join("vaultbuild.toml");
    let cli = Cli::parse_from(["vaultbuild", "--config", config.to_str().unwrap(), "check"]);
    assert!(matches!(cli.command, Commands::Check));

    let workspace = Workspace::open(cli.root.as_deref(), cli.config.as_deref()).unwrap();
    assert_eq!(workspace.root, dir.path().join("vault"));
    assert_eq!(workspace.config.projects.len(), 1);

    let items = check::checks(&workspace).await;
    assert!(items.iter().all(|item| item.ok), "{items:?}");
}

/// Tests that collection reads through the configured root.
#[tokio::test]
async fn test_assets_of_configured_project() {
    let dir = fixture();
    let workspace = Workspace::open(None, Some(&dir.path().join("vaultbuild.toml"))).unwrap();

    let listing = assets::collect(&workspace, "hello").await.unwrap();
    assert_eq!(listing.files.len(), 1);
    assert_eq!(listing.files[0].path, "main.ts");
    assert_eq!(listing.files[0].size, 22);
    workspace.close().await;
}

/// Tests that a missing entry point fails collection.
#[tokio::test]
async fn test_missing_entry_point_fails() {
    let dir = fixture();
    fs::remove_file(dir.path().join("vault/plugins/hello/main.ts")).unwrap();
    let workspace = Workspace::open(None, Some(&dir.path().join("vaultbuild.toml"))).unwrap();

    let err = assets::collect(&workspace, "hello").await.unwrap_err();
    let chain = format!("{err:#}");
    assert!(chain.contains("Failed to collect project 'hello'"));
    assert!(chain.contains("entry point"));
}
