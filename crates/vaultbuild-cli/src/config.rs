//! `vaultbuild.toml` loading.
//!
//! The file is looked up in this order:
//! 1. the path given with `--config`
//! 2. `vaultbuild.toml` in the current directory
//! 3. `vaultbuild/config.toml` in the user config directory
//!
//! A missing file is not an error; every section has defaults.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use vaultbuild_core::{BuildSettings, EngineConfig, ProjectDescriptor, ProjectId};

/// File name looked up in the working directory.
pub const CONFIG_FILE: &str = "vaultbuild.toml";

/// CLI configuration.
///
/// # Examples
///
/// ```toml
/// root = "/home/me/vault"
///
/// [engine]
/// cache_dir = ".vaultbuild/engine-cache"
///
/// [build]
/// compile_timeout_secs = 120
///
/// [[projects]]
/// id = "hello"
/// root = "plugins/hello"
/// entry = "main.ts"
/// output = "main.js"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Directory used as host storage
    pub root: Option<PathBuf>,
    /// Engine acquisition and lifecycle
    pub engine: EngineConfig,
    /// Build limits
    pub build: BuildSettings,
    /// Registered projects
    pub projects: Vec<ProjectDescriptor>,
}

impl CliConfig {
    /// Parses a TOML document.
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).context("Failed to parse configuration")
    }

    /// Loads the configuration, returning it with the file it came from.
    ///
    /// An explicit `path` must exist; the fallbacks may be absent.
    pub fn load(path: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = path {
            if !path.is_file() {
                bail!("Configuration file {} does not exist", path.display());
            }
            return Ok((Self::read(path)?, Some(path.to_path_buf())));
        }
        for candidate in default_locations() {
            if candidate.is_file() {
                tracing::debug!(path = %candidate.display(), "Using configuration file");
                return Ok((Self::read(&candidate)?, Some(candidate)));
            }
        }
        tracing::debug!("No configuration file found, using defaults");
        Ok((Self::default(), None))
    }

    fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid configuration in {}", path.display()))
    }

    /// Storage root: the `--root` override, then the configured root, then
    /// the current directory. A relative configured root is taken relative
    /// to the configuration file.
    pub fn storage_root(&self, cli_root: Option<&Path>, source: Option<&Path>) -> Result<PathBuf> {
        if let Some(root) = cli_root {
            return Ok(root.to_path_buf());
        }
        match (&self.root, source.and_then(Path::parent)) {
            (Some(root), Some(dir)) if root.is_relative() => Ok(dir.join(root)),
            (Some(root), _) => Ok(root.clone()),
            (None, _) => std::env::current_dir().context("Failed to determine current directory"),
        }
    }

    /// Looks up a configured project.
    pub fn project(&self, id: &str) -> Result<&ProjectDescriptor> {
        let id = ProjectId::new(id);
        self.projects
            .iter()
            .find(|project| project.id == id)
            .with_context(|| {
                let known: Vec<&str> = self.projects.iter().map(|p| p.id.as_str()).collect();
                if known.is_empty() {
                    format!("Unknown project '{id}', no projects are configured")
                } else {
                    format!("Unknown project '{id}', known: {}", known.join(", "))
                }
            })
    }
}

fn default_locations() -> Vec<PathBuf> {
    let mut locations = vec![PathBuf::from(CONFIG_FILE)];
    if let Some(dir) = dirs::config_dir() {
        locations.push(dir.join("vaultbuild").join("config.toml"));
    }
    locations
}

#[cfg(test)]
mod tests {
    use super::*;
    use vaultbuild_core::SourceMapMode;

    const SAMPLE: &str = r#"
root = "vault"

[engine]
cache_enabled = false

[build]
compile_timeout_secs = 60

[[projects]]
id = "hello"
root = "plugins/hello"
entry = "main.ts"
output = "main.js"
compiler = { sourcemap = "external" }

[[projects.dependencies]]
name = "preact"
url = "https://unpkg.com/preact/dist/preact.module.js"
"#;

    #[test]
    fn test_parse_full_document() {
        let config = CliConfig::parse(SAMPLE).unwrap();
        assert!(!config.engine.cache_enabled);
        assert_eq!(config.engine.cache_dir, EngineConfig::DEFAULT_CACHE_DIR);
        assert_eq!(config.build.compile_timeout_secs, 60);
        assert_eq!(config.build.host_api_modules, ["obsidian"]);

        let project = config.project("hello").unwrap();
        assert_eq!(project.root, "plugins/hello");
        assert_eq!(project.compiler.sourcemap, SourceMapMode::External);
        assert_eq!(project.dependencies.len(), 1);
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = CliConfig::parse("").unwrap();
        assert_eq!(config, CliConfig::default());
    }

    #[test]
    fn test_unknown_project_lists_known_ids() {
        let config = CliConfig::parse(SAMPLE).unwrap();
        let err = config.project("nope").unwrap_err();
        assert!(err.to_string().contains("known: hello"));
    }

    #[test]
    fn test_relative_root_follows_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join(CONFIG_FILE);
        std::fs::write(&file, SAMPLE).unwrap();

        let (config, source) = CliConfig::load(Some(&file)).unwrap();
        let root = config.storage_root(None, source.as_deref()).unwrap();
        assert_eq!(root, dir.path().join("vault"));

        let overridden = config
            .storage_root(Some(Path::new("/elsewhere")), source.as_deref())
            .unwrap();
        assert_eq!(overridden, PathBuf::from("/elsewhere"));
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = CliConfig::load(Some(&dir.path().join("missing.toml"))).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }
}
