//! Configuration types.
//!
//! All configuration is plain `serde` data with defaults, so it can be read
//! from TOML or JSON. Call `validate()` before handing a value to a service;
//! validation never touches storage.
//!
//! # Examples
//!
//! ```
//! use vaultbuild_core::config::{EngineConfig, ProjectDescriptor};
//! use std::time::Duration;
//!
//! let engine = EngineConfig::builder()
//!     .cache_enabled(false)
//!     .init_timeout(Duration::from_secs(10))
//!     .build();
//! assert!(engine.validate().is_ok());
//!
//! let project = ProjectDescriptor::new("demo", ".", "main.ts", "dist/main.js");
//! assert!(project.validate().is_ok());
//! assert_eq!(project.entry_path(), "main.ts");
//! ```

use crate::error::{Error, Result};
use crate::path;
use crate::types::{LogLevel, Loader, ModuleFormat, Platform, ProjectId, SourceMapMode};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

/// A named external module served from a URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyDecl {
    /// Import specifier, e.g. `lodash-es`
    pub name: String,
    /// Location of the module
    pub url: String,
}

impl DependencyDecl {
    /// Creates a declaration.
    #[must_use]
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }

    /// Returns `true` when both the name and the URL are present.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.name.trim().is_empty() && !self.url.trim().is_empty()
    }
}

/// Options forwarded to the bundling engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerOptions {
    /// Follow imports and inline them
    pub bundle: bool,
    /// Minify output
    pub minify: bool,
    /// Target environment, e.g. `es2018`
    pub target: String,
    /// Output module format
    pub format: ModuleFormat,
    /// Target platform
    pub platform: Platform,
    /// Global identifier replacements
    pub define: BTreeMap<String, String>,
    /// Extensions probed during resolution, with leading dot
    pub resolve_extensions: Vec<String>,
    /// Extension (with leading dot) to loader overrides
    pub loaders: BTreeMap<String, Loader>,
    /// Bare specifiers always left external
    pub external: Vec<String>,
    /// Source map emission
    pub sourcemap: SourceMapMode,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            bundle: true,
            minify: false,
            target: "es2018".to_string(),
            format: ModuleFormat::Cjs,
            platform: Platform::Browser,
            define: BTreeMap::new(),
            resolve_extensions: [".ts", ".tsx", ".js", ".jsx", ".mjs", ".cjs", ".json", ".css"]
                .into_iter()
                .map(String::from)
                .collect(),
            loaders: BTreeMap::new(),
            external: Vec::new(),
            sourcemap: SourceMapMode::None,
        }
    }
}

impl CompilerOptions {
    /// Extensions (lowercase, without dot) of files worth collecting.
    ///
    /// The union of the resolvable extensions and the loader override keys.
    #[must_use]
    pub fn collected_extensions(&self) -> BTreeSet<String> {
        self.resolve_extensions
            .iter()
            .chain(self.loaders.keys())
            .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect()
    }

    /// Loader for a path: override first, then the default by extension.
    #[must_use]
    pub fn loader_for(&self, file: &str) -> Loader {
        let Some(ext) = path::extension(file) else {
            return Loader::Js;
        };
        self.loaders
            .iter()
            .find(|(key, _)| key.trim_start_matches('.').eq_ignore_ascii_case(&ext))
            .map_or_else(|| Loader::for_extension(&ext), |(_, loader)| *loader)
    }

    /// Returns `true` if `specifier` is on the external allowlist.
    #[must_use]
    pub fn is_external(&self, specifier: &str) -> bool {
        self.external.iter().any(|name| {
            name == specifier
                || specifier
                    .strip_prefix(name.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }
}

/// A project built into one bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectDescriptor {
    /// Unique identifier
    pub id: ProjectId,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Root relative to the storage root; `.` is the storage root
    #[serde(default = "default_root")]
    pub root: String,
    /// Entry point relative to the project root
    pub entry: String,
    /// Output file relative to the project root
    pub output: String,
    /// Declared external modules
    #[serde(default)]
    pub dependencies: Vec<DependencyDecl>,
    /// Engine options
    #[serde(default)]
    pub compiler: CompilerOptions,
    /// Engine and resolver verbosity
    #[serde(default)]
    pub log_level: LogLevel,
}

fn default_root() -> String {
    path::ROOT.to_string()
}

impl ProjectDescriptor {
    /// Creates a descriptor with default compiler options.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        root: impl Into<String>,
        entry: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id: ProjectId::new(id),
            root: root.into(),
            entry: entry.into(),
            output: output.into(),
            dependencies: Vec::new(),
            compiler: CompilerOptions::default(),
            log_level: LogLevel::default(),
        }
    }

    /// Adds a declared dependency.
    #[must_use]
    pub fn with_dependency(mut self, name: impl Into<String>, url: impl Into<String>) -> Self {
        self.dependencies.push(DependencyDecl::new(name, url));
        self
    }

    /// Replaces the compiler options.
    #[must_use]
    pub fn with_compiler(mut self, compiler: CompilerOptions) -> Self {
        self.compiler = compiler;
        self
    }

    /// Normalized project root.
    #[must_use]
    pub fn root_path(&self) -> String {
        path::normalize(&self.root)
    }

    /// Entry point relative to the storage root.
    #[must_use]
    pub fn entry_path(&self) -> String {
        path::join(&self.root, &self.entry)
    }

    /// Output file relative to the storage root.
    #[must_use]
    pub fn output_path(&self) -> String {
        path::join(&self.root, &self.output)
    }

    /// Validates identity and paths.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the id is blank, any path fails
    /// [`path::validate_relative`], or the entry or output does not name a
    /// file strictly inside the root.
    pub fn validate(&self) -> Result<()> {
        if self.id.as_str().trim().is_empty() {
            return Err(Error::Validation {
                field: "id".to_string(),
                reason: "Project id cannot be empty".to_string(),
            });
        }
        path::validate_relative("root", &self.root)?;
        path::validate_relative("entry", &self.entry)?;
        path::validate_relative("output", &self.output)?;

        for (field, relative, full) in [
            ("entry", &self.entry, self.entry_path()),
            ("output", &self.output, self.output_path()),
        ] {
            if path::normalize(relative) == path::ROOT
                || !path::is_within(&self.root, &full)
                || full == self.root_path()
            {
                return Err(Error::Validation {
                    field: field.to_string(),
                    reason: format!("'{relative}' must name a file inside the project root"),
                });
            }
        }
        Ok(())
    }
}

/// How to obtain and start the bundling engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// URL of the bootstrap script
    pub script_url: String,
    /// URL of the engine binary
    pub binary_url: String,
    /// Whether the persistent cache is used
    pub cache_enabled: bool,
    /// Cache directory relative to the storage root
    pub cache_dir: String,
    /// Hard limit on the engine's own initialization, in seconds
    pub init_timeout_secs: u64,
    /// Number of polls for the engine API after script injection
    pub api_poll_attempts: u32,
    /// Delay between API polls, in milliseconds
    pub api_poll_interval_ms: u64,
    /// Limit on a graceful engine stop, in seconds
    pub stop_timeout_secs: u64,
}

impl EngineConfig {
    /// Default initialization timeout in seconds.
    pub const DEFAULT_INIT_TIMEOUT_SECS: u64 = 30;
    /// Default number of API polls.
    pub const DEFAULT_API_POLL_ATTEMPTS: u32 = 100;
    /// Default delay between API polls in milliseconds.
    pub const DEFAULT_API_POLL_INTERVAL_MS: u64 = 100;
    /// Default stop timeout in seconds.
    pub const DEFAULT_STOP_TIMEOUT_SECS: u64 = 5;
    /// Default cache directory.
    pub const DEFAULT_CACHE_DIR: &'static str = ".vaultbuild/engine-cache";

    /// Creates a builder starting from defaults.
    #[must_use]
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Initialization timeout.
    #[must_use]
    pub const fn init_timeout(&self) -> Duration {
        Duration::from_secs(self.init_timeout_secs)
    }

    /// Delay between API polls.
    #[must_use]
    pub const fn api_poll_interval(&self) -> Duration {
        Duration::from_millis(self.api_poll_interval_ms)
    }

    /// Stop timeout.
    #[must_use]
    pub const fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }

    /// Validates URLs, the cache directory, and limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] naming the offending field.
    pub fn validate(&self) -> Result<()> {
        for (field, url) in [("script_url", &self.script_url), ("binary_url", &self.binary_url)] {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                return Err(Error::Validation {
                    field: field.to_string(),
                    reason: format!("Expected an http(s) URL, got '{url}'"),
                });
            }
        }
        path::validate_relative("cache_dir", &self.cache_dir)?;
        if path::normalize(&self.cache_dir) == path::ROOT {
            return Err(Error::Validation {
                field: "cache_dir".to_string(),
                reason: "The cache needs its own directory, not the storage root".to_string(),
            });
        }
        if self.init_timeout_secs == 0 {
            return Err(Error::Validation {
                field: "init_timeout_secs".to_string(),
                reason: "Timeout must be positive".to_string(),
            });
        }
        if self.api_poll_attempts == 0 {
            return Err(Error::Validation {
                field: "api_poll_attempts".to_string(),
                reason: "At least one poll is required".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            script_url: "https://unpkg.com/esbuild-wasm@0.25.0/lib/browser.min.js".to_string(),
            binary_url: "https://unpkg.com/esbuild-wasm@0.25.0/esbuild.wasm".to_string(),
            cache_enabled: true,
            cache_dir: Self::DEFAULT_CACHE_DIR.to_string(),
            init_timeout_secs: Self::DEFAULT_INIT_TIMEOUT_SECS,
            api_poll_attempts: Self::DEFAULT_API_POLL_ATTEMPTS,
            api_poll_interval_ms: Self::DEFAULT_API_POLL_INTERVAL_MS,
            stop_timeout_secs: Self::DEFAULT_STOP_TIMEOUT_SECS,
        }
    }
}

/// Builder for [`EngineConfig`].
#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    script_url: Option<String>,
    binary_url: Option<String>,
    cache_enabled: Option<bool>,
    cache_dir: Option<String>,
    init_timeout: Option<Duration>,
    api_poll: Option<(u32, Duration)>,
    stop_timeout: Option<Duration>,
}

impl EngineConfigBuilder {
    /// Sets the bootstrap script URL.
    #[must_use]
    pub fn script_url(mut self, url: impl Into<String>) -> Self {
        self.script_url = Some(url.into());
        self
    }

    /// Sets the engine binary URL.
    #[must_use]
    pub fn binary_url(mut self, url: impl Into<String>) -> Self {
        self.binary_url = Some(url.into());
        self
    }

    /// Enables or disables the persistent cache.
    #[must_use]
    pub const fn cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = Some(enabled);
        self
    }

    /// Sets the cache directory.
    #[must_use]
    pub fn cache_dir(mut self, dir: impl Into<String>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Sets the initialization timeout.
    #[must_use]
    pub const fn init_timeout(mut self, timeout: Duration) -> Self {
        self.init_timeout = Some(timeout);
        self
    }

    /// Sets the API polling schedule.
    #[must_use]
    pub const fn api_poll(mut self, attempts: u32, interval: Duration) -> Self {
        self.api_poll = Some((attempts, interval));
        self
    }

    /// Sets the stop timeout.
    #[must_use]
    pub const fn stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = Some(timeout);
        self
    }

    /// Builds the configuration. Unset fields keep their defaults.
    #[must_use]
    pub fn build(self) -> EngineConfig {
        let defaults = EngineConfig::default();
        let (api_poll_attempts, api_poll_interval_ms) = self.api_poll.map_or(
            (defaults.api_poll_attempts, defaults.api_poll_interval_ms),
            |(attempts, interval)| (attempts, duration_millis(interval)),
        );
        EngineConfig {
            script_url: self.script_url.unwrap_or(defaults.script_url),
            binary_url: self.binary_url.unwrap_or(defaults.binary_url),
            cache_enabled: self.cache_enabled.unwrap_or(defaults.cache_enabled),
            cache_dir: self.cache_dir.unwrap_or(defaults.cache_dir),
            init_timeout_secs: self
                .init_timeout
                .map_or(defaults.init_timeout_secs, |d| d.as_secs()),
            api_poll_attempts,
            api_poll_interval_ms,
            stop_timeout_secs: self
                .stop_timeout
                .map_or(defaults.stop_timeout_secs, |d| d.as_secs()),
        }
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Limits and policies of the build pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildSettings {
    /// Hard limit on one engine build, in seconds
    pub compile_timeout_secs: u64,
    /// Freshness window of fetched dependencies, in seconds
    pub dependency_ttl_secs: u64,
    /// Specifiers provided by the host at runtime; never fetched
    pub host_api_modules: Vec<String>,
    /// Files larger than this produce a warning
    pub max_file_size: u64,
    /// Collection fails once the project exceeds this many bytes
    pub max_total_size: u64,
    /// Concurrent network requests
    pub network_concurrency: usize,
    /// Per-request network timeout, in seconds
    pub request_timeout_secs: u64,
}

impl BuildSettings {
    /// Compile timeout.
    #[must_use]
    pub const fn compile_timeout(&self) -> Duration {
        Duration::from_secs(self.compile_timeout_secs)
    }

    /// Dependency freshness window.
    #[must_use]
    pub const fn dependency_ttl(&self) -> Duration {
        Duration::from_secs(self.dependency_ttl_secs)
    }

    /// Network request timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Returns `true` if `specifier` names a host API module.
    #[must_use]
    pub fn is_host_api(&self, specifier: &str) -> bool {
        self.host_api_modules.iter().any(|name| name == specifier)
    }

    /// Validates limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if a limit is zero or the per-file
    /// threshold exceeds the total cap.
    pub fn validate(&self) -> Result<()> {
        let zero = [
            ("compile_timeout_secs", self.compile_timeout_secs),
            ("max_total_size", self.max_total_size),
            ("request_timeout_secs", self.request_timeout_secs),
        ]
        .into_iter()
        .find(|(_, value)| *value == 0);
        if let Some((field, _)) = zero {
            return Err(Error::Validation {
                field: field.to_string(),
                reason: "Value must be positive".to_string(),
            });
        }
        if self.max_file_size > self.max_total_size {
            return Err(Error::Validation {
                field: "max_file_size".to_string(),
                reason: "Per-file threshold cannot exceed the total size cap".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            compile_timeout_secs: 300,
            dependency_ttl_secs: 30 * 60,
            host_api_modules: vec!["obsidian".to_string()],
            max_file_size: 1024 * 1024,
            max_total_size: 50 * 1024 * 1024,
            network_concurrency: 4,
            request_timeout_secs: 30,
        }
    }
}
