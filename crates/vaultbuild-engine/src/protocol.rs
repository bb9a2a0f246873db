//! Bundling engine plugin protocol.
//!
//! The engine is an opaque, asynchronously initialized service. vaultbuild
//! drives it through [`BundlingEngine`] and answers its file system
//! questions through a [`ResolverPlugin`]: every path the engine sees is
//! resolved and loaded by the plugin, tagged with a [`Namespace`].

use crate::compiler::CompiledModule;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use vaultbuild_core::{
    Loader, LogLevel, ModuleFormat, Namespace, Platform, ProjectDescriptor, Result, SourceMapMode,
};

/// How an import reached the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolveKind {
    /// The build's entry point
    EntryPoint,
    /// `import ... from '...'`
    ImportStatement,
    /// `require('...')`
    RequireCall,
    /// `import('...')`
    DynamicImport,
}

/// A resolution request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveArgs {
    /// Specifier as written in the source
    pub path: String,
    /// Path of the importing module, empty for the entry point
    pub importer: String,
    /// Namespace of the importing module
    pub namespace: Namespace,
    /// Base directory for relative specifiers
    pub resolve_dir: String,
    /// Import form
    pub kind: ResolveKind,
}

/// Where a specifier resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveOutcome {
    /// Resolved path or URL
    pub path: String,
    /// Namespace serving the path
    pub namespace: Namespace,
    /// Leave the import in the output instead of bundling it
    pub external: bool,
}

impl ResolveOutcome {
    /// A project file.
    #[must_use]
    pub fn project(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            namespace: Namespace::ProjectFile,
            external: false,
        }
    }

    /// A network dependency served through the resolver.
    #[must_use]
    pub fn dependency(url: impl Into<String>) -> Self {
        Self {
            path: url.into(),
            namespace: Namespace::ExternalDependency,
            external: false,
        }
    }

    /// A specifier the engine leaves untouched.
    #[must_use]
    pub fn external(path: impl Into<String>, namespace: Namespace) -> Self {
        Self {
            path: path.into(),
            namespace,
            external: true,
        }
    }
}

/// A load request for a resolved path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadArgs {
    /// Resolved path or URL
    pub path: String,
    /// Namespace the path resolved into
    pub namespace: Namespace,
}

/// Content handed back to the engine.
#[derive(Clone, PartialEq, Eq)]
pub struct LoadOutcome {
    /// Module source
    pub contents: String,
    /// How to interpret the source
    pub loader: Loader,
    /// Base directory for imports inside this module
    pub resolve_dir: String,
}

impl fmt::Debug for LoadOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadOutcome")
            .field("contents_len", &self.contents.len())
            .field("loader", &self.loader)
            .field("resolve_dir", &self.resolve_dir)
            .finish()
    }
}

/// Resolver and loader hooks registered with the engine for one build.
#[async_trait]
pub trait ResolverPlugin: Send + Sync {
    /// Plugin name reported in engine diagnostics.
    fn name(&self) -> &str;

    /// Resolves a specifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Resolution`](vaultbuild_core::Error::Resolution) when
    /// nothing matches.
    async fn on_resolve(&self, args: ResolveArgs) -> Result<ResolveOutcome>;

    /// Loads a resolved path.
    ///
    /// # Errors
    ///
    /// Returns an error when the content is unavailable or failed its
    /// integrity check.
    async fn on_load(&self, args: LoadArgs) -> Result<LoadOutcome>;
}

/// Options of one engine build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineBuildOptions {
    /// Entry point, project-relative
    pub entry_point: String,
    /// Output file, project-relative
    pub outfile: String,
    /// Follow and inline imports
    pub bundle: bool,
    /// Minify output
    pub minify: bool,
    /// Target environment
    pub target: String,
    /// Output module format
    pub format: ModuleFormat,
    /// Target platform
    pub platform: Platform,
    /// Global replacements
    pub define: BTreeMap<String, String>,
    /// Extensions the engine itself may probe
    pub resolve_extensions: Vec<String>,
    /// Source map emission
    pub sourcemap: SourceMapMode,
    /// Engine log verbosity
    pub log_level: LogLevel,
}

impl EngineBuildOptions {
    /// Options for a project build.
    #[must_use]
    pub fn for_project(project: &ProjectDescriptor) -> Self {
        let compiler = &project.compiler;
        Self {
            entry_point: vaultbuild_core::path::normalize(&project.entry),
            outfile: vaultbuild_core::path::normalize(&project.output),
            bundle: compiler.bundle,
            minify: compiler.minify,
            target: compiler.target.clone(),
            format: compiler.format,
            platform: compiler.platform,
            define: compiler.define.clone(),
            resolve_extensions: compiler.resolve_extensions.clone(),
            sourcemap: compiler.sourcemap,
            log_level: project.log_level,
        }
    }
}

/// A file produced by the engine; nothing is written by the engine itself.
#[derive(Clone, PartialEq, Eq)]
pub struct OutputFile {
    /// Path the engine intended to write, project-relative
    pub path: String,
    /// File content
    pub contents: String,
}

impl fmt::Debug for OutputFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputFile")
            .field("path", &self.path)
            .field("contents_len", &self.contents.len())
            .finish()
    }
}

/// Source position attached to an engine message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageLocation {
    /// File path as the engine saw it
    pub file: String,
    /// Namespace of the file
    pub namespace: Namespace,
    /// 1-based line
    pub line: u32,
    /// 0-based column, in characters
    pub column: u32,
    /// Length of the highlighted span
    pub length: u32,
    /// Text of the offending line
    pub line_text: String,
}

/// An engine error or warning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineMessage {
    /// Message text
    pub text: String,
    /// Plugin that raised the message, if any
    pub plugin: Option<String>,
    /// Source position
    pub location: Option<MessageLocation>,
}

impl EngineMessage {
    /// A message without a location.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            plugin: None,
            location: None,
        }
    }
}

/// Result of one engine build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineBuildOutput {
    /// Produced files
    pub output_files: Vec<OutputFile>,
    /// Errors; non-empty means the build failed
    pub errors: Vec<EngineMessage>,
    /// Warnings
    pub warnings: Vec<EngineMessage>,
}

/// The external bundling engine.
#[async_trait]
pub trait BundlingEngine: Send + Sync {
    /// Initializes the engine with its compiled binary.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine rejects the module.
    async fn initialize(&self, module: CompiledModule) -> Result<()>;

    /// Runs one build, serving the file system through `plugin`.
    ///
    /// Compile errors are reported in [`EngineBuildOutput::errors`]; an
    /// `Err` means the engine itself failed.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine is unusable.
    async fn build(
        &self,
        options: EngineBuildOptions,
        plugin: Arc<dyn ResolverPlugin>,
    ) -> Result<EngineBuildOutput>;

    /// Stops the engine and releases its resources.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine does not stop cleanly.
    async fn stop(&self) -> Result<()>;
}

/// Identifies an injected bootstrap script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScriptHandle(pub u64);

/// The host environment that runs the engine's bootstrap script.
///
/// Injecting the script makes the engine's API appear some time later;
/// callers poll [`api`](Self::api) until it does.
#[async_trait]
pub trait EngineHost: Send + Sync {
    /// Injects and executes the bootstrap script.
    ///
    /// # Errors
    ///
    /// Returns an error if the script cannot be executed.
    async fn inject_script(&self, script: &str) -> Result<ScriptHandle>;

    /// The engine API, once the script has exposed it.
    fn api(&self) -> Option<Arc<dyn BundlingEngine>>;

    /// Removes an injected script and the global handle it created.
    ///
    /// # Errors
    ///
    /// Returns an error if teardown fails.
    async fn remove_script(&self, handle: ScriptHandle) -> Result<()>;
}
