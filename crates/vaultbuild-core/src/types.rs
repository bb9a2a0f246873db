//! Strong domain types for vaultbuild.
//!
//! Newtypes and small enums shared by the build pipeline, the engine
//! protocol, and configuration.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Project identifier (newtype over String).
///
/// # Examples
///
/// ```
/// use vaultbuild_core::ProjectId;
///
/// let id = ProjectId::new("my-plugin");
/// assert_eq!(id.as_str(), "my-plugin");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(String);

impl ProjectId {
    /// Creates a new project identifier.
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the project ID as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProjectId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Phase of an in-flight build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildPhase {
    /// Collecting assets and dependencies
    Preparing,
    /// Running the engine
    Compiling,
    /// Persisting output
    Writing,
}

impl fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Preparing => "preparing",
            Self::Compiling => "compiling",
            Self::Writing => "writing",
        })
    }
}

/// Who asked for a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildInitiator {
    /// Interactive command
    User,
    /// File watcher or schedule
    Automatic,
    /// Command line front end
    Cli,
}

impl fmt::Display for BuildInitiator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::User => "user",
            Self::Automatic => "automatic",
            Self::Cli => "cli",
        })
    }
}

/// Lifecycle status of the bundling engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    /// No engine has been started, or it was unloaded
    Uninitialized,
    /// An initialization run is in flight
    Initializing,
    /// The engine is ready
    Initialized,
    /// The last current-generation run failed
    Error,
}

impl fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::Initialized => "initialized",
            Self::Error => "error",
        })
    }
}

/// Virtual namespace a resolved path belongs to.
///
/// The engine sees two in-memory maps as one file system; the namespace tag
/// decides which map serves a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Namespace {
    /// Files collected from the project root
    ProjectFile,
    /// Modules fetched over the network, keyed by URL
    ExternalDependency,
}

impl Namespace {
    /// Returns the wire name used in diagnostics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ProjectFile => "project",
            Self::ExternalDependency => "external",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the engine interprets file contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Loader {
    /// JavaScript
    Js,
    /// JavaScript with JSX
    Jsx,
    /// TypeScript
    Ts,
    /// TypeScript with JSX
    Tsx,
    /// Stylesheet
    Css,
    /// JSON document
    Json,
    /// Raw text exported as a string
    Text,
    /// Bytes exported as base64
    Base64,
    /// Bytes exported as a data URL
    Dataurl,
    /// Bytes exported as binary
    Binary,
    /// Empty module
    Empty,
}

impl Loader {
    /// Default loader for a file extension (without the dot).
    ///
    /// # Examples
    ///
    /// ```
    /// use vaultbuild_core::Loader;
    ///
    /// assert_eq!(Loader::for_extension("tsx"), Loader::Tsx);
    /// assert_eq!(Loader::for_extension("mjs"), Loader::Js);
    /// assert_eq!(Loader::for_extension("weird"), Loader::Js);
    /// ```
    #[must_use]
    pub fn for_extension(extension: &str) -> Self {
        match extension.to_ascii_lowercase().as_str() {
            "ts" | "mts" | "cts" => Self::Ts,
            "tsx" => Self::Tsx,
            "jsx" => Self::Jsx,
            "css" => Self::Css,
            "json" => Self::Json,
            "txt" | "md" | "html" | "svg" => Self::Text,
            _ => Self::Js,
        }
    }
}

/// Output module format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleFormat {
    /// ECMAScript modules
    Esm,
    /// CommonJS
    #[default]
    Cjs,
    /// Immediately invoked function expression
    Iife,
}

/// Target platform for the bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Browser globals
    #[default]
    Browser,
    /// Node.js built-ins
    Node,
    /// No platform assumptions
    Neutral,
}

/// Source map emission mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceMapMode {
    /// No source map
    #[default]
    None,
    /// Map embedded in the bundle as a data URL
    Inline,
    /// Map written next to the bundle
    External,
}

/// Per-project log verbosity forwarded to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Nothing
    Silent,
    /// Errors only
    Error,
    /// Errors and warnings
    #[default]
    Warning,
    /// Informational
    Info,
    /// Debug output, records every resolution
    Debug,
    /// Everything
    Verbose,
}

impl LogLevel {
    /// Returns `true` when every resolver decision should be traced.
    #[must_use]
    pub const fn traces_resolution(self) -> bool {
        matches!(self, Self::Debug | Self::Verbose)
    }
}
