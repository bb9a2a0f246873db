//! Error types for vaultbuild.
//!
//! This module provides the error hierarchy shared by every crate in the
//! workspace. Variants follow the build pipeline's failure taxonomy:
//! validation, storage, network, engine initialization, build process,
//! and cooperative cancellation.
//!
//! # Examples
//!
//! ```
//! use vaultbuild_core::{Error, Result};
//!
//! fn check_entry(entry: &str) -> Result<()> {
//!     if entry.is_empty() {
//!         return Err(Error::Validation {
//!             field: "entry".to_string(),
//!             reason: "Entry point cannot be empty".to_string(),
//!         });
//!     }
//!     Ok(())
//! }
//!
//! let err = check_entry("").unwrap_err();
//! assert!(err.is_validation_error());
//! ```

use std::sync::Arc;
use thiserror::Error;

/// Boxed error used in `source` slots.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for vaultbuild.
///
/// All errors in the system use this type, providing consistent error handling
/// across all crates in the workspace.
#[derive(Error, Debug)]
pub enum Error {
    /// Project or configuration value failed validation.
    ///
    /// Raised before any I/O takes place. Paths that traverse, absolute
    /// paths, and malformed identifiers all end up here.
    #[error("Validation error in {field}: {reason}")]
    Validation {
        /// The field that failed validation
        field: String,
        /// Detailed reason for the validation failure
        reason: String,
    },

    /// Host storage operation failed.
    #[error("File system error at '{path}': {message}")]
    FileSystem {
        /// Storage path the operation targeted
        path: String,
        /// Description of the failure
        message: String,
        /// Underlying error cause
        #[source]
        source: Option<BoxError>,
    },

    /// Network request failed, including timeouts and non-success statuses.
    #[error("Network error for {url}: {message}")]
    Network {
        /// Requested URL
        url: String,
        /// Description of the failure
        message: String,
        /// HTTP status when the server answered
        status: Option<u16>,
    },

    /// Engine acquisition, bootstrap, or handshake failed.
    ///
    /// When `aborted` is `true` the failure was caused by a newer lifecycle
    /// generation superseding the running one. Aborted errors are never
    /// shown to the user.
    #[error("Engine initialization failed: {message}")]
    EngineInitialization {
        /// Description of the failure
        message: String,
        /// Whether the attempt was superseded rather than failing
        aborted: bool,
        /// Underlying error cause
        #[source]
        source: Option<BoxError>,
    },

    /// Pipeline-level failure.
    #[error("Build failed: {message}")]
    BuildProcess {
        /// Description of the failure
        message: String,
        /// Underlying error cause
        #[source]
        source: Option<BoxError>,
    },

    /// An import specifier could not be resolved inside the virtual file system.
    #[error("Could not resolve '{specifier}' from '{importer}'")]
    Resolution {
        /// The unresolved import specifier
        specifier: String,
        /// The module that contained the import
        importer: String,
    },

    /// Security policy violation, such as output escaping the project root.
    #[error("Security policy violation: {reason}")]
    SecurityViolation {
        /// Description of the security violation
        reason: String,
    },

    /// The build was cancelled by the user.
    ///
    /// This is not a failure and produces no diagnostic report.
    #[error("Build cancelled")]
    BuildCancelled,

    /// A stateful service is shutting down and rejected the operation.
    #[error("Service '{service}' is shutting down")]
    ShuttingDown {
        /// Name of the service
        service: String,
    },

    /// Operation exceeded its configured timeout.
    #[error("Operation timed out after {duration_secs}s: {operation}")]
    Timeout {
        /// Name of the operation that timed out
        operation: String,
        /// Duration in seconds before timeout occurred
        duration_secs: u64,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure
        message: String,
        /// Underlying serde error
        #[source]
        source: Option<serde_json::Error>,
    },
}

impl Error {
    /// Creates a storage error wrapping an I/O failure.
    #[must_use]
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::FileSystem {
            path: path.into(),
            message: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a pipeline error without a cause.
    #[must_use]
    pub fn build(message: impl Into<String>) -> Self {
        Self::BuildProcess {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a current-generation engine failure.
    #[must_use]
    pub fn engine(message: impl Into<String>) -> Self {
        Self::EngineInitialization {
            message: message.into(),
            aborted: false,
            source: None,
        }
    }

    /// Creates an engine error flagged as superseded by a newer generation.
    ///
    /// # Examples
    ///
    /// ```
    /// use vaultbuild_core::Error;
    ///
    /// let err = Error::aborted("generation 3 superseded by 4");
    /// assert!(err.is_aborted());
    /// assert!(!err.is_cancelled());
    /// ```
    #[must_use]
    pub fn aborted(message: impl Into<String>) -> Self {
        Self::EngineInitialization {
            message: message.into(),
            aborted: true,
            source: None,
        }
    }

    /// Wraps a shared error so it can be delivered to several waiters.
    ///
    /// The result keeps the aborted flag of the original when it is an
    /// engine error.
    #[must_use]
    pub fn from_shared(shared: &Arc<Self>) -> Self {
        Self::EngineInitialization {
            message: shared.to_string(),
            aborted: shared.is_aborted(),
            source: Some(Box::new(Arc::clone(shared))),
        }
    }

    /// Returns `true` if this is a validation error.
    #[must_use]
    pub const fn is_validation_error(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// Returns `true` if this is a host storage error.
    #[must_use]
    pub const fn is_file_system_error(&self) -> bool {
        matches!(self, Self::FileSystem { .. })
    }

    /// Returns `true` if this is a network error.
    #[must_use]
    pub const fn is_network_error(&self) -> bool {
        matches!(self, Self::Network { .. })
    }

    /// Returns `true` if this is an engine initialization error of any kind.
    #[must_use]
    pub const fn is_engine_error(&self) -> bool {
        matches!(self, Self::EngineInitialization { .. })
    }

    /// Returns `true` if an engine initialization was superseded.
    #[must_use]
    pub const fn is_aborted(&self) -> bool {
        matches!(self, Self::EngineInitialization { aborted: true, .. })
    }

    /// Returns `true` if this is a pipeline error.
    #[must_use]
    pub const fn is_build_error(&self) -> bool {
        matches!(self, Self::BuildProcess { .. })
    }

    /// Returns `true` if this is an unresolved import.
    #[must_use]
    pub const fn is_resolution_error(&self) -> bool {
        matches!(self, Self::Resolution { .. })
    }

    /// Returns `true` if this is a security violation error.
    #[must_use]
    pub const fn is_security_error(&self) -> bool {
        matches!(self, Self::SecurityViolation { .. })
    }

    /// Returns `true` if the build was cancelled by the user.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::BuildCancelled)
    }

    /// Returns `true` if a service rejected work during shutdown.
    #[must_use]
    pub const fn is_shutting_down(&self) -> bool {
        matches!(self, Self::ShuttingDown { .. })
    }

    /// Returns `true` if this is a timeout error.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns `true` if the error is part of cooperative control flow
    /// (user cancellation or a superseded engine generation) rather than a
    /// failure worth reporting.
    #[must_use]
    pub const fn is_controlled(&self) -> bool {
        self.is_cancelled() || self.is_aborted()
    }

    /// Returns the display strings of this error and every error in its
    /// source chain, outermost first.
    ///
    /// # Examples
    ///
    /// ```
    /// use vaultbuild_core::Error;
    ///
    /// let inner = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
    /// let err = Error::io("src/main.ts", inner);
    /// let chain = err.cause_chain();
    /// assert_eq!(chain.len(), 2);
    /// assert_eq!(chain[1], "gone");
    /// ```
    #[must_use]
    pub fn cause_chain(&self) -> Vec<String> {
        let mut chain = vec![self.to_string()];
        let mut current = std::error::Error::source(self);
        while let Some(err) = current {
            chain.push(err.to_string());
            current = err.source();
        }
        chain
    }
}

impl From<serde_json::Error> for Error {
    fn from(source: serde_json::Error) -> Self {
        Self::Serialization {
            message: source.to_string(),
            source: Some(source),
        }
    }
}

/// Result type alias for vaultbuild operations.
pub type Result<T> = std::result::Result<T, Error>;
