//! Build pipeline of vaultbuild.
//!
//! [`BuildOrchestrator`] runs one build at a time: it collects a project's
//! files, fetches its dependencies, drives the bundling engine through the
//! [`ProjectResolver`], and writes the bundle next to the project. Failed
//! builds leave a [`DiagnosticReport`] behind.
//!
//! # Examples
//!
//! ```
//! use vaultbuild_build::diagnostics::{Severity, render};
//! use vaultbuild_engine::EngineMessage;
//!
//! let text = render(Severity::Warning, &EngineMessage::new("Unused import"), None);
//! assert!(text.starts_with("[WARNING] Unused import"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs, missing_debug_implementations)]

pub mod compile;
pub mod context;
pub mod diagnostics;
pub mod orchestrator;
pub mod registry;
pub mod report;
pub mod resolver;
pub mod writer;

pub use compile::CompiledBundle;
pub use context::BuildContext;
pub use orchestrator::{
    BuildEvent, BuildOrchestrator, BuildOrchestratorBuilder, BuildStatus, BuildSummary,
};
pub use registry::ProjectRegistry;
pub use report::DiagnosticReport;
pub use resolver::{Decision, ExternalReason, PLUGIN_NAME, ProjectResolver, TraceEntry};
pub use writer::{OutputWriter, WrittenOutput};
