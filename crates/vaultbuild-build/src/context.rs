//! Per-build mutable state.

use crate::resolver::{ProjectResolver, TraceEntry};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;
use vaultbuild_bridge::DependencySet;
use vaultbuild_core::{BuildInitiator, BuildPhase, CancellationToken, ProjectDescriptor, Result};
use vaultbuild_vfs::{CollectionOutcome, CollectionWarning, VirtualFileMap};

/// Everything one in-flight build knows about itself.
///
/// Exactly one context exists while a build runs. It is filled phase by
/// phase and, on failure, is the source of the diagnostic report.
pub struct BuildContext {
    build_id: Uuid,
    project: ProjectDescriptor,
    initiator: BuildInitiator,
    phase: BuildPhase,
    cancel: CancellationToken,
    created_at: DateTime<Utc>,
    started: Instant,
    files: Arc<VirtualFileMap>,
    collection_warnings: Vec<CollectionWarning>,
    dependencies: DependencySet,
    engine_errors: Vec<String>,
    engine_warnings: Vec<String>,
    resolver: Option<Arc<ProjectResolver>>,
}

impl BuildContext {
    /// Creates a context in the preparing phase.
    #[must_use]
    pub fn new(
        project: ProjectDescriptor,
        initiator: BuildInitiator,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            build_id: Uuid::new_v4(),
            project,
            initiator,
            phase: BuildPhase::Preparing,
            cancel,
            created_at: Utc::now(),
            started: Instant::now(),
            files: Arc::new(VirtualFileMap::new()),
            collection_warnings: Vec::new(),
            dependencies: DependencySet::default(),
            engine_errors: Vec::new(),
            engine_warnings: Vec::new(),
            resolver: None,
        }
    }

    pub(crate) const fn with_build_id(mut self, build_id: Uuid) -> Self {
        self.build_id = build_id;
        self
    }

    /// Unique id of this build.
    #[must_use]
    pub const fn build_id(&self) -> Uuid {
        self.build_id
    }

    /// Project being built.
    #[must_use]
    pub const fn project(&self) -> &ProjectDescriptor {
        &self.project
    }

    /// Who started the build.
    #[must_use]
    pub const fn initiator(&self) -> BuildInitiator {
        self.initiator
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> BuildPhase {
        self.phase
    }

    pub(crate) const fn set_phase(&mut self, phase: BuildPhase) {
        self.phase = phase;
    }

    /// Token observed at every checkpoint.
    #[must_use]
    pub const fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Fails with [`Error::BuildCancelled`](vaultbuild_core::Error::BuildCancelled)
    /// once cancellation was requested.
    ///
    /// # Errors
    ///
    /// Returns the cancellation error after cancellation.
    pub fn checkpoint(&self) -> Result<()> {
        self.cancel.check()
    }

    /// When the build started.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Time since the build started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Collected project files.
    #[must_use]
    pub fn files(&self) -> &Arc<VirtualFileMap> {
        &self.files
    }

    /// Stores the collector's result.
    pub fn set_collection(&mut self, outcome: CollectionOutcome) {
        self.files = Arc::new(outcome.files);
        self.collection_warnings = outcome.warnings;
    }

    /// Non-fatal findings from collection.
    #[must_use]
    pub fn collection_warnings(&self) -> &[CollectionWarning] {
        &self.collection_warnings
    }

    /// Fetched dependencies.
    #[must_use]
    pub const fn dependencies(&self) -> &DependencySet {
        &self.dependencies
    }

    /// Stores the fetched dependencies.
    pub fn set_dependencies(&mut self, dependencies: DependencySet) {
        self.dependencies = dependencies;
    }

    /// Appends a rendered engine error.
    pub fn record_error(&mut self, rendered: String) {
        self.engine_errors.push(rendered);
    }

    /// Appends a rendered engine warning.
    pub fn record_warning(&mut self, rendered: String) {
        self.engine_warnings.push(rendered);
    }

    /// Rendered engine errors.
    #[must_use]
    pub fn engine_errors(&self) -> &[String] {
        &self.engine_errors
    }

    /// Rendered engine warnings.
    #[must_use]
    pub fn engine_warnings(&self) -> &[String] {
        &self.engine_warnings
    }

    pub(crate) fn attach_resolver(&mut self, resolver: Arc<ProjectResolver>) {
        self.resolver = Some(resolver);
    }

    /// Resolver used by the compile phase, once it started.
    #[must_use]
    pub const fn resolver(&self) -> Option<&Arc<ProjectResolver>> {
        self.resolver.as_ref()
    }

    /// Resolver decisions recorded so far.
    #[must_use]
    pub fn resolution_trace(&self) -> Vec<TraceEntry> {
        self.resolver
            .as_ref()
            .map(|resolver| resolver.trace())
            .unwrap_or_default()
    }
}

impl fmt::Debug for BuildContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildContext")
            .field("build_id", &self.build_id)
            .field("project", &self.project.id)
            .field("phase", &self.phase)
            .field("files", &self.files.len())
            .field("dependencies", &self.dependencies.len())
            .finish_non_exhaustive()
    }
}
