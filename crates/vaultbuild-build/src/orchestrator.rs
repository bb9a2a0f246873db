//! Build orchestration.
//!
//! A build moves through `preparing → compiling → writing` and back to
//! idle. Only one build runs at a time across the whole orchestrator; a
//! second request while one is active is rejected, not queued.
//!
//! ```text
//! engine ready ─→ collect ─→ dependencies ─→ compile ─→ write
//!      │             │             │            │          │
//!      └─────────────┴──── cancellation checkpoints ───────┘
//! ```

use crate::compile::{self, CompiledBundle};
use crate::context::BuildContext;
use crate::diagnostics::{self, Severity};
use crate::registry::{self, ProjectRegistry};
use crate::report::DiagnosticReport;
use crate::resolver::ProjectResolver;
use crate::writer::OutputWriter;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;
use vaultbuild_bridge::DependencyFetcher;
use vaultbuild_core::{
    BuildInitiator, BuildPhase, BuildSettings, CancellationToken, ContentHasher, Error, EventBus,
    HostStorage, Namespace, ProjectId, Result,
};
use vaultbuild_engine::{
    EngineBuildOptions, EngineHandle, EngineLifecycle, EngineMessage, ResolverPlugin,
};
use vaultbuild_vfs::{AssetCollector, CollectionLimits};

/// Times a superseded engine initialization is waited out before giving up.
const MAX_ENGINE_WAITS: usize = 3;

/// Build notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildEvent {
    /// A build was accepted
    Started {
        /// Project being built
        project: ProjectId,
        /// Build id
        build_id: Uuid,
        /// Who asked for it
        initiator: BuildInitiator,
    },
    /// Output was written
    Succeeded {
        /// Project built
        project: ProjectId,
        /// Build id
        build_id: Uuid,
        /// Storage path of the bundle
        output_path: String,
    },
    /// The build failed; the full report is available from
    /// [`BuildOrchestrator::diagnostics`]
    Failed {
        /// Project built
        project: ProjectId,
        /// Build id
        build_id: Uuid,
        /// Truncated failure message
        message: String,
    },
    /// The build stopped at a cancellation checkpoint
    Cancelled {
        /// Project built
        project: ProjectId,
        /// Build id
        build_id: Uuid,
    },
    /// The engine reported a warning
    Warning {
        /// Project built
        project: ProjectId,
        /// One-line warning
        message: String,
    },
}

/// Result of a successful build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSummary {
    /// Build id
    pub build_id: Uuid,
    /// Project built
    pub project: ProjectId,
    /// Storage path of the bundle
    pub output_path: String,
    /// Storage path of the external source map
    pub map_path: Option<String>,
    /// Number of collected files
    pub file_count: usize,
    /// Collection and engine warnings, one line each
    pub warnings: Vec<String>,
    /// Wall time of the build
    pub duration: Duration,
}

/// The build currently holding the lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildStatus {
    /// Project being built
    pub project: ProjectId,
    /// Build id
    pub build_id: Uuid,
    /// Who asked for it
    pub initiator: BuildInitiator,
    /// Current phase
    pub phase: BuildPhase,
}

#[derive(Debug)]
struct ActiveBuild {
    status: BuildStatus,
    cancel: CancellationToken,
}

/// Releases the single build slot when dropped.
struct BuildLock<'a> {
    slot: &'a Mutex<Option<ActiveBuild>>,
    build_id: Uuid,
    cancel: CancellationToken,
}

impl Drop for BuildLock<'_> {
    fn drop(&mut self) {
        let mut slot = lock(self.slot);
        if slot
            .as_ref()
            .is_some_and(|active| active.status.build_id == self.build_id)
        {
            *slot = None;
        }
    }
}

/// Runs builds of registered projects.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use vaultbuild_build::{BuildOrchestrator, ProjectRegistry};
/// use vaultbuild_core::{BuildInitiator, ProjectId};
///
/// # async fn example(
/// #     storage: Arc<dyn vaultbuild_core::HostStorage>,
/// #     engine: Arc<vaultbuild_engine::EngineLifecycle>,
/// #     fetcher: Arc<vaultbuild_bridge::DependencyFetcher>,
/// # ) -> vaultbuild_core::Result<()> {
/// let orchestrator = BuildOrchestrator::builder()
///     .storage(storage)
///     .engine(engine)
///     .fetcher(fetcher)
///     .registry(Arc::new(ProjectRegistry::new()))
///     .build()?;
///
/// let summary = orchestrator
///     .trigger_build(&ProjectId::new("demo"), BuildInitiator::User)
///     .await?;
/// println!("wrote {}", summary.output_path);
/// # Ok(())
/// # }
/// ```
pub struct BuildOrchestrator {
    storage: Arc<dyn HostStorage>,
    engine: Arc<EngineLifecycle>,
    fetcher: Arc<DependencyFetcher>,
    registry: Arc<ProjectRegistry>,
    hasher: Arc<ContentHasher>,
    settings: BuildSettings,
    active: Mutex<Option<ActiveBuild>>,
    reports: Mutex<HashMap<ProjectId, DiagnosticReport>>,
    events: EventBus<BuildEvent>,
}

impl BuildOrchestrator {
    /// Starts a builder.
    #[must_use]
    pub fn builder() -> BuildOrchestratorBuilder {
        BuildOrchestratorBuilder::default()
    }

    /// Builds `project_id`.
    ///
    /// # Errors
    ///
    /// - [`Error::BuildProcess`] naming the busy project if a build is
    ///   already running
    /// - [`Error::Validation`] if the project is unknown or invalid
    /// - [`Error::BuildCancelled`] if [`cancel_current_build`] was called;
    ///   no report is stored
    /// - any phase's error otherwise, after a report was stored
    ///
    /// [`cancel_current_build`]: Self::cancel_current_build
    pub async fn trigger_build(
        &self,
        project_id: &ProjectId,
        initiator: BuildInitiator,
    ) -> Result<BuildSummary> {
        let build_lock = self.acquire(project_id, initiator)?;
        let project = self
            .registry
            .get(project_id)
            .ok_or_else(|| registry::unknown(project_id))?;

        let build_id = build_lock.build_id;
        let mut context = BuildContext::new(project, initiator, build_lock.cancel.clone())
            .with_build_id(build_id);
        tracing::info!(project = %project_id, %build_id, %initiator, "Build started");
        self.events.publish(BuildEvent::Started {
            project: project_id.clone(),
            build_id,
            initiator,
        });

        let result = self.run(&mut context).await;
        match result {
            Ok(summary) => {
                self.reports().remove(project_id);
                tracing::info!(
                    project = %project_id,
                    %build_id,
                    output = %summary.output_path,
                    elapsed_ms = summary.duration.as_millis(),
                    "Build succeeded"
                );
                self.events.publish(BuildEvent::Succeeded {
                    project: project_id.clone(),
                    build_id,
                    output_path: summary.output_path.clone(),
                });
                Ok(summary)
            }
            Err(err) if err.is_cancelled() => {
                tracing::info!(project = %project_id, %build_id, phase = %context.phase(), "Build cancelled");
                self.events.publish(BuildEvent::Cancelled {
                    project: project_id.clone(),
                    build_id,
                });
                Err(err)
            }
            Err(err) => {
                let report = DiagnosticReport::capture(&context, &err);
                let message = report.short_message();
                tracing::error!(project = %project_id, %build_id, phase = %context.phase(), error = %err, "Build failed");
                self.reports().insert(project_id.clone(), report);
                self.events.publish(BuildEvent::Failed {
                    project: project_id.clone(),
                    build_id,
                    message,
                });
                Err(err)
            }
        }
    }

    /// Requests cancellation of the running build.
    ///
    /// Returns `false` when no build is running. The build stops at its
    /// next checkpoint.
    pub fn cancel_current_build(&self) -> bool {
        let slot = lock(&self.active);
        let Some(active) = slot.as_ref() else {
            return false;
        };
        tracing::info!(project = %active.status.project, build_id = %active.status.build_id, "Cancellation requested");
        active.cancel.cancel();
        true
    }

    /// The running build, if any.
    #[must_use]
    pub fn current_build(&self) -> Option<BuildStatus> {
        lock(&self.active).as_ref().map(|active| active.status.clone())
    }

    /// Report of the last failed build of `project_id`, cleared by the next
    /// success.
    #[must_use]
    pub fn diagnostics(&self, project_id: &ProjectId) -> Option<DiagnosticReport> {
        self.reports().get(project_id).cloned()
    }

    /// Subscribes to build events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<BuildEvent> {
        self.events.subscribe()
    }

    /// Registered projects.
    #[must_use]
    pub const fn registry(&self) -> &Arc<ProjectRegistry> {
        &self.registry
    }

    /// Engine lifecycle used by builds.
    #[must_use]
    pub const fn engine(&self) -> &Arc<EngineLifecycle> {
        &self.engine
    }

    fn acquire(&self, project_id: &ProjectId, initiator: BuildInitiator) -> Result<BuildLock<'_>> {
        let mut slot = lock(&self.active);
        if let Some(active) = slot.as_ref() {
            tracing::warn!(requested = %project_id, running = %active.status.project, "Build rejected, another build is running");
            return Err(Error::build(format!(
                "A build of project '{}' is already running",
                active.status.project
            )));
        }
        let cancel = CancellationToken::new();
        let build_id = Uuid::new_v4();
        *slot = Some(ActiveBuild {
            status: BuildStatus {
                project: project_id.clone(),
                build_id,
                initiator,
                phase: BuildPhase::Preparing,
            },
            cancel: cancel.clone(),
        });
        Ok(BuildLock {
            slot: &self.active,
            build_id,
            cancel,
        })
    }

    async fn run(&self, context: &mut BuildContext) -> Result<BuildSummary> {
        let engine = self.ensure_engine().await?;
        context.checkpoint()?;

        let collector = AssetCollector::new(
            Arc::clone(&self.storage),
            Arc::clone(&self.hasher),
            CollectionLimits::from(&self.settings),
        );
        let collected = collector
            .collect(context.project(), context.cancel_token())
            .await?;
        for warning in &collected.warnings {
            tracing::warn!(project = %context.project().id, %warning, "Collection warning");
        }
        tracing::debug!(project = %context.project().id, files = collected.files.len(), bytes = collected.total_bytes, "Assets collected");
        context.set_collection(collected);
        context.checkpoint()?;

        let dependencies = self
            .fetcher
            .fetch(context.project(), context.cancel_token())
            .await?;
        context.set_dependencies(dependencies);
        context.checkpoint()?;

        self.enter(context, BuildPhase::Compiling);
        let bundle = self.compile(context, &engine).await?;
        context.checkpoint()?;

        self.enter(context, BuildPhase::Writing);
        let written = OutputWriter::new(Arc::clone(&self.storage))
            .write(context.project(), &bundle.code, bundle.source_map.as_deref())
            .await?;

        let mut warnings: Vec<String> = context
            .collection_warnings()
            .iter()
            .map(ToString::to_string)
            .collect();
        warnings.extend(
            context
                .engine_warnings()
                .iter()
                .filter_map(|rendered| rendered.lines().next().map(str::to_string)),
        );
        Ok(BuildSummary {
            build_id: context.build_id(),
            project: context.project().id.clone(),
            output_path: written.output_path,
            map_path: written.map_path,
            file_count: context.files().len(),
            warnings,
            duration: context.elapsed(),
        })
    }

    /// Waits for a ready engine, starting one when none is running.
    async fn ensure_engine(&self) -> Result<EngineHandle> {
        let mut attempt = 1;
        loop {
            match self.engine.wait_ready().await {
                Err(err) if err.is_aborted() && attempt < MAX_ENGINE_WAITS => {
                    tracing::debug!(attempt, "Engine initialization superseded, waiting for the current run");
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn compile(
        &self,
        context: &mut BuildContext,
        engine: &EngineHandle,
    ) -> Result<CompiledBundle> {
        let resolver = Arc::new(ProjectResolver::new(
            context,
            Arc::clone(&self.hasher),
            Arc::clone(&self.fetcher),
            self.settings.clone(),
        ));
        context.attach_resolver(Arc::clone(&resolver));

        let options = EngineBuildOptions::for_project(context.project());
        let output = compile::run_engine(
            engine.engine(),
            options.clone(),
            Arc::clone(&resolver) as Arc<dyn ResolverPlugin>,
            self.settings.compile_timeout(),
        )
        .await?;
        context.checkpoint()?;
        if let Some(err) = resolver.integrity_failure() {
            return Err(err);
        }

        let project = context.project().id.clone();
        for warning in &output.warnings {
            let rendered = diagnostics::render(
                Severity::Warning,
                warning,
                source_of(context, &resolver, warning).as_deref(),
            );
            context.record_warning(rendered);
            self.events.publish(BuildEvent::Warning {
                project: project.clone(),
                message: diagnostics::headline(warning),
            });
        }
        for error in &output.errors {
            let rendered = diagnostics::render(
                Severity::Error,
                error,
                source_of(context, &resolver, error).as_deref(),
            );
            context.record_error(rendered);
        }
        if let Some(first) = output.errors.first() {
            return Err(Error::build(format!(
                "Engine reported {} error(s), first: {}",
                output.errors.len(),
                diagnostics::headline(first)
            )));
        }
        compile::select_outputs(&output, &options)
    }

    fn enter(&self, context: &mut BuildContext, phase: BuildPhase) {
        context.set_phase(phase);
        if let Some(active) = lock(&self.active).as_mut() {
            active.status.phase = phase;
        }
        tracing::debug!(project = %context.project().id, %phase, "Build phase");
    }

    fn reports(&self) -> MutexGuard<'_, HashMap<ProjectId, DiagnosticReport>> {
        lock(&self.reports)
    }
}

impl fmt::Debug for BuildOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildOrchestrator")
            .field("current", &self.current_build())
            .field("engine", &self.engine.status())
            .finish_non_exhaustive()
    }
}

/// Source text behind a message location, for snippet rendering.
fn source_of(
    context: &BuildContext,
    resolver: &ProjectResolver,
    message: &EngineMessage,
) -> Option<String> {
    let location = message.location.as_ref()?;
    match location.namespace {
        Namespace::ProjectFile => context
            .files()
            .get(&location.file)
            .map(|asset| asset.content().to_string()),
        Namespace::ExternalDependency => resolver
            .dependencies()
            .content(&location.file)
            .map(str::to_string),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Builder for [`BuildOrchestrator`].
#[derive(Default)]
pub struct BuildOrchestratorBuilder {
    storage: Option<Arc<dyn HostStorage>>,
    engine: Option<Arc<EngineLifecycle>>,
    fetcher: Option<Arc<DependencyFetcher>>,
    registry: Option<Arc<ProjectRegistry>>,
    hasher: Option<Arc<ContentHasher>>,
    settings: BuildSettings,
}

impl BuildOrchestratorBuilder {
    /// Host storage holding the projects.
    #[must_use]
    pub fn storage(mut self, storage: Arc<dyn HostStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Engine lifecycle.
    #[must_use]
    pub fn engine(mut self, engine: Arc<EngineLifecycle>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Dependency fetcher.
    #[must_use]
    pub fn fetcher(mut self, fetcher: Arc<DependencyFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Project registry; an empty one by default.
    #[must_use]
    pub fn registry(mut self, registry: Arc<ProjectRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Hasher shared by collection and load-time verification.
    #[must_use]
    pub fn hasher(mut self, hasher: Arc<ContentHasher>) -> Self {
        self.hasher = Some(hasher);
        self
    }

    /// Build limits and timeouts.
    #[must_use]
    pub fn settings(mut self, settings: BuildSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Finishes the orchestrator.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if storage, engine, or fetcher is
    /// missing, or the settings are invalid.
    pub fn build(self) -> Result<BuildOrchestrator> {
        self.settings.validate()?;
        Ok(BuildOrchestrator {
            storage: self.storage.ok_or_else(|| missing("storage"))?,
            engine: self.engine.ok_or_else(|| missing("engine"))?,
            fetcher: self.fetcher.ok_or_else(|| missing("fetcher"))?,
            registry: self.registry.unwrap_or_default(),
            hasher: self.hasher.unwrap_or_default(),
            settings: self.settings,
            active: Mutex::new(None),
            reports: Mutex::new(HashMap::new()),
            events: EventBus::new(),
        })
    }
}

impl fmt::Debug for BuildOrchestratorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildOrchestratorBuilder")
            .field("storage", &self.storage.is_some())
            .field("engine", &self.engine.is_some())
            .field("fetcher", &self.fetcher.is_some())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

fn missing(field: &str) -> Error {
    Error::Validation {
        field: field.to_string(),
        reason: "Required when building an orchestrator".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vaultbuild_core::testing::StaticNetwork;
    use vaultbuild_core::{EngineConfig, MemoryStorage, ProjectDescriptor};
    use vaultbuild_engine::testing::{FakeEngine, ScriptedHost};
    use vaultbuild_engine::{AssetAcquirer, ModuleCache, ModuleCompiler};

    const SCRIPT_URL: &str = "https://cdn.test/engine.js";
    const BINARY_URL: &str = "https://cdn.test/engine.wasm";

    fn orchestrator(storage: Arc<MemoryStorage>) -> BuildOrchestrator {
        let network = Arc::new(StaticNetwork::new());
        network.respond(SCRIPT_URL, "globalThis.engine = {}");
        network.respond(BINARY_URL, wat::parse_str("(module)").unwrap());
        let hasher = Arc::new(ContentHasher::new());
        let compiler = Arc::new(ModuleCompiler::new(Arc::new(ModuleCache::new(1))).unwrap());
        let acquirer = AssetAcquirer::new(network.clone(), storage.clone(), hasher.clone(), compiler);
        let config = EngineConfig::builder()
            .script_url(SCRIPT_URL)
            .binary_url(BINARY_URL)
            .cache_enabled(false)
            .build();
        let host = Arc::new(ScriptedHost::new(Arc::new(FakeEngine::new())));
        let engine = Arc::new(EngineLifecycle::new(config, host, acquirer).unwrap());
        BuildOrchestrator::builder()
            .storage(storage)
            .engine(engine)
            .fetcher(Arc::new(DependencyFetcher::new(network, BuildSettings::default())))
            .hasher(hasher)
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_requires_collaborators() {
        let err = BuildOrchestrator::builder().build().unwrap_err();
        assert!(err.to_string().contains("storage"));
    }

    #[tokio::test]
    async fn test_unknown_project_fails_fast_and_releases_lock() {
        let orchestrator = orchestrator(Arc::new(MemoryStorage::new()));
        let err = orchestrator
            .trigger_build(&ProjectId::new("ghost"), BuildInitiator::User)
            .await
            .unwrap_err();
        assert!(err.is_validation_error());
        assert!(orchestrator.current_build().is_none());
        assert!(orchestrator.diagnostics(&ProjectId::new("ghost")).is_none());
    }

    #[tokio::test]
    async fn test_busy_slot_rejects_second_build() {
        let orchestrator = orchestrator(Arc::new(MemoryStorage::new()));
        let held = orchestrator
            .acquire(&ProjectId::new("first"), BuildInitiator::User)
            .unwrap();
        let err = orchestrator
            .trigger_build(&ProjectId::new("second"), BuildInitiator::User)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("'first'"));
        assert_eq!(
            orchestrator.current_build().map(|status| status.project),
            Some(ProjectId::new("first"))
        );
        drop(held);
        assert!(orchestrator.current_build().is_none());
    }

    #[tokio::test]
    async fn test_cancel_flips_the_active_token() {
        let orchestrator = orchestrator(Arc::new(MemoryStorage::new()));
        assert!(!orchestrator.cancel_current_build());
        let held = orchestrator
            .acquire(&ProjectId::new("p"), BuildInitiator::User)
            .unwrap();
        assert!(orchestrator.cancel_current_build());
        assert!(held.cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_builds_registered_project() {
        let storage = Arc::new(MemoryStorage::new());
        storage
            .write("demo/main.ts", "import { x } from './lib';\nconsole.log(x);\n")
            .await
            .unwrap();
        storage.write("demo/lib.ts", "export const x = 1;\n").await.unwrap();
        let orchestrator = orchestrator(storage.clone());
        orchestrator
            .registry()
            .add(ProjectDescriptor::new("demo", "demo", "main.ts", "main.js"))
            .await
            .unwrap();

        let summary = orchestrator
            .trigger_build(&ProjectId::new("demo"), BuildInitiator::User)
            .await
            .unwrap();
        assert_eq!(summary.output_path, "demo/main.js");
        assert_eq!(summary.file_count, 2);
        let bundle = storage.read("demo/main.js").await.unwrap();
        assert!(bundle.contains("export const x = 1;"));
        assert!(!bundle.contains("./lib"));
    }
}
