//! Resolver and loader serving the engine from the virtual maps.
//!
//! The engine believes it reads a file system. Every path it asks for is
//! answered by [`ProjectResolver`] from one of two in-memory sources,
//! selected by the [`Namespace`] tag:
//!
//! - [`Namespace::ProjectFile`]: the collected [`VirtualFileMap`]
//! - [`Namespace::ExternalDependency`]: fetched dependency text keyed by URL
//!
//! Relative imports are probed as the exact path, then with each resolvable
//! extension, then as `<path>/index.<ext>`. Bare imports go through the
//! external allowlist, the host API names, the declared dependencies, and
//! `node_modules`, in that order, and stay external when nothing matches.

use crate::context::BuildContext;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use url::Url;
use vaultbuild_bridge::{DependencyFetcher, DependencySet};
use vaultbuild_core::{
    BuildSettings, CancellationToken, ContentHasher, Error, Namespace, ProjectDescriptor, Result,
    path,
};
use vaultbuild_engine::{
    LoadArgs, LoadOutcome, ResolveArgs, ResolveKind, ResolveOutcome, ResolverPlugin,
};
use vaultbuild_vfs::VirtualFileMap;
use vaultbuild_vfs::policy::DEPENDENCY_DIR;

/// Name the resolver reports to the engine.
pub const PLUGIN_NAME: &str = "vaultbuild-resolver";

const PACKAGE_MANIFEST: &str = "package.json";

/// Why a specifier was left to the engine as external.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExternalReason {
    /// Listed in the project's external allowlist
    Allowlisted,
    /// Reserved host API module
    HostApi,
    /// Imported from inside a fetched dependency
    DependencyImport,
    /// Nothing matched
    Fallback,
}

/// What the resolver decided for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Decision {
    /// A collected project file
    Project {
        /// Project-relative path
        path: String,
    },
    /// A dependency served from the network
    Dependency {
        /// Dependency URL
        url: String,
    },
    /// Left to the engine
    External {
        /// Path or URL handed back to the engine
        path: String,
        /// Why it is external
        reason: ExternalReason,
    },
    /// Resolution failed
    Unresolved,
}

impl Decision {
    const fn is_notable(&self) -> bool {
        matches!(
            self,
            Self::Unresolved
                | Self::External {
                    reason: ExternalReason::Fallback,
                    ..
                }
        )
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Project { path } => write!(f, "project {path}"),
            Self::Dependency { url } => write!(f, "dependency {url}"),
            Self::External { path, reason } => write!(f, "external {path} ({reason:?})"),
            Self::Unresolved => f.write_str("unresolved"),
        }
    }
}

/// One recorded resolver decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceEntry {
    /// Requested specifier
    pub specifier: String,
    /// Importing module, empty for the entry point
    pub importer: String,
    /// Namespace of the importer
    pub namespace: Namespace,
    /// Outcome
    pub decision: Decision,
}

impl fmt::Display for TraceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' from '{}' [{}] -> {}",
            self.specifier, self.importer, self.namespace, self.decision
        )
    }
}

#[derive(Deserialize)]
struct PackageManifest {
    module: Option<String>,
    main: Option<String>,
}

type RequestKey = (String, String, String);

/// The engine plugin for one build.
pub struct ProjectResolver {
    project: ProjectDescriptor,
    files: Arc<VirtualFileMap>,
    hasher: Arc<ContentHasher>,
    fetcher: Arc<DependencyFetcher>,
    settings: BuildSettings,
    cancel: CancellationToken,
    dependencies: Mutex<DependencySet>,
    decisions: Mutex<HashMap<RequestKey, Decision>>,
    trace: Mutex<Vec<TraceEntry>>,
    trace_all: bool,
    integrity: Mutex<Option<String>>,
}

impl ProjectResolver {
    /// Creates a resolver over the files and dependencies in `context`.
    #[must_use]
    pub fn new(
        context: &BuildContext,
        hasher: Arc<ContentHasher>,
        fetcher: Arc<DependencyFetcher>,
        settings: BuildSettings,
    ) -> Self {
        let project = context.project().clone();
        let trace_all = project.log_level.traces_resolution();
        Self {
            project,
            files: Arc::clone(context.files()),
            hasher,
            fetcher,
            settings,
            cancel: context.cancel_token().clone(),
            dependencies: Mutex::new(context.dependencies().clone()),
            decisions: Mutex::new(HashMap::new()),
            trace: Mutex::new(Vec::new()),
            trace_all,
            integrity: Mutex::new(None),
        }
    }

    /// Recorded decisions, oldest first.
    ///
    /// Every decision is kept when the project's log level traces
    /// resolution; otherwise only failures and fallbacks are.
    #[must_use]
    pub fn trace(&self) -> Vec<TraceEntry> {
        lock(&self.trace).clone()
    }

    /// Dependencies known to the build, including ones fetched on demand.
    #[must_use]
    pub fn dependencies(&self) -> DependencySet {
        lock(&self.dependencies).clone()
    }

    /// The first load whose content no longer matched its collected hash.
    #[must_use]
    pub fn integrity_failure(&self) -> Option<Error> {
        lock(&self.integrity).clone().map(Error::build)
    }

    fn decide(&self, args: &ResolveArgs) -> Decision {
        let key = (
            args.resolve_dir.clone(),
            args.importer.clone(),
            args.path.clone(),
        );
        if let Some(decision) = lock(&self.decisions).get(&key) {
            return decision.clone();
        }
        let decision = match args.namespace {
            Namespace::ProjectFile => self.resolve_in_project(args),
            Namespace::ExternalDependency => self.resolve_in_dependency(args),
        };
        lock(&self.decisions).insert(key, decision.clone());
        decision
    }

    fn resolve_in_project(&self, args: &ResolveArgs) -> Decision {
        let specifier = args.path.as_str();
        let base_dir = if args.resolve_dir.is_empty() {
            path::dirname(&args.importer)
        } else {
            args.resolve_dir.clone()
        };

        if args.kind == ResolveKind::EntryPoint {
            let entry = path::join(&base_dir, specifier);
            return if self.files.get(&entry).is_some() {
                Decision::Project { path: entry }
            } else {
                Decision::Unresolved
            };
        }
        if is_url(specifier) {
            return Decision::Dependency {
                url: specifier.to_string(),
            };
        }
        if is_relative(specifier) {
            return self
                .probe(&path::join(&base_dir, specifier))
                .map_or(Decision::Unresolved, |path| Decision::Project { path });
        }
        if path::is_absolute_like(specifier) {
            return Decision::Unresolved;
        }

        if let Some(decision) = self.resolve_bare(specifier) {
            return decision;
        }
        self.probe_package(specifier).map_or_else(
            || Decision::External {
                path: specifier.to_string(),
                reason: ExternalReason::Fallback,
            },
            |path| Decision::Project { path },
        )
    }

    fn resolve_in_dependency(&self, args: &ResolveArgs) -> Decision {
        let specifier = args.path.as_str();
        if is_url(specifier) {
            return Decision::External {
                path: specifier.to_string(),
                reason: ExternalReason::DependencyImport,
            };
        }
        if is_relative(specifier) || specifier.starts_with('/') {
            let joined = Url::parse(&args.importer).and_then(|base| base.join(specifier));
            return match joined {
                Ok(url) => Decision::External {
                    path: url.to_string(),
                    reason: ExternalReason::DependencyImport,
                },
                Err(err) => {
                    tracing::debug!(importer = %args.importer, specifier, error = %err, "Dependency URL join failed");
                    Decision::Unresolved
                }
            };
        }
        self.resolve_bare(specifier).unwrap_or_else(|| Decision::External {
            path: specifier.to_string(),
            reason: ExternalReason::Fallback,
        })
    }

    /// Allowlist, host API names, then declared dependencies.
    fn resolve_bare(&self, specifier: &str) -> Option<Decision> {
        if self.project.compiler.is_external(specifier) {
            return Some(Decision::External {
                path: specifier.to_string(),
                reason: ExternalReason::Allowlisted,
            });
        }
        if self.settings.is_host_api(package_name(specifier)) {
            return Some(Decision::External {
                path: specifier.to_string(),
                reason: ExternalReason::HostApi,
            });
        }
        lock(&self.dependencies)
            .url_for(specifier)
            .map(|url| Decision::Dependency {
                url: url.to_string(),
            })
    }

    fn probe_package(&self, specifier: &str) -> Option<String> {
        let package_root = path::join(DEPENDENCY_DIR, specifier);
        if package_name(specifier) == specifier
            && let Some(entry) = self.manifest_entry(&package_root)
            && let Some(hit) = self.probe(&path::join(&package_root, &entry))
        {
            return Some(hit);
        }
        self.probe(&package_root)
    }

    fn manifest_entry(&self, package_root: &str) -> Option<String> {
        let asset = self
            .files
            .get(&path::join(package_root, PACKAGE_MANIFEST))?;
        let manifest: PackageManifest = serde_json::from_str(asset.content()).ok()?;
        manifest
            .module
            .into_iter()
            .chain(manifest.main)
            .find(|entry| !entry.trim().is_empty())
    }

    fn probe(&self, base: &str) -> Option<String> {
        if self.files.get(base).is_some() {
            return Some(base.to_string());
        }
        let extensions = &self.project.compiler.resolve_extensions;
        let appended = extensions.iter().map(|ext| format!("{base}{ext}"));
        let indexes = extensions
            .iter()
            .map(|ext| path::join(base, &format!("index{ext}")));
        appended
            .chain(indexes)
            .find(|candidate| self.files.get(candidate).is_some())
    }

    fn record(&self, args: &ResolveArgs, decision: &Decision) {
        if !self.trace_all && !decision.is_notable() {
            return;
        }
        lock(&self.trace).push(TraceEntry {
            specifier: args.path.clone(),
            importer: args.importer.clone(),
            namespace: args.namespace,
            decision: decision.clone(),
        });
    }

    fn load_project_file(&self, file: &str) -> Result<LoadOutcome> {
        let asset = self
            .files
            .get(file)
            .ok_or_else(|| Error::build(format!("'{file}' is not in the virtual file map")))?;
        if let Some(message) = asset.read_error() {
            return Err(Error::FileSystem {
                path: file.to_string(),
                message: message.to_string(),
                source: None,
            });
        }
        if !self
            .hasher
            .verify(asset.content().as_bytes(), asset.content_hash())
        {
            let message = format!("Content of '{file}' no longer matches the hash taken at collection");
            tracing::error!(path = file, "Virtual file content diverged from its hash");
            lock(&self.integrity).get_or_insert_with(|| message.clone());
            return Err(Error::build(message));
        }
        Ok(LoadOutcome {
            contents: asset.content().to_string(),
            loader: self.project.compiler.loader_for(file),
            resolve_dir: path::dirname(file),
        })
    }

    async fn load_dependency(&self, url: &str) -> Result<LoadOutcome> {
        let cached = lock(&self.dependencies).content(url).map(str::to_string);
        let contents = if let Some(text) = cached {
            text
        } else {
            tracing::debug!(url, "Fetching dependency on demand");
            let text = self.fetcher.fetch_text(url).await?;
            lock(&self.dependencies).insert_content(url, text.clone());
            text
        };
        let loader = Url::parse(url).map_or_else(
            |_| self.project.compiler.loader_for(url),
            |parsed| self.project.compiler.loader_for(parsed.path()),
        );
        Ok(LoadOutcome {
            contents,
            loader,
            resolve_dir: url.to_string(),
        })
    }
}

#[async_trait]
impl ResolverPlugin for ProjectResolver {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    async fn on_resolve(&self, args: ResolveArgs) -> Result<ResolveOutcome> {
        self.cancel.check()?;
        let decision = self.decide(&args);
        self.record(&args, &decision);
        tracing::trace!(specifier = %args.path, importer = %args.importer, %decision, "Resolved");
        match decision {
            Decision::Project { path } => Ok(ResolveOutcome::project(path)),
            Decision::Dependency { url } => Ok(ResolveOutcome::dependency(url)),
            Decision::External { path, reason } => {
                let namespace = if reason == ExternalReason::DependencyImport {
                    Namespace::ExternalDependency
                } else {
                    Namespace::ProjectFile
                };
                Ok(ResolveOutcome::external(path, namespace))
            }
            Decision::Unresolved => Err(Error::Resolution {
                specifier: args.path,
                importer: args.importer,
            }),
        }
    }

    async fn on_load(&self, args: LoadArgs) -> Result<LoadOutcome> {
        self.cancel.check()?;
        match args.namespace {
            Namespace::ProjectFile => self.load_project_file(&args.path),
            Namespace::ExternalDependency => self.load_dependency(&args.path).await,
        }
    }
}

impl fmt::Debug for ProjectResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectResolver")
            .field("project", &self.project.id)
            .field("files", &self.files.len())
            .field("trace_all", &self.trace_all)
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn is_url(specifier: &str) -> bool {
    specifier.starts_with("http://") || specifier.starts_with("https://")
}

fn is_relative(specifier: &str) -> bool {
    specifier == "."
        || specifier == ".."
        || specifier.starts_with("./")
        || specifier.starts_with("../")
}

/// Package part of a bare specifier: `@scope/name` or `name`.
fn package_name(specifier: &str) -> &str {
    let mut slashes = specifier.match_indices('/').map(|(index, _)| index);
    let cut = if specifier.starts_with('@') {
        slashes.nth(1)
    } else {
        slashes.next()
    };
    cut.map_or(specifier, |index| &specifier[..index])
}

#[cfg(test)]
mod tests {
    use super::*;
    use vaultbuild_core::testing::StaticNetwork;
    use vaultbuild_core::{BuildInitiator, Loader, LogLevel};
    use vaultbuild_vfs::{CollectionOutcome, VirtualFileAsset};

    const PREACT: &str = "https://cdn.test/preact/dist/preact.module.js";

    struct Fixture {
        network: Arc<StaticNetwork>,
        resolver: ProjectResolver,
    }

    fn fixture_with(project: ProjectDescriptor, files: &[(&str, &str)]) -> Fixture {
        let hasher = Arc::new(ContentHasher::new());
        let mut map = VirtualFileMap::new();
        for (path, content) in files {
            map.insert(VirtualFileAsset::new(
                *path,
                (*content).to_string(),
                hasher.hash_str(content),
            ));
        }
        let mut context = BuildContext::new(project, BuildInitiator::User, CancellationToken::new());
        context.set_collection(CollectionOutcome {
            files: map,
            ..CollectionOutcome::default()
        });
        let mut dependencies = DependencySet::default();
        dependencies.insert_name("preact", PREACT);
        dependencies.insert_content(PREACT, "export const h = 1;");
        context.set_dependencies(dependencies);

        let network = Arc::new(StaticNetwork::new());
        let fetcher = Arc::new(DependencyFetcher::new(network.clone(), BuildSettings::default()));
        let resolver = ProjectResolver::new(&context, hasher, fetcher, BuildSettings::default());
        Fixture { network, resolver }
    }

    fn fixture(files: &[(&str, &str)]) -> Fixture {
        fixture_with(ProjectDescriptor::new("p", ".", "src/index.ts", "main.js"), files)
    }

    fn import(path: &str, importer: &str) -> ResolveArgs {
        ResolveArgs {
            path: path.to_string(),
            importer: importer.to_string(),
            namespace: Namespace::ProjectFile,
            resolve_dir: path::dirname(importer),
            kind: ResolveKind::ImportStatement,
        }
    }

    fn from_dependency(path: &str, importer: &str) -> ResolveArgs {
        ResolveArgs {
            namespace: Namespace::ExternalDependency,
            resolve_dir: importer.to_string(),
            ..import(path, importer)
        }
    }

    #[tokio::test]
    async fn test_relative_import_appends_extension() {
        let fx = fixture(&[("src/index.ts", ""), ("src/util.ts", "")]);
        let outcome = fx.resolver.on_resolve(import("./util", "src/index.ts")).await.unwrap();
        assert_eq!(outcome, ResolveOutcome::project("src/util.ts"));
    }

    #[tokio::test]
    async fn test_relative_import_falls_back_to_index() {
        let fx = fixture(&[("src/index.ts", ""), ("src/util/index.ts", "")]);
        let outcome = fx.resolver.on_resolve(import("./util", "src/index.ts")).await.unwrap();
        assert_eq!(outcome.path, "src/util/index.ts");
    }

    #[tokio::test]
    async fn test_exact_path_wins() {
        let fx = fixture(&[("src/index.ts", ""), ("src/style.css", ""), ("src/style.css.ts", "")]);
        let outcome = fx.resolver.on_resolve(import("./style.css", "src/index.ts")).await.unwrap();
        assert_eq!(outcome.path, "src/style.css");
    }

    #[tokio::test]
    async fn test_missing_relative_import_names_specifier_and_importer() {
        let fx = fixture(&[("src/index.ts", "")]);
        let err = fx
            .resolver
            .on_resolve(import("./util", "src/index.ts"))
            .await
            .unwrap_err();
        assert!(err.is_resolution_error());
        let message = err.to_string();
        assert!(message.contains("'./util'"));
        assert!(message.contains("'src/index.ts'"));
        assert_eq!(fx.resolver.trace().len(), 1);
    }

    #[tokio::test]
    async fn test_parent_import_inside_project() {
        let fx = fixture(&[("src/a/b.ts", ""), ("src/shared.ts", "")]);
        let outcome = fx.resolver.on_resolve(import("../shared", "src/a/b.ts")).await.unwrap();
        assert_eq!(outcome.path, "src/shared.ts");
    }

    #[tokio::test]
    async fn test_entry_point_looked_up_directly() {
        let fx = fixture(&[("src/index.ts", "")]);
        let args = ResolveArgs {
            kind: ResolveKind::EntryPoint,
            resolve_dir: path::ROOT.to_string(),
            ..import("src/index.ts", "")
        };
        let outcome = fx.resolver.on_resolve(args).await.unwrap();
        assert_eq!(outcome.path, "src/index.ts");
    }

    #[tokio::test]
    async fn test_declared_dependency_redirects_to_url() {
        let fx = fixture(&[("src/index.ts", "")]);
        let outcome = fx.resolver.on_resolve(import("preact", "src/index.ts")).await.unwrap();
        assert_eq!(outcome, ResolveOutcome::dependency(PREACT));
    }

    #[tokio::test]
    async fn test_allowlist_wins_over_dependency() {
        let mut project = ProjectDescriptor::new("p", ".", "src/index.ts", "main.js");
        project.compiler.external.push("preact".into());
        let fx = fixture_with(project, &[("src/index.ts", "")]);
        let outcome = fx.resolver.on_resolve(import("preact", "src/index.ts")).await.unwrap();
        assert!(outcome.external);
        assert_eq!(outcome.path, "preact");
    }

    #[tokio::test]
    async fn test_host_api_module_is_external() {
        let fx = fixture(&[("src/index.ts", ""), ("node_modules/obsidian/index.js", "")]);
        let outcome = fx.resolver.on_resolve(import("obsidian", "src/index.ts")).await.unwrap();
        assert!(outcome.external);
    }

    #[tokio::test]
    async fn test_node_modules_package_manifest() {
        let fx = fixture(&[
            ("src/index.ts", ""),
            ("node_modules/tiny/package.json", r#"{"main": "lib/main.js", "module": "esm/index"}"#),
            ("node_modules/tiny/esm/index.js", ""),
            ("node_modules/tiny/lib/main.js", ""),
            ("node_modules/@s/pkg/index.ts", ""),
        ]);
        let outcome = fx.resolver.on_resolve(import("tiny", "src/index.ts")).await.unwrap();
        assert_eq!(outcome.path, "node_modules/tiny/esm/index.js");
        let scoped = fx.resolver.on_resolve(import("@s/pkg", "src/index.ts")).await.unwrap();
        assert_eq!(scoped.path, "node_modules/@s/pkg/index.ts");
    }

    #[tokio::test]
    async fn test_unknown_bare_import_stays_external_and_is_traced() {
        let fx = fixture(&[("src/index.ts", "")]);
        let outcome = fx.resolver.on_resolve(import("left-pad", "src/index.ts")).await.unwrap();
        assert!(outcome.external);
        let trace = fx.resolver.trace();
        assert_eq!(trace.len(), 1);
        assert_eq!(
            trace[0].decision,
            Decision::External {
                path: "left-pad".into(),
                reason: ExternalReason::Fallback
            }
        );
    }

    #[tokio::test]
    async fn test_routine_decisions_traced_only_when_verbose() {
        let quiet = fixture(&[("src/index.ts", ""), ("src/util.ts", "")]);
        quiet.resolver.on_resolve(import("./util", "src/index.ts")).await.unwrap();
        assert!(quiet.resolver.trace().is_empty());

        let mut project = ProjectDescriptor::new("p", ".", "src/index.ts", "main.js");
        project.log_level = LogLevel::Debug;
        let verbose = fixture_with(project, &[("src/index.ts", ""), ("src/util.ts", "")]);
        verbose.resolver.on_resolve(import("./util", "src/index.ts")).await.unwrap();
        assert_eq!(verbose.resolver.trace().len(), 1);
    }

    #[tokio::test]
    async fn test_relative_import_from_dependency_joins_url() {
        let fx = fixture(&[]);
        let outcome = fx
            .resolver
            .on_resolve(from_dependency("../hooks/index.js", PREACT))
            .await
            .unwrap();
        assert!(outcome.external);
        assert_eq!(outcome.namespace, Namespace::ExternalDependency);
        assert_eq!(outcome.path, "https://cdn.test/preact/hooks/index.js");
    }

    #[tokio::test]
    async fn test_url_import_enters_dependency_namespace() {
        let fx = fixture(&[("src/index.ts", "")]);
        let url = "https://cdn.test/htm.js";
        fx.network.respond(url, "export default 2;");
        let outcome = fx.resolver.on_resolve(import(url, "src/index.ts")).await.unwrap();
        assert_eq!(outcome, ResolveOutcome::dependency(url));

        let load = LoadArgs {
            path: url.to_string(),
            namespace: Namespace::ExternalDependency,
        };
        let loaded = fx.resolver.on_load(load.clone()).await.unwrap();
        assert_eq!(loaded.contents, "export default 2;");
        fx.resolver.on_load(load).await.unwrap();
        assert_eq!(fx.network.call_count(url), 1);
        assert!(fx.resolver.dependencies().content(url).is_some());
    }

    #[tokio::test]
    async fn test_load_uses_loader_overrides_and_resolve_dir() {
        let mut project = ProjectDescriptor::new("p", ".", "src/index.ts", "main.js");
        project.compiler.loaders.insert(".svg".into(), Loader::Dataurl);
        project.compiler.resolve_extensions.push(".svg".into());
        let fx = fixture_with(project, &[("src/icons/a.svg", "<svg/>"), ("src/index.ts", "x")]);

        let icon = fx
            .resolver
            .on_load(LoadArgs {
                path: "src/icons/a.svg".into(),
                namespace: Namespace::ProjectFile,
            })
            .await
            .unwrap();
        assert_eq!(icon.loader, Loader::Dataurl);
        assert_eq!(icon.resolve_dir, "src/icons");

        let script = fx
            .resolver
            .on_load(LoadArgs {
                path: "src/index.ts".into(),
                namespace: Namespace::ProjectFile,
            })
            .await
            .unwrap();
        assert_eq!(script.loader, Loader::Ts);
    }

    #[tokio::test]
    async fn test_hash_mismatch_is_fatal() {
        let hasher = Arc::new(ContentHasher::new());
        let mut map = VirtualFileMap::new();
        map.insert(VirtualFileAsset::new(
            "main.ts",
            "export const x = 2;".into(),
            hasher.hash_str("export const x = 1;"),
        ));
        let project = ProjectDescriptor::new("p", ".", "main.ts", "main.js");
        let mut context = BuildContext::new(project, BuildInitiator::User, CancellationToken::new());
        context.set_collection(CollectionOutcome {
            files: map,
            ..CollectionOutcome::default()
        });
        let fetcher = Arc::new(DependencyFetcher::new(
            Arc::new(StaticNetwork::new()),
            BuildSettings::default(),
        ));
        let resolver = ProjectResolver::new(&context, hasher, fetcher, BuildSettings::default());

        let err = resolver
            .on_load(LoadArgs {
                path: "main.ts".into(),
                namespace: Namespace::ProjectFile,
            })
            .await
            .unwrap_err();
        assert!(err.is_build_error());
        assert!(resolver.integrity_failure().is_some());
    }

    #[tokio::test]
    async fn test_unreadable_file_reports_read_error() {
        let fx = fixture(&[("src/index.ts", "")]);
        let mut map = VirtualFileMap::new();
        map.insert(VirtualFileAsset::unreadable("src/locked.ts", "permission denied"));
        let project = ProjectDescriptor::new("p", ".", "src/index.ts", "main.js");
        let mut context = BuildContext::new(project, BuildInitiator::User, CancellationToken::new());
        context.set_collection(CollectionOutcome {
            files: map,
            ..CollectionOutcome::default()
        });
        let resolver = ProjectResolver::new(
            &context,
            Arc::new(ContentHasher::new()),
            Arc::new(DependencyFetcher::new(fx.network.clone(), BuildSettings::default())),
            BuildSettings::default(),
        );
        let err = resolver
            .on_load(LoadArgs {
                path: "src/locked.ts".into(),
                namespace: Namespace::ProjectFile,
            })
            .await
            .unwrap_err();
        assert!(err.is_file_system_error());
        assert!(err.to_string().contains("permission denied"));
    }

    #[tokio::test]
    async fn test_cancelled_resolver_refuses_requests() {
        let project = ProjectDescriptor::new("p", ".", "main.ts", "main.js");
        let cancel = CancellationToken::new();
        let context = BuildContext::new(project, BuildInitiator::User, cancel.clone());
        let resolver = ProjectResolver::new(
            &context,
            Arc::new(ContentHasher::new()),
            Arc::new(DependencyFetcher::new(Arc::new(StaticNetwork::new()), BuildSettings::default())),
            BuildSettings::default(),
        );
        cancel.cancel();
        let err = resolver.on_resolve(import("./a", "main.ts")).await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_package_name() {
        assert_eq!(package_name("react"), "react");
        assert_eq!(package_name("react/jsx-runtime"), "react");
        assert_eq!(package_name("@scope/pkg"), "@scope/pkg");
        assert_eq!(package_name("@scope/pkg/sub/path"), "@scope/pkg");
    }
}
