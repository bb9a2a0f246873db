//! In-process engine doubles.
//!
//! [`ScriptedHost`] plays the host environment that runs the bootstrap
//! script; [`FakeEngine`] is a small bundler that drives the resolver
//! protocol for real. It follows `import`/`export ... from` statements,
//! inlines every non-external module (dependencies first), strips the
//! inlined imports, and keeps imports of externals.
//!
//! Source lines containing `@@error` or `@@warn` make the fake report an
//! error or warning located at that line.

use crate::compiler::CompiledModule;
use crate::protocol::{
    BundlingEngine, EngineBuildOptions, EngineBuildOutput, EngineHost, EngineMessage, LoadArgs,
    MessageLocation, OutputFile, ResolveArgs, ResolveKind, ResolveOutcome, ResolverPlugin,
    ScriptHandle,
};
use async_trait::async_trait;
use regex::Regex;
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use vaultbuild_core::{Error, Loader, ModuleFormat, Namespace, Result, SourceMapMode, path};

const IMPORT_PATTERN: &str =
    r#"^\s*(?:import|export)\s+(?:[^'"]*?\s*from\s*)?['"]([^'"]+)['"]\s*;?\s*$"#;
const ERROR_MARKER: &str = "@@error";
const WARNING_MARKER: &str = "@@warn";

#[derive(Debug, Default)]
struct HostState {
    next_handle: u64,
    live: HashSet<ScriptHandle>,
    injected: usize,
    removed: usize,
    polls: u32,
}

/// Host double that exposes an engine API some polls after injection.
pub struct ScriptedHost {
    engine: Arc<dyn BundlingEngine>,
    appears_after: Option<u32>,
    state: Mutex<HostState>,
}

impl ScriptedHost {
    /// A host whose API appears on the first poll.
    #[must_use]
    pub fn new<E: BundlingEngine + 'static>(engine: Arc<E>) -> Self {
        Self {
            engine,
            appears_after: Some(0),
            state: Mutex::new(HostState::default()),
        }
    }

    /// A host whose script never exposes the API.
    #[must_use]
    pub fn never_exposes_api<E: BundlingEngine + 'static>(engine: Arc<E>) -> Self {
        Self {
            appears_after: None,
            ..Self::new(engine)
        }
    }

    /// Makes the API appear only after `polls` unsuccessful polls.
    #[must_use]
    pub const fn with_api_delay(mut self, polls: u32) -> Self {
        self.appears_after = Some(polls);
        self
    }

    /// Scripts injected so far.
    #[must_use]
    pub fn injected_count(&self) -> usize {
        self.state().injected
    }

    /// Scripts removed so far.
    #[must_use]
    pub fn removed_count(&self) -> usize {
        self.state().removed
    }

    /// Scripts currently injected.
    #[must_use]
    pub fn live_scripts(&self) -> usize {
        self.state().live.len()
    }

    fn state(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ScriptedHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedHost")
            .field("appears_after", &self.appears_after)
            .field("state", &*self.state())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl EngineHost for ScriptedHost {
    async fn inject_script(&self, script: &str) -> Result<ScriptHandle> {
        if script.trim().is_empty() {
            return Err(Error::engine("Refusing to inject an empty script"));
        }
        let mut state = self.state();
        state.next_handle += 1;
        let handle = ScriptHandle(state.next_handle);
        state.live.insert(handle);
        state.injected += 1;
        state.polls = 0;
        Ok(handle)
    }

    fn api(&self) -> Option<Arc<dyn BundlingEngine>> {
        let mut state = self.state();
        if state.live.is_empty() {
            return None;
        }
        let threshold = self.appears_after?;
        if state.polls >= threshold {
            return Some(Arc::clone(&self.engine));
        }
        state.polls += 1;
        None
    }

    async fn remove_script(&self, handle: ScriptHandle) -> Result<()> {
        let mut state = self.state();
        if state.live.remove(&handle) {
            state.removed += 1;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct EngineState {
    running: bool,
    initialized: usize,
    stopped: usize,
    builds: usize,
    last_options: Option<EngineBuildOptions>,
}

/// A minimal bundler speaking the resolver protocol.
#[derive(Debug, Default)]
pub struct FakeEngine {
    init_delay: Option<Duration>,
    init_failure: Option<String>,
    state: Mutex<EngineState>,
}

impl FakeEngine {
    /// An engine that initializes immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays `initialize`.
    #[must_use]
    pub const fn with_init_delay(mut self, delay: Duration) -> Self {
        self.init_delay = Some(delay);
        self
    }

    /// Makes `initialize` fail with `message`.
    #[must_use]
    pub fn fail_initialize(mut self, message: impl Into<String>) -> Self {
        self.init_failure = Some(message.into());
        self
    }

    /// Successful `initialize` calls.
    #[must_use]
    pub fn initialize_count(&self) -> usize {
        self.state().initialized
    }

    /// `stop` calls.
    #[must_use]
    pub fn stop_count(&self) -> usize {
        self.state().stopped
    }

    /// `build` calls.
    #[must_use]
    pub fn build_count(&self) -> usize {
        self.state().builds
    }

    /// Options of the most recent build.
    #[must_use]
    pub fn last_options(&self) -> Option<EngineBuildOptions> {
        self.state().last_options.clone()
    }

    fn state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl BundlingEngine for FakeEngine {
    async fn initialize(&self, _module: CompiledModule) -> Result<()> {
        if let Some(delay) = self.init_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.init_failure {
            return Err(Error::engine(message.clone()));
        }
        let mut state = self.state();
        state.running = true;
        state.initialized += 1;
        Ok(())
    }

    async fn build(
        &self,
        options: EngineBuildOptions,
        plugin: Arc<dyn ResolverPlugin>,
    ) -> Result<EngineBuildOutput> {
        {
            let mut state = self.state();
            if !state.running {
                return Err(Error::engine("Engine is not initialized"));
            }
            state.builds += 1;
            state.last_options = Some(options.clone());
        }

        let pattern = Regex::new(IMPORT_PATTERN)
            .map_err(|err| Error::engine(format!("Invalid import pattern: {err}")))?;
        let mut run = BundleRun {
            plugin,
            pattern,
            visited: HashSet::new(),
            chunks: Vec::new(),
            sources: Vec::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
        };

        let entry = ResolveArgs {
            path: options.entry_point.clone(),
            importer: String::new(),
            namespace: Namespace::ProjectFile,
            resolve_dir: path::ROOT.to_string(),
            kind: ResolveKind::EntryPoint,
        };
        match run.plugin.on_resolve(entry).await {
            Ok(target) => run.visit(target).await,
            Err(err) => {
                let message = run.plugin_message(&err, None);
                run.errors.push(message);
            }
        }

        if !run.errors.is_empty() {
            return Ok(EngineBuildOutput {
                output_files: Vec::new(),
                errors: run.errors,
                warnings: run.warnings,
            });
        }
        Ok(EngineBuildOutput {
            output_files: run.output_files(&options),
            errors: Vec::new(),
            warnings: run.warnings,
        })
    }

    async fn stop(&self) -> Result<()> {
        let mut state = self.state();
        state.running = false;
        state.stopped += 1;
        Ok(())
    }
}

struct ScannedLine {
    number: u32,
    text: String,
    import: Option<(String, u32)>,
}

struct BundleRun {
    plugin: Arc<dyn ResolverPlugin>,
    pattern: Regex,
    visited: HashSet<(Namespace, String)>,
    chunks: Vec<String>,
    sources: Vec<String>,
    errors: Vec<EngineMessage>,
    warnings: Vec<EngineMessage>,
}

impl BundleRun {
    fn visit(&mut self, target: ResolveOutcome) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            if !self.visited.insert((target.namespace, target.path.clone())) {
                return;
            }
            let load = LoadArgs {
                path: target.path.clone(),
                namespace: target.namespace,
            };
            let loaded = match self.plugin.on_load(load).await {
                Ok(loaded) => loaded,
                Err(err) => {
                    let message = self.plugin_message(&err, None);
                    self.errors.push(message);
                    return;
                }
            };

            let mut body = String::new();
            for line in self.scan(&loaded.contents) {
                let location = || MessageLocation {
                    file: target.path.clone(),
                    namespace: target.namespace,
                    line: line.number,
                    column: 0,
                    length: 0,
                    line_text: line.text.clone(),
                };
                if let Some(column) = marker_column(&line.text, ERROR_MARKER) {
                    self.errors.push(marked(ERROR_MARKER, location(), column));
                }
                if let Some(column) = marker_column(&line.text, WARNING_MARKER) {
                    self.warnings.push(marked(WARNING_MARKER, location(), column));
                }

                let Some((specifier, column)) = &line.import else {
                    body.push_str(&line.text);
                    body.push('\n');
                    continue;
                };
                let args = ResolveArgs {
                    path: specifier.clone(),
                    importer: target.path.clone(),
                    namespace: target.namespace,
                    resolve_dir: loaded.resolve_dir.clone(),
                    kind: ResolveKind::ImportStatement,
                };
                match self.plugin.on_resolve(args).await {
                    Ok(child) if child.external => {
                        body.push_str(&line.text);
                        body.push('\n');
                    }
                    Ok(child) => self.visit(child).await,
                    Err(err) => {
                        let mut at = location();
                        at.column = *column;
                        at.length = u32::try_from(specifier.chars().count()).unwrap_or(u32::MAX);
                        let message = self.plugin_message(&err, Some(at));
                        self.errors.push(message);
                    }
                }
            }

            if loaded.loader != Loader::Empty {
                self.sources.push(target.path.clone());
                self.chunks.push(format!("// {}\n{body}", target.path));
            }
        })
    }

    fn scan(&self, contents: &str) -> Vec<ScannedLine> {
        contents
            .lines()
            .enumerate()
            .map(|(index, text)| {
                let import = self.pattern.captures(text).and_then(|captures| {
                    captures.get(1).map(|specifier| {
                        let column = text[..specifier.start()].chars().count();
                        (
                            specifier.as_str().to_string(),
                            u32::try_from(column).unwrap_or(u32::MAX),
                        )
                    })
                });
                ScannedLine {
                    number: u32::try_from(index + 1).unwrap_or(u32::MAX),
                    text: text.to_string(),
                    import,
                }
            })
            .collect()
    }

    fn plugin_message(&self, err: &Error, location: Option<MessageLocation>) -> EngineMessage {
        EngineMessage {
            text: err.to_string(),
            plugin: Some(self.plugin.name().to_string()),
            location,
        }
    }

    fn output_files(&self, options: &EngineBuildOptions) -> Vec<OutputFile> {
        let mut code = self.chunks.join("\n");
        if options.minify {
            code = code
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with("//"))
                .collect::<Vec<_>>()
                .join("\n");
        }
        if options.format == ModuleFormat::Iife {
            code = format!("(() => {{\n{code}\n}})();\n");
        }

        let map = format!(
            r#"{{"version":3,"sources":[{}],"mappings":""}}"#,
            self.sources
                .iter()
                .map(|source| format!("{source:?}"))
                .collect::<Vec<_>>()
                .join(",")
        );
        let map_name = format!("{}.map", path::file_name(&options.outfile));
        match options.sourcemap {
            SourceMapMode::None => vec![OutputFile {
                path: options.outfile.clone(),
                contents: code,
            }],
            SourceMapMode::Inline => vec![OutputFile {
                path: options.outfile.clone(),
                contents: format!(
                    "{code}\n//# sourceMappingURL=data:application/json;charset=utf-8,{map}\n"
                ),
            }],
            SourceMapMode::External => vec![
                OutputFile {
                    path: options.outfile.clone(),
                    contents: format!("{code}\n//# sourceMappingURL={map_name}\n"),
                },
                OutputFile {
                    path: format!("{}.map", options.outfile),
                    contents: map,
                },
            ],
        }
    }
}

fn marker_column(text: &str, marker: &str) -> Option<u32> {
    text.find(marker)
        .map(|offset| u32::try_from(text[..offset].chars().count()).unwrap_or(u32::MAX))
}

fn marked(marker: &str, mut location: MessageLocation, column: u32) -> EngineMessage {
    location.column = column;
    location.length = u32::try_from(marker.len()).unwrap_or(u32::MAX);
    EngineMessage {
        text: format!("Unexpected \"{marker}\""),
        plugin: None,
        location: Some(location),
    }
}
