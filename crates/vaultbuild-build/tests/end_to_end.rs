//! Whole builds against in-memory storage, a canned network, and the fake
//! engine.

use std::sync::Arc;
use std::time::Duration;
use vaultbuild_bridge::DependencyFetcher;
use vaultbuild_build::{BuildEvent, BuildOrchestrator, ProjectRegistry};
use vaultbuild_core::testing::StaticNetwork;
use vaultbuild_core::{
    BuildInitiator, BuildPhase, BuildSettings, ContentHasher, EngineConfig, HostStorage,
    MemoryStorage, ModuleFormat, ProjectDescriptor, ProjectId, SourceMapMode,
};
use vaultbuild_engine::testing::{FakeEngine, ScriptedHost};
use vaultbuild_engine::{AssetAcquirer, EngineLifecycle, ModuleCache, ModuleCompiler};

const SCRIPT_URL: &str = "https://cdn.test/engine.js";
const BINARY_URL: &str = "https://cdn.test/engine.wasm";
const PREACT_URL: &str = "https://cdn.test/preact.js";

struct Harness {
    storage: Arc<MemoryStorage>,
    network: Arc<StaticNetwork>,
    engine: Arc<FakeEngine>,
    orchestrator: Arc<BuildOrchestrator>,
}

impl Harness {
    fn new() -> Self {
        let storage = Arc::new(MemoryStorage::new());
        let network = Arc::new(StaticNetwork::new());
        network.respond(SCRIPT_URL, "globalThis.engine = {}");
        network.respond(BINARY_URL, wat::parse_str("(module)").unwrap());
        network.respond(PREACT_URL, "export function h() {}\n");

        let hasher = Arc::new(ContentHasher::new());
        let compiler = Arc::new(ModuleCompiler::new(Arc::new(ModuleCache::new(2))).unwrap());
        let acquirer = AssetAcquirer::new(
            network.clone(),
            storage.clone(),
            hasher.clone(),
            compiler,
        );
        let config = EngineConfig::builder()
            .script_url(SCRIPT_URL)
            .binary_url(BINARY_URL)
            .cache_enabled(false)
            .init_timeout(Duration::from_secs(1))
            .api_poll(5, Duration::from_millis(10))
            .stop_timeout(Duration::from_secs(1))
            .build();
        let engine = Arc::new(FakeEngine::new());
        let host = Arc::new(ScriptedHost::new(Arc::clone(&engine)));
        let lifecycle = Arc::new(EngineLifecycle::new(config, host, acquirer).unwrap());

        let settings = BuildSettings::default();
        let orchestrator = BuildOrchestrator::builder()
            .storage(storage.clone())
            .engine(lifecycle)
            .fetcher(Arc::new(DependencyFetcher::new(
                network.clone(),
                settings.clone(),
            )))
            .registry(Arc::new(ProjectRegistry::new()))
            .hasher(hasher)
            .settings(settings)
            .build()
            .unwrap();

        Self {
            storage,
            network,
            engine,
            orchestrator: Arc::new(orchestrator),
        }
    }

    async fn file(&self, path: &str, content: &str) {
        self.storage.write(path, content).await.unwrap();
    }

    async fn register(&self, project: ProjectDescriptor) -> ProjectId {
        let id = project.id.clone();
        self.orchestrator.registry().add(project).await.unwrap();
        id
    }

    async fn wait_for_phase(&self, phase: BuildPhase) {
        for _ in 0..200 {
            if self
                .orchestrator
                .current_build()
                .is_some_and(|status| status.phase == phase)
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("build never reached {phase}");
    }
}

fn demo() -> ProjectDescriptor {
    ProjectDescriptor::new("demo", "plugins/demo", "main.ts", "main.js")
}

#[tokio::test]
async fn test_bundles_esm_project_and_inlines_local_imports() {
    let harness = Harness::new();
    harness
        .file(
            "plugins/demo/main.ts",
            "import { greet } from './lib';\nconsole.log(greet());\n",
        )
        .await;
    harness
        .file("plugins/demo/lib.ts", "export const greet = () => 'hi';\n")
        .await;
    let mut project = demo();
    project.compiler.format = ModuleFormat::Esm;
    let id = harness.register(project).await;
    let mut events = harness.orchestrator.subscribe();

    let summary = harness
        .orchestrator
        .trigger_build(&id, BuildInitiator::User)
        .await
        .unwrap();

    assert_eq!(summary.output_path, "plugins/demo/main.js");
    assert_eq!(summary.file_count, 2);
    assert!(summary.map_path.is_none());
    let bundle = harness.storage.read("plugins/demo/main.js").await.unwrap();
    assert!(!bundle.contains("./lib"));
    assert!(bundle.contains("export const greet"));
    assert!(bundle.contains("console.log(greet());"));
    assert!(bundle.find("// lib.ts") < bundle.find("// main.ts"));

    assert!(matches!(events.recv().await.unwrap(), BuildEvent::Started { .. }));
    match events.recv().await.unwrap() {
        BuildEvent::Succeeded { output_path, build_id, .. } => {
            assert_eq!(output_path, "plugins/demo/main.js");
            assert_eq!(build_id, summary.build_id);
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert!(harness.orchestrator.current_build().is_none());
}

#[tokio::test]
async fn test_dependency_is_bundled_from_fetched_source() {
    let harness = Harness::new();
    harness
        .file(
            "plugins/demo/main.ts",
            "import { h } from 'preact';\nimport { Notice } from 'obsidian';\nh();\n",
        )
        .await;
    let id = harness
        .register(demo().with_dependency("preact", PREACT_URL))
        .await;

    harness
        .orchestrator
        .trigger_build(&id, BuildInitiator::Cli)
        .await
        .unwrap();

    let bundle = harness.storage.read("plugins/demo/main.js").await.unwrap();
    assert!(bundle.contains("export function h() {}"));
    assert!(bundle.contains("from 'obsidian'"));
    assert!(!bundle.contains("from 'preact'"));
    assert_eq!(harness.network.call_count(PREACT_URL), 1);
}

#[tokio::test]
async fn test_unknown_project_fails_fast() {
    let harness = Harness::new();
    let err = harness
        .orchestrator
        .trigger_build(&ProjectId::new("ghost"), BuildInitiator::User)
        .await
        .unwrap_err();

    assert!(err.is_validation_error());
    assert!(harness.orchestrator.current_build().is_none());
    assert_eq!(harness.engine.build_count(), 0);
}

#[tokio::test]
async fn test_second_build_is_rejected_while_one_runs() {
    let harness = Harness::new();
    harness.file("plugins/demo/main.ts", "import { h } from 'preact';\n").await;
    harness.file("plugins/other/main.ts", "console.log(1);\n").await;
    let id = harness
        .register(demo().with_dependency("preact", PREACT_URL))
        .await;
    let other = harness
        .register(ProjectDescriptor::new("other", "plugins/other", "main.ts", "main.js"))
        .await;
    harness.orchestrator.engine().initialize("test").await.unwrap();
    harness.network.set_delay(Duration::from_millis(200));

    let orchestrator = Arc::clone(&harness.orchestrator);
    let running = tokio::spawn(async move {
        orchestrator.trigger_build(&id, BuildInitiator::User).await
    });
    harness.wait_for_phase(BuildPhase::Preparing).await;

    let err = harness
        .orchestrator
        .trigger_build(&other, BuildInitiator::User)
        .await
        .unwrap_err();
    assert!(err.is_build_error());
    assert!(err.to_string().contains("'demo'"));

    running.await.unwrap().unwrap();
    assert!(harness.orchestrator.current_build().is_none());
}

#[tokio::test]
async fn test_cancel_during_dependency_fetch() {
    let harness = Harness::new();
    harness.file("plugins/demo/main.ts", "import { h } from 'preact';\n").await;
    let id = harness
        .register(demo().with_dependency("preact", PREACT_URL))
        .await;
    harness.orchestrator.engine().initialize("test").await.unwrap();
    harness.network.set_delay(Duration::from_millis(200));
    let mut events = harness.orchestrator.subscribe();

    let orchestrator = Arc::clone(&harness.orchestrator);
    let running = tokio::spawn(async move {
        orchestrator.trigger_build(&id, BuildInitiator::User).await
    });
    harness.wait_for_phase(BuildPhase::Preparing).await;
    assert!(harness.orchestrator.cancel_current_build());

    let err = running.await.unwrap().unwrap_err();
    assert!(err.is_cancelled());
    assert!(!harness.storage.exists("plugins/demo/main.js").await.unwrap());
    assert!(harness.orchestrator.diagnostics(&ProjectId::new("demo")).is_none());
    assert_eq!(harness.engine.build_count(), 0);

    assert!(matches!(events.recv().await.unwrap(), BuildEvent::Started { .. }));
    assert!(matches!(events.recv().await.unwrap(), BuildEvent::Cancelled { .. }));
    assert!(harness.orchestrator.current_build().is_none());
}

#[tokio::test]
async fn test_missing_import_stores_diagnostics() {
    let harness = Harness::new();
    harness
        .file(
            "plugins/demo/main.ts",
            "const a = 1;\nimport { x } from './missing';\nconsole.log(a);\n",
        )
        .await;
    let id = harness.register(demo()).await;
    let mut events = harness.orchestrator.subscribe();

    let err = harness
        .orchestrator
        .trigger_build(&id, BuildInitiator::User)
        .await
        .unwrap_err();
    assert!(err.is_build_error());
    assert!(err.to_string().contains("./missing"));
    assert!(!harness.storage.exists("plugins/demo/main.js").await.unwrap());

    let report = harness.orchestrator.diagnostics(&id).unwrap();
    assert_eq!(report.phase, BuildPhase::Compiling);
    assert_eq!(report.engine_errors.len(), 1);
    let rendered = &report.engine_errors[0];
    assert!(rendered.contains("Could not resolve './missing' from 'main.ts'"));
    assert!(rendered.contains("[plugin vaultbuild-resolver]"));
    assert!(rendered.contains("main.ts:2:"));
    assert!(rendered.contains("> 2 | import { x } from './missing';"));
    assert!(rendered.contains("Bytes around line 2"));
    assert!(report.render().contains("Engine errors"));

    assert!(matches!(events.recv().await.unwrap(), BuildEvent::Started { .. }));
    match events.recv().await.unwrap() {
        BuildEvent::Failed { message, .. } => {
            assert!(message.ends_with("(copy full diagnostics for details)"));
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn test_success_clears_previous_diagnostics() {
    let harness = Harness::new();
    harness
        .file("plugins/demo/main.ts", "import './missing';\n")
        .await;
    let id = harness.register(demo()).await;
    harness
        .orchestrator
        .trigger_build(&id, BuildInitiator::User)
        .await
        .unwrap_err();
    assert!(harness.orchestrator.diagnostics(&id).is_some());

    harness.file("plugins/demo/missing.ts", "export {};\n").await;
    harness
        .orchestrator
        .trigger_build(&id, BuildInitiator::User)
        .await
        .unwrap();
    assert!(harness.orchestrator.diagnostics(&id).is_none());
}

#[tokio::test]
async fn test_external_source_map_is_written_beside_bundle() {
    let harness = Harness::new();
    harness.file("plugins/demo/main.ts", "console.log(1);\n").await;
    let mut project = demo();
    project.compiler.sourcemap = SourceMapMode::External;
    let id = harness.register(project).await;

    let summary = harness
        .orchestrator
        .trigger_build(&id, BuildInitiator::User)
        .await
        .unwrap();

    assert_eq!(summary.map_path.as_deref(), Some("plugins/demo/main.js.map"));
    assert!(harness.storage.exists("plugins/demo/main.js.map").await.unwrap());
    let bundle = harness.storage.read("plugins/demo/main.js").await.unwrap();
    assert!(bundle.trim_end().ends_with("//# sourceMappingURL=main.js.map"));
}

#[tokio::test]
async fn test_engine_warning_is_published_and_build_succeeds() {
    let harness = Harness::new();
    harness
        .file("plugins/demo/main.ts", "console.log(1); // @@warn\n")
        .await;
    let id = harness.register(demo()).await;
    let mut events = harness.orchestrator.subscribe();

    let summary = harness
        .orchestrator
        .trigger_build(&id, BuildInitiator::User)
        .await
        .unwrap();
    assert_eq!(summary.warnings.len(), 1);
    assert!(summary.warnings[0].starts_with("[WARNING]"));

    assert!(matches!(events.recv().await.unwrap(), BuildEvent::Started { .. }));
    match events.recv().await.unwrap() {
        BuildEvent::Warning { project, message } => {
            assert_eq!(project, id);
            assert!(message.starts_with("main.ts:1:"));
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert!(matches!(events.recv().await.unwrap(), BuildEvent::Succeeded { .. }));
}

#[tokio::test]
async fn test_output_escaping_root_is_rejected() {
    let harness = Harness::new();
    harness.file("plugins/demo/main.ts", "console.log(1);\n").await;
    let mut project = demo();
    project.output = "../../main.js".into();
    let err = harness.orchestrator.registry().add(project).await.unwrap_err();
    assert!(err.is_validation_error() || err.is_security_error());
    assert_eq!(harness.storage.file_count(), 1);
}
