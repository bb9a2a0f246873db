//! Engine asset acquisition.
//!
//! The engine needs two assets: a bootstrap script and a WebAssembly binary.
//! [`AssetAcquirer::get_assets`] serves them from the chunked cache when it
//! verifies, otherwise downloads both, compiles the binary, and writes the
//! pair back to the cache.

use crate::compiler::{CompiledModule, ModuleCompiler};
use crate::generation::GenerationGuard;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use vaultbuild_cache::ChunkedCache;
use vaultbuild_core::{
    ContentHasher, EngineConfig, Error, HostStorage, HttpRequest, NetworkClient, Result,
};

/// Where a set of engine assets came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetSource {
    /// Verified chunked cache
    Cache,
    /// Freshly downloaded
    Network,
}

/// The two artifacts needed to start the engine.
#[derive(Clone)]
pub struct EngineAssets {
    /// Bootstrap script
    pub script_text: String,
    /// Compiled engine binary
    pub module: CompiledModule,
    /// Origin of the pair
    pub source: AssetSource,
}

impl fmt::Debug for EngineAssets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineAssets")
            .field("script_len", &self.script_text.len())
            .field("module", &self.module)
            .field("source", &self.source)
            .finish()
    }
}

/// Obtains engine assets from cache or network.
pub struct AssetAcquirer {
    network: Arc<dyn NetworkClient>,
    storage: Arc<dyn HostStorage>,
    hasher: Arc<ContentHasher>,
    compiler: Arc<ModuleCompiler>,
    request_timeout: Duration,
}

impl AssetAcquirer {
    /// Creates an acquirer.
    #[must_use]
    pub fn new(
        network: Arc<dyn NetworkClient>,
        storage: Arc<dyn HostStorage>,
        hasher: Arc<ContentHasher>,
        compiler: Arc<ModuleCompiler>,
    ) -> Self {
        Self {
            network,
            storage,
            hasher,
            compiler,
            request_timeout: Duration::from_secs(30),
        }
    }

    /// Overrides the per-request download timeout.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// The chunked cache configured by `config`.
    #[must_use]
    pub fn cache_for(&self, config: &EngineConfig) -> ChunkedCache {
        ChunkedCache::new(
            Arc::clone(&self.storage),
            config.cache_dir.clone(),
            Arc::clone(&self.hasher),
        )
    }

    /// Drops every compiled module kept in memory.
    pub fn forget_compiled(&self) {
        self.compiler.cache().clear();
    }

    /// Obtains a validated asset pair.
    ///
    /// A cache hit whose binary fails to compile counts as a miss. Failing
    /// to write the cache after a download is logged and ignored.
    ///
    /// # Errors
    ///
    /// - aborted [`Error::EngineInitialization`] once `guard` goes stale
    /// - [`Error::EngineInitialization`] if a download fails or the assets
    ///   are invalid
    pub async fn get_assets(
        &self,
        config: &EngineConfig,
        guard: &GenerationGuard,
    ) -> Result<EngineAssets> {
        guard.check("asset acquisition")?;

        if config.cache_enabled {
            let cache = self.cache_for(config);
            if let Some(cached) = cache.load().await {
                guard.check("cache load")?;
                match self.validate(cached.script_text, cached.binary).await {
                    Ok((script_text, module)) => {
                        guard.check("cached binary compilation")?;
                        return Ok(EngineAssets {
                            script_text,
                            module,
                            source: AssetSource::Cache,
                        });
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "Cached engine assets unusable, downloading");
                    }
                }
            }
        }

        guard.check("download")?;
        let (script_bytes, binary) = tokio::try_join!(
            self.download(&config.script_url),
            self.download(&config.binary_url)
        )?;
        guard.check("download")?;

        let script_text = String::from_utf8(script_bytes).map_err(|err| {
            Error::EngineInitialization {
                message: format!("Engine script from {} is not valid UTF-8", config.script_url),
                aborted: false,
                source: Some(Box::new(err)),
            }
        })?;

        let cache_copy = config.cache_enabled.then(|| binary.clone());
        let (script_text, module) = self.validate(script_text, binary).await?;
        guard.check("binary compilation")?;

        if let Some(binary) = cache_copy {
            if let Err(err) = self.cache_for(config).save(&script_text, &binary).await {
                tracing::warn!(error = %err, "Failed to write engine cache");
            }
            guard.check("cache write")?;
        }

        tracing::info!(
            generation = guard.generation(),
            script_bytes = script_text.len(),
            binary_bytes = module.size(),
            "Engine assets downloaded"
        );
        Ok(EngineAssets {
            script_text,
            module,
            source: AssetSource::Network,
        })
    }

    async fn validate(&self, script_text: String, binary: Vec<u8>) -> Result<(String, CompiledModule)> {
        if script_text.trim().is_empty() {
            return Err(Error::engine("Engine script is empty"));
        }
        let module = self.compiler.compile(binary).await?;
        Ok((script_text, module))
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let request = HttpRequest::get(url).with_timeout(self.request_timeout);
        let response = self
            .network
            .fetch(request)
            .await
            .map_err(|err| Error::EngineInitialization {
                message: format!("Failed to download engine asset {url}"),
                aborted: false,
                source: Some(Box::new(err)),
            })?;
        if !response.is_success() {
            return Err(Error::EngineInitialization {
                message: format!("Engine asset {url} answered HTTP {}", response.status),
                aborted: false,
                source: Some(Box::new(Error::Network {
                    url: url.to_string(),
                    message: format!("HTTP {}", response.status),
                    status: Some(response.status),
                })),
            });
        }
        tracing::debug!(url, bytes = response.body.len(), "Downloaded engine asset");
        Ok(response.body)
    }
}

impl fmt::Debug for AssetAcquirer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetAcquirer")
            .field("compiler", &self.compiler)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::GenerationCounter;
    use crate::module_cache::ModuleCache;
    use vaultbuild_core::testing::StaticNetwork;
    use vaultbuild_core::{HttpResponse, MemoryStorage};

    const SCRIPT_URL: &str = "https://cdn.test/engine.js";
    const BINARY_URL: &str = "https://cdn.test/engine.wasm";

    struct Fixture {
        network: Arc<StaticNetwork>,
        storage: Arc<MemoryStorage>,
        acquirer: AssetAcquirer,
        config: EngineConfig,
    }

    fn fixture() -> Fixture {
        let network = Arc::new(StaticNetwork::new());
        network.respond(SCRIPT_URL, "globalThis.engine = {}");
        network.respond(BINARY_URL, wat::parse_str("(module)").unwrap());
        let storage = Arc::new(MemoryStorage::new());
        let compiler = Arc::new(ModuleCompiler::new(Arc::new(ModuleCache::new(2))).unwrap());
        let acquirer = AssetAcquirer::new(
            network.clone(),
            storage.clone(),
            Arc::new(ContentHasher::new()),
            compiler,
        );
        let config = EngineConfig::builder()
            .script_url(SCRIPT_URL)
            .binary_url(BINARY_URL)
            .cache_dir("cache/engine")
            .build();
        Fixture {
            network,
            storage,
            acquirer,
            config,
        }
    }

    fn current_guard() -> GenerationGuard {
        let counter = GenerationCounter::new();
        counter.guard(counter.advance())
    }

    #[tokio::test]
    async fn test_downloads_then_serves_from_cache() {
        let fx = fixture();
        let guard = current_guard();

        let first = fx.acquirer.get_assets(&fx.config, &guard).await.unwrap();
        assert_eq!(first.source, AssetSource::Network);
        assert_eq!(first.script_text, "globalThis.engine = {}");
        assert!(fx.storage.exists("cache/engine/cache-manifest.json").await.unwrap());

        let second = fx.acquirer.get_assets(&fx.config, &guard).await.unwrap();
        assert_eq!(second.source, AssetSource::Cache);
        assert_eq!(second.module.key(), first.module.key());
        assert_eq!(fx.network.total_calls(), 2);
    }

    #[tokio::test]
    async fn test_cache_disabled_always_downloads() {
        let mut fx = fixture();
        fx.config.cache_enabled = false;
        let guard = current_guard();
        fx.acquirer.get_assets(&fx.config, &guard).await.unwrap();
        fx.acquirer.get_assets(&fx.config, &guard).await.unwrap();
        assert_eq!(fx.network.call_count(BINARY_URL), 2);
        assert!(!fx.storage.exists("cache/engine").await.unwrap());
    }

    #[tokio::test]
    async fn test_http_failure_is_engine_error() {
        let fx = fixture();
        fx.network
            .respond_with(BINARY_URL, HttpResponse::new(503, "unavailable"));
        let err = fx
            .acquirer
            .get_assets(&fx.config, &current_guard())
            .await
            .unwrap_err();
        assert!(err.is_engine_error());
        assert!(!err.is_aborted());
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn test_invalid_assets_rejected_and_not_cached() {
        let fx = fixture();
        fx.network.respond(BINARY_URL, "not wasm");
        let err = fx
            .acquirer
            .get_assets(&fx.config, &current_guard())
            .await
            .unwrap_err();
        assert!(err.is_engine_error());
        assert!(!fx.storage.exists("cache/engine/cache-manifest.json").await.unwrap());

        let fx = fixture();
        fx.network.respond(SCRIPT_URL, "   ");
        assert!(fx.acquirer.get_assets(&fx.config, &current_guard()).await.is_err());
    }

    #[tokio::test]
    async fn test_stale_generation_aborts() {
        let fx = fixture();
        let counter = GenerationCounter::new();
        let guard = counter.guard(counter.advance());
        counter.advance();
        let err = fx.acquirer.get_assets(&fx.config, &guard).await.unwrap_err();
        assert!(err.is_aborted());
        assert_eq!(fx.network.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_corrupt_cache_falls_back_to_network() {
        let fx = fixture();
        let guard = current_guard();
        fx.acquirer.get_assets(&fx.config, &guard).await.unwrap();
        fx.storage
            .write("cache/engine/engine-script.js", "tampered")
            .await
            .unwrap();

        let assets = fx.acquirer.get_assets(&fx.config, &guard).await.unwrap();
        assert_eq!(assets.source, AssetSource::Network);
        assert_eq!(assets.script_text, "globalThis.engine = {}");
    }
}
