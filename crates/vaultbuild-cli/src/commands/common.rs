//! Services shared by the commands.

use crate::config::CliConfig;
use anyhow::{Context, Result, bail};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use vaultbuild_bridge::HttpClient;
use vaultbuild_cache::ChunkedCache;
use vaultbuild_core::{ContentHasher, FsStorage, HostStorage};

/// Configuration plus the local directory it builds in.
pub struct Workspace {
    /// Loaded configuration
    pub config: CliConfig,
    /// File the configuration came from
    pub source: Option<PathBuf>,
    /// Storage root on disk
    pub root: PathBuf,
    /// Host storage over `root`
    pub storage: Arc<FsStorage>,
    /// Hasher shared by collection and the cache
    pub hasher: Arc<ContentHasher>,
}

impl Workspace {
    /// Loads the configuration and opens the storage root.
    pub fn open(cli_root: Option<&Path>, config_path: Option<&Path>) -> Result<Self> {
        let (config, source) = CliConfig::load(config_path)?;
        let root = config.storage_root(cli_root, source.as_deref())?;
        Ok(Self::with_config(config, source, root))
    }

    /// A workspace over an already loaded configuration.
    #[must_use]
    pub fn with_config(config: CliConfig, source: Option<PathBuf>, root: PathBuf) -> Self {
        let storage = Arc::new(FsStorage::new(root.clone()));
        Self {
            config,
            source,
            root,
            storage,
            hasher: Arc::new(ContentHasher::new()),
        }
    }

    /// Fails unless the storage root is an existing directory.
    pub fn require_root(&self) -> Result<()> {
        if !self.root.is_dir() {
            bail!("Storage root {} is not a directory", self.root.display());
        }
        Ok(())
    }

    /// HTTP client configured from the build settings.
    pub fn network(&self) -> Result<Arc<HttpClient>> {
        let client = HttpClient::new(&self.config.build).context("Failed to create HTTP client")?;
        Ok(Arc::new(client))
    }

    /// The engine asset cache.
    #[must_use]
    pub fn engine_cache(&self) -> ChunkedCache {
        ChunkedCache::new(
            Arc::clone(&self.storage) as Arc<dyn HostStorage>,
            self.config.engine.cache_dir.clone(),
            Arc::clone(&self.hasher),
        )
    }

    /// Waits for pending writes.
    pub async fn close(&self) {
        self.storage.shutdown().await;
    }
}

impl fmt::Debug for Workspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workspace")
            .field("root", &self.root)
            .field("source", &self.source)
            .field("projects", &self.config.projects.len())
            .finish_non_exhaustive()
    }
}
