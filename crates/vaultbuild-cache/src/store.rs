//! Chunked cache storage.
//!
//! Provides [`ChunkedCache`] for saving and loading the engine asset pair on
//! host storage.

use crate::checksum::verify;
use crate::error::{CacheError, Result};
use crate::manifest::{
    BinaryLayout, CacheManifest, CachedFile, FORMAT_VERSION, MANIFEST_FILE, MAX_CHUNK_SIZE,
    SCRIPT_FILE, chunk_name,
};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use vaultbuild_core::{ContentHasher, Error, HostStorage, path};

/// Default chunk size (2 MiB).
pub const DEFAULT_CHUNK_SIZE: usize = 2 * 1024 * 1024;

/// The verified asset pair read back from the cache.
#[derive(Clone, PartialEq, Eq)]
pub struct CachedAssets {
    /// Bootstrap script
    pub script_text: String,
    /// Reassembled binary
    pub binary: Vec<u8>,
    /// When the cache was written
    pub created_at: DateTime<Utc>,
}

impl fmt::Debug for CachedAssets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedAssets")
            .field("script_len", &self.script_text.len())
            .field("binary_len", &self.binary.len())
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Summary of the cache directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStatus {
    /// Whether a manifest exists
    pub present: bool,
    /// Whether every digest verified
    pub verified: bool,
    /// When the cache was written
    pub created_at: Option<DateTime<Utc>>,
    /// Size of the cached binary
    pub total_size: u64,
    /// Number of binary chunks
    pub chunk_count: usize,
    /// Why verification failed
    pub problem: Option<String>,
}

/// Versioned, hash-verified cache of the engine script and binary.
///
/// Loading fails closed: any problem makes [`load`](Self::load) return `None`
/// and leaves the directory untouched. Only [`save`](Self::save) and
/// [`clear`](Self::clear) modify it.
pub struct ChunkedCache {
    storage: Arc<dyn HostStorage>,
    dir: String,
    hasher: Arc<ContentHasher>,
    chunk_size: usize,
}

impl ChunkedCache {
    /// Creates a cache rooted at `dir` on `storage`.
    #[must_use]
    pub fn new(
        storage: Arc<dyn HostStorage>,
        dir: impl Into<String>,
        hasher: Arc<ContentHasher>,
    ) -> Self {
        Self {
            storage,
            dir: path::normalize(&dir.into()),
            hasher,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Overrides the chunk size, clamped to `1..=MAX_CHUNK_SIZE`.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        let max = usize::try_from(MAX_CHUNK_SIZE).unwrap_or(usize::MAX);
        self.chunk_size = chunk_size.clamp(1, max);
        self
    }

    /// Cache directory on host storage.
    #[must_use]
    pub fn dir(&self) -> &str {
        &self.dir
    }

    /// Loads the assets, or `None` if the cache is absent or untrustworthy.
    ///
    /// The reason for a miss is logged; the cache is never deleted here.
    pub async fn load(&self) -> Option<CachedAssets> {
        match self.try_load().await {
            Ok(assets) => {
                tracing::info!(dir = %self.dir, bytes = assets.binary.len(), "Engine cache hit");
                Some(assets)
            }
            Err(CacheError::NoManifest) => {
                tracing::debug!(dir = %self.dir, "Engine cache empty");
                None
            }
            Err(err) => {
                tracing::warn!(dir = %self.dir, error = %err, "Engine cache rejected");
                None
            }
        }
    }

    /// Loads and verifies the assets.
    ///
    /// # Errors
    ///
    /// Returns the [`CacheError`] describing why the cache cannot be used.
    pub async fn try_load(&self) -> Result<CachedAssets> {
        let manifest = self.read_manifest().await?;

        let script_bytes = self.read_file(&manifest.script_file.name).await?;
        verify(&self.hasher, &script_bytes, &manifest.script_file.hash, &manifest.script_file.name)?;
        let script_text = String::from_utf8(script_bytes).map_err(|_| CacheError::InvalidManifest {
            reason: "Cached script is not valid UTF-8".to_string(),
        })?;

        let layout = &manifest.binary;
        let mut binary = Vec::new();
        for chunk in &layout.chunks {
            let bytes = self.read_file(&chunk.name).await?;
            verify(&self.hasher, &bytes, &chunk.hash, &chunk.name)?;
            binary.extend_from_slice(&bytes);
            if binary.len() as u64 > layout.total_size {
                break;
            }
        }

        let actual = binary.len() as u64;
        if actual != layout.total_size {
            return Err(CacheError::SizeMismatch {
                expected: layout.total_size,
                actual,
            });
        }
        verify(&self.hasher, &binary, &layout.whole_hash, "binary")?;

        Ok(CachedAssets {
            script_text,
            binary,
            created_at: manifest.created_at,
        })
    }

    /// Replaces the cache content.
    ///
    /// The old manifest is removed first and the new one is written last, so
    /// a reader never sees a manifest whose files are incomplete. If any
    /// write fails the directory is cleared.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Storage`] if host storage fails.
    pub async fn save(&self, script_text: &str, binary: &[u8]) -> Result<()> {
        self.guard_dir()?;
        self.clear().await?;
        match self.write_all(script_text, binary).await {
            Ok(chunks) => {
                tracing::info!(dir = %self.dir, bytes = binary.len(), chunks, "Engine cache written");
                Ok(())
            }
            Err(err) => {
                if let Err(cleanup) = self.storage.delete(&self.dir).await {
                    tracing::warn!(dir = %self.dir, error = %cleanup, "Failed to clean up partial cache");
                }
                Err(err)
            }
        }
    }

    /// Deletes the cache directory.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Storage`] if host storage fails, or wrapping
    /// [`Error::SecurityViolation`] when the directory is the storage root.
    pub async fn clear(&self) -> Result<()> {
        self.guard_dir()?;
        self.storage.delete(&self.file_path(MANIFEST_FILE)).await?;
        self.storage.delete(&self.dir).await?;
        tracing::debug!(dir = %self.dir, "Engine cache cleared");
        Ok(())
    }

    /// Reports presence and verification state.
    pub async fn status(&self) -> CacheStatus {
        let manifest = match self.read_manifest().await {
            Ok(manifest) => manifest,
            Err(CacheError::NoManifest) => {
                return CacheStatus {
                    present: false,
                    verified: false,
                    created_at: None,
                    total_size: 0,
                    chunk_count: 0,
                    problem: None,
                };
            }
            Err(err) => {
                return CacheStatus {
                    present: true,
                    verified: false,
                    created_at: None,
                    total_size: 0,
                    chunk_count: 0,
                    problem: Some(err.to_string()),
                };
            }
        };
        let problem = self.try_load().await.err().map(|err| err.to_string());
        CacheStatus {
            present: true,
            verified: problem.is_none(),
            created_at: Some(manifest.created_at),
            total_size: manifest.binary.total_size,
            chunk_count: manifest.binary.chunks.len(),
            problem,
        }
    }

    async fn write_all(&self, script_text: &str, binary: &[u8]) -> Result<usize> {
        self.storage.create_dir(&self.dir).await?;
        self.storage
            .write(&self.file_path(SCRIPT_FILE), script_text)
            .await?;

        let mut chunks = Vec::new();
        for (index, bytes) in binary.chunks(self.chunk_size).enumerate() {
            let name = chunk_name(index);
            self.storage
                .write_binary(&self.file_path(&name), bytes)
                .await?;
            chunks.push(CachedFile {
                name,
                hash: self.hasher.hash_bytes(bytes),
            });
        }

        let count = chunks.len();
        let manifest = CacheManifest {
            format_version: FORMAT_VERSION,
            created_at: Utc::now(),
            script_file: CachedFile {
                name: SCRIPT_FILE.to_string(),
                hash: self.hasher.hash_str(script_text),
            },
            binary: BinaryLayout {
                total_size: binary.len() as u64,
                chunk_size: self.chunk_size as u64,
                whole_hash: self.hasher.hash_bytes(binary),
                chunks,
            },
        };
        let json = serde_json::to_string_pretty(&manifest).map_err(|e| {
            CacheError::Storage(Error::from(e))
        })?;
        self.storage.write(&self.file_path(MANIFEST_FILE), &json).await?;
        Ok(count)
    }

    async fn read_manifest(&self) -> Result<CacheManifest> {
        let manifest_path = self.file_path(MANIFEST_FILE);
        if !self.storage.exists(&manifest_path).await? {
            return Err(CacheError::NoManifest);
        }
        let json = self.storage.read(&manifest_path).await?;
        CacheManifest::parse(&json)
    }

    async fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        let file = self.file_path(name);
        if !self.storage.exists(&file).await? {
            return Err(CacheError::MissingFile {
                file: name.to_string(),
            });
        }
        Ok(self.storage.read_binary(&file).await?)
    }

    /// The cache may only own a subdirectory of host storage.
    fn guard_dir(&self) -> Result<()> {
        if self.dir == path::ROOT || !path::is_within(path::ROOT, &self.dir) {
            return Err(CacheError::Storage(Error::SecurityViolation {
                reason: format!(
                    "Cache directory '{}' must be a subdirectory of the storage root",
                    self.dir
                ),
            }));
        }
        Ok(())
    }

    fn file_path(&self, name: &str) -> String {
        path::join(&self.dir, name)
    }
}

impl fmt::Debug for ChunkedCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkedCache")
            .field("dir", &self.dir)
            .field("chunk_size", &self.chunk_size)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vaultbuild_core::MemoryStorage;

    const DIR: &str = "cache";

    fn cache(storage: &Arc<MemoryStorage>, chunk_size: usize) -> ChunkedCache {
        let storage: Arc<dyn HostStorage> = storage.clone();
        ChunkedCache::new(storage, DIR, Arc::new(ContentHasher::new())).with_chunk_size(chunk_size)
    }

    fn binary(len: usize) -> Vec<u8> {
        (0..len).map(|i| u8::try_from(i % 251).unwrap()).collect()
    }

    #[tokio::test]
    async fn test_round_trip_with_uneven_chunks() {
        let storage = Arc::new(MemoryStorage::new());
        let cache = cache(&storage, 4);
        let data = binary(10);
        cache.save("script();", &data).await.unwrap();

        assert!(storage.exists("cache/engine-binary.002").await.unwrap());
        assert!(!storage.exists("cache/engine-binary.003").await.unwrap());

        let assets = cache.load().await.unwrap();
        assert_eq!(assets.script_text, "script();");
        assert_eq!(assets.binary, data);
    }

    #[tokio::test]
    async fn test_empty_cache_is_a_miss() {
        let storage = Arc::new(MemoryStorage::new());
        let cache = cache(&storage, 4);
        assert!(cache.load().await.is_none());
        assert!(cache.try_load().await.unwrap_err().is_absent());
        assert!(!cache.status().await.present);
    }

    #[tokio::test]
    async fn test_corrupt_chunk_fails_closed_without_deleting() {
        let storage = Arc::new(MemoryStorage::new());
        let cache = cache(&storage, 4);
        cache.save("s", &binary(12)).await.unwrap();
        storage
            .write_binary("cache/engine-binary.001", &[9, 9, 9, 9])
            .await
            .unwrap();

        assert!(cache.load().await.is_none());
        assert!(cache.try_load().await.unwrap_err().is_corruption());
        assert!(storage.exists("cache/cache-manifest.json").await.unwrap());

        let status = cache.status().await;
        assert!(status.present);
        assert!(!status.verified);
        assert!(status.problem.unwrap().contains("engine-binary.001"));
    }

    #[tokio::test]
    async fn test_missing_chunk_and_tampered_script() {
        let storage = Arc::new(MemoryStorage::new());
        let cache = cache(&storage, 4);
        cache.save("s", &binary(8)).await.unwrap();

        storage.write("cache/engine-script.js", "evil()").await.unwrap();
        assert!(matches!(
            cache.try_load().await,
            Err(CacheError::ChecksumMismatch { ref file, .. }) if file == SCRIPT_FILE
        ));

        cache.save("s", &binary(8)).await.unwrap();
        storage.delete("cache/engine-binary.000").await.unwrap();
        assert!(matches!(cache.try_load().await, Err(CacheError::MissingFile { .. })));
    }

    #[tokio::test]
    async fn test_save_replaces_previous_content() {
        let storage = Arc::new(MemoryStorage::new());
        let cache = cache(&storage, 4);
        cache.save("old", &binary(16)).await.unwrap();
        cache.save("new", &binary(3)).await.unwrap();

        assert!(!storage.exists("cache/engine-binary.001").await.unwrap());
        let status = cache.status().await;
        assert!(status.verified);
        assert_eq!(status.total_size, 3);
        assert_eq!(status.chunk_count, 1);
        assert_eq!(cache.load().await.unwrap().script_text, "new");
    }

    #[tokio::test]
    async fn test_clear_removes_everything() {
        let storage = Arc::new(MemoryStorage::new());
        let cache = cache(&storage, 4);
        cache.save("s", &binary(5)).await.unwrap();
        cache.clear().await.unwrap();
        assert_eq!(storage.file_count(), 0);
        assert!(cache.load().await.is_none());
    }

    #[tokio::test]
    async fn test_huge_declared_size_is_rejected_without_panicking() {
        let storage = Arc::new(MemoryStorage::new());
        let cache = cache(&storage, 4);
        cache.save("s", &binary(3)).await.unwrap();

        let json = storage.read("cache/cache-manifest.json").await.unwrap();
        let mut value: serde_json::Value = serde_json::from_str(&json).unwrap();
        value["binary"]["totalSize"] = serde_json::json!(u64::MAX);
        value["binary"]["chunkSize"] = serde_json::json!(u64::MAX);
        storage
            .write("cache/cache-manifest.json", &value.to_string())
            .await
            .unwrap();

        assert!(cache.load().await.is_none());
        assert!(cache.try_load().await.unwrap_err().is_corruption());
    }

    #[tokio::test]
    async fn test_understated_size_stops_reassembly() {
        let storage = Arc::new(MemoryStorage::new());
        let cache = cache(&storage, 4);
        cache.save("s", &binary(12)).await.unwrap();

        let json = storage.read("cache/cache-manifest.json").await.unwrap();
        let mut value: serde_json::Value = serde_json::from_str(&json).unwrap();
        value["binary"]["totalSize"] = serde_json::json!(9);
        storage
            .write("cache/cache-manifest.json", &value.to_string())
            .await
            .unwrap();

        assert!(matches!(
            cache.try_load().await,
            Err(CacheError::SizeMismatch { expected: 9, .. })
        ));
    }

    #[tokio::test]
    async fn test_root_directory_is_refused() {
        let storage = Arc::new(MemoryStorage::new());
        storage.write("vault/notes/important.md", "keep me").await.unwrap();
        let root: Arc<dyn HostStorage> = storage.clone();

        for dir in [".", "./", "a/.."] {
            let hasher = Arc::new(ContentHasher::new());
            let cache = ChunkedCache::new(Arc::clone(&root), dir, hasher);
            let err = cache.save("s", &binary(3)).await.unwrap_err();
            assert!(matches!(err, CacheError::Storage(ref inner) if inner.is_security_error()), "{dir}");
            assert!(cache.clear().await.is_err());
        }
        assert_eq!(storage.read("vault/notes/important.md").await.unwrap(), "keep me");
    }
}
