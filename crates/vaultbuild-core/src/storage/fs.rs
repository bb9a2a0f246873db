use crate::error::{Error, Result};
use crate::path;
use crate::queue::SerializedQueue;
use crate::traits::{HostStorage, StorageEntry};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// A local directory used as host storage.
///
/// Reads go straight to disk. Every mutation is serialized through a
/// single-concurrency queue so that writes against the same tree never
/// interleave. After [`shutdown`](Self::shutdown) mutations are rejected.
///
/// # Examples
///
/// ```no_run
/// use vaultbuild_core::{FsStorage, HostStorage};
///
/// # async fn example() -> vaultbuild_core::Result<()> {
/// let storage = FsStorage::new("/path/to/vault");
/// storage.write("notes/todo.md", "- [ ] ship").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct FsStorage {
    root: PathBuf,
    writes: SerializedQueue<()>,
}

impl FsStorage {
    /// Creates a storage rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            writes: SerializedQueue::new("host-storage", 1),
        }
    }

    /// The directory acting as the storage root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Rejects queued writes and waits for running ones to finish.
    pub async fn shutdown(&self) {
        self.writes.shutdown();
        self.writes.wait_idle().await;
        tracing::debug!(root = %self.root.display(), "Host storage shut down");
    }

    /// Accepts writes again after [`shutdown`](Self::shutdown).
    pub fn reset(&self) {
        self.writes.reset();
    }

    fn resolve(&self, storage_path: &str) -> Result<PathBuf> {
        if path::is_absolute_like(storage_path) || path::has_traversal(storage_path) {
            return Err(Error::SecurityViolation {
                reason: format!("Storage path '{storage_path}' escapes the storage root"),
            });
        }
        let normalized = path::normalize(storage_path);
        if normalized == path::ROOT {
            return Ok(self.root.clone());
        }
        Ok(normalized
            .split('/')
            .fold(self.root.clone(), |acc, segment| acc.join(segment)))
    }

    async fn mutate<F, Fut>(&self, task: F) -> Result<()>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        self.writes.enqueue(task).await
    }
}

async fn write_file(target: PathBuf, display: String, content: Vec<u8>) -> Result<()> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|err| Error::io(display.clone(), err))?;
    }
    tokio::fs::write(&target, content)
        .await
        .map_err(|err| Error::io(display, err))
}

#[async_trait]
impl HostStorage for FsStorage {
    async fn read(&self, path: &str) -> Result<String> {
        let target = self.resolve(path)?;
        tokio::fs::read_to_string(&target)
            .await
            .map_err(|err| Error::io(path, err))
    }

    async fn read_binary(&self, path: &str) -> Result<Vec<u8>> {
        let target = self.resolve(path)?;
        tokio::fs::read(&target)
            .await
            .map_err(|err| Error::io(path, err))
    }

    async fn write(&self, path: &str, content: &str) -> Result<()> {
        let target = self.resolve(path)?;
        let display = path.to_string();
        let content = content.as_bytes().to_vec();
        self.mutate(move || write_file(target, display, content)).await
    }

    async fn write_binary(&self, path: &str, content: &[u8]) -> Result<()> {
        let target = self.resolve(path)?;
        let display = path.to_string();
        let content = content.to_vec();
        self.mutate(move || write_file(target, display, content)).await
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let target = self.resolve(path)?;
        tokio::fs::try_exists(&target)
            .await
            .map_err(|err| Error::io(path, err))
    }

    async fn create_dir(&self, path: &str) -> Result<()> {
        let target = self.resolve(path)?;
        let display = path.to_string();
        self.mutate(move || async move {
            tokio::fs::create_dir_all(&target)
                .await
                .map_err(|err| Error::io(display, err))
        })
        .await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let target = self.resolve(path)?;
        if target == self.root {
            return Err(Error::SecurityViolation {
                reason: "Refusing to delete the storage root".to_string(),
            });
        }
        let display = path.to_string();
        self.mutate(move || async move {
            let metadata = match tokio::fs::metadata(&target).await {
                Ok(metadata) => metadata,
                Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
                Err(err) => return Err(Error::io(display, err)),
            };
            let removed = if metadata.is_dir() {
                tokio::fs::remove_dir_all(&target).await
            } else {
                tokio::fs::remove_file(&target).await
            };
            match removed {
                Err(err) if err.kind() != ErrorKind::NotFound => Err(Error::io(display, err)),
                _ => Ok(()),
            }
        })
        .await
    }

    async fn list(&self, path: &str) -> Result<Vec<StorageEntry>> {
        let target = self.resolve(path)?;
        let mut reader = tokio::fs::read_dir(&target)
            .await
            .map_err(|err| Error::io(path, err))?;
        let mut entries = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|err| Error::io(path, err))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|err| Error::io(path, err))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            entries.push(StorageEntry {
                name,
                is_dir: file_type.is_dir(),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}
