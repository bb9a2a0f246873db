use crate::error::Result;
use async_trait::async_trait;

/// One child of a storage directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEntry {
    /// File or directory name, without parent path
    pub name: String,
    /// Whether the entry is a directory
    pub is_dir: bool,
}

impl StorageEntry {
    /// Creates a file entry.
    #[must_use]
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_dir: false,
        }
    }

    /// Creates a directory entry.
    #[must_use]
    pub fn dir(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_dir: true,
        }
    }
}

/// Host hierarchical storage.
///
/// Paths are root-relative, slash-separated strings where `.` names the
/// root. Writes create missing parent directories.
///
/// # Examples
///
/// ```
/// use vaultbuild_core::{HostStorage, MemoryStorage};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> vaultbuild_core::Result<()> {
/// let storage = MemoryStorage::new();
/// storage.write("src/main.ts", "export {}").await?;
/// assert!(storage.exists("src").await?);
/// assert_eq!(storage.read("src/main.ts").await?, "export {}");
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait HostStorage: Send + Sync {
    /// Reads a UTF-8 text file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileSystem`](crate::Error::FileSystem) if the file is
    /// missing or unreadable.
    async fn read(&self, path: &str) -> Result<String>;

    /// Reads a file as raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileSystem`](crate::Error::FileSystem) if the file is
    /// missing or unreadable.
    async fn read_binary(&self, path: &str) -> Result<Vec<u8>>;

    /// Writes a text file, replacing existing content.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileSystem`](crate::Error::FileSystem) on failure.
    async fn write(&self, path: &str, content: &str) -> Result<()>;

    /// Writes a binary file, replacing existing content.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileSystem`](crate::Error::FileSystem) on failure.
    async fn write_binary(&self, path: &str, content: &[u8]) -> Result<()>;

    /// Returns `true` if a file or directory exists at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileSystem`](crate::Error::FileSystem) if existence
    /// cannot be determined.
    async fn exists(&self, path: &str) -> Result<bool>;

    /// Creates a directory and any missing parents.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileSystem`](crate::Error::FileSystem) on failure.
    async fn create_dir(&self, path: &str) -> Result<()>;

    /// Deletes a file, or a directory with everything below it.
    ///
    /// Deleting a missing path succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileSystem`](crate::Error::FileSystem) on failure.
    async fn delete(&self, path: &str) -> Result<()>;

    /// Lists the direct children of a directory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileSystem`](crate::Error::FileSystem) if `path` is
    /// not a readable directory.
    async fn list(&self, path: &str) -> Result<Vec<StorageEntry>>;
}
