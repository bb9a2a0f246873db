use crate::error::{Error, Result};
use crate::path;
use crate::traits::{HostStorage, StorageEntry};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
struct Tree {
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
    failing_reads: BTreeSet<String>,
}

impl Tree {
    fn add_parents(&mut self, file: &str) {
        let mut dir = path::dirname(file);
        while dir != path::ROOT {
            let parent = path::dirname(&dir);
            self.dirs.insert(dir);
            dir = parent;
        }
    }

    fn is_dir(&self, dir: &str) -> bool {
        dir == path::ROOT || self.dirs.contains(dir)
    }
}

/// In-memory host storage.
///
/// Used by tests and by embedders that assemble projects programmatically.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    tree: RwLock<Tree>,
}

impl MemoryStorage {
    /// Creates an empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent read of `path` fail with an I/O error.
    pub fn inject_read_failure(&self, path: &str) {
        self.write_tree().failing_reads.insert(path::normalize(path));
    }

    /// Number of stored files.
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.read_tree().files.len()
    }

    /// All file paths, sorted.
    #[must_use]
    pub fn file_paths(&self) -> Vec<String> {
        self.read_tree().files.keys().cloned().collect()
    }

    fn read_tree(&self) -> RwLockReadGuard<'_, Tree> {
        self.tree.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_tree(&self) -> RwLockWriteGuard<'_, Tree> {
        self.tree.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn get(&self, file: &str) -> Result<Vec<u8>> {
        let key = path::normalize(file);
        let tree = self.read_tree();
        if tree.failing_reads.contains(&key) {
            return Err(Error::FileSystem {
                path: key,
                message: "Injected read failure".to_string(),
                source: None,
            });
        }
        tree.files.get(&key).cloned().ok_or_else(|| Error::FileSystem {
            path: key,
            message: "File not found".to_string(),
            source: None,
        })
    }

    fn put(&self, file: &str, content: Vec<u8>) -> Result<()> {
        let key = path::normalize(file);
        let mut tree = self.write_tree();
        if key == path::ROOT || tree.dirs.contains(&key) {
            return Err(Error::FileSystem {
                path: key,
                message: "Path is a directory".to_string(),
                source: None,
            });
        }
        tree.add_parents(&key);
        tree.files.insert(key, content);
        Ok(())
    }
}

#[async_trait]
impl HostStorage for MemoryStorage {
    async fn read(&self, path: &str) -> Result<String> {
        let bytes = self.get(path)?;
        String::from_utf8(bytes).map_err(|err| Error::FileSystem {
            path: path.to_string(),
            message: "File is not valid UTF-8".to_string(),
            source: Some(Box::new(err)),
        })
    }

    async fn read_binary(&self, path: &str) -> Result<Vec<u8>> {
        self.get(path)
    }

    async fn write(&self, path: &str, content: &str) -> Result<()> {
        self.put(path, content.as_bytes().to_vec())
    }

    async fn write_binary(&self, path: &str, content: &[u8]) -> Result<()> {
        self.put(path, content.to_vec())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let key = path::normalize(path);
        let tree = self.read_tree();
        Ok(tree.is_dir(&key) || tree.files.contains_key(&key))
    }

    async fn create_dir(&self, path: &str) -> Result<()> {
        let key = path::normalize(path);
        if key == path::ROOT {
            return Ok(());
        }
        let mut tree = self.write_tree();
        if tree.files.contains_key(&key) {
            return Err(Error::FileSystem {
                path: key,
                message: "A file exists at this path".to_string(),
                source: None,
            });
        }
        tree.add_parents(&format!("{key}/_"));
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let key = path::normalize(path);
        let mut tree = self.write_tree();
        if key == path::ROOT {
            return Err(Error::SecurityViolation {
                reason: "Refusing to delete the storage root".to_string(),
            });
        }
        let prefix = format!("{key}/");
        tree.files.retain(|file, _| file != &key && !file.starts_with(&prefix));
        tree.dirs.retain(|dir| dir != &key && !dir.starts_with(&prefix));
        Ok(())
    }

    async fn list(&self, path: &str) -> Result<Vec<StorageEntry>> {
        let key = path::normalize(path);
        let tree = self.read_tree();
        if !tree.is_dir(&key) {
            return Err(Error::FileSystem {
                path: key,
                message: "Not a directory".to_string(),
                source: None,
            });
        }
        let is_child = |candidate: &str| path::dirname(candidate) == key;
        let mut entries: Vec<StorageEntry> = tree
            .dirs
            .iter()
            .filter(|dir| is_child(dir.as_str()))
            .map(|dir| StorageEntry::dir(path::file_name(dir)))
            .chain(
                tree.files
                    .keys()
                    .filter(|file| is_child(file.as_str()))
                    .map(|file| StorageEntry::file(path::file_name(file))),
            )
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_creates_parents() {
        let storage = MemoryStorage::new();
        storage.write("a/b/c.ts", "x").await.unwrap();
        assert!(storage.exists("a").await.unwrap());
        assert!(storage.exists("a/b").await.unwrap());
        assert_eq!(storage.list("a").await.unwrap(), vec![StorageEntry::dir("b")]);
        assert_eq!(storage.list(".").await.unwrap(), vec![StorageEntry::dir("a")]);
    }

    #[tokio::test]
    async fn test_delete_directory_recursive() {
        let storage = MemoryStorage::new();
        storage.write("cache/one", "1").await.unwrap();
        storage.write_binary("cache/sub/two", &[2]).await.unwrap();
        storage.write("keep.txt", "k").await.unwrap();
        storage.delete("cache").await.unwrap();
        assert!(!storage.exists("cache").await.unwrap());
        assert!(!storage.exists("cache/sub/two").await.unwrap());
        assert!(storage.exists("keep.txt").await.unwrap());
        storage.delete("missing").await.unwrap();
    }

    #[tokio::test]
    async fn test_read_errors() {
        let storage = MemoryStorage::new();
        assert!(storage.read("nope").await.unwrap_err().is_file_system_error());
        storage.write_binary("bin", &[0xff, 0xfe]).await.unwrap();
        assert!(storage.read("bin").await.is_err());
        storage.write("ok.ts", "x").await.unwrap();
        storage.inject_read_failure("ok.ts");
        assert!(storage.read("ok.ts").await.is_err());
    }

    #[tokio::test]
    async fn test_list_requires_directory() {
        let storage = MemoryStorage::new();
        storage.write("file.ts", "x").await.unwrap();
        assert!(storage.list("file.ts").await.is_err());
        storage.create_dir("empty/dir").await.unwrap();
        assert!(storage.list("empty/dir").await.unwrap().is_empty());
    }
}
