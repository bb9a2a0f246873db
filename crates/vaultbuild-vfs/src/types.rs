//! Virtual file types.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// One project file captured for the current build.
///
/// Created once by the collector and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VirtualFileAsset {
    path: String,
    #[serde(skip)]
    content: String,
    content_hash: String,
    size: u64,
    read_error: Option<String>,
}

impl VirtualFileAsset {
    /// Creates a successfully read asset.
    #[must_use]
    pub fn new(path: impl Into<String>, content: String, content_hash: String) -> Self {
        Self {
            path: path.into(),
            size: content.len() as u64,
            content,
            content_hash,
            read_error: None,
        }
    }

    /// Creates an asset whose read failed.
    #[must_use]
    pub fn unreadable(path: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: String::new(),
            content_hash: String::new(),
            size: 0,
            read_error: Some(error.into()),
        }
    }

    /// Path relative to the project root.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// File content.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Digest taken at collection time.
    #[must_use]
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    /// Size in bytes.
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Read failure, if any.
    #[must_use]
    pub fn read_error(&self) -> Option<&str> {
        self.read_error.as_deref()
    }

    /// Returns `true` if the content is usable.
    #[must_use]
    pub const fn is_readable(&self) -> bool {
        self.read_error.is_none()
    }
}

/// Project files keyed by path relative to the project root.
///
/// # Examples
///
/// ```
/// use vaultbuild_vfs::{VirtualFileAsset, VirtualFileMap};
///
/// let mut map = VirtualFileMap::new();
/// map.insert(VirtualFileAsset::new("src/a.ts", "export {}".into(), "h".into()));
/// assert!(map.contains("src/a.ts"));
/// assert_eq!(map.len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct VirtualFileMap {
    files: HashMap<String, VirtualFileAsset>,
}

impl VirtualFileMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an asset, replacing any asset at the same path.
    pub fn insert(&mut self, asset: VirtualFileAsset) {
        self.files.insert(asset.path.clone(), asset);
    }

    /// Looks up an asset.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&VirtualFileAsset> {
        self.files.get(path)
    }

    /// Returns `true` if a readable asset exists at `path`.
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.files.get(path).is_some_and(VirtualFileAsset::is_readable)
    }

    /// Number of assets, readable or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Returns `true` if the map is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Sum of all readable asset sizes.
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.files.values().map(VirtualFileAsset::size).sum()
    }

    /// Assets sorted by path.
    #[must_use]
    pub fn sorted(&self) -> Vec<&VirtualFileAsset> {
        let mut assets: Vec<_> = self.files.values().collect();
        assets.sort_by(|a, b| a.path.cmp(&b.path));
        assets
    }
}

/// A non-fatal finding raised during collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CollectionWarning {
    /// File is larger than the per-file threshold
    OversizeFile {
        /// Project-relative path
        path: String,
        /// Size in bytes
        size: u64,
        /// Threshold in bytes
        limit: u64,
    },
    /// File contains invisible or bidirectional control characters
    SuspiciousCharacters {
        /// Project-relative path
        path: String,
        /// Offending code points, deduplicated
        code_points: Vec<u32>,
    },
    /// File could not be read; it is left out of the build
    ReadFailed {
        /// Project-relative path
        path: String,
        /// Failure description
        message: String,
    },
}

impl fmt::Display for CollectionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OversizeFile { path, size, limit } => {
                write!(f, "{path} is {size} bytes, above the {limit} byte threshold")
            }
            Self::SuspiciousCharacters { path, code_points } => {
                let listed: Vec<String> = code_points.iter().map(|cp| format!("U+{cp:04X}")).collect();
                write!(f, "{path} contains invisible characters: {}", listed.join(", "))
            }
            Self::ReadFailed { path, message } => write!(f, "{path} could not be read: {message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreadable_assets_are_not_contained() {
        let mut map = VirtualFileMap::new();
        map.insert(VirtualFileAsset::unreadable("broken.ts", "denied"));
        assert_eq!(map.len(), 1);
        assert!(!map.contains("broken.ts"));
        assert_eq!(map.get("broken.ts").and_then(VirtualFileAsset::read_error), Some("denied"));
    }

    #[test]
    fn test_sorted_and_totals() {
        let mut map = VirtualFileMap::new();
        map.insert(VirtualFileAsset::new("b.ts", "bb".into(), "h2".into()));
        map.insert(VirtualFileAsset::new("a.ts", "a".into(), "h1".into()));
        let sorted = map.sorted();
        let paths: Vec<_> = sorted.iter().map(|asset| asset.path()).collect();
        assert_eq!(paths, vec!["a.ts", "b.ts"]);
        assert_eq!(map.total_bytes(), 3);
    }

    #[test]
    fn test_warning_display() {
        let warning = CollectionWarning::SuspiciousCharacters {
            path: "a.ts".into(),
            code_points: vec![0x200B, 0x202E],
        };
        assert_eq!(warning.to_string(), "a.ts contains invisible characters: U+200B, U+202E");
    }
}
