//! Cache manifest format.

use crate::error::{CacheError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Manifest format version. A manifest with any other version is rejected.
pub const FORMAT_VERSION: u32 = 1;

/// Manifest file name inside the cache directory.
pub const MANIFEST_FILE: &str = "cache-manifest.json";

/// Script file name inside the cache directory.
pub const SCRIPT_FILE: &str = "engine-script.js";

/// Prefix of binary chunk files; the index is appended as `.NNN`.
pub const CHUNK_PREFIX: &str = "engine-binary";

/// Largest chunk size a manifest may declare (64 MiB).
pub const MAX_CHUNK_SIZE: u64 = 64 * 1024 * 1024;

/// Name of the chunk at `index`.
#[must_use]
pub fn chunk_name(index: usize) -> String {
    format!("{CHUNK_PREFIX}.{index:03}")
}

/// A cached file and its digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedFile {
    /// File name inside the cache directory
    pub name: String,
    /// Tagged digest of the file content
    pub hash: String,
}

/// How the binary was split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinaryLayout {
    /// Size of the reassembled binary
    pub total_size: u64,
    /// Size of every chunk but the last
    pub chunk_size: u64,
    /// Digest of the reassembled binary
    pub whole_hash: String,
    /// Chunks in order
    pub chunks: Vec<CachedFile>,
}

/// Index of a cache directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheManifest {
    /// Format version, see [`FORMAT_VERSION`]
    pub format_version: u32,
    /// When the cache was written
    pub created_at: DateTime<Utc>,
    /// The bootstrap script
    pub script_file: CachedFile,
    /// The chunked binary
    pub binary: BinaryLayout,
}

impl CacheManifest {
    /// Parses and checks a manifest.
    ///
    /// # Errors
    ///
    /// - [`CacheError::InvalidManifest`] if the JSON is malformed or the
    ///   layout is impossible
    /// - [`CacheError::VersionMismatch`] if the format version differs
    pub fn parse(json: &str) -> Result<Self> {
        let manifest: Self = serde_json::from_str(json).map_err(|e| CacheError::InvalidManifest {
            reason: format!("Failed to parse JSON: {e}"),
        })?;
        if manifest.format_version != FORMAT_VERSION {
            return Err(CacheError::VersionMismatch {
                found: manifest.format_version,
                expected: FORMAT_VERSION,
            });
        }
        manifest.check_layout()?;
        Ok(manifest)
    }

    fn check_layout(&self) -> Result<()> {
        let invalid = |reason: String| Err(CacheError::InvalidManifest { reason });

        let names = std::iter::once(&self.script_file.name)
            .chain(self.binary.chunks.iter().map(|chunk| &chunk.name));
        for name in names {
            if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
                return invalid(format!("Unsafe file name '{name}'"));
            }
        }

        let layout = &self.binary;
        if layout.chunk_size == 0 {
            return invalid("Chunk size is zero".to_string());
        }
        if layout.chunk_size > MAX_CHUNK_SIZE {
            return invalid(format!(
                "Chunk size {} exceeds the {MAX_CHUNK_SIZE} byte limit",
                layout.chunk_size
            ));
        }
        let expected_chunks = layout.total_size.div_ceil(layout.chunk_size);
        if layout.chunks.len() as u64 != expected_chunks {
            return invalid(format!(
                "{} chunks listed, {expected_chunks} expected for {} bytes",
                layout.chunks.len(),
                layout.total_size
            ));
        }
        for (index, chunk) in layout.chunks.iter().enumerate() {
            let expected = chunk_name(index);
            if chunk.name != expected {
                return invalid(format!(
                    "Chunk {index} is named '{}', expected '{expected}'",
                    chunk.name
                ));
            }
        }
        Ok(())
    }
}
