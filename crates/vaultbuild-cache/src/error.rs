//! Reasons a cache is rejected.

use thiserror::Error;

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

/// Why the cache could not be used.
///
/// Every variant except [`CacheError::Storage`] means the cache content is
/// untrustworthy; callers treat all of them as a miss.
#[derive(Error, Debug)]
pub enum CacheError {
    /// No manifest in the cache directory.
    #[error("No cache manifest present")]
    NoManifest,

    /// Manifest was written by another format version.
    #[error("Unsupported cache format version {found} (expected {expected})")]
    VersionMismatch {
        /// Version in the manifest
        found: u32,
        /// Version this build understands
        expected: u32,
    },

    /// A file listed in the manifest is absent.
    #[error("Cache file missing: {file}")]
    MissingFile {
        /// File name inside the cache directory
        file: String,
    },

    /// A file's digest differs from the manifest.
    #[error("Checksum mismatch for {file}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// File name, or `binary` for the reassembled whole
        file: String,
        /// Digest in the manifest
        expected: String,
        /// Digest of the bytes read
        actual: String,
    },

    /// Reassembled binary has the wrong length.
    #[error("Cached binary is {actual} bytes, manifest says {expected}")]
    SizeMismatch {
        /// Size in the manifest
        expected: u64,
        /// Size read
        actual: u64,
    },

    /// Manifest cannot be parsed or describes an impossible layout.
    #[error("Invalid cache manifest: {reason}")]
    InvalidManifest {
        /// What is wrong
        reason: String,
    },

    /// Host storage failed.
    #[error(transparent)]
    Storage(#[from] vaultbuild_core::Error),
}

impl CacheError {
    /// Returns `true` if the cache content failed verification, as opposed
    /// to being absent or unreadable.
    #[must_use]
    pub const fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::ChecksumMismatch { .. } | Self::SizeMismatch { .. } | Self::InvalidManifest { .. }
        )
    }

    /// Returns `true` if no cache exists.
    #[must_use]
    pub const fn is_absent(&self) -> bool {
        matches!(self, Self::NoManifest)
    }
}

impl From<CacheError> for vaultbuild_core::Error {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Storage(inner) => inner,
            other => Self::FileSystem {
                path: crate::manifest::MANIFEST_FILE.to_string(),
                message: other.to_string(),
                source: Some(Box::new(other)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(CacheError::NoManifest.is_absent());
        let mismatch = CacheError::ChecksumMismatch {
            file: "engine-binary.000".into(),
            expected: "blake3:aa".into(),
            actual: "blake3:bb".into(),
        };
        assert!(mismatch.is_corruption());
        assert!(mismatch.to_string().contains("engine-binary.000"));
        assert!(!CacheError::VersionMismatch { found: 0, expected: 1 }.is_corruption());
    }

    #[test]
    fn test_converts_into_core_error() {
        let core: vaultbuild_core::Error = CacheError::MissingFile { file: "x".into() }.into();
        assert!(core.is_file_system_error());

        let storage = vaultbuild_core::Error::build("inner");
        let core: vaultbuild_core::Error = CacheError::Storage(storage).into();
        assert!(core.is_build_error());
    }
}
