//! Digest verification for cache files.
//!
//! Digests use the tagged format produced by
//! [`ContentHasher`](vaultbuild_core::ContentHasher), e.g. `blake3:<hex>`.

use crate::error::{CacheError, Result};
use vaultbuild_core::ContentHasher;

/// Verifies that `data` matches `expected`.
///
/// # Errors
///
/// Returns [`CacheError::ChecksumMismatch`] naming `file` on mismatch.
///
/// # Examples
///
/// ```
/// use vaultbuild_cache::checksum::verify;
/// use vaultbuild_core::ContentHasher;
///
/// let hasher = ContentHasher::new();
/// let digest = hasher.hash_bytes(b"chunk");
/// assert!(verify(&hasher, b"chunk", &digest, "engine-binary.000").is_ok());
/// assert!(verify(&hasher, b"chunk!", &digest, "engine-binary.000").is_err());
/// ```
pub fn verify(hasher: &ContentHasher, data: &[u8], expected: &str, file: &str) -> Result<()> {
    if hasher.verify(data, expected) {
        return Ok(());
    }
    Err(CacheError::ChecksumMismatch {
        file: file.to_string(),
        expected: expected.to_string(),
        actual: hasher.hash_bytes(data),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mismatch_reports_both_digests() {
        let hasher = ContentHasher::new();
        let expected = hasher.hash_bytes(b"a");
        match verify(&hasher, b"b", &expected, "script").unwrap_err() {
            CacheError::ChecksumMismatch { file, expected: e, actual } => {
                assert_eq!(file, "script");
                assert_eq!(e, expected);
                assert_eq!(actual, hasher.hash_bytes(b"b"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
