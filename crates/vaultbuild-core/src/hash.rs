//! Content hashing with a non-cryptographic fallback.
//!
//! [`ContentHasher`] produces tagged hex digests such as `blake3:<64 hex>`.
//! When the strong digest is unavailable, or fails mid-hash, it falls back
//! to a 32-bit FNV-1a hash tagged `fnv1a32:<8 hex>` and logs the switch once
//! per hasher instance.
//!
//! The fallback keeps integrity checks working but is not collision
//! resistant. Callers must not treat a fallback digest as a security control.
//!
//! # Examples
//!
//! ```
//! use vaultbuild_core::ContentHasher;
//!
//! let hasher = ContentHasher::new();
//! let digest = hasher.hash_str("export const x = 1;");
//! assert!(digest.starts_with("blake3:"));
//! assert!(hasher.verify(b"export const x = 1;", &digest));
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// Tag prefix of strong digests.
pub const BLAKE3_PREFIX: &str = "blake3:";

/// Tag prefix of fallback digests.
pub const FNV1A32_PREFIX: &str = "fnv1a32:";

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// The strong digest could not be computed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Digest unavailable: {reason}")]
pub struct DigestUnavailable {
    /// Why the digest failed
    pub reason: String,
}

/// A cryptographic digest primitive.
///
/// Implementations return the untagged lowercase hex digest.
pub trait StrongDigest: Send + Sync + fmt::Debug {
    /// Tag written before the hex digest, including the trailing colon.
    fn prefix(&self) -> &'static str;

    /// Computes the digest of `data`.
    ///
    /// # Errors
    ///
    /// Returns [`DigestUnavailable`] if the primitive cannot run.
    fn digest(&self, data: &[u8]) -> Result<String, DigestUnavailable>;
}

/// BLAKE3 digest.
#[derive(Debug, Clone, Copy, Default)]
pub struct Blake3Digest;

impl StrongDigest for Blake3Digest {
    fn prefix(&self) -> &'static str {
        BLAKE3_PREFIX
    }

    fn digest(&self, data: &[u8]) -> Result<String, DigestUnavailable> {
        Ok(blake3::hash(data).to_hex().to_string())
    }
}

/// Hashes strings and byte buffers into tagged hex digests.
///
/// The fallback notice flag lives on the instance. Share one hasher through
/// an `Arc` to get one notice per service graph.
pub struct ContentHasher {
    strong: Option<Arc<dyn StrongDigest>>,
    fallback_logged: AtomicBool,
}

impl ContentHasher {
    /// Creates a hasher backed by BLAKE3.
    #[must_use]
    pub fn new() -> Self {
        Self::with_digest(Arc::new(Blake3Digest))
    }

    /// Creates a hasher backed by a custom strong digest.
    #[must_use]
    pub fn with_digest(strong: Arc<dyn StrongDigest>) -> Self {
        Self {
            strong: Some(strong),
            fallback_logged: AtomicBool::new(false),
        }
    }

    /// Creates a hasher that only uses the fallback algorithm.
    #[must_use]
    pub const fn fallback_only() -> Self {
        Self {
            strong: None,
            fallback_logged: AtomicBool::new(false),
        }
    }

    /// Hashes a byte buffer.
    #[must_use]
    pub fn hash_bytes(&self, data: &[u8]) -> String {
        if let Some(strong) = &self.strong {
            match strong.digest(data) {
                Ok(hex) => return format!("{}{hex}", strong.prefix()),
                Err(err) => self.note_fallback(&err.reason),
            }
        } else {
            self.note_fallback("no strong digest configured");
        }
        fallback_digest(data)
    }

    /// Hashes the UTF-8 bytes of a string.
    #[must_use]
    pub fn hash_str(&self, text: &str) -> String {
        self.hash_bytes(text.as_bytes())
    }

    /// Returns `true` if `data` hashes to `expected`.
    ///
    /// The algorithm is chosen from the tag of `expected`, so digests taken
    /// while the fallback was active still verify. Comparison runs in
    /// constant time.
    #[must_use]
    pub fn verify(&self, data: &[u8], expected: &str) -> bool {
        let actual = if expected.starts_with(FNV1A32_PREFIX) {
            fallback_digest(data)
        } else {
            self.hash_bytes(data)
        };
        constant_time_eq(&actual, expected)
    }

    /// Returns `true` once the fallback has been used by this instance.
    #[must_use]
    pub fn fallback_active(&self) -> bool {
        self.fallback_logged.load(Ordering::Relaxed)
    }

    fn note_fallback(&self, reason: &str) {
        if !self.fallback_logged.swap(true, Ordering::Relaxed) {
            tracing::warn!(
                reason,
                "Strong digest unavailable, using fnv1a32. Hashes are not collision resistant"
            );
        }
    }
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ContentHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentHasher")
            .field("strong", &self.strong)
            .field("fallback_active", &self.fallback_active())
            .finish()
    }
}

/// Computes the tagged FNV-1a 32-bit digest.
///
/// # Examples
///
/// ```
/// use vaultbuild_core::hash::fallback_digest;
///
/// assert_eq!(fallback_digest(b""), "fnv1a32:811c9dc5");
/// assert_eq!(fallback_digest(b"a"), "fnv1a32:e40c292c");
/// ```
#[must_use]
pub fn fallback_digest(data: &[u8]) -> String {
    let hash = data.iter().fold(FNV_OFFSET_BASIS, |acc, byte| {
        (acc ^ u32::from(*byte)).wrapping_mul(FNV_PRIME)
    });
    format!("{FNV1A32_PREFIX}{hash:08x}")
}

/// Compares two strings without short-circuiting on the first difference.
///
/// # Examples
///
/// ```
/// use vaultbuild_core::hash::constant_time_eq;
///
/// assert!(constant_time_eq("blake3:abc", "blake3:abc"));
/// assert!(!constant_time_eq("blake3:abc", "blake3:abd"));
/// assert!(!constant_time_eq("blake3:abc", "blake3:abcdef"));
/// ```
#[must_use]
#[allow(clippy::similar_names)]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let left = a.as_bytes();
    let right = b.as_bytes();
    let mut diff = u8::from(left.len() != right.len());
    for i in 0..left.len().max(right.len()) {
        diff |= left.get(i).copied().unwrap_or(0) ^ right.get(i).copied().unwrap_or(0);
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct BrokenDigest;

    impl StrongDigest for BrokenDigest {
        fn prefix(&self) -> &'static str {
            "broken:"
        }

        fn digest(&self, _data: &[u8]) -> Result<String, DigestUnavailable> {
            Err(DigestUnavailable {
                reason: "primitive missing".to_string(),
            })
        }
    }

    #[test]
    fn test_blake3_format() {
        let digest = ContentHasher::new().hash_bytes(b"hello");
        assert!(digest.starts_with(BLAKE3_PREFIX));
        assert_eq!(digest.len(), BLAKE3_PREFIX.len() + 64);
    }

    #[test]
    fn test_deterministic() {
        let hasher = ContentHasher::new();
        assert_eq!(hasher.hash_str("same"), hasher.hash_str("same"));
        assert_ne!(hasher.hash_str("same"), hasher.hash_str("diff"));
    }

    #[test]
    fn test_falls_back_when_digest_fails() {
        let hasher = ContentHasher::with_digest(Arc::new(BrokenDigest));
        assert!(!hasher.fallback_active());
        let digest = hasher.hash_bytes(b"data");
        assert!(digest.starts_with(FNV1A32_PREFIX));
        assert_eq!(digest.len(), FNV1A32_PREFIX.len() + 8);
        assert!(hasher.fallback_active());
        assert_eq!(digest, hasher.hash_bytes(b"data"));
    }

    #[test]
    fn test_verify_uses_tagged_algorithm() {
        let hasher = ContentHasher::new();
        let fallback = fallback_digest(b"payload");
        assert!(hasher.verify(b"payload", &fallback));
        assert!(!hasher.verify(b"payload!", &fallback));

        let strong = hasher.hash_bytes(b"payload");
        assert!(hasher.verify(b"payload", &strong));
        assert!(!hasher.verify(b"tampered", &strong));
    }

    #[test]
    fn test_fallback_only() {
        let hasher = ContentHasher::fallback_only();
        assert_eq!(hasher.hash_str(""), "fnv1a32:811c9dc5");
    }
}
