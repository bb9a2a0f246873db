//! Persistent chunked cache for vaultbuild engine assets.
//!
//! The engine needs a bootstrap script and a large binary. Both are kept on
//! host storage as a versioned manifest plus hash-verified chunks, so a
//! restart can skip the download and any corruption is detected before the
//! bytes are trusted.
//!
//! # Layout
//!
//! ```text
//! <cache dir>/
//!   cache-manifest.json     format version, creation time, digests
//!   engine-script.js        bootstrap script
//!   engine-binary.000       binary chunk 0
//!   engine-binary.001       binary chunk 1
//!   ...
//! ```
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use vaultbuild_cache::ChunkedCache;
//! use vaultbuild_core::{ContentHasher, MemoryStorage};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = ChunkedCache::new(
//!     Arc::new(MemoryStorage::new()),
//!     ".vaultbuild/engine-cache",
//!     Arc::new(ContentHasher::new()),
//! );
//! cache.save("globalThis.engine = {}", b"\0asm\x01\0\0\0").await?;
//! let assets = cache.load().await.expect("cache hit");
//! assert_eq!(assets.script_text, "globalThis.engine = {}");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs, missing_debug_implementations)]

pub mod checksum;
pub mod error;
pub mod manifest;
pub mod store;

pub use error::{CacheError, Result};
pub use manifest::{BinaryLayout, CacheManifest, CachedFile, FORMAT_VERSION, MANIFEST_FILE};
pub use store::{CacheStatus, CachedAssets, ChunkedCache, DEFAULT_CHUNK_SIZE};
