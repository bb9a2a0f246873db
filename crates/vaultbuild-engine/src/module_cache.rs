//! In-memory cache of compiled engine binaries.
//!
//! Compiling the engine binary is the slowest step of a cold start. A
//! relaunch after [`unload`](crate::EngineLifecycle::unload) reuses the
//! compiled module when the binary bytes are unchanged.

use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use wasmtime::Module;

/// Key derived from the BLAKE3 digest of a binary.
///
/// # Examples
///
/// ```
/// use vaultbuild_engine::module_cache::ModuleKey;
///
/// let a = ModuleKey::for_binary(b"\0asm");
/// let b = ModuleKey::for_binary(b"\0asm");
/// assert_eq!(a, b);
/// assert!(a.as_str().starts_with("engine_"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleKey(String);

impl ModuleKey {
    /// Derives the key for `binary`.
    #[must_use]
    pub fn for_binary(binary: &[u8]) -> Self {
        Self(format!("engine_{}", blake3::hash(binary).to_hex()))
    }

    /// The key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ModuleKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// LRU cache of compiled modules.
pub struct ModuleCache {
    entries: Mutex<lru::LruCache<ModuleKey, Module>>,
}

impl std::fmt::Debug for ModuleCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleCache")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}

impl ModuleCache {
    /// Creates a cache holding up to `capacity` modules; zero means one.
    ///
    /// # Examples
    ///
    /// ```
    /// use vaultbuild_engine::module_cache::ModuleCache;
    ///
    /// assert_eq!(ModuleCache::new(4).capacity(), 4);
    /// assert_eq!(ModuleCache::new(0).capacity(), 1);
    /// ```
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(lru::LruCache::new(capacity)),
        }
    }

    /// Looks up a module, refreshing its LRU position.
    #[must_use]
    pub fn get(&self, key: &ModuleKey) -> Option<Module> {
        self.entries().get(key).cloned()
    }

    /// Stores a module, evicting the least recently used one when full.
    pub fn insert(&self, key: ModuleKey, module: Module) {
        self.entries().put(key, module);
    }

    /// Whether `key` is cached. Does not touch LRU order.
    #[must_use]
    pub fn contains(&self, key: &ModuleKey) -> bool {
        self.entries().contains(key)
    }

    /// Drops every module.
    pub fn clear(&self) {
        self.entries().clear();
    }

    /// Number of cached modules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of modules.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.entries().cap().get()
    }

    fn entries(&self) -> MutexGuard<'_, lru::LruCache<ModuleKey, Module>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ModuleCache {
    fn default() -> Self {
        Self::new(4)
    }
}
