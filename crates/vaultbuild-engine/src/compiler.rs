//! Engine binary compilation.

use crate::module_cache::{ModuleCache, ModuleKey};
use std::fmt;
use std::sync::Arc;
use vaultbuild_core::{Error, Result};
use wasmtime::{Config, Engine, Module, Strategy};

const WASM_MAGIC: &[u8; 4] = b"\0asm";

/// A compiled engine binary ready to hand to
/// [`BundlingEngine::initialize`](crate::BundlingEngine::initialize).
#[derive(Clone)]
pub struct CompiledModule {
    module: Module,
    key: ModuleKey,
    size: usize,
}

impl CompiledModule {
    /// The compiled module.
    #[must_use]
    pub const fn module(&self) -> &Module {
        &self.module
    }

    /// Cache key of the source binary.
    #[must_use]
    pub const fn key(&self) -> &ModuleKey {
        &self.key
    }

    /// Size of the source binary in bytes.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }
}

impl fmt::Debug for CompiledModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledModule")
            .field("key", &self.key)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

/// Compiles engine binaries, reusing earlier compilations of identical bytes.
pub struct ModuleCompiler {
    engine: Engine,
    cache: Arc<ModuleCache>,
}

impl ModuleCompiler {
    /// Creates a compiler using Cranelift.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EngineInitialization`] if Wasmtime rejects the
    /// configuration.
    pub fn new(cache: Arc<ModuleCache>) -> Result<Self> {
        let mut config = Config::new();
        config.strategy(Strategy::Cranelift);
        let engine = Engine::new(&config).map_err(|err| Error::EngineInitialization {
            message: format!("Failed to create Wasmtime engine: {err}"),
            aborted: false,
            source: None,
        })?;
        Ok(Self { engine, cache })
    }

    /// Compiles `binary`.
    ///
    /// Compilation runs on the blocking pool.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EngineInitialization`] if the bytes are not a valid
    /// WebAssembly module.
    pub async fn compile(&self, binary: Vec<u8>) -> Result<CompiledModule> {
        if !binary.starts_with(WASM_MAGIC) {
            return Err(Error::engine(
                "Engine binary is not a WebAssembly module (bad magic number)",
            ));
        }

        let key = ModuleKey::for_binary(&binary);
        let size = binary.len();
        if let Some(module) = self.cache.get(&key) {
            tracing::debug!(key = %key, "Reusing compiled engine module");
            return Ok(CompiledModule { module, key, size });
        }

        let engine = self.engine.clone();
        let module = tokio::task::spawn_blocking(move || Module::new(&engine, &binary))
            .await
            .map_err(|err| Error::engine(format!("Engine compilation task failed: {err}")))?
            .map_err(|err| Error::engine(format!("Failed to compile engine binary: {err}")))?;

        tracing::debug!(key = %key, size, "Compiled engine module");
        self.cache.insert(key.clone(), module.clone());
        Ok(CompiledModule { module, key, size })
    }

    /// The module cache backing this compiler.
    #[must_use]
    pub const fn cache(&self) -> &Arc<ModuleCache> {
        &self.cache
    }
}

impl fmt::Debug for ModuleCompiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleCompiler")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}
