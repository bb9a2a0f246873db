//! Bundling engine integration for vaultbuild.
//!
//! - [`protocol`]: the contract with the external engine: resolve/load
//!   plugin hooks, build options, and build output
//! - [`compiler`]: compiles the engine's WebAssembly binary with Wasmtime,
//!   memoised by [`module_cache`]
//! - [`acquirer`]: fetches the engine assets from the chunked cache or the
//!   network
//! - [`generation`] and [`lifecycle`]: generation-guarded initialization and
//!   unload of the single engine instance
//!
//! The `testing` feature adds a scripted host and an in-process fake engine.

#![deny(unsafe_code)]
#![warn(missing_docs, missing_debug_implementations)]

pub mod acquirer;
pub mod compiler;
pub mod generation;
pub mod lifecycle;
pub mod module_cache;
pub mod protocol;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use acquirer::{AssetAcquirer, AssetSource, EngineAssets};
pub use compiler::{CompiledModule, ModuleCompiler};
pub use generation::{GenerationCounter, GenerationGuard};
pub use lifecycle::{EngineEvent, EngineHandle, EngineLifecycle};
pub use module_cache::{ModuleCache, ModuleKey};
pub use protocol::{
    BundlingEngine, EngineBuildOptions, EngineBuildOutput, EngineHost, EngineMessage, LoadArgs,
    LoadOutcome, MessageLocation, OutputFile, ResolveArgs, ResolveKind, ResolveOutcome,
    ResolverPlugin, ScriptHandle,
};
