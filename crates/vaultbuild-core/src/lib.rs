//! Core types, traits, and primitives for vaultbuild.
//!
//! This crate holds everything the build pipeline crates share:
//! - the error taxonomy ([`Error`], [`Result`])
//! - domain types and configuration
//! - storage path rules
//! - the [`ContentHasher`]
//! - the [`SerializedQueue`] used by every stateful service
//! - cooperative [`CancellationToken`] and the [`EventBus`]
//! - host collaborator contracts ([`HostStorage`], [`NetworkClient`],
//!   [`SettingsStore`]) with in-memory and local-directory implementations
//!
//! # Examples
//!
//! ```
//! use vaultbuild_core::{ContentHasher, HostStorage, MemoryStorage};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> vaultbuild_core::Result<()> {
//! let storage = MemoryStorage::new();
//! storage.write("main.ts", "console.log(1)").await?;
//!
//! let hasher = ContentHasher::new();
//! let text = storage.read("main.ts").await?;
//! assert!(hasher.verify(text.as_bytes(), &hasher.hash_str("console.log(1)")));
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs, missing_debug_implementations)]

pub mod cancel;
pub mod config;
pub mod error;
pub mod events;
pub mod hash;
pub mod path;
pub mod queue;
pub mod storage;
pub mod traits;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use cancel::CancellationToken;
pub use config::{BuildSettings, CompilerOptions, DependencyDecl, EngineConfig, ProjectDescriptor};
pub use error::{BoxError, Error, Result};
pub use events::EventBus;
pub use hash::ContentHasher;
pub use queue::{QueueStatus, SerializedQueue};
pub use storage::{FsStorage, MemorySettings, MemoryStorage};
pub use traits::{
    HostStorage, HttpMethod, HttpRequest, HttpResponse, NetworkClient, SettingsStore, StorageEntry,
};
pub use types::{
    BuildInitiator, BuildPhase, EngineStatus, Loader, LogLevel, ModuleFormat, Namespace, Platform,
    ProjectId, SourceMapMode,
};
