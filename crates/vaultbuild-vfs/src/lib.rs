//! Virtual file system for vaultbuild.
//!
//! Project files are read from host storage once per build, hashed, and kept
//! in a [`VirtualFileMap`]. The bundling engine is then served from that map
//! only, so what the engine compiles is exactly what was hashed.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use vaultbuild_core::{CancellationToken, ContentHasher, HostStorage, MemoryStorage, ProjectDescriptor};
//! use vaultbuild_vfs::{AssetCollector, CollectionLimits};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> vaultbuild_core::Result<()> {
//! let storage = Arc::new(MemoryStorage::new());
//! storage.write("demo/main.ts", "export const x = 1;").await?;
//!
//! let collector = AssetCollector::new(storage, Arc::new(ContentHasher::new()), CollectionLimits::default());
//! let project = ProjectDescriptor::new("demo", "demo", "main.ts", "main.js");
//! let outcome = collector.collect(&project, &CancellationToken::new()).await?;
//! assert!(outcome.files.contains("main.ts"));
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs, missing_debug_implementations)]

pub mod collector;
pub mod policy;
pub mod types;

pub use collector::{AssetCollector, CollectionLimits, CollectionOutcome};
pub use types::{CollectionWarning, VirtualFileAsset, VirtualFileMap};
