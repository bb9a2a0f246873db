//! Network side of vaultbuild.
//!
//! - [`HttpClient`]: a [`NetworkClient`](vaultbuild_core::NetworkClient) on
//!   `reqwest`, with every request passing through a bounded-concurrency
//!   [`SerializedQueue`](vaultbuild_core::SerializedQueue)
//! - [`DependencyFetcher`]: downloads a project's declared dependencies and
//!   keeps them fresh for a configured window
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use vaultbuild_bridge::{DependencyFetcher, HttpClient};
//! use vaultbuild_core::{BuildSettings, CancellationToken, ProjectDescriptor};
//!
//! # async fn example() -> vaultbuild_core::Result<()> {
//! let settings = BuildSettings::default();
//! let client = Arc::new(HttpClient::new(&settings)?);
//! let fetcher = DependencyFetcher::new(client, settings);
//!
//! let project = ProjectDescriptor::new("demo", ".", "main.ts", "main.js")
//!     .with_dependency("preact", "https://unpkg.com/preact/dist/preact.module.js");
//! let deps = fetcher.fetch(&project, &CancellationToken::new()).await?;
//! assert_eq!(deps.len(), 1);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs, missing_debug_implementations)]

pub mod fetcher;
pub mod http;

pub use fetcher::{DEFAULT_CACHE_CAPACITY, DependencyFetcher, DependencySet};
pub use http::HttpClient;
