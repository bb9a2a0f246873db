//! Declared dependency fetching.
//!
//! Dependencies are named modules served from a URL, typically a CDN build.
//! Fetched text is kept in an LRU for the configured freshness window so
//! consecutive builds do not download it again.

use lru::LruCache;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::time::Instant;
use vaultbuild_core::{
    BuildSettings, CancellationToken, Error, HttpRequest, NetworkClient, ProjectDescriptor, Result,
};

/// Default number of dependency bodies kept across builds.
pub const DEFAULT_CACHE_CAPACITY: usize = 64;

/// Dependencies available to one build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DependencySet {
    contents: BTreeMap<String, String>,
    names: BTreeMap<String, String>,
}

impl DependencySet {
    /// URL declared for `name`.
    #[must_use]
    pub fn url_for(&self, name: &str) -> Option<&str> {
        self.names.get(name).map(String::as_str)
    }

    /// Fetched text of `url`.
    #[must_use]
    pub fn content(&self, url: &str) -> Option<&str> {
        self.contents.get(url).map(String::as_str)
    }

    /// Records a fetched body.
    pub fn insert_content(&mut self, url: impl Into<String>, text: impl Into<String>) {
        self.contents.insert(url.into(), text.into());
    }

    /// Records a name → URL mapping.
    pub fn insert_name(&mut self, name: impl Into<String>, url: impl Into<String>) {
        self.names.insert(name.into(), url.into());
    }

    /// Declared names with their URLs, sorted by name.
    pub fn names(&self) -> impl Iterator<Item = (&str, &str)> {
        self.names.iter().map(|(name, url)| (name.as_str(), url.as_str()))
    }

    /// Number of fetched bodies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.contents.len()
    }

    /// Whether nothing was fetched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }
}

struct CachedBody {
    text: String,
    fetched_at: Instant,
}

/// Fetches declared dependencies with a time-boxed cache.
pub struct DependencyFetcher {
    network: Arc<dyn NetworkClient>,
    settings: BuildSettings,
    cache: Mutex<LruCache<String, CachedBody>>,
}

impl DependencyFetcher {
    /// Creates a fetcher using `settings` for TTL, timeout, and reserved
    /// names.
    #[must_use]
    pub fn new(network: Arc<dyn NetworkClient>, settings: BuildSettings) -> Self {
        Self::with_capacity(network, settings, DEFAULT_CACHE_CAPACITY)
    }

    /// Creates a fetcher keeping at most `capacity` bodies; zero means one.
    #[must_use]
    pub fn with_capacity(
        network: Arc<dyn NetworkClient>,
        settings: BuildSettings,
        capacity: usize,
    ) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            network,
            settings,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Fetches every declared dependency of `project`.
    ///
    /// Declarations without a name or URL and host API modules are skipped.
    ///
    /// # Errors
    ///
    /// - [`Error::Network`] naming the first dependency that fails; no
    ///   partial set is returned
    /// - [`Error::BuildCancelled`] if `cancel` is set between fetches
    pub async fn fetch(
        &self,
        project: &ProjectDescriptor,
        cancel: &CancellationToken,
    ) -> Result<DependencySet> {
        let mut set = DependencySet::default();
        for dependency in &project.dependencies {
            if !dependency.is_complete() {
                tracing::debug!(project = %project.id, name = %dependency.name, "Skipping incomplete dependency");
                continue;
            }
            if self.settings.is_host_api(&dependency.name) {
                tracing::debug!(project = %project.id, name = %dependency.name, "Skipping host API module");
                continue;
            }
            cancel.check()?;

            let text = self
                .fetch_text(&dependency.url)
                .await
                .map_err(|err| Error::Network {
                    url: dependency.url.clone(),
                    message: format!("Failed to fetch dependency '{}': {err}", dependency.name),
                    status: match err {
                        Error::Network { status, .. } => status,
                        _ => None,
                    },
                })?;
            set.insert_name(&dependency.name, &dependency.url);
            set.insert_content(&dependency.url, text);
        }
        cancel.check()?;
        tracing::debug!(project = %project.id, count = set.len(), "Dependencies ready");
        Ok(set)
    }

    /// Fetches the text at `url`, serving a fresh cached copy when present.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Network`] on transport failure, a non-success
    /// status, or a body that is not UTF-8.
    pub async fn fetch_text(&self, url: &str) -> Result<String> {
        if let Some(text) = self.fresh(url) {
            tracing::trace!(url, "Dependency cache hit");
            return Ok(text);
        }

        let request = HttpRequest::get(url).with_timeout(self.settings.request_timeout());
        let response = self.network.fetch(request).await?;
        if !response.is_success() {
            return Err(Error::Network {
                url: url.to_string(),
                message: format!("HTTP {}", response.status),
                status: Some(response.status),
            });
        }
        let text = String::from_utf8(response.body).map_err(|_| Error::Network {
            url: url.to_string(),
            message: "Response body is not valid UTF-8".to_string(),
            status: Some(response.status),
        })?;

        tracing::debug!(url, bytes = text.len(), "Fetched dependency");
        self.cache().put(
            url.to_string(),
            CachedBody {
                text: text.clone(),
                fetched_at: Instant::now(),
            },
        );
        Ok(text)
    }

    /// Drops every cached body.
    pub fn clear_cache(&self) {
        self.cache().clear();
    }

    /// Number of cached bodies, fresh or not.
    #[must_use]
    pub fn cached_len(&self) -> usize {
        self.cache().len()
    }

    fn fresh(&self, url: &str) -> Option<String> {
        let ttl = self.settings.dependency_ttl();
        let mut cache = self.cache();
        let expired = match cache.get(url) {
            Some(body) if body.fetched_at.elapsed() <= ttl => return Some(body.text.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            cache.pop(url);
        }
        None
    }

    fn cache(&self) -> MutexGuard<'_, LruCache<String, CachedBody>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for DependencyFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencyFetcher")
            .field("ttl", &self.settings.dependency_ttl())
            .field("cached", &self.cached_len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mockall::mock;
    use mockall::predicate::function;
    use std::time::Duration;
    use vaultbuild_core::HttpResponse;

    mock! {
        Network {}

        #[async_trait]
        impl NetworkClient for Network {
            async fn fetch(&self, request: HttpRequest) -> Result<HttpResponse>;
        }
    }

    const REACT: &str = "https://cdn.test/react.js";

    fn project() -> ProjectDescriptor {
        ProjectDescriptor::new("p", ".", "main.ts", "main.js")
            .with_dependency("react", REACT)
            .with_dependency("obsidian", "https://cdn.test/obsidian.js")
            .with_dependency("", "https://cdn.test/unnamed.js")
    }

    fn fetcher(network: MockNetwork) -> DependencyFetcher {
        DependencyFetcher::new(Arc::new(network), BuildSettings::default())
    }

    #[tokio::test]
    async fn test_fetches_declared_dependencies_only() {
        let mut network = MockNetwork::new();
        network
            .expect_fetch()
            .with(function(|request: &HttpRequest| request.url == REACT))
            .times(1)
            .returning(|_| Ok(HttpResponse::new(200, "export default React;")));

        let set = fetcher(network)
            .fetch(&project(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.url_for("react"), Some(REACT));
        assert_eq!(set.content(REACT), Some("export default React;"));
        assert!(set.url_for("obsidian").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_expires_after_ttl() {
        let mut network = MockNetwork::new();
        network
            .expect_fetch()
            .times(2)
            .returning(|_| Ok(HttpResponse::new(200, "v")));
        let fetcher = fetcher(network);

        fetcher.fetch_text(REACT).await.unwrap();
        tokio::time::advance(Duration::from_secs(29 * 60)).await;
        fetcher.fetch_text(REACT).await.unwrap();
        tokio::time::advance(Duration::from_secs(2 * 60)).await;
        fetcher.fetch_text(REACT).await.unwrap();
    }

    #[tokio::test]
    async fn test_failure_names_the_dependency() {
        let mut network = MockNetwork::new();
        network
            .expect_fetch()
            .returning(|_| Ok(HttpResponse::new(500, "boom")));

        let err = fetcher(network)
            .fetch(&project(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_network_error());
        assert!(err.to_string().contains("'react'"));
        assert!(matches!(err, Error::Network { status: Some(500), .. }));
    }

    #[tokio::test]
    async fn test_transport_error_propagates() {
        let mut network = MockNetwork::new();
        network.expect_fetch().returning(|request| {
            Err(Error::Network {
                url: request.url,
                message: "connection reset".to_string(),
                status: None,
            })
        });
        let err = fetcher(network).fetch_text(REACT).await.unwrap_err();
        assert!(err.to_string().contains("connection reset"));
    }

    #[tokio::test]
    async fn test_cancelled_before_fetching() {
        let network = MockNetwork::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = fetcher(network).fetch(&project(), &cancel).await.unwrap_err();
        assert!(err.is_cancelled());
    }
}
