//! Test doubles shared across the workspace.
//!
//! Available in this crate's tests and, for downstream crates, behind the
//! `testing` feature.

use crate::error::{Error, Result};
use crate::traits::{HttpRequest, HttpResponse, NetworkClient};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Default)]
struct Routes {
    responses: HashMap<String, HttpResponse>,
    failures: HashMap<String, String>,
    calls: Vec<String>,
    delay: Option<Duration>,
}

/// Network double answering from a fixed URL table.
///
/// Unknown URLs answer `404`. Every request is recorded.
#[derive(Debug, Default)]
pub struct StaticNetwork {
    routes: Mutex<Routes>,
}

impl StaticNetwork {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers `url` with status 200 and `body`.
    pub fn respond(&self, url: &str, body: impl Into<Vec<u8>>) {
        self.respond_with(url, HttpResponse::new(200, body));
    }

    /// Answers `url` with a prepared response.
    pub fn respond_with(&self, url: &str, response: HttpResponse) {
        let mut routes = self.routes();
        routes.failures.remove(url);
        routes.responses.insert(url.to_string(), response);
    }

    /// Fails requests for `url` with a transport error.
    pub fn fail(&self, url: &str, message: &str) {
        self.routes()
            .failures
            .insert(url.to_string(), message.to_string());
    }

    /// Delays every response.
    pub fn set_delay(&self, delay: Duration) {
        self.routes().delay = Some(delay);
    }

    /// Number of requests made for `url`.
    #[must_use]
    pub fn call_count(&self, url: &str) -> usize {
        self.routes().calls.iter().filter(|call| *call == url).count()
    }

    /// Total number of requests.
    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.routes().calls.len()
    }

    fn routes(&self) -> MutexGuard<'_, Routes> {
        self.routes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl NetworkClient for StaticNetwork {
    async fn fetch(&self, request: HttpRequest) -> Result<HttpResponse> {
        let (delay, outcome) = {
            let mut routes = self.routes();
            routes.calls.push(request.url.clone());
            let outcome = if let Some(message) = routes.failures.get(&request.url) {
                Err(Error::Network {
                    url: request.url.clone(),
                    message: message.clone(),
                    status: None,
                })
            } else {
                Ok(routes
                    .responses
                    .get(&request.url)
                    .cloned()
                    .unwrap_or_else(|| HttpResponse::new(404, "not found")))
            };
            (routes.delay, outcome)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        outcome
    }
}
