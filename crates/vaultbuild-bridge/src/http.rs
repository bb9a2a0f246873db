//! `reqwest`-backed network client.

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use vaultbuild_core::{
    BuildSettings, Error, HttpMethod, HttpRequest, HttpResponse, NetworkClient, Result,
    SerializedQueue,
};

const USER_AGENT: &str = concat!("vaultbuild/", env!("CARGO_PKG_VERSION"));

/// HTTP client whose requests run through a bounded-concurrency queue.
///
/// Non-success statuses are returned as responses. After
/// [`shutdown`](Self::shutdown) queued and new requests are rejected.
///
/// # Examples
///
/// ```no_run
/// use vaultbuild_bridge::HttpClient;
/// use vaultbuild_core::{BuildSettings, HttpRequest, NetworkClient};
///
/// # async fn example() -> vaultbuild_core::Result<()> {
/// let client = HttpClient::new(&BuildSettings::default())?;
/// let response = client.fetch(HttpRequest::get("https://unpkg.com/react")).await?;
/// println!("{} bytes", response.body.len());
/// # Ok(())
/// # }
/// ```
pub struct HttpClient {
    client: reqwest::Client,
    queue: SerializedQueue<HttpResponse>,
    default_timeout: Duration,
}

impl HttpClient {
    /// Creates a client sized by `settings`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Network`] if the TLS backend cannot be initialized.
    pub fn new(settings: &BuildSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| Error::Network {
                url: String::new(),
                message: format!("Failed to create HTTP client: {err}"),
                status: None,
            })?;
        Ok(Self::with_client(
            client,
            settings.network_concurrency,
            settings.request_timeout(),
        ))
    }

    /// Wraps an existing `reqwest` client.
    #[must_use]
    pub fn with_client(client: reqwest::Client, concurrency: usize, default_timeout: Duration) -> Self {
        Self {
            client,
            queue: SerializedQueue::new("network", concurrency),
            default_timeout,
        }
    }

    /// Rejects pending requests and waits for running ones.
    pub async fn shutdown(&self) {
        self.queue.shutdown();
        self.queue.wait_idle().await;
        tracing::debug!("Network client shut down");
    }

    /// Accepts requests again after [`shutdown`](Self::shutdown).
    pub fn reset(&self) {
        self.queue.reset();
    }
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("queue", &self.queue)
            .field("default_timeout", &self.default_timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl NetworkClient for HttpClient {
    async fn fetch(&self, request: HttpRequest) -> Result<HttpResponse> {
        let client = self.client.clone();
        let timeout = request.timeout.unwrap_or(self.default_timeout);
        self.queue
            .enqueue(move || execute(client, request, timeout))
            .await
    }
}

async fn execute(
    client: reqwest::Client,
    request: HttpRequest,
    timeout: Duration,
) -> Result<HttpResponse> {
    let method = match request.method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Head => reqwest::Method::HEAD,
    };
    let mut builder = client.request(method, &request.url).timeout(timeout);
    for (name, value) in &request.headers {
        builder = builder.header(name, value);
    }

    let response = builder
        .send()
        .await
        .map_err(|err| transport_error(&request.url, &err, timeout))?;
    let status = response.status().as_u16();
    let body = response
        .bytes()
        .await
        .map_err(|err| transport_error(&request.url, &err, timeout))?;

    tracing::debug!(url = %request.url, status, bytes = body.len(), "HTTP request completed");
    Ok(HttpResponse::new(status, body.to_vec()))
}

fn transport_error(url: &str, err: &reqwest::Error, timeout: Duration) -> Error {
    let message = if err.is_timeout() {
        format!("Request timed out after {}s", timeout.as_secs())
    } else {
        err.to_string()
    };
    Error::Network {
        url: url.to_string(),
        message,
        status: err.status().map(|status| status.as_u16()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves one canned HTTP/1.1 response per connection.
    async fn serve(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buffer = [0_u8; 4096];
                let _ = socket.read(&mut buffer).await;
                let reply = format!(
                    "HTTP/1.1 {status_line}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(reply.as_bytes()).await;
            }
        });
        format!("http://{address}/asset")
    }

    fn client() -> HttpClient {
        HttpClient::new(&BuildSettings::default()).unwrap()
    }

    #[tokio::test]
    async fn test_fetches_body() {
        let url = serve("200 OK", "export default 1;").await;
        let response = client().fetch(HttpRequest::get(url)).await.unwrap();
        assert!(response.is_success());
        assert_eq!(response.text(), "export default 1;");
    }

    #[tokio::test]
    async fn test_error_status_is_a_response() {
        let url = serve("404 Not Found", "missing").await;
        let response = client().fetch(HttpRequest::get(url)).await.unwrap();
        assert_eq!(response.status, 404);
    }

    #[tokio::test]
    async fn test_transport_failure_is_network_error() {
        let err = client()
            .fetch(HttpRequest::get("http://127.0.0.1:1/unreachable"))
            .await
            .unwrap_err();
        assert!(err.is_network_error());
    }

    #[tokio::test]
    async fn test_shutdown_rejects_requests() {
        let url = serve("200 OK", "ok").await;
        let client = client();
        client.shutdown().await;
        let err = client.fetch(HttpRequest::get(url.clone())).await.unwrap_err();
        assert!(err.is_shutting_down());
        client.reset();
        assert!(client.fetch(HttpRequest::get(url)).await.is_ok());
    }
}
