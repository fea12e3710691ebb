use std::time::Duration;

use bytes::Bytes;
use http::HeaderMap;

use crate::config::ServerConfig;
use crate::error::RelayError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

fn build_reqwest_client(
    pool_max_idle_per_host: usize,
    pool_idle_timeout: Option<Duration>,
    use_env_proxy: bool,
) -> Result<reqwest::Client, RelayError> {
    let mut builder = reqwest::Client::builder()
        .pool_max_idle_per_host(pool_max_idle_per_host)
        .pool_idle_timeout(pool_idle_timeout)
        .tcp_nodelay(true)
        .connect_timeout(CONNECT_TIMEOUT)
        .redirect(reqwest::redirect::Policy::none());

    if !use_env_proxy {
        builder = builder.no_proxy();
    }

    builder
        .build()
        .map_err(|err| RelayError::Transport(format!("Failed to build HTTP client: {err}")))
}

/// Pooled HTTP client for talking to the upstream model service.
///
/// The client itself has no whole-request timeout; callers opt in per
/// request so long-lived streams are never cut.
pub struct HttpTransport {
    client: reqwest::Client,
    request_timeout: Duration,
}

impl HttpTransport {
    /// Create a new transport with connection pooling and timeouts from the given server config.
    #[must_use]
    pub fn new(config: &ServerConfig) -> Self {
        let pool_idle_timeout = if config.http_pool_idle_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(config.http_pool_idle_timeout_secs))
        };

        let client = match build_reqwest_client(
            config.http_pool_max_idle_per_host.max(1),
            pool_idle_timeout,
            config.http_use_env_proxy,
        ) {
            Ok(client) => client,
            Err(err) => {
                tracing::error!(error = %err, "failed to build configured reqwest client, falling back to default client");
                reqwest::Client::new()
            }
        };
        Self {
            client,
            request_timeout: Duration::from_secs(config.timeout),
        }
    }

    /// Whole-request timeout for buffered calls, from `server.timeout`.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// POST `body` to `url` and return the response once headers arrive.
    ///
    /// The body is not read; callers decide whether to stream or buffer it.
    /// `timeout`, when set, bounds the whole exchange including the body.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Transport`] when the request cannot be sent or
    /// no response headers arrive.
    pub async fn post(
        &self,
        url: &str,
        headers: HeaderMap,
        body: Bytes,
        timeout: Option<Duration>,
    ) -> Result<reqwest::Response, RelayError> {
        let mut request = self.client.post(url).headers(headers).body(body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        request
            .send()
            .await
            .map_err(|err| RelayError::Transport(format!("Upstream request failed: {err}")))
    }
}
