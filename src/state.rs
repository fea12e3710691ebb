mod request_id;

use crate::config::{AppConfig, MissingUpstreamConfig, ResolvedUpstream};
use crate::error::RelayError;
use crate::transport::HttpTransport;

use request_id::RequestIds;

/// Shared, read-only application state handed to every request.
pub struct AppState {
    pub config: AppConfig,
    pub transport: HttpTransport,
    upstream: Result<ResolvedUpstream, MissingUpstreamConfig>,
    request_ids: RequestIds,
}

impl AppState {
    /// Build state from a loaded config.
    ///
    /// Missing upstream settings do not fail startup; they are reported on
    /// every relay request instead.
    #[must_use]
    pub fn new(config: AppConfig, transport: HttpTransport) -> Self {
        let upstream = config.upstream.resolve();
        Self {
            config,
            transport,
            upstream,
            request_ids: RequestIds::new(),
        }
    }

    /// Resolved upstream settings for this request.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] naming which settings are missing.
    /// Their values are never included.
    pub fn upstream(&self) -> Result<&ResolvedUpstream, RelayError> {
        self.upstream.as_ref().map_err(|missing| {
            tracing::error!(%missing, "upstream configuration incomplete");
            RelayError::Config(missing.to_string())
        })
    }

    /// Model used when a request names none, if configured.
    #[must_use]
    pub fn default_model(&self) -> Option<&str> {
        self.upstream.as_ref().ok().map(|upstream| upstream.model_id.as_str())
    }

    #[must_use]
    pub fn upstream_configured(&self) -> bool {
        self.upstream.is_ok()
    }

    pub fn next_request_id(&self) -> uuid::Uuid {
        self.request_ids.next()
    }
}
