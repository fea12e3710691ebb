//! Calls the upstream chat-completions endpoint.

use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures_util::Stream;
use http::{HeaderMap, HeaderValue};
use serde_json::Value;

use super::HttpTransport;
use crate::config::ResolvedUpstream;
use crate::error::RelayError;
use crate::protocol::normalize::UpstreamRequestBody;

/// Raw upstream body chunks, in arrival order.
pub type UpstreamByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>;

/// Build the bearer-auth JSON headers sent with every upstream call.
///
/// # Errors
///
/// Returns [`RelayError::Config`] when the credential cannot be used as a
/// header value.
pub fn build_upstream_headers(api_key: &str) -> Result<HeaderMap, RelayError> {
    let mut authorization = HeaderValue::from_str(&format!("Bearer {api_key}")).map_err(|_| {
        RelayError::Config("upstream api_key contains characters not allowed in a header".into())
    })?;
    authorization.set_sensitive(true);

    let mut headers = HeaderMap::with_capacity(2);
    headers.insert(http::header::AUTHORIZATION, authorization);
    headers.insert(
        http::header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    Ok(headers)
}

/// Issues one request against the configured upstream.
pub struct UpstreamInvoker<'a> {
    transport: &'a HttpTransport,
    upstream: &'a ResolvedUpstream,
}

impl<'a> UpstreamInvoker<'a> {
    #[must_use]
    pub fn new(transport: &'a HttpTransport, upstream: &'a ResolvedUpstream) -> Self {
        Self {
            transport,
            upstream,
        }
    }

    /// Send a streaming request and hand back the open body stream.
    ///
    /// No overall timeout applies; the stream lives as long as the upstream
    /// keeps it open or the client stays connected.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Upstream`] with the status and full error body
    /// on a non-success status, or [`RelayError::Transport`] when the call
    /// itself fails. No partial stream is produced in either case.
    pub async fn open_stream(
        &self,
        body: &UpstreamRequestBody,
    ) -> Result<UpstreamByteStream, RelayError> {
        let response = self.send(body, None).await?;
        Ok(Box::pin(response.bytes_stream()))
    }

    /// Send a non-streaming request and parse the JSON reply.
    ///
    /// The transport's request timeout bounds the call, body read included.
    ///
    /// # Errors
    ///
    /// Same as [`open_stream`](Self::open_stream), plus [`RelayError::Decode`]
    /// when the reply is not JSON.
    pub async fn complete(&self, body: &UpstreamRequestBody) -> Result<Value, RelayError> {
        let response = self
            .send(body, Some(self.transport.request_timeout()))
            .await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| RelayError::Transport(format!("Failed to read response body: {e}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| RelayError::Decode(format!("Upstream reply is not valid JSON: {e}")))
    }

    async fn send(
        &self,
        body: &UpstreamRequestBody,
        timeout: Option<Duration>,
    ) -> Result<reqwest::Response, RelayError> {
        let payload = serde_json::to_vec(body)
            .map_err(|e| RelayError::Internal(format!("Failed to encode upstream request: {e}")))?;
        let headers = build_upstream_headers(&self.upstream.api_key)?;

        tracing::debug!(
            endpoint = %self.upstream.endpoint,
            model = %body.model,
            message_count = body.messages.len(),
            stream = body.stream,
            "calling upstream"
        );

        let response = self
            .transport
            .post(&self.upstream.endpoint, headers, Bytes::from(payload), timeout)
            .await?;

        let status = response.status();
        tracing::debug!(status = status.as_u16(), "upstream responded");
        if status.is_success() {
            return Ok(response);
        }

        let error_body = response
            .text()
            .await
            .map_err(|e| RelayError::Transport(format!("Failed to read error body: {e}")))?;
        Err(RelayError::Upstream {
            status: status.as_u16(),
            body: error_body,
        })
    }
}
