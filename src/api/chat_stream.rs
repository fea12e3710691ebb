//! `POST /api/chat/stream`: relays an upstream SSE completion as a
//! normalized event stream.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::State;
use axum::response::Response;
use bytes::Bytes;
use http::{header, HeaderValue, StatusCode};

use crate::error::{into_axum_response, RelayError};
use crate::protocol::{normalize_chat_request, ChatRequest, RelayMode};
use crate::state::AppState;
use crate::stream::{RelayContext, RelayStream};
use crate::transport::UpstreamInvoker;

const SSE_CONTENT_TYPE: &str = "text/event-stream; charset=utf-8";
const SSE_CACHE_CONTROL: &str = "no-cache, no-store, must-revalidate";

pub async fn handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    match handler_inner(&state, &body).await {
        Ok(response) => response,
        Err(err) => into_axum_response(&err, RelayMode::Stream, state.config.features.environment),
    }
}

async fn handler_inner(state: &AppState, body: &[u8]) -> Result<Response, RelayError> {
    let started = Instant::now();
    let request = ChatRequest::from_slice(body)?;
    let chat = normalize_chat_request(
        request,
        &state.config.features.system_prompt,
        state.default_model().unwrap_or_default(),
    )?;
    let upstream = state.upstream()?;

    let request_id = state.next_request_id();
    tracing::info!(
        request_id = %request_id,
        model = %chat.model,
        history = chat.history.total,
        attachments = chat.has_attachments,
        "relaying streaming chat"
    );

    let model = chat.model.clone();
    let upstream_body = chat.into_stream_body();
    let byte_stream = UpstreamInvoker::new(&state.transport, upstream)
        .open_stream(&upstream_body)
        .await
        .inspect_err(|err| log_upstream_failure(&request_id, err))?;

    let relay = RelayStream::new(
        byte_stream,
        RelayContext {
            request_id,
            model,
            started,
        },
    );
    Ok(sse_ok_response(Body::from_stream(relay)))
}

pub(crate) fn log_upstream_failure(request_id: &uuid::Uuid, err: &RelayError) {
    match err {
        RelayError::Upstream { status, body } => {
            tracing::error!(request_id = %request_id, status, body = %body, "upstream returned an error");
        }
        other => {
            tracing::error!(request_id = %request_id, error = %other, "upstream call failed");
        }
    }
}

fn sse_ok_response(body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(SSE_CONTENT_TYPE));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(SSE_CACHE_CONTROL));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sse_headers() {
        let response = sse_ok_response(Body::empty());
        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], SSE_CONTENT_TYPE);
        assert_eq!(headers[header::CACHE_CONTROL], SSE_CACHE_CONTROL);
        assert_eq!(headers[header::CONNECTION], "keep-alive");
        assert_eq!(headers["x-accel-buffering"], "no");
    }
}
