//! `POST /api/chat`: one buffered completion answered as a JSON document.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::response::{IntoResponse, Json, Response};
use bytes::Bytes;
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};

use super::chat_stream::log_upstream_failure;
use crate::error::{into_axum_response, RelayError};
use crate::observability::log_request_usage;
use crate::protocol::decoder::extract_content;
use crate::protocol::request::SearchResult;
use crate::protocol::{normalize_chat_request, ChatRequest, NormalizedChat, RelayMode, UsageSnapshot};
use crate::state::AppState;
use crate::transport::UpstreamInvoker;

const FALLBACK_REPLY: &str = "Sorry, no reply could be obtained.";

pub async fn handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    match handler_inner(&state, &body).await {
        Ok(response) => response,
        Err(err) => into_axum_response(
            &err,
            RelayMode::NonStream,
            state.config.features.environment,
        ),
    }
}

async fn handler_inner(state: &AppState, body: &[u8]) -> Result<Response, RelayError> {
    let started = Instant::now();
    let features = &state.config.features;
    let request = ChatRequest::from_slice(body)?;
    let mut chat = normalize_chat_request(
        request,
        &features.system_prompt,
        state.default_model().unwrap_or_default(),
    )?;
    chat.enforce_message_limit(features.max_message_chars)?;
    let upstream = state.upstream()?;
    chat.enforce_vision_model(upstream.vision_model_id.as_deref())?;

    let request_id = state.next_request_id();
    tracing::info!(
        request_id = %request_id,
        model = %chat.model,
        history = chat.history.total,
        search_results = chat.search_results.len(),
        "relaying non-streaming chat"
    );

    let summary = ReplySummary::from(&mut chat);
    let upstream_body = chat.into_non_stream_body();
    let reply = UpstreamInvoker::new(&state.transport, upstream)
        .complete(&upstream_body)
        .await
        .inspect_err(|err| log_upstream_failure(&request_id, err))?;

    let usage = UsageSnapshot::from_payload(&reply).unwrap_or_default();
    let text = reply_text(&reply);
    log_request_usage(
        &request_id,
        &upstream_body.model,
        &usage,
        content_events(text),
        started.elapsed(),
    );

    let text = text.unwrap_or(FALLBACK_REPLY);
    Ok(Json(summary.render(&upstream_body.model, text, usage)).into_response())
}

/// Request facts echoed back alongside the reply.
struct ReplySummary {
    history_total: usize,
    history_user: usize,
    history_assistant: usize,
    search_enabled: bool,
    search_results: Vec<SearchResult>,
}

impl From<&mut NormalizedChat> for ReplySummary {
    fn from(chat: &mut NormalizedChat) -> Self {
        Self {
            history_total: chat.history.total,
            history_user: chat.history.user,
            history_assistant: chat.history.assistant,
            search_enabled: chat.search_enabled,
            search_results: std::mem::take(&mut chat.search_results),
        }
    }
}

impl ReplySummary {
    fn render(&self, model: &str, reply: &str, usage: UsageSnapshot) -> Value {
        let mut body = json!({
            "reply": reply,
            "tokens": {
                "prompt": usage.prompt_tokens,
                "completion": usage.completion_tokens,
                "total": usage.total_tokens(),
            },
            "model": { "id": model },
            "conversation": {
                "currentTurn": self.history_total + 1,
                "totalMessages": self.history_total,
                "userMessages": self.history_user,
                "assistantMessages": self.history_assistant,
            },
            "search": self.search_summary(),
            "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            "success": true,
            "mode": "non-stream",
        });
        if self.search_enabled && !self.search_results.is_empty() {
            body["searchResults"] = json!(self.search_results);
        }
        body
    }

    fn search_summary(&self) -> Value {
        if !self.search_enabled {
            return json!({ "enabled": false, "resultsCount": 0 });
        }
        let sources: Vec<&str> = self
            .search_results
            .iter()
            .map(|result| result.source.as_deref().unwrap_or("Unknown"))
            .collect();
        json!({
            "enabled": true,
            "resultsCount": self.search_results.len(),
            "resultsSources": sources,
        })
    }
}

/// A buffered reply counts as one content event only when it had text.
fn content_events(text: Option<&str>) -> u64 {
    u64::from(text.is_some())
}

/// `choices[0].message.content`, else the first non-empty streamed-shape
/// content field.
fn reply_text(reply: &Value) -> Option<&str> {
    reply
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
        .or_else(|| extract_content(reply))
}
