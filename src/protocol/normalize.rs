//! Builds the upstream request body from an inbound [`ChatRequest`].

use serde::Serialize;
use serde_json::Value;

use super::request::{Attachment, ChatRequest, ContentBlock, Role, SearchResult, Turn, TurnContent};
use crate::error::RelayError;

const NON_STREAM_MAX_TOKENS: u32 = 4096;
const NON_STREAM_TEMPERATURE: f32 = 0.7;

/// Counts over the client-supplied history, reported by the non-streaming route.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryStats {
    pub total: usize,
    pub user: usize,
    pub assistant: usize,
}

/// A validated chat ready to be sent upstream.
#[derive(Debug, Clone)]
pub struct NormalizedChat {
    pub model: String,
    pub messages: Vec<Turn>,
    pub message_chars: usize,
    pub has_attachments: bool,
    pub history: HistoryStats,
    pub search_enabled: bool,
    /// Results folded into the system prompt; empty unless search is enabled.
    pub search_results: Vec<SearchResult>,
}

/// Body posted to the upstream chat-completions endpoint.
#[derive(Debug, Serialize)]
pub struct UpstreamRequestBody {
    pub model: String,
    pub stream: bool,
    pub messages: Vec<Turn>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl NormalizedChat {
    #[must_use]
    pub fn into_stream_body(self) -> UpstreamRequestBody {
        UpstreamRequestBody {
            model: self.model,
            stream: true,
            messages: self.messages,
            max_tokens: None,
            temperature: None,
        }
    }

    #[must_use]
    pub fn into_non_stream_body(self) -> UpstreamRequestBody {
        UpstreamRequestBody {
            model: self.model,
            stream: false,
            messages: self.messages,
            max_tokens: Some(NON_STREAM_MAX_TOKENS),
            temperature: Some(NON_STREAM_TEMPERATURE),
        }
    }

    /// Reject messages longer than `max_chars` characters.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidRequest`] when the limit is exceeded.
    pub fn enforce_message_limit(&self, max_chars: usize) -> Result<(), RelayError> {
        if self.message_chars > max_chars {
            return Err(RelayError::InvalidRequest(format!(
                "Message is too long, please keep it within {max_chars} characters"
            )));
        }
        Ok(())
    }

    /// Reject attachments unless the effective model is the vision model.
    ///
    /// No gate applies when no vision model is configured.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidRequest`] naming the model that cannot
    /// take images or video.
    pub fn enforce_vision_model(&self, vision_model_id: Option<&str>) -> Result<(), RelayError> {
        let Some(vision_model_id) = vision_model_id else {
            return Ok(());
        };
        if self.has_attachments && self.model != vision_model_id {
            return Err(RelayError::InvalidRequest(format!(
                "Model '{}' does not accept image or video input; switch to '{vision_model_id}' and retry",
                self.model
            )));
        }
        Ok(())
    }
}

/// Validate an inbound request and assemble the upstream message list.
///
/// The system turn comes first, then the history verbatim, then the new
/// user turn.
///
/// # Errors
///
/// Returns [`RelayError::InvalidRequest`] when the message is not a string,
/// or is missing/empty while no usable attachment is present.
pub fn normalize_chat_request(
    request: ChatRequest,
    system_prompt: &str,
    default_model: &str,
) -> Result<NormalizedChat, RelayError> {
    let message = match request.message.as_ref() {
        None | Some(Value::Null) => "",
        Some(Value::String(text)) => text.as_str(),
        Some(_) => {
            return Err(RelayError::InvalidRequest(
                "message must be a string".to_string(),
            ))
        }
    };

    let attachments = request.attachments();
    let has_usable_attachment = attachments.iter().any(|a| a.to_block().is_some());
    if message.is_empty() && !has_usable_attachment {
        return Err(RelayError::InvalidRequest("message is required".to_string()));
    }

    let user_content = build_user_content(message, attachments);
    let message_chars = message.chars().count();
    let has_attachments = !attachments.is_empty();

    let search_results = request
        .search_results
        .as_deref()
        .filter(|_| request.enable_search)
        .unwrap_or_default();
    let mut system_text = system_prompt.to_string();
    if !search_results.is_empty() {
        system_text.push_str(&build_search_context(search_results));
        tracing::debug!(
            results = search_results.len(),
            "added search results to system prompt"
        );
    }

    let model = request
        .model_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .unwrap_or(default_model)
        .to_string();

    let history = request.conversation_history.unwrap_or_default();
    let stats = history_stats(&history);

    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(Turn::system(system_text));
    messages.extend(history);
    messages.push(Turn {
        role: Role::User,
        content: user_content,
    });

    Ok(NormalizedChat {
        model,
        messages,
        message_chars,
        has_attachments,
        history: stats,
        search_enabled: request.enable_search,
        search_results: search_results.to_vec(),
    })
}

/// Build the user turn's content.
///
/// Without attachments this is the plain message string. With attachments it
/// is a block list: the text first (when non-empty), then one block per
/// recognized attachment in input order.
#[must_use]
pub fn build_user_content(message: &str, attachments: &[Attachment]) -> TurnContent {
    if attachments.is_empty() {
        return TurnContent::Text(message.to_string());
    }

    let mut blocks = Vec::with_capacity(attachments.len() + 1);
    if !message.is_empty() {
        blocks.push(ContentBlock::Text {
            text: message.to_string(),
        });
    }
    blocks.extend(attachments.iter().filter_map(Attachment::to_block));
    TurnContent::Blocks(blocks)
}

/// Render client-supplied search results as a numbered block for the
/// system prompt.
#[must_use]
pub fn build_search_context(results: &[SearchResult]) -> String {
    let mut out = String::from("\n\n[Latest web search results]\n");
    for (index, result) in results.iter().enumerate() {
        out.push_str(&format!(
            "{}. {}\n   Source: {}\n   {}\n",
            index + 1,
            result.title,
            result.url,
            result.description
        ));
    }
    out
}

fn history_stats(history: &[Turn]) -> HistoryStats {
    let mut stats = HistoryStats {
        total: history.len(),
        ..HistoryStats::default()
    };
    for turn in history {
        match turn.role {
            Role::User => stats.user += 1,
            Role::Assistant => stats.assistant += 1,
            Role::System => {}
        }
    }
    stats
}
