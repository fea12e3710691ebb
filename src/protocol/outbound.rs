use bytes::Bytes;

use super::decoder::UsageSnapshot;
use crate::util::{push_json_string_escaped, push_u64_decimal};

pub const DONE_FRAME: &str = "data: [DONE]\n\n";

/// An event written to the client, in wire order: any number of `Content`,
/// then exactly one `Usage`, then exactly one `Done`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundEvent {
    Content(String),
    Usage(UsageSnapshot),
    Done,
}

impl OutboundEvent {
    /// Encode as one `data: ...\n\n` frame.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        match self {
            OutboundEvent::Content(text) => Bytes::from(encode_content_frame(text)),
            OutboundEvent::Usage(usage) => Bytes::from(encode_usage_frame(usage)),
            OutboundEvent::Done => Bytes::from_static(DONE_FRAME.as_bytes()),
        }
    }
}

/// `data: {"content":"..."}\n\n`
#[must_use]
pub fn encode_content_frame(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 24);
    out.push_str("data: {\"content\":");
    push_json_string_escaped(&mut out, text);
    out.push_str("}\n\n");
    out
}

/// `data: {"type":"token_usage","inputTokens":P,"outputTokens":C,"totalTokens":P+C}\n\n`
#[must_use]
pub fn encode_usage_frame(usage: &UsageSnapshot) -> String {
    let mut out = String::with_capacity(96);
    out.push_str("data: {\"type\":\"token_usage\",\"inputTokens\":");
    push_u64_decimal(&mut out, usage.prompt_tokens);
    out.push_str(",\"outputTokens\":");
    push_u64_decimal(&mut out, usage.completion_tokens);
    out.push_str(",\"totalTokens\":");
    push_u64_decimal(&mut out, usage.total_tokens());
    out.push_str("}\n\n");
    out
}
