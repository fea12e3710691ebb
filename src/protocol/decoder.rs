//! Decodes reassembled upstream event frames into content and usage increments.
//!
//! Only `data:` lines carry payload. Every other line (comments, `event:`,
//! keep-alives) is ignored. A malformed payload is logged and skipped; it
//! never ends the relay.

use serde_json::Value;

use crate::util::truncate_for_log;

/// Field marker for payload lines.
pub const DATA_PREFIX: &str = "data:";
/// Payload value that marks the end of the upstream stream.
pub const DONE_SENTINEL: &str = "[DONE]";

const LOG_PAYLOAD_MAX: usize = 200;

/// Token counters reported by the upstream. These are totals to date, so a
/// newer snapshot replaces an older one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageSnapshot {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl UsageSnapshot {
    #[must_use]
    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens.saturating_add(self.completion_tokens)
    }

    /// Read `usage.prompt_tokens` / `usage.completion_tokens` from a payload.
    ///
    /// Returns `None` when `usage` is absent or not an object. Missing
    /// counters read as zero.
    #[must_use]
    pub fn from_payload(payload: &Value) -> Option<Self> {
        let usage = payload.get("usage").filter(|usage| usage.is_object())?;
        let counter = |name: &str| usage.get(name).and_then(Value::as_u64).unwrap_or(0);
        Some(Self {
            prompt_tokens: counter("prompt_tokens"),
            completion_tokens: counter("completion_tokens"),
        })
    }
}

/// One decoded piece of an upstream frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedIncrement {
    Text(String),
    Usage(UsageSnapshot),
    /// The upstream sent its end-of-stream sentinel.
    Done,
}

type ContentExtractor = fn(&Value) -> Option<&str>;

/// Content locations, most preferred first. Different upstream variants
/// populate different fields.
const CONTENT_EXTRACTORS: &[ContentExtractor] = &[
    choice_delta_content,
    choice_message_content,
    message_content,
    top_level_content,
];

fn first_choice(payload: &Value) -> Option<&Value> {
    payload.get("choices")?.get(0)
}

fn choice_delta_content(payload: &Value) -> Option<&str> {
    first_choice(payload)?.get("delta")?.get("content")?.as_str()
}

fn choice_message_content(payload: &Value) -> Option<&str> {
    first_choice(payload)?.get("message")?.get("content")?.as_str()
}

fn message_content(payload: &Value) -> Option<&str> {
    payload.get("message")?.get("content")?.as_str()
}

fn top_level_content(payload: &Value) -> Option<&str> {
    payload.get("content")?.as_str()
}

/// Return the first non-empty content string found in `payload`.
#[must_use]
pub fn extract_content(payload: &Value) -> Option<&str> {
    CONTENT_EXTRACTORS
        .iter()
        .filter_map(|extract| extract(payload))
        .find(|content| !content.is_empty())
}

/// Decode one frame, appending increments to `out` in line order.
pub fn decode_frame(frame: &str, out: &mut Vec<DecodedIncrement>) {
    for raw_line in frame.split('\n') {
        let line = raw_line.trim();
        let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
            continue;
        };
        decode_payload(payload.trim(), out);
    }
}

/// Decode a single `data:` payload (already stripped of the marker).
pub fn decode_payload(payload: &str, out: &mut Vec<DecodedIncrement>) {
    if payload.is_empty() {
        return;
    }
    if payload == DONE_SENTINEL {
        out.push(DecodedIncrement::Done);
        return;
    }

    let parsed: Value = match serde_json::from_str(payload) {
        Ok(parsed) => parsed,
        Err(err) => {
            tracing::warn!(
                error = %err,
                payload = %truncate_for_log(payload, LOG_PAYLOAD_MAX),
                "skipping malformed upstream event payload"
            );
            return;
        }
    };

    if let Some(usage) = UsageSnapshot::from_payload(&parsed) {
        out.push(DecodedIncrement::Usage(usage));
    }
    if let Some(content) = extract_content(&parsed) {
        out.push(DecodedIncrement::Text(content.to_owned()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(frame: &str) -> Vec<DecodedIncrement> {
        let mut out = Vec::new();
        decode_frame(frame, &mut out);
        out
    }

    fn text(value: &str) -> DecodedIncrement {
        DecodedIncrement::Text(value.to_string())
    }

    #[test]
    fn test_all_content_shapes_decode_identically() {
        let shapes = [
            r#"data: {"choices":[{"delta":{"content":"x"}}]}"#,
            r#"data: {"choices":[{"message":{"content":"x"}}]}"#,
            r#"data: {"message":{"content":"x"}}"#,
            r#"data: {"content":"x"}"#,
        ];
        for shape in shapes {
            assert_eq!(decode(shape), vec![text("x")], "shape: {shape}");
        }
    }

    #[test]
    fn test_empty_preferred_shape_falls_through() {
        let frame = r#"data: {"choices":[{"delta":{"content":""},"message":{"content":"full"}}]}"#;
        assert_eq!(decode(frame), vec![text("full")]);
    }

    #[test]
    fn test_preferred_shape_wins() {
        let frame = r#"data: {"choices":[{"delta":{"content":"delta"}}],"content":"top"}"#;
        assert_eq!(decode(frame), vec![text("delta")]);
    }

    #[test]
    fn test_non_string_content_is_ignored() {
        assert!(decode(r#"data: {"content":[{"type":"text"}]}"#).is_empty());
        assert!(decode(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#).is_empty());
    }

    #[test]
    fn test_done_sentinel_is_not_json() {
        assert_eq!(decode("data: [DONE]"), vec![DecodedIncrement::Done]);
        assert_eq!(decode("data:[DONE]  "), vec![DecodedIncrement::Done]);
    }

    #[test]
    fn test_usage_and_content_in_one_payload() {
        let frame = r#"data: {"choices":[{"delta":{"content":"hi"}}],"usage":{"prompt_tokens":10,"completion_tokens":5}}"#;
        assert_eq!(
            decode(frame),
            vec![
                DecodedIncrement::Usage(UsageSnapshot {
                    prompt_tokens: 10,
                    completion_tokens: 5
                }),
                text("hi"),
            ]
        );
    }

    #[test]
    fn test_null_usage_is_ignored() {
        let frame = r#"data: {"choices":[{"delta":{"content":"a"}}],"usage":null}"#;
        assert_eq!(decode(frame), vec![text("a")]);
    }

    #[test]
    fn test_partial_usage_reads_missing_counter_as_zero() {
        let frame = r#"data: {"usage":{"completion_tokens":7}}"#;
        assert_eq!(
            decode(frame),
            vec![DecodedIncrement::Usage(UsageSnapshot {
                prompt_tokens: 0,
                completion_tokens: 7
            })]
        );
    }

    #[test]
    fn test_malformed_line_is_skipped_between_valid_lines() {
        let frame = "data: {\"content\":\"a\"}\ndata: {not json\ndata: {\"content\":\"b\"}";
        assert_eq!(decode(frame), vec![text("a"), text("b")]);
    }

    #[test]
    fn test_non_data_lines_and_blank_payloads_are_ignored() {
        let frame = ": keep-alive\nevent: delta\nid: 7\ndata:\ndata:    \ndata: {\"content\":\"ok\"}";
        assert_eq!(decode(frame), vec![text("ok")]);
    }

    #[test]
    fn test_leading_whitespace_before_marker_is_tolerated() {
        assert_eq!(decode("   data: {\"content\":\"x\"}\r"), vec![text("x")]);
    }

    #[test]
    fn test_total_tokens_saturates() {
        let usage = UsageSnapshot {
            prompt_tokens: u64::MAX,
            completion_tokens: 1,
        };
        assert_eq!(usage.total_tokens(), u64::MAX);
    }
}
