use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RelayError;

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Reference to a remote media object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub url: String,
}

/// One element of a multimodal turn. Order is presentation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    ImageUrl { image_url: MediaRef },
    VideoUrl { video_url: MediaRef },
}

/// Turn content: the upstream accepts either a bare string or a block list,
/// and consumers distinguish on that shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TurnContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

/// One conversation turn, both as received from clients and as sent upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: TurnContent,
}

impl Turn {
    #[must_use]
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: TurnContent::Text(text.into()),
        }
    }
}

/// Attachment kinds the upstream understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    Image,
    Video,
}

impl AttachmentKind {
    #[must_use]
    pub fn from_wire(kind: &str) -> Option<Self> {
        match kind {
            "image_url" => Some(AttachmentKind::Image),
            "video_url" => Some(AttachmentKind::Video),
            _ => None,
        }
    }
}

/// A client-supplied attachment. The kind stays a raw string so unknown
/// kinds can be dropped instead of failing the whole request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
}

impl Attachment {
    #[must_use]
    pub fn to_block(&self) -> Option<ContentBlock> {
        let media = MediaRef {
            url: self.url.clone(),
        };
        match AttachmentKind::from_wire(&self.kind)? {
            AttachmentKind::Image => Some(ContentBlock::ImageUrl { image_url: media }),
            AttachmentKind::Video => Some(ContentBlock::VideoUrl { video_url: media }),
        }
    }
}

/// A web search hit the client already fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Inbound chat request body.
///
/// `message` is kept as raw JSON so a missing message and a non-string
/// message can be told apart during normalization.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<Value>,
    #[serde(default)]
    pub conversation_history: Option<Vec<Turn>>,
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub multimodal: Option<Vec<Attachment>>,
    #[serde(default)]
    pub enable_search: bool,
    #[serde(default)]
    pub search_results: Option<Vec<SearchResult>>,
}

impl ChatRequest {
    /// Parse a request body.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidRequest`] when the body is not a JSON
    /// object of the expected shape.
    pub fn from_slice(body: &[u8]) -> Result<Self, RelayError> {
        serde_json::from_slice(body)
            .map_err(|err| RelayError::InvalidRequest(format!("Invalid request body: {err}")))
    }

    #[must_use]
    pub fn attachments(&self) -> &[Attachment] {
        self.multimodal.as_deref().unwrap_or_default()
    }

    #[must_use]
    pub fn history(&self) -> &[Turn] {
        self.conversation_history.as_deref().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_full_request() {
        let body = json!({
            "message": "hi",
            "conversationHistory": [
                {"role": "user", "content": "earlier"},
                {"role": "assistant", "content": [{"type": "text", "text": "reply"}]}
            ],
            "modelId": "vision-model",
            "multimodal": [{"type": "image_url", "url": "https://img.example/a.png"}],
            "enableSearch": true,
            "searchResults": [{"title": "t", "url": "https://s.example", "description": "d"}]
        });
        let request = ChatRequest::from_slice(body.to_string().as_bytes()).expect("parse");
        assert_eq!(request.message, Some(json!("hi")));
        assert_eq!(request.history().len(), 2);
        assert_eq!(
            request.history()[1].content,
            TurnContent::Blocks(vec![ContentBlock::Text {
                text: "reply".to_string()
            }])
        );
        assert_eq!(request.model_id.as_deref(), Some("vision-model"));
        assert_eq!(request.attachments().len(), 1);
        assert!(request.enable_search);
    }

    #[test]
    fn test_parse_rejects_non_object() {
        let err = ChatRequest::from_slice(b"[1,2,3]").expect_err("array body");
        assert!(matches!(err, RelayError::InvalidRequest(_)));
    }

    #[test]
    fn test_unknown_attachment_kind_has_no_block() {
        let attachment = Attachment {
            kind: "audio_url".to_string(),
            url: "https://a.example/x.mp3".to_string(),
        };
        assert!(attachment.to_block().is_none());
    }

    #[test]
    fn test_block_wire_shape() {
        let block = ContentBlock::VideoUrl {
            video_url: MediaRef {
                url: "https://v.example/a.mp4".to_string(),
            },
        };
        assert_eq!(
            serde_json::to_value(&block).unwrap(),
            json!({"type": "video_url", "video_url": {"url": "https://v.example/a.mp4"}})
        );
    }
}
