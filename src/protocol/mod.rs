pub mod decoder;
pub mod normalize;
pub mod outbound;
pub mod request;

pub use decoder::{decode_frame, DecodedIncrement, UsageSnapshot};
pub use normalize::{normalize_chat_request, NormalizedChat, UpstreamRequestBody};
pub use outbound::OutboundEvent;
pub use request::{Attachment, ChatRequest, ContentBlock, Role, Turn, TurnContent};

/// Which client-facing route a request came through.
///
/// The streaming route answers with an event stream; the non-streaming route
/// answers with one JSON document. Error bodies differ slightly between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayMode {
    Stream,
    NonStream,
}
