//! Per-request relay state machine: chunks in, outbound events out.
//!
//! Everything here is synchronous. The async wrapper in
//! [`super::relay_stream`] drives it one upstream chunk at a time, so chunk
//! order, frame order and line order are preserved end to end.

use super::reassembler::{EventFrame, FrameReassembler};
use crate::protocol::decoder::{decode_frame, DecodedIncrement, UsageSnapshot};
use crate::protocol::outbound::OutboundEvent;

/// State owned by exactly one request.
///
/// `terminated` flips to true once, when the usage summary and sentinel are
/// queued. Nothing is emitted after that.
pub struct RelayPipeline {
    reassembler: FrameReassembler,
    usage: UsageSnapshot,
    terminated: bool,
    content_events: u64,
    frames: Vec<EventFrame>,
    increments: Vec<DecodedIncrement>,
}

impl RelayPipeline {
    #[must_use]
    pub fn new() -> Self {
        Self {
            reassembler: FrameReassembler::new(),
            usage: UsageSnapshot::default(),
            terminated: false,
            content_events: 0,
            frames: Vec::with_capacity(8),
            increments: Vec::with_capacity(8),
        }
    }

    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Latest usage totals seen from the upstream.
    #[must_use]
    pub fn usage(&self) -> UsageSnapshot {
        self.usage
    }

    #[must_use]
    pub fn content_events(&self) -> u64 {
        self.content_events
    }

    /// Process one upstream chunk, appending outbound events to `out`.
    pub fn push_chunk(&mut self, chunk: &[u8], out: &mut Vec<OutboundEvent>) {
        if self.terminated {
            return;
        }
        let mut frames = std::mem::take(&mut self.frames);
        self.reassembler.feed_into(chunk, &mut frames);
        for frame in frames.drain(..) {
            self.process_frame(&frame, out);
        }
        self.frames = frames;
    }

    /// Handle the physical end of the upstream stream: decode any
    /// unterminated tail, then terminate if no sentinel was seen.
    pub fn finish(&mut self, out: &mut Vec<OutboundEvent>) {
        if !self.terminated {
            if let Some(frame) = self.reassembler.flush() {
                self.process_frame(&frame, out);
            }
        }
        self.terminate(out);
    }

    /// Queue the usage summary and sentinel. Returns `false` when the pair
    /// was already queued.
    pub fn terminate(&mut self, out: &mut Vec<OutboundEvent>) -> bool {
        if self.terminated {
            return false;
        }
        self.terminated = true;
        out.push(OutboundEvent::Usage(self.usage));
        out.push(OutboundEvent::Done);
        true
    }

    fn process_frame(&mut self, frame: &EventFrame, out: &mut Vec<OutboundEvent>) {
        let mut increments = std::mem::take(&mut self.increments);
        decode_frame(&frame.text(), &mut increments);
        for increment in increments.drain(..) {
            self.apply(increment, out);
        }
        self.increments = increments;
    }

    fn apply(&mut self, increment: DecodedIncrement, out: &mut Vec<OutboundEvent>) {
        if self.terminated {
            if let DecodedIncrement::Text(_) = increment {
                tracing::debug!("dropping upstream content received after the stream terminated");
            }
            return;
        }
        match increment {
            DecodedIncrement::Text(text) => {
                self.content_events += 1;
                out.push(OutboundEvent::Content(text));
            }
            DecodedIncrement::Usage(snapshot) => self.usage = snapshot,
            DecodedIncrement::Done => {
                self.terminate(out);
            }
        }
    }
}

impl Default for RelayPipeline {
    fn default() -> Self {
        Self::new()
    }
}
