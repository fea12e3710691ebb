//! Byte-to-frame reassembly for upstream event streams.
//!
//! Chunks arrive at arbitrary boundaries. Frames end at a blank line
//! (`\n\n` after CR-LF normalization) and may span any number of chunks.

use std::borrow::Cow;
use std::sync::LazyLock;

use bytes::{Buf, Bytes, BytesMut};
use memchr::memmem;

static FRAME_DELIMITER: LazyLock<memmem::Finder<'static>> =
    LazyLock::new(|| memmem::Finder::new(b"\n\n"));
static CRLF: LazyLock<memmem::Finder<'static>> = LazyLock::new(|| memmem::Finder::new(b"\r\n"));

const FRAME_DELIMITER_LEN: usize = 2;

/// One complete frame, without its trailing delimiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFrame(Bytes);

impl EventFrame {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Frame text. Invalid UTF-8 is replaced rather than rejected.
    #[must_use]
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.0)
    }
}

impl From<&'static str> for EventFrame {
    fn from(value: &'static str) -> Self {
        Self(Bytes::from_static(value.as_bytes()))
    }
}

/// Stateful transducer from raw chunks to [`EventFrame`]s.
///
/// Call [`feed`](Self::feed) once per chunk and [`flush`](Self::flush) once
/// at end of stream. Bytes after the last delimiter are kept between calls.
pub struct FrameReassembler {
    buffer: BytesMut,
    scan_from: usize,
}

impl FrameReassembler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            scan_from: 0,
        }
    }

    /// Feed one chunk and return every frame it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<EventFrame> {
        let mut out = Vec::new();
        self.feed_into(chunk, &mut out);
        out
    }

    /// Feed one chunk and append completed frames to a caller-provided buffer.
    pub fn feed_into(&mut self, chunk: &[u8], out: &mut Vec<EventFrame>) {
        self.append_normalized(chunk);

        while let Some(rel) = FRAME_DELIMITER.find(&self.buffer[self.scan_from..]) {
            let frame_end = self.scan_from + rel;
            let frame = self.buffer.split_to(frame_end).freeze();
            self.buffer.advance(FRAME_DELIMITER_LEN);
            self.scan_from = 0;
            out.push(EventFrame(frame));
        }

        // A delimiter may straddle the next chunk boundary; rescan one byte.
        self.scan_from = self.buffer.len().saturating_sub(FRAME_DELIMITER_LEN - 1);
    }

    /// Return the unterminated tail as a final frame, if it holds anything
    /// besides whitespace. The reassembler is empty afterwards.
    pub fn flush(&mut self) -> Option<EventFrame> {
        self.scan_from = 0;
        let residual = self.buffer.split().freeze();
        if residual.iter().all(u8::is_ascii_whitespace) {
            return None;
        }
        Some(EventFrame(residual))
    }

    /// Bytes currently held back waiting for a delimiter.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    fn append_normalized(&mut self, chunk: &[u8]) {
        // A CR held over from the previous chunk pairs with a leading LF here.
        if chunk.first() == Some(&b'\n') && self.buffer.last() == Some(&b'\r') {
            self.buffer.truncate(self.buffer.len() - 1);
            self.scan_from = self.scan_from.min(self.buffer.len().saturating_sub(1));
        }

        let mut copied_up_to = 0;
        for crlf in CRLF.find_iter(chunk) {
            self.buffer.extend_from_slice(&chunk[copied_up_to..crlf]);
            copied_up_to = crlf + 1;
        }
        self.buffer.extend_from_slice(&chunk[copied_up_to..]);
    }
}

impl Default for FrameReassembler {
    fn default() -> Self {
        Self::new()
    }
}
