//! Message fragmentation for outgoing WebSocket messages (RFC 6455).

use crate::protocol::{Frame, OpCode};

/// Iterator that produces frames from a message payload.
///
/// Splits large payloads into multiple frames of at most `frame_size`
/// bytes. The first frame carries the message opcode, subsequent frames
/// use `OpCode::Continuation`; only the last frame has `fin` set
/// (RFC 6455 Section 5.4).
pub struct MessageFragmenter<'a> {
    payload: &'a [u8],
    opcode: OpCode,
    frame_size: usize,
    offset: usize,
    is_first: bool,
}

impl<'a> MessageFragmenter<'a> {
    /// Create a new fragmenter for the given payload.
    ///
    /// `frame_size` is clamped to at least 1 byte per fragment.
    #[inline]
    #[must_use]
    pub fn new(payload: &'a [u8], opcode: OpCode, frame_size: usize) -> Self {
        Self {
            payload,
            opcode,
            frame_size: frame_size.max(1),
            offset: 0,
            is_first: true,
        }
    }

    /// Get remaining bytes to fragment.
    #[inline]
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.payload.len().saturating_sub(self.offset)
    }
}

impl Iterator for MessageFragmenter<'_> {
    type Item = Frame;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.payload.len() {
            // An empty message still produces one empty FIN frame
            if self.is_first && self.payload.is_empty() {
                self.is_first = false;
                return Some(Frame::new(true, self.opcode, Vec::new()));
            }
            return None;
        }

        let remaining = self.payload.len() - self.offset;
        let chunk_len = remaining.min(self.frame_size);
        let chunk = self.payload[self.offset..self.offset + chunk_len].to_vec();
        self.offset += chunk_len;

        let fin = self.offset >= self.payload.len();
        let opcode = if self.is_first {
            self.is_first = false;
            self.opcode
        } else {
            OpCode::Continuation
        };

        Some(Frame::new(fin, opcode, chunk))
    }
}
