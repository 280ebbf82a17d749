//! Per-message payload routing.
//!
//! By default the engine accumulates message payloads in memory. An
//! application that handles large messages can register a callback that
//! inspects the first frame's headers and decides, per message, where
//! the payload goes.

use std::io;

use crate::protocol::FrameHeader;

/// A writable byte destination for streamed message payloads.
///
/// Follows the `std::io::Write` partial-write contract: `write` may
/// accept fewer bytes than offered and is called in a loop until the
/// whole fragment is consumed.
pub trait MessageSink {
    /// Write a chunk of payload, returning the number of bytes accepted.
    ///
    /// # Errors
    ///
    /// Any error aborts delivery of the current fragment; the engine
    /// reports it as an update and keeps the connection alive.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;
}

impl<W: io::Write> MessageSink for W {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::Write::write(self, buf)
    }
}

/// Decision returned by the message-sink callback for each new data
/// message.
pub enum SinkDecision {
    /// Accumulate the message payload in memory (the default).
    Buffer,
    /// Refuse the message; the engine closes with 1003 Unsupported Data.
    Reject,
    /// Stream the payload into the given sink instead of buffering.
    Stream(Box<dyn MessageSink + Send>),
}

impl std::fmt::Debug for SinkDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkDecision::Buffer => write!(f, "Buffer"),
            SinkDecision::Reject => write!(f, "Reject"),
            SinkDecision::Stream(_) => write!(f, "Stream(..)"),
        }
    }
}

/// Callback consulted on the first frame of each data message.
pub type SinkCallback = Box<dyn FnMut(&FrameHeader) -> SinkDecision + Send>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_is_a_sink() {
        let mut sink: Vec<u8> = Vec::new();
        assert_eq!(MessageSink::write(&mut sink, b"hello").unwrap(), 5);
        assert_eq!(sink, b"hello");
    }

    #[test]
    fn test_decision_debug() {
        assert_eq!(format!("{:?}", SinkDecision::Buffer), "Buffer");
        assert_eq!(format!("{:?}", SinkDecision::Reject), "Reject");
        let stream = SinkDecision::Stream(Box::new(Vec::<u8>::new()));
        assert_eq!(format!("{:?}", stream), "Stream(..)");
    }
}
