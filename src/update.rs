//! Events emitted by the connection engine.
//!
//! The engine never calls back into the application. It queues
//! [`Update`]s as it digests input, and the application drains them with
//! [`Connection::poll`] after each `ingest`/`flush` call.
//!
//! [`Connection::poll`]: crate::Connection::poll

use crate::connection::sink::MessageSink;
use crate::protocol::{CloseFrame, OpCode};

/// Where a completed message's payload ended up.
pub enum MessagePayload {
    /// The payload, accumulated in memory.
    Complete(Vec<u8>),
    /// The payload was streamed into an application-provided sink,
    /// which is handed back here together with the byte count written.
    Streamed {
        /// The sink the payload was written to.
        sink: Box<dyn MessageSink + Send>,
        /// Total payload bytes delivered to the sink.
        bytes_written: u64,
    },
}

impl MessagePayload {
    /// Borrow the in-memory payload, if the message was buffered.
    #[must_use]
    pub fn as_slice(&self) -> Option<&[u8]> {
        match self {
            MessagePayload::Complete(data) => Some(data),
            MessagePayload::Streamed { .. } => None,
        }
    }

    /// Total payload length in bytes.
    #[must_use]
    pub fn len(&self) -> u64 {
        match self {
            MessagePayload::Complete(data) => data.len() as u64,
            MessagePayload::Streamed { bytes_written, .. } => *bytes_written,
        }
    }

    /// Whether the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for MessagePayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessagePayload::Complete(data) => {
                f.debug_tuple("Complete").field(&data.len()).finish()
            }
            MessagePayload::Streamed { bytes_written, .. } => f
                .debug_struct("Streamed")
                .field("bytes_written", bytes_written)
                .finish(),
        }
    }
}

/// Data received from the remote endpoint.
#[derive(Debug)]
#[non_exhaustive]
pub enum ReadEvent {
    /// A complete data message (all fragments reassembled).
    Message {
        /// Text or Binary.
        opcode: OpCode,
        /// The reassembled payload.
        payload: MessagePayload,
    },
    /// A ping frame arrived; the engine has already queued the pong.
    Ping(Vec<u8>),
    /// A pong frame arrived.
    Pong(Vec<u8>),
    /// The remote endpoint sent a close frame.
    Disconnect {
        /// Parsed status, with violations remapped to 1002.
        close: Option<CloseFrame>,
        /// The raw close payload as received.
        payload: Vec<u8>,
    },
    /// The transport has been closed; no further events follow.
    SockDisconnect,
}

/// Failures surfaced to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorEvent {
    /// The transport rejected a write.
    Write,
    /// A frame arrived with a reserved bit that was not allowed.
    RsvBitSet,
    /// The remote endpoint violated the framing protocol.
    ProtocolError,
    /// A text message contained invalid UTF-8.
    InvalidPayload,
    /// The application-provided message sink failed; the connection
    /// survives, but payload bytes were dropped.
    InvalidTargetStream,
}

/// An event emitted by the connection engine.
#[derive(Debug)]
#[non_exhaustive]
pub enum Update {
    /// Data or lifecycle information from the remote endpoint.
    Read(ReadEvent),
    /// A failure the application should know about.
    Error(ErrorEvent),
}
