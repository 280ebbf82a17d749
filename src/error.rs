//! Error types for the WebSocket connection engine.
//!
//! Remote misbehavior (malformed frames, bad UTF-8, illegal opcode
//! sequences) is *not* reported through this enum: the engine answers it
//! on the wire with a close frame and surfaces an [`Update`] event
//! instead. `Error` covers wire-parse signals and misuse of the local
//! API.
//!
//! [`Update`]: crate::Update

use thiserror::Error;

use crate::protocol::OpCode;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during engine operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Invalid frame structure or header.
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Incomplete frame data.
    #[error("Incomplete frame: need {needed} more bytes")]
    IncompleteFrame {
        /// Number of additional bytes needed.
        needed: usize,
    },

    /// Invalid opcode value.
    #[error("Invalid opcode: {0:#x}")]
    InvalidOpcode(u8),

    /// Reserved opcode used.
    #[error("Reserved opcode: {0:#x}")]
    ReservedOpcode(u8),

    /// Control frame fragmented (RFC violation).
    #[error("Control frames cannot be fragmented")]
    FragmentedControlFrame,

    /// Control frame payload too large (>125 bytes).
    #[error("Control frame payload too large: {0} bytes (max: 125)")]
    ControlFrameTooLarge(usize),

    /// 64-bit extended payload length with the most significant bit set.
    #[error("Payload length has high bit set: {0:#x}")]
    PayloadLengthHighBit(u64),

    /// Frame length exceeds what this platform can address.
    #[error("Payload too large for platform: {size} bytes (max: {max})")]
    PayloadTooLargeForPlatform {
        /// Declared payload size.
        size: u64,
        /// Maximum addressable size.
        max: u64,
    },

    /// Invalid close code for an outgoing close frame.
    #[error("Invalid close code: {0}")]
    InvalidCloseCode(u16),

    /// A close handshake is in progress; no further data frames may be sent.
    #[error("Connection is closing; data frames rejected")]
    ConnectionClosing,

    /// `write_multi_framed` requires a positive fragment size.
    #[error("Invalid fragment size: {0} (must be >= 1)")]
    InvalidFragmentSize(usize),

    /// `write_multi_framed` accepts only Text and Binary opcodes.
    #[error("Cannot fragment {0} frames")]
    NotDataFrame(OpCode),

    /// I/O error surfaced by the transport.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}
