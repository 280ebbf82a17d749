//! WebSocket frame opcodes as defined in RFC 6455.

use crate::error::{Error, Result};

/// WebSocket frame opcode.
///
/// Defines the interpretation of the payload data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
#[non_exhaustive]
pub enum OpCode {
    /// Continuation frame (0x0).
    ///
    /// Used for fragmented messages after the initial frame.
    Continuation = 0x0,

    /// Text frame (0x1).
    ///
    /// Payload must be valid UTF-8.
    Text = 0x1,

    /// Binary frame (0x2).
    ///
    /// Payload is arbitrary binary data.
    Binary = 0x2,

    /// Close frame (0x8).
    ///
    /// Initiates connection close. May contain status code and reason.
    Close = 0x8,

    /// Ping frame (0x9).
    ///
    /// Used for keepalive. Receiver must respond with Pong.
    Ping = 0x9,

    /// Pong frame (0xA).
    ///
    /// Response to Ping. May be sent unsolicited as unidirectional heartbeat.
    Pong = 0xA,
}

impl OpCode {
    /// Create OpCode from raw byte value.
    ///
    /// # Errors
    ///
    /// Returns `Error::ReservedOpcode` if the value is reserved for future use.
    /// Returns `Error::InvalidOpcode` if the value does not fit in 4 bits.
    pub fn from_u8(byte: u8) -> Result<Self> {
        match byte {
            0x0 => Ok(OpCode::Continuation),
            0x1 => Ok(OpCode::Text),
            0x2 => Ok(OpCode::Binary),
            0x3..=0x7 => Err(Error::ReservedOpcode(byte)),
            0x8 => Ok(OpCode::Close),
            0x9 => Ok(OpCode::Ping),
            0xA => Ok(OpCode::Pong),
            0xB..=0xF => Err(Error::ReservedOpcode(byte)),
            _ => Err(Error::InvalidOpcode(byte)),
        }
    }

    /// Convert OpCode to raw byte value.
    #[inline]
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Check if this is a control frame opcode.
    ///
    /// Control frames: Close (0x8), Ping (0x9), Pong (0xA).
    #[inline]
    #[must_use]
    pub const fn is_control(self) -> bool {
        matches!(self, OpCode::Close | OpCode::Ping | OpCode::Pong)
    }

    /// Check if this is a data frame opcode.
    ///
    /// Data frames: Continuation (0x0), Text (0x1), Binary (0x2).
    #[inline]
    #[must_use]
    pub const fn is_data(self) -> bool {
        matches!(self, OpCode::Continuation | OpCode::Text | OpCode::Binary)
    }

    /// Check if frames with this opcode bypass the normal write queue.
    ///
    /// Close, Ping and Pong frames are scheduled ahead of queued data
    /// frames so that control traffic is never starved by a large
    /// outbound message.
    #[inline]
    #[must_use]
    pub const fn is_priority(self) -> bool {
        self.is_control()
    }

    /// Get human-readable name for this opcode.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            OpCode::Continuation => "Continuation",
            OpCode::Text => "Text",
            OpCode::Binary => "Binary",
            OpCode::Close => "Close",
            OpCode::Ping => "Ping",
            OpCode::Pong => "Pong",
        }
    }
}

impl std::fmt::Display for OpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
