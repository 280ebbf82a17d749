//! Configuration for WebSocket connections.

/// Default bytes consumed from the transport per ingest cycle.
pub const DEFAULT_READ_RATE: usize = 16384;

/// Default bytes written to the transport per flush cycle.
pub const DEFAULT_WRITE_RATE: usize = 16384;

/// Default bound on buffered HTTP upgrade bytes.
pub const DEFAULT_MAX_HANDSHAKE_LENGTH: usize = 8192;

/// Default bound on a reassembled message, 64 MB.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// WebSocket connection configuration.
///
/// The rates bound how much work a single ingest or flush cycle may do,
/// so one busy connection cannot starve the rest of the event loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Bytes the outer loop should read per ingest cycle.
    pub read_rate: usize,

    /// Bytes written to the transport per flush cycle.
    pub write_rate: usize,

    /// Bound on the HTTP upgrade bytes the surrounding layer may buffer.
    ///
    /// The engine does not parse the handshake; this is advisory for the
    /// layer that does.
    pub max_handshake_length: usize,

    /// Maximum size of a reassembled message in bytes.
    ///
    /// Exceeding it closes the connection with 1009 Message Too Big.
    pub max_message_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            read_rate: DEFAULT_READ_RATE,
            write_rate: DEFAULT_WRITE_RATE,
            max_handshake_length: DEFAULT_MAX_HANDSHAKE_LENGTH,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl Config {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-cycle read rate.
    #[must_use]
    pub const fn with_read_rate(mut self, rate: usize) -> Self {
        self.read_rate = rate;
        self
    }

    /// Set the per-cycle write rate.
    #[must_use]
    pub const fn with_write_rate(mut self, rate: usize) -> Self {
        self.write_rate = rate;
        self
    }

    /// Set the handshake length bound.
    #[must_use]
    pub const fn with_max_handshake_length(mut self, len: usize) -> Self {
        self.max_handshake_length = len;
        self
    }

    /// Set the reassembled message size bound.
    #[must_use]
    pub const fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }
}
