//! The per-connection protocol state machine.

use std::collections::VecDeque;
use std::time::Instant;

use bytes::{Buf, BytesMut};
use tracing::{debug, trace, warn};

use crate::config::Config;
use crate::connection::fragmenter::MessageFragmenter;
use crate::connection::scheduler::{FlushStatus, WriteScheduler};
use crate::connection::sink::{MessageSink, SinkCallback, SinkDecision};
use crate::connection::Role;
use crate::error::{Error, Result};
use crate::protocol::{
    is_valid_close_code, parse_close_payload, CloseCode, Frame, FrameHeader, OpCode, Utf8Validator,
};
use crate::transport::Transport;
use crate::update::{ErrorEvent, MessagePayload, ReadEvent, Update};

/// Where the payload of the in-progress message accumulates.
enum MessageStore {
    Buffer(BytesMut),
    Sink(Box<dyn MessageSink + Send>),
}

/// A fragmented data message in progress.
///
/// Present iff a non-FIN Text or Binary frame has been received and its
/// message has not completed; the opcode is never Continuation and never
/// a control opcode.
struct PartialMessage {
    opcode: OpCode,
    store: MessageStore,
    bytes_written: u64,
}

/// Generate a random seed for mask generation.
/// Falls back to system time if getrandom fails.
fn random_mask_seed() -> u32 {
    let mut buf = [0u8; 4];
    if getrandom::getrandom(&mut buf).is_ok() {
        u32::from_le_bytes(buf)
    } else {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u32)
            .unwrap_or(0x1234_5678)
    }
}

/// A WebSocket connection engine bound to an open transport.
///
/// The engine performs no I/O of its own beyond writing queued frames to
/// the [`Transport`] it owns. An outer event loop feeds received bytes
/// into [`ingest`](Self::ingest), drains emitted events with
/// [`poll`](Self::poll), and calls [`flush`](Self::flush) while the
/// transport is writable.
///
/// ## Example
///
/// ```rust,ignore
/// use wscore::{Config, Connection, Role, Update};
///
/// let mut conn = Connection::new(stream, Role::Server, Config::default());
/// conn.ingest(&received_bytes);
/// while let Some(update) = conn.poll() {
///     match update {
///         Update::Read(event) => handle(event),
///         Update::Error(err) => log(err),
///     }
/// }
/// conn.flush();
/// ```
pub struct Connection<T: Transport> {
    transport: T,
    role: Role,
    read_buf: BytesMut,
    partial: Option<PartialMessage>,
    utf8: Utf8Validator,
    scheduler: WriteScheduler,
    events: VecDeque<Update>,
    pending_pongs: Vec<Vec<u8>>,
    read_rate: usize,
    max_handshake_length: usize,
    max_message_size: usize,
    opened_at: Instant,
    allowed_rsv: [bool; 3],
    we_sent_close: bool,
    we_initiated_close: bool,
    remote_sent_close: bool,
    sink_cb: Option<SinkCallback>,
    current_frame_remaining: usize,
    mask_state: u32,
    /// Set when a protocol or payload error armed the teardown; further
    /// input is ignored.
    halted: bool,
    /// Set once the transport has been closed; no further events.
    terminated: bool,
}

impl<T: Transport> Connection<T> {
    /// Create a new connection engine over an open transport.
    pub fn new(transport: T, role: Role, config: Config) -> Self {
        Self {
            transport,
            role,
            read_buf: BytesMut::new(),
            partial: None,
            utf8: Utf8Validator::new(),
            scheduler: WriteScheduler::new(config.write_rate),
            events: VecDeque::new(),
            pending_pongs: Vec::new(),
            read_rate: config.read_rate,
            max_handshake_length: config.max_handshake_length,
            max_message_size: config.max_message_size,
            opened_at: Instant::now(),
            allowed_rsv: [false; 3],
            we_sent_close: false,
            we_initiated_close: false,
            remote_sent_close: false,
            sink_cb: None,
            current_frame_remaining: 0,
            mask_state: random_mask_seed(),
            halted: false,
            terminated: false,
        }
    }

    /// The connection's role.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// When the connection was constructed.
    #[must_use]
    pub fn opened_at(&self) -> Instant {
        self.opened_at
    }

    /// Borrow the owned transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutably borrow the owned transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Bytes the outer loop should read per ingest cycle.
    #[must_use]
    pub fn read_rate(&self) -> usize {
        self.read_rate
    }

    /// Set the per-cycle read rate.
    pub fn set_read_rate(&mut self, rate: usize) {
        self.read_rate = rate;
    }

    /// Bytes written to the transport per flush cycle.
    #[must_use]
    pub fn write_rate(&self) -> usize {
        self.scheduler.write_rate()
    }

    /// Set the per-cycle write rate.
    pub fn set_write_rate(&mut self, rate: usize) {
        self.scheduler.set_write_rate(rate);
    }

    /// Bound on buffered HTTP upgrade bytes (advisory for the handshake layer).
    #[must_use]
    pub fn max_handshake_length(&self) -> usize {
        self.max_handshake_length
    }

    /// Set the handshake length bound.
    pub fn set_max_handshake_length(&mut self, len: usize) {
        self.max_handshake_length = len;
    }

    /// Additional bytes needed to complete the frame currently being
    /// parsed, if known. Advisory for read sizing.
    #[must_use]
    pub fn current_frame_remaining_bytes(&self) -> usize {
        self.current_frame_remaining
    }

    /// Allow or disallow a reserved header bit (1, 2 or 3).
    ///
    /// # Panics
    ///
    /// Panics if `bit` is not 1, 2 or 3.
    pub fn set_rsv_bit_allowed(&mut self, bit: usize, allowed: bool) {
        assert!((1..=3).contains(&bit), "invalid RSV bit index: {bit}");
        self.allowed_rsv[bit - 1] = allowed;
    }

    /// Whether a reserved header bit (1, 2 or 3) is allowed.
    ///
    /// # Panics
    ///
    /// Panics if `bit` is not 1, 2 or 3.
    #[must_use]
    pub fn is_rsv_bit_allowed(&self, bit: usize) -> bool {
        assert!((1..=3).contains(&bit), "invalid RSV bit index: {bit}");
        self.allowed_rsv[bit - 1]
    }

    /// Register the callback consulted on the first frame of each data
    /// message to decide where its payload goes.
    pub fn set_new_message_sink_callback(&mut self, cb: SinkCallback) {
        self.sink_cb = Some(cb);
    }

    /// All outbound queues and the write cursor are empty.
    #[must_use]
    pub fn is_write_buffer_empty(&self) -> bool {
        self.scheduler.is_empty()
    }

    /// A close handshake is in progress in either direction.
    #[must_use]
    pub fn is_disconnecting(&self) -> bool {
        self.we_sent_close || self.remote_sent_close
    }

    /// The transport has been closed and the engine is inert.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Arm closing of the transport once all queued frames have drained.
    pub fn set_close_after_write(&mut self) {
        self.scheduler.set_close_after_write();
    }

    /// Encode and queue a single frame.
    ///
    /// Control opcodes (Close, Ping, Pong) are routed to the priority
    /// queue; data frames to the normal queue. Masking follows the
    /// connection role.
    ///
    /// # Errors
    ///
    /// `Error::ConnectionClosing` if a data frame is written after a
    /// close frame has been sent.
    pub fn write(&mut self, data: &[u8], opcode: OpCode, fin: bool) -> Result<()> {
        if self.we_sent_close && !opcode.is_priority() {
            return Err(Error::ConnectionClosing);
        }
        self.enqueue_frame(Frame::new(fin, opcode, data.to_vec()));
        Ok(())
    }

    /// Queue a message split into frames of at most `frame_size` bytes.
    ///
    /// The first frame carries `opcode`, subsequent frames are
    /// continuations, and only the final frame has FIN set.
    ///
    /// # Errors
    ///
    /// - `Error::NotDataFrame` unless `opcode` is Text or Binary
    /// - `Error::InvalidFragmentSize` if `frame_size` is zero
    /// - `Error::ConnectionClosing` after a close frame has been sent
    pub fn write_multi_framed(
        &mut self,
        data: &[u8],
        opcode: OpCode,
        frame_size: usize,
    ) -> Result<()> {
        if !matches!(opcode, OpCode::Text | OpCode::Binary) {
            return Err(Error::NotDataFrame(opcode));
        }
        if frame_size == 0 {
            return Err(Error::InvalidFragmentSize(frame_size));
        }
        if self.we_sent_close {
            return Err(Error::ConnectionClosing);
        }
        for frame in MessageFragmenter::new(data, opcode, frame_size) {
            self.enqueue_frame(frame);
        }
        Ok(())
    }

    /// Initiate (or answer) the close handshake.
    ///
    /// Queues a close frame with the given code and reason. If the
    /// remote endpoint has not already sent its close frame, this side
    /// becomes the initiator and the transport stays open until the
    /// remote's close frame arrives.
    ///
    /// # Errors
    ///
    /// `Error::InvalidCloseCode` if `code` must not appear on the wire.
    pub fn send_disconnect(&mut self, code: CloseCode, reason: &str) -> Result<()> {
        if !is_valid_close_code(code.as_u16()) {
            return Err(Error::InvalidCloseCode(code.as_u16()));
        }
        if self.we_sent_close {
            return Ok(());
        }
        debug!(code = %code, "sending close frame");
        self.we_sent_close = true;
        if !self.remote_sent_close {
            self.we_initiated_close = true;
        }
        self.enqueue_frame(Frame::close(Some(code.as_u16()), reason));
        Ok(())
    }

    /// Hard-close the transport. Idempotent.
    pub fn close(&mut self) {
        self.terminate();
    }

    /// Drain the next pending event, if any.
    ///
    /// Events are emitted in the order the underlying frames arrived.
    #[must_use]
    pub fn poll(&mut self) -> Option<Update> {
        self.events.pop_front()
    }

    /// Feed received bytes into the state machine.
    ///
    /// Parses and dispatches as many complete frames as the buffer
    /// holds, queueing [`Update`]s for [`poll`](Self::poll). Work is
    /// proportional to the bytes supplied; nothing blocks.
    pub fn ingest(&mut self, data: &[u8]) {
        if self.terminated || self.halted {
            return;
        }
        self.read_buf.extend_from_slice(data);
        self.current_frame_remaining = 0;

        loop {
            let header = match FrameHeader::parse(&self.read_buf) {
                Ok(header) => header,
                Err(Error::IncompleteFrame { needed }) => {
                    // No advisory when nothing of the next frame has arrived
                    self.current_frame_remaining =
                        if self.read_buf.is_empty() { 0 } else { needed };
                    break;
                }
                Err(err) => {
                    debug!(%err, "malformed frame header");
                    self.fail(
                        CloseCode::ProtocolError,
                        "Malformed frame header",
                        ErrorEvent::ProtocolError,
                    );
                    return;
                }
            };

            if (header.rsv1 && !self.allowed_rsv[0])
                || (header.rsv2 && !self.allowed_rsv[1])
                || (header.rsv3 && !self.allowed_rsv[2])
            {
                self.fail(
                    CloseCode::ProtocolError,
                    "Unexpected RSV bit set",
                    ErrorEvent::RsvBitSet,
                );
                return;
            }

            let total = match header.frame_len() {
                Ok(total) => total,
                Err(err) => {
                    debug!(%err, "unrepresentable frame length");
                    self.fail(
                        CloseCode::ProtocolError,
                        "Frame too large",
                        ErrorEvent::ProtocolError,
                    );
                    return;
                }
            };
            if self.read_buf.len() < total {
                self.current_frame_remaining = total - self.read_buf.len();
                break;
            }

            let frame = match Frame::extract(&header, &self.read_buf) {
                Ok((frame, _)) => frame,
                Err(err) => {
                    debug!(%err, "invalid frame");
                    self.fail(
                        CloseCode::ProtocolError,
                        "Invalid frame",
                        ErrorEvent::ProtocolError,
                    );
                    return;
                }
            };
            self.read_buf.advance(total);

            trace!(opcode = %frame.opcode, len = frame.payload().len(), fin = frame.fin, "frame received");

            if self.remote_sent_close && !frame.opcode.is_control() {
                self.fail(
                    CloseCode::ProtocolError,
                    "Data frame after close",
                    ErrorEvent::ProtocolError,
                );
                return;
            }

            match frame.opcode {
                OpCode::Continuation | OpCode::Text | OpCode::Binary => {
                    if !self.handle_data_frame(&header, frame) {
                        return;
                    }
                }
                OpCode::Close => {
                    self.handle_close_frame(frame);
                    if self.terminated {
                        return;
                    }
                }
                OpCode::Ping => {
                    self.events
                        .push_back(Update::Read(ReadEvent::Ping(frame.payload().to_vec())));
                    self.pending_pongs.push(frame.into_payload());
                }
                OpCode::Pong => {
                    self.events
                        .push_back(Update::Read(ReadEvent::Pong(frame.into_payload())));
                }
            }
        }

        // Queued pongs go through the regular write path, which routes
        // control opcodes to the priority queue.
        if self.is_disconnecting() {
            self.pending_pongs.clear();
        } else {
            let pongs: Vec<Vec<u8>> = self.pending_pongs.drain(..).collect();
            for payload in pongs {
                self.enqueue_frame(Frame::pong(payload));
            }
        }
    }

    /// Perform one bounded write attempt against the transport.
    ///
    /// Writes at most `write_rate` bytes. On transport failure an
    /// [`ErrorEvent::Write`] update is queued; once the queues drain with
    /// close-after-write armed, the transport is closed and
    /// [`ReadEvent::SockDisconnect`] is emitted.
    pub fn flush(&mut self) {
        if self.terminated {
            return;
        }
        match self.scheduler.flush(&mut self.transport) {
            Ok(FlushStatus::Drained) => self.terminate(),
            Ok(_) => {}
            Err(err) => {
                warn!(%err, "transport write failed");
                self.events.push_back(Update::Error(ErrorEvent::Write));
            }
        }
    }

    fn generate_mask(&mut self) -> [u8; 4] {
        self.mask_state = self.mask_state.wrapping_add(0x9E37_79B9);
        let a = self.mask_state;
        let b = a.wrapping_mul(0x85EB_CA6B);
        let c = b ^ (b >> 13);
        let d = c.wrapping_mul(0xC2B2_AE35);
        d.to_le_bytes()
    }

    fn enqueue_frame(&mut self, frame: Frame) {
        let mask = if self.role.must_mask() {
            Some(self.generate_mask())
        } else {
            None
        };
        let priority = frame.opcode.is_priority();
        self.scheduler.enqueue(frame.encode(mask), priority);
    }

    /// Answer a protocol violation: queue a compliant close frame, arm
    /// the teardown, report the error, and stop consuming input.
    fn fail(&mut self, code: CloseCode, reason: &str, event: ErrorEvent) {
        warn!(code = %code, %reason, "protocol violation");
        if !self.we_sent_close {
            self.we_sent_close = true;
            if !self.remote_sent_close {
                self.we_initiated_close = true;
            }
            self.enqueue_frame(Frame::close(Some(code.as_u16()), reason));
        }
        self.scheduler.set_close_after_write();
        self.events.push_back(Update::Error(event));
        self.partial = None;
        self.utf8.reset();
        self.halted = true;
    }

    /// Handle a Text, Binary or Continuation frame. Returns false if the
    /// ingest cycle must terminate.
    fn handle_data_frame(&mut self, header: &FrameHeader, frame: Frame) -> bool {
        if frame.opcode == OpCode::Continuation {
            if self.partial.is_none() {
                self.fail(
                    CloseCode::ProtocolError,
                    "Continuation frame without a message in progress",
                    ErrorEvent::ProtocolError,
                );
                return false;
            }
        } else {
            if self.partial.is_some() {
                self.fail(
                    CloseCode::ProtocolError,
                    "Got new frame without completing the previous",
                    ErrorEvent::ProtocolError,
                );
                return false;
            }

            let decision = match self.sink_cb.as_mut() {
                Some(cb) => cb(header),
                None => SinkDecision::Buffer,
            };
            let store = match decision {
                SinkDecision::Buffer => MessageStore::Buffer(BytesMut::new()),
                SinkDecision::Stream(sink) => MessageStore::Sink(sink),
                SinkDecision::Reject => {
                    debug!(opcode = %frame.opcode, "message rejected by sink callback");
                    if !self.we_sent_close {
                        self.we_sent_close = true;
                        if !self.remote_sent_close {
                            self.we_initiated_close = true;
                        }
                        self.enqueue_frame(Frame::close(
                            Some(CloseCode::UnsupportedData.as_u16()),
                            "Unsupported payload",
                        ));
                    }
                    self.scheduler.set_close_after_write();
                    self.halted = true;
                    return false;
                }
            };

            if frame.opcode == OpCode::Text {
                self.utf8.reset();
            }
            self.partial = Some(PartialMessage {
                opcode: frame.opcode,
                store,
                bytes_written: 0,
            });
        }

        let is_text = self
            .partial
            .as_ref()
            .is_some_and(|partial| partial.opcode == OpCode::Text);
        if is_text {
            self.utf8.advance(frame.payload());
            if self.utf8.is_rejected() || (frame.fin && !self.utf8.is_accept()) {
                self.fail(
                    CloseCode::InvalidPayload,
                    "Invalid UTF-8 in text message",
                    ErrorEvent::InvalidPayload,
                );
                return false;
            }
        }

        let max_message_size = self.max_message_size;
        let payload = frame.payload();
        let mut sink_failed = false;
        let mut over_limit = false;

        let Some(partial) = self.partial.as_mut() else {
            // handle_data_frame established the partial message above
            unreachable!("partial message missing");
        };
        match &mut partial.store {
            MessageStore::Buffer(buf) => {
                if buf.len() + payload.len() > max_message_size {
                    over_limit = true;
                } else {
                    buf.extend_from_slice(payload);
                    partial.bytes_written += payload.len() as u64;
                }
            }
            MessageStore::Sink(sink) => {
                let mut offset = 0;
                while offset < payload.len() {
                    match sink.write(&payload[offset..]) {
                        Ok(0) => {
                            warn!("message sink accepted no bytes");
                            sink_failed = true;
                            break;
                        }
                        Ok(n) => offset += n,
                        Err(err) => {
                            warn!(%err, "message sink write failed");
                            sink_failed = true;
                            break;
                        }
                    }
                }
                partial.bytes_written += offset as u64;
            }
        }

        if over_limit {
            self.fail(
                CloseCode::MessageTooBig,
                "Message exceeds size limit",
                ErrorEvent::ProtocolError,
            );
            return false;
        }
        if sink_failed {
            // The frame is still accounted for; the connection survives.
            self.events
                .push_back(Update::Error(ErrorEvent::InvalidTargetStream));
        }

        if frame.fin {
            if let Some(PartialMessage {
                opcode,
                store,
                bytes_written,
            }) = self.partial.take()
            {
                let payload = match store {
                    MessageStore::Buffer(buf) => MessagePayload::Complete(buf.to_vec()),
                    MessageStore::Sink(sink) => MessagePayload::Streamed {
                        sink,
                        bytes_written,
                    },
                };
                trace!(opcode = %opcode, len = payload.len(), "message complete");
                self.events
                    .push_back(Update::Read(ReadEvent::Message { opcode, payload }));
            }
            self.utf8.reset();
        }

        true
    }

    fn handle_close_frame(&mut self, frame: Frame) {
        let raw = frame.into_payload();
        let close = parse_close_payload(&raw);
        self.remote_sent_close = true;
        debug!(
            code = close.as_ref().map(|c| c.code.as_u16()),
            "close frame received"
        );
        self.events.push_back(Update::Read(ReadEvent::Disconnect {
            close: close.clone(),
            payload: raw,
        }));

        if self.we_initiated_close {
            // Our close was answered; the handshake is complete.
            self.terminate();
        } else if !self.we_sent_close {
            match &close {
                Some(cf) => {
                    self.enqueue_frame(Frame::close(Some(cf.code.as_u16()), &cf.reason));
                }
                None => self.enqueue_frame(Frame::close(None, "")),
            }
            self.we_sent_close = true;
            self.scheduler.set_close_after_write();
        }
    }

    fn terminate(&mut self) {
        if self.terminated {
            return;
        }
        debug!("closing transport");
        self.transport.close();
        self.terminated = true;
        self.events.push_back(Update::Read(ReadEvent::SockDisconnect));
    }
}

impl<T: Transport> Drop for Connection<T> {
    fn drop(&mut self) {
        if self.transport.is_open() {
            self.transport.close();
        }
    }
}
