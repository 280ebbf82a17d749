//! Outbound frame scheduling.
//!
//! Encoded frames wait in two FIFO queues: control frames (close, ping,
//! pong) in the priority queue, everything else in the normal queue.
//! Each flush cycle performs exactly one bounded write attempt against
//! the transport; the outer loop re-invokes flushing while the transport
//! is writable.

use std::collections::VecDeque;
use std::io;

use tracing::trace;

use crate::transport::Transport;

/// Outcome of one flush cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FlushStatus {
    /// Nothing was queued.
    Idle,
    /// Bytes were written; more may remain.
    Wrote(usize),
    /// Everything drained while `close_after_write` was armed; the
    /// connection should now close the transport.
    Drained,
}

/// Two-tier FIFO of encoded frames with a byte-rate-limited drain.
pub(crate) struct WriteScheduler {
    priority: VecDeque<Vec<u8>>,
    normal: VecDeque<Vec<u8>>,
    /// Head frame currently being written, and how far we got.
    cursor: Option<(Vec<u8>, usize)>,
    write_rate: usize,
    close_after_write: bool,
}

impl WriteScheduler {
    pub(crate) fn new(write_rate: usize) -> Self {
        Self {
            priority: VecDeque::new(),
            normal: VecDeque::new(),
            cursor: None,
            write_rate,
            close_after_write: false,
        }
    }

    /// Queue an encoded frame; control frames go to the priority queue.
    pub(crate) fn enqueue(&mut self, frame: Vec<u8>, priority: bool) {
        if priority {
            self.priority.push_back(frame);
        } else {
            self.normal.push_back(frame);
        }
    }

    pub(crate) fn set_write_rate(&mut self, rate: usize) {
        self.write_rate = rate;
    }

    pub(crate) fn write_rate(&self) -> usize {
        self.write_rate
    }

    /// Arm closing of the transport once all queued frames have drained.
    pub(crate) fn set_close_after_write(&mut self) {
        self.close_after_write = true;
    }

    pub(crate) fn close_after_write(&self) -> bool {
        self.close_after_write
    }

    /// No frames queued and no partially written frame outstanding.
    pub(crate) fn is_empty(&self) -> bool {
        self.priority.is_empty() && self.normal.is_empty() && self.cursor.is_none()
    }

    /// Perform one write attempt of at most `write_rate` bytes.
    ///
    /// A frame on the cursor is finished before the priority queue can
    /// pre-empt it; with an empty cursor the priority queue is always
    /// popped first.
    pub(crate) fn flush<T: Transport>(&mut self, transport: &mut T) -> io::Result<FlushStatus> {
        if self.cursor.is_none() {
            let next = self.priority.pop_front().or_else(|| self.normal.pop_front());
            self.cursor = next.map(|frame| (frame, 0));
        }

        let Some((frame, pos)) = self.cursor.as_mut() else {
            if self.close_after_write {
                return Ok(FlushStatus::Drained);
            }
            return Ok(FlushStatus::Idle);
        };

        let remaining = &frame[*pos..];
        let attempt = remaining.len().min(self.write_rate);
        let written = transport.write(&remaining[..attempt])?;
        *pos += written;

        if *pos >= frame.len() {
            self.cursor = None;
            if self.close_after_write && self.is_empty() {
                trace!("write queues drained with close armed");
                return Ok(FlushStatus::Drained);
            }
        }

        Ok(FlushStatus::Wrote(written))
    }
}
