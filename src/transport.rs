//! The byte-oriented transport seam.
//!
//! The engine never opens sockets; an outer event loop hands it a
//! [`Transport`] and drives [`Connection::ingest`] and
//! [`Connection::flush`] when the underlying descriptor is readable or
//! writable.
//!
//! [`Connection::ingest`]: crate::Connection::ingest
//! [`Connection::flush`]: crate::Connection::flush

use std::io;

/// A non-blocking, byte-oriented transport.
///
/// Implementations wrap whatever the outer loop multiplexes: a TCP
/// stream in non-blocking mode, a TLS session, an in-memory pipe in
/// tests. `write` may accept fewer bytes than offered; it must never
/// block.
pub trait Transport {
    /// Attempt to write `buf`, returning the number of bytes accepted.
    ///
    /// # Errors
    ///
    /// Any I/O error of the underlying stream. `WouldBlock` should be
    /// mapped to `Ok(0)` by the implementation when possible.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Close the transport. Idempotent.
    fn close(&mut self);

    /// Whether the transport is still open.
    fn is_open(&self) -> bool;
}
