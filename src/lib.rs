//! # wscore - Sans-I/O WebSocket Connection Engine
//!
//! `wscore` is an RFC 6455 WebSocket protocol engine with no I/O of its
//! own: a per-connection state machine that ingests bytes from any
//! transport, reassembles frames and messages, and queues wire-format
//! bytes for transmission.
//!
//! ## Features
//!
//! - **Transport-agnostic** - the outer event loop owns all sockets
//! - **Full RFC 6455 framing** with strict validation
//! - **Streaming UTF-8 validation** across fragment boundaries
//! - **Priority write scheduling** - control frames bypass data frames
//! - **Streaming message sinks** for large payloads
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use wscore::{Config, Connection, Role, Update};
//!
//! let mut conn = Connection::new(transport, Role::Server, Config::default());
//!
//! // Transport readable: feed bytes in, drain events
//! conn.ingest(&bytes);
//! while let Some(update) = conn.poll() {
//!     println!("{update:?}");
//! }
//!
//! // Transport writable: push queued frames out
//! conn.flush();
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod protocol;
pub mod transport;
pub mod update;

pub use config::Config;
pub use connection::{Connection, MessageSink, Role, SinkCallback, SinkDecision};
pub use error::{Error, Result};
pub use protocol::{CloseCode, CloseFrame, Frame, FrameHeader, OpCode};
pub use transport::Transport;
pub use update::{ErrorEvent, MessagePayload, ReadEvent, Update};
