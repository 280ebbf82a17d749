//! WebSocket wire protocol core (RFC 6455).

pub mod close;
pub mod frame;
pub mod mask;
pub mod opcode;
pub mod utf8;

pub use close::{is_valid_close_code, parse_close_payload, CloseCode, CloseFrame};
pub use frame::{Frame, FrameHeader, MAX_CONTROL_FRAME_PAYLOAD};
pub use mask::{apply_mask, apply_mask_fast};
pub use opcode::OpCode;
pub use utf8::{validate_utf8, Utf8Validator, UTF8_ACCEPT, UTF8_REJECT};
