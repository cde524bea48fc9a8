//! Protocol module - transport frame wire format.
//!
//! This module implements the binary framing every TCP connection speaks:
//! - 14-byte header encoding/decoding
//! - Request/response metadata blocks
//! - Frame buffer for accumulating partial reads
//!
//! Envelope framing of the body lives in [`crate::envelope`]; this layer only
//! moves bytes and routing metadata.

mod frame;
mod frame_buffer;
mod metadata;
mod wire_format;

pub use frame::Frame;
pub use frame_buffer::FrameBuffer;
pub use metadata::{RequestMeta, ResponseMeta, Status};
pub use wire_format::{
    flags, kind, Header, DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE, RESERVED_REQUEST_ID,
};
