//! Protocol module - capacity, wire format, framing, and frame types.
//!
//! This module implements the message framing of the q IPC protocol:
//! - 8-byte header encoding/decoding
//! - Frame buffer for accumulating partial reads
//! - Frame struct with typed accessors
//! - Capability levels agreed at handshake time

mod capacity;
mod frame;
mod frame_buffer;
mod wire_format;

pub use capacity::Capacity;
pub use frame::{build_frame, Frame};
pub use frame_buffer::FrameBuffer;
pub use wire_format::{
    decode_header, encode_header, Endianness, Header, MessageType, DEFAULT_MAX_MESSAGE_SIZE,
    HEADER_SIZE,
};
