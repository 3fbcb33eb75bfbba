//! Frame struct with typed accessors.
//!
//! Represents a complete message: decoded header plus raw payload.
//! Uses `bytes::Bytes` for zero-copy payload sharing.
//!
//! # Example
//!
//! ```
//! use qwire_client::protocol::{build_frame, Endianness, FrameBuffer, MessageType};
//!
//! let bytes = build_frame(MessageType::Async, Endianness::Little, &[0xF9, 1, 0, 0, 0, 0, 0, 0, 0]).unwrap();
//! let frames = FrameBuffer::new().push(&bytes).unwrap();
//!
//! assert!(frames[0].is_async());
//! assert_eq!(frames[0].payload_len(), 9);
//! ```

use bytes::Bytes;

use super::wire_format::{Endianness, Header, MessageType, HEADER_SIZE};
use crate::error::Result;

/// A complete protocol frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Decoded header.
    pub header: Header,
    /// Payload bytes (zero-copy via `bytes::Bytes`).
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame from header and payload.
    pub fn new(header: Header, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get the payload length.
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Byte order of the payload.
    #[inline]
    pub fn endianness(&self) -> Endianness {
        self.header.endianness
    }

    /// Message kind.
    #[inline]
    pub fn message_type(&self) -> MessageType {
        self.header.message_type
    }

    #[inline]
    pub fn is_async(&self) -> bool {
        self.header.message_type == MessageType::Async
    }

    #[inline]
    pub fn is_sync(&self) -> bool {
        self.header.message_type == MessageType::Sync
    }

    #[inline]
    pub fn is_response(&self) -> bool {
        self.header.message_type == MessageType::Response
    }
}

/// Build a complete frame as a single byte vector.
///
/// Encodes the header for `payload` and appends the payload into one
/// contiguous buffer.
pub fn build_frame(
    message_type: MessageType,
    endianness: Endianness,
    payload: &[u8],
) -> Result<Vec<u8>> {
    let header = Header::new(message_type, endianness, payload.len())?;
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(payload);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_accessors() {
        let header = Header::new(MessageType::Response, Endianness::Big, 5).unwrap();
        let frame = Frame::new(header, Bytes::from_static(b"hello"));

        assert!(frame.is_response());
        assert!(!frame.is_async());
        assert!(!frame.is_sync());
        assert_eq!(frame.endianness(), Endianness::Big);
        assert_eq!(frame.payload(), b"hello");
        assert_eq!(frame.payload_len(), 5);
    }

    #[test]
    fn test_build_frame() {
        let bytes = build_frame(MessageType::Sync, Endianness::Little, b"hello").unwrap();

        assert_eq!(bytes.len(), HEADER_SIZE + 5);

        let parsed = Header::decode(&bytes[..HEADER_SIZE]).unwrap();
        assert_eq!(parsed.message_type, MessageType::Sync);
        assert_eq!(parsed.length as usize, HEADER_SIZE + 5);
        assert_eq!(&bytes[HEADER_SIZE..], b"hello");
    }

    #[test]
    fn test_build_frame_empty_payload() {
        let bytes = build_frame(MessageType::Async, Endianness::Big, b"").unwrap();
        assert_eq!(bytes, [0, 0, 0, 0, 0, 0, 0, 8]);
    }
}
