//! Wire format encoding and decoding.
//!
//! Implements the 8-byte message header:
//! ```text
//! ┌────────────┬──────────┬──────────┬──────────────┐
//! │ Endianness │ Msg type │ Reserved │ Total length │
//! │ 1 byte     │ 1 byte   │ 2 bytes  │ uint32       │
//! └────────────┴──────────┴──────────┴──────────────┘
//! ```
//!
//! The length counts the header itself and is laid out in the byte order
//! named by byte 0. That byte order applies to the rest of the message too.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{QwireError, Result};

/// Header size in bytes (fixed, exactly 8).
pub const HEADER_SIZE: usize = 8;

/// Default maximum total message size (1 GB).
pub const DEFAULT_MAX_MESSAGE_SIZE: u32 = 1_073_741_824;

/// Byte order of a single message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endianness {
    /// Byte 0 = 0.
    Big,
    /// Byte 0 = 1.
    Little,
}

impl Endianness {
    /// Parse the header's first byte.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Endianness::Big),
            1 => Some(Endianness::Little),
            _ => None,
        }
    }

    /// Byte written at offset 0 of the header.
    #[inline]
    pub fn as_byte(self) -> u8 {
        match self {
            Endianness::Big => 0,
            Endianness::Little => 1,
        }
    }
}

impl Default for Endianness {
    fn default() -> Self {
        Endianness::Little
    }
}

/// Kind of message carried by a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum MessageType {
    /// Fire-and-forget.
    Async,
    /// Expects exactly one `Response`.
    Sync,
    /// Reply to a `Sync`, or an unsolicited error.
    Response,
    /// Unrecognized message type byte.
    Other(u8),
}

impl MessageType {
    /// Raw byte written at offset 1 of the header.
    pub fn as_u8(self) -> u8 {
        match self {
            MessageType::Async => 0,
            MessageType::Sync => 1,
            MessageType::Response => 2,
            MessageType::Other(b) => b,
        }
    }
}

impl From<u8> for MessageType {
    fn from(b: u8) -> Self {
        match b {
            0 => MessageType::Async,
            1 => MessageType::Sync,
            2 => MessageType::Response,
            other => MessageType::Other(other),
        }
    }
}

impl From<MessageType> for u8 {
    fn from(t: MessageType) -> Self {
        t.as_u8()
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageType::Async => f.write_str("MessageType_Async"),
            MessageType::Sync => f.write_str("MessageType_Sync"),
            MessageType::Response => f.write_str("MessageType_Response"),
            MessageType::Other(b) => write!(f, "MessageType({})", b),
        }
    }
}

/// Decoded header from wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Byte order of the length field and of the payload.
    pub endianness: Endianness,
    /// Message kind.
    pub message_type: MessageType,
    /// Total message length in bytes, header included.
    pub length: u32,
}

impl Header {
    /// Create a header for a payload of `payload_len` bytes.
    pub fn new(
        message_type: MessageType,
        endianness: Endianness,
        payload_len: usize,
    ) -> Result<Self> {
        let length = payload_len
            .checked_add(HEADER_SIZE)
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| {
                QwireError::InvalidValue(format!(
                    "Payload of {} bytes does not fit a 32-bit message length",
                    payload_len
                ))
            })?;
        Ok(Self {
            endianness,
            message_type,
            length,
        })
    }

    /// Payload size implied by the length field.
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.length as usize - HEADER_SIZE
    }

    /// Encode header to bytes.
    ///
    /// # Example
    ///
    /// ```
    /// use qwire_client::protocol::{Endianness, Header, MessageType};
    ///
    /// let header = Header::new(MessageType::Sync, Endianness::Little, 6).unwrap();
    /// assert_eq!(header.encode(), [1, 1, 0, 0, 14, 0, 0, 0]);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0] = self.endianness.as_byte();
        buf[1] = self.message_type.as_u8();
        let len = match self.endianness {
            Endianness::Big => self.length.to_be_bytes(),
            Endianness::Little => self.length.to_le_bytes(),
        };
        buf[4..8].copy_from_slice(&len);
        buf
    }

    /// Decode and validate a header.
    ///
    /// Checks:
    /// - at least 8 bytes are present
    /// - endianness byte is 0 or 1
    /// - reserved bytes 2 and 3 are zero
    /// - total length is at least the header size
    ///
    /// # Example
    ///
    /// ```
    /// use qwire_client::protocol::{Endianness, Header, MessageType};
    ///
    /// let header = Header::decode(&[0, 2, 0, 0, 0, 0, 0, 9]).unwrap();
    /// assert_eq!(header.endianness, Endianness::Big);
    /// assert_eq!(header.message_type, MessageType::Response);
    /// assert_eq!(header.payload_len(), 1);
    /// ```
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(QwireError::protocol(format!(
                "Header needs {} bytes, got {}",
                HEADER_SIZE,
                buf.len()
            )));
        }

        let endianness = Endianness::from_byte(buf[0]).ok_or_else(|| {
            QwireError::protocol(format!("Unknown endianness byte {:#04x}", buf[0]))
        })?;

        if buf[2] != 0 || buf[3] != 0 {
            return Err(QwireError::protocol(format!(
                "Reserved header bytes must be 0, got {:#04x} {:#04x}",
                buf[2], buf[3]
            )));
        }

        let raw = [buf[4], buf[5], buf[6], buf[7]];
        let length = match endianness {
            Endianness::Big => u32::from_be_bytes(raw),
            Endianness::Little => u32::from_le_bytes(raw),
        };

        if (length as usize) < HEADER_SIZE {
            return Err(QwireError::protocol(format!(
                "Message length {} is shorter than the header",
                length
            )));
        }

        Ok(Self {
            endianness,
            message_type: MessageType::from(buf[1]),
            length,
        })
    }

    /// Check the total length against a size limit.
    pub fn validate(&self, max_message_size: u32) -> Result<()> {
        if self.length > max_message_size {
            return Err(QwireError::protocol(format!(
                "Message size {} exceeds maximum {}",
                self.length, max_message_size
            )));
        }
        Ok(())
    }
}

/// Encode a header for `payload_len` bytes of payload (standalone function).
#[inline]
pub fn encode_header(
    message_type: MessageType,
    endianness: Endianness,
    payload_len: usize,
) -> Result<[u8; HEADER_SIZE]> {
    Ok(Header::new(message_type, endianness, payload_len)?.encode())
}

/// Decode a header from bytes (standalone function).
#[inline]
pub fn decode_header(buf: &[u8]) -> Result<Header> {
    Header::decode(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_encode_decode_roundtrip() {
        for endianness in [Endianness::Big, Endianness::Little] {
            let original = Header::new(MessageType::Sync, endianness, 100).unwrap();
            let decoded = Header::decode(&original.encode()).unwrap();
            assert_eq!(original, decoded);
            assert_eq!(decoded.payload_len(), 100);
        }
    }

    #[test]
    fn test_length_follows_declared_endianness() {
        let little = encode_header(MessageType::Async, Endianness::Little, 0x0102).unwrap();
        assert_eq!(little, [1, 0, 0, 0, 0x0A, 0x01, 0, 0]);

        let big = encode_header(MessageType::Async, Endianness::Big, 0x0102).unwrap();
        assert_eq!(big, [0, 0, 0, 0, 0, 0, 0x01, 0x0A]);
    }

    #[test]
    fn test_length_includes_header() {
        let header = Header::new(MessageType::Response, Endianness::Little, 0).unwrap();
        assert_eq!(header.length, 8);
        assert_eq!(header.payload_len(), 0);
    }

    #[test]
    fn test_decode_too_short_buffer() {
        let buf = [1u8; 7];
        assert!(matches!(Header::decode(&buf), Err(QwireError::Protocol(_))));
    }

    #[test]
    fn test_reserved_bytes_rejected() {
        let result = Header::decode(&[1, 1, 0x01, 0, 8, 0, 0, 0]);
        assert!(result.unwrap_err().to_string().contains("Reserved"));

        let result = Header::decode(&[1, 1, 0, 0x80, 8, 0, 0, 0]);
        assert!(matches!(result, Err(QwireError::Protocol(_))));
    }

    #[test]
    fn test_length_below_header_rejected() {
        let result = Header::decode(&[1, 2, 0, 0, 7, 0, 0, 0]);
        assert!(result.unwrap_err().to_string().contains("shorter"));
    }

    #[test]
    fn test_unknown_endianness_rejected() {
        let result = Header::decode(&[2, 2, 0, 0, 8, 0, 0, 0]);
        assert!(matches!(result, Err(QwireError::Protocol(_))));
    }

    #[test]
    fn test_unknown_message_type_preserved() {
        let header = Header::decode(&[1, 7, 0, 0, 8, 0, 0, 0]).unwrap();
        assert_eq!(header.message_type, MessageType::Other(7));
        assert_eq!(header.encode()[1], 7);
    }

    #[test]
    fn test_validate_message_too_large() {
        let header = Header::new(MessageType::Response, Endianness::Little, 1_000).unwrap();
        assert!(header.validate(100).is_err());
        assert!(header.validate(DEFAULT_MAX_MESSAGE_SIZE).is_ok());
    }

    #[test]
    fn test_oversized_payload_rejected_on_encode() {
        let result = Header::new(MessageType::Sync, Endianness::Little, u32::MAX as usize);
        assert!(matches!(result, Err(QwireError::InvalidValue(_))));
    }

    #[test]
    fn test_message_type_bytes() {
        assert_eq!(MessageType::Async.as_u8(), 0);
        assert_eq!(MessageType::Sync.as_u8(), 1);
        assert_eq!(MessageType::Response.as_u8(), 2);
        assert_eq!(MessageType::from(2), MessageType::Response);
        assert_eq!(MessageType::Response.to_string(), "MessageType_Response");
    }
}
