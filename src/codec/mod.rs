//! Codec module - q values to and from message payloads.
//!
//! - [`Value`] and friends - the in-memory model of a q object
//! - [`encode_value`] / [`Encoder`] - value to payload bytes
//! - [`decode_payload`] / [`Decoder`] - payload bytes to value
//!
//! # Design
//!
//! The payload byte order comes from the frame header and vector counts
//! widen to 64 bits at capacity 5 and 6, so both directions take an
//! [`Endianness`](crate::protocol::Endianness) and a
//! [`Capacity`](crate::protocol::Capacity) instead of fixing them.
//!
//! # Example
//!
//! ```
//! use qwire_client::codec::{decode_payload, encode_value, Value, VectorData};
//! use qwire_client::protocol::{Capacity, Endianness};
//!
//! let value: Value = VectorData::Long(vec![1, 2, 3]).into();
//! let payload = encode_value(&value, Endianness::Big, Capacity::V3).unwrap();
//! let decoded = decode_payload(&payload, Endianness::Big, Capacity::V3).unwrap();
//! assert_eq!(decoded, value);
//! ```

mod decode;
mod encode;
mod types;
mod value;

pub use decode::{decode_payload, decode_value, Decoder, MAX_DEPTH};
pub use encode::{encode_value, Encoder};
pub use types::{
    is_atomic, Attribute, Guid, Kind, TypeTag, DICTIONARY_TAG, ERROR_TAG, MIXED_LIST_TAG,
    TABLE_TAG, UNARY_PRIMITIVE_TAG,
};
pub use value::{Atom, Dictionary, Table, Value, Vector, VectorData};
