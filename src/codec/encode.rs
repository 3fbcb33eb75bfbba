//! Payload encoder.

use bytes::{BufMut, Bytes, BytesMut};

use super::types::{
    Guid, Kind, DICTIONARY_TAG, ERROR_TAG, MIXED_LIST_TAG, TABLE_TAG, UNARY_PRIMITIVE_TAG,
};
use super::value::{Atom, Dictionary, Value, VectorData};
use crate::error::{QwireError, Result};
use crate::protocol::{Capacity, Endianness};

/// Writes one number with the encoder's byte order.
macro_rules! put_num {
    ($self:ident, $value:expr, $be:ident, $le:ident) => {{
        let value = $value;
        match $self.endianness {
            Endianness::Big => $self.buf.$be(value),
            Endianness::Little => $self.buf.$le(value),
        }
    }};
}

/// Writes a slice of numbers.
macro_rules! put_nums {
    ($self:ident, $values:expr, $width:expr, $be:ident, $le:ident) => {{
        let values = $values;
        $self.buf.reserve(values.len() * $width);
        for &v in values.iter() {
            put_num!($self, v, $be, $le);
        }
    }};
}

/// Builds a payload.
pub struct Encoder {
    buf: BytesMut,
    endianness: Endianness,
    wide_counts: bool,
}

impl Encoder {
    pub fn new(endianness: Endianness, capacity: Capacity) -> Self {
        Self {
            buf: BytesMut::with_capacity(256),
            endianness,
            wide_counts: capacity.has_wide_counts(),
        }
    }

    /// Bytes written so far.
    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }

    fn put_count(&mut self, len: usize) -> Result<()> {
        if self.wide_counts {
            let n = i64::try_from(len).map_err(|_| {
                QwireError::InvalidValue(format!("Vector of {} elements is too long", len))
            })?;
            put_num!(self, n, put_i64, put_i64_le);
        } else {
            let n = i32::try_from(len).map_err(|_| {
                QwireError::InvalidValue(format!(
                    "Vector of {} elements needs capacity 5 or 6",
                    len
                ))
            })?;
            put_num!(self, n, put_i32, put_i32_le);
        }
        Ok(())
    }

    fn put_cstring(&mut self, s: &str) -> Result<()> {
        if s.as_bytes().contains(&0) {
            return Err(QwireError::InvalidValue(format!(
                "Text {:?} contains a NUL byte",
                s
            )));
        }
        self.buf.put_slice(s.as_bytes());
        self.buf.put_u8(0);
        Ok(())
    }

    fn put_guid(&mut self, g: &Guid) {
        self.buf.put_slice(g.as_bytes());
    }

    /// Append one value.
    pub fn encode_value(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Atom(atom) => {
                self.buf.put_i8(atom.kind().atom_tag());
                self.encode_atom(atom)
            }
            Value::Vector(v) => {
                let tag = v.data.kind().map_or(MIXED_LIST_TAG, Kind::vector_tag);
                self.buf.put_i8(tag);
                self.buf.put_u8(v.attribute.0);
                self.put_count(v.data.len())?;
                self.encode_elements(&v.data)
            }
            Value::Dictionary(d) => self.encode_dictionary(d),
            Value::Table(t) => {
                self.buf.put_i8(TABLE_TAG);
                self.buf.put_u8(t.attribute().0);
                self.encode_dictionary(t.as_dictionary())
            }
            Value::Unary(b) => {
                self.buf.put_i8(UNARY_PRIMITIVE_TAG);
                self.buf.put_u8(*b);
                Ok(())
            }
            Value::Error(msg) => {
                self.buf.put_i8(ERROR_TAG);
                self.put_cstring(msg)
            }
        }
    }

    fn encode_dictionary(&mut self, d: &Dictionary) -> Result<()> {
        self.buf.put_i8(DICTIONARY_TAG);
        self.encode_value(&d.keys)?;
        self.encode_value(&d.values)
    }

    fn encode_atom(&mut self, atom: &Atom) -> Result<()> {
        match atom {
            Atom::Boolean(b) => self.buf.put_u8(u8::from(*b)),
            Atom::Guid(g) => self.put_guid(g),
            Atom::Byte(b) | Atom::Char(b) => self.buf.put_u8(*b),
            Atom::Short(n) => put_num!(self, *n, put_i16, put_i16_le),
            Atom::Int(n)
            | Atom::Month(n)
            | Atom::Date(n)
            | Atom::Minute(n)
            | Atom::Second(n)
            | Atom::Time(n) => put_num!(self, *n, put_i32, put_i32_le),
            Atom::Long(n) | Atom::Timestamp(n) | Atom::Timespan(n) => {
                put_num!(self, *n, put_i64, put_i64_le)
            }
            Atom::Real(x) => put_num!(self, *x, put_f32, put_f32_le),
            Atom::Float(x) | Atom::Datetime(x) => put_num!(self, *x, put_f64, put_f64_le),
            Atom::Symbol(s) => return self.put_cstring(s),
        }
        Ok(())
    }

    fn encode_elements(&mut self, data: &VectorData) -> Result<()> {
        match data {
            VectorData::Boolean(v) => {
                self.buf.extend(v.iter().map(|&b| u8::from(b)));
            }
            VectorData::Guid(v) => {
                for g in v {
                    self.put_guid(g);
                }
            }
            VectorData::Byte(v) | VectorData::Char(v) => self.buf.put_slice(v),
            VectorData::Short(v) => put_nums!(self, v, 2, put_i16, put_i16_le),
            VectorData::Int(v)
            | VectorData::Month(v)
            | VectorData::Date(v)
            | VectorData::Minute(v)
            | VectorData::Second(v)
            | VectorData::Time(v) => put_nums!(self, v, 4, put_i32, put_i32_le),
            VectorData::Long(v) | VectorData::Timestamp(v) | VectorData::Timespan(v) => {
                put_nums!(self, v, 8, put_i64, put_i64_le)
            }
            VectorData::Real(v) => put_nums!(self, v, 4, put_f32, put_f32_le),
            VectorData::Float(v) | VectorData::Datetime(v) => {
                put_nums!(self, v, 8, put_f64, put_f64_le)
            }
            VectorData::Symbol(v) => {
                for s in v {
                    self.put_cstring(s)?;
                }
            }
            VectorData::Mixed(v) => {
                for item in v {
                    self.encode_value(item)?;
                }
            }
        }
        Ok(())
    }
}

/// Encode a value as a message payload.
///
/// # Example
///
/// ```
/// use qwire_client::codec::{encode_value, Value};
/// use qwire_client::protocol::{Capacity, Endianness};
///
/// let payload = encode_value(&Value::string("1+1"), Endianness::Little, Capacity::V3).unwrap();
/// assert_eq!(&payload[..], b"\x0a\x00\x03\x00\x00\x001+1");
/// ```
pub fn encode_value(value: &Value, endianness: Endianness, capacity: Capacity) -> Result<Bytes> {
    let mut encoder = Encoder::new(endianness, capacity);
    encoder.encode_value(value)?;
    Ok(encoder.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Table, Vector};

    fn le(value: &Value) -> Vec<u8> {
        encode_value(value, Endianness::Little, Capacity::V3)
            .unwrap()
            .to_vec()
    }

    #[test]
    fn test_int_vector_layout() {
        let bytes = le(&VectorData::Int(vec![1, 2, 3]).into());
        assert_eq!(
            bytes,
            [6, 0, 3, 0, 0, 0, 1, 0, 0, 0, 2, 0, 0, 0, 3, 0, 0, 0]
        );
    }

    #[test]
    fn test_big_endian_counts_and_elements() {
        let bytes = encode_value(
            &VectorData::Short(vec![0x0102]).into(),
            Endianness::Big,
            Capacity::V3,
        )
        .unwrap();
        assert_eq!(&bytes[..], [5, 0, 0, 0, 0, 1, 0x01, 0x02]);
    }

    #[test]
    fn test_wide_count_at_capacity_5() {
        let bytes = encode_value(
            &VectorData::Byte(vec![7]).into(),
            Endianness::Little,
            Capacity::V5,
        )
        .unwrap();
        assert_eq!(&bytes[..], [4, 0, 1, 0, 0, 0, 0, 0, 0, 0, 7]);
    }

    #[test]
    fn test_symbol_atom_and_error() {
        assert_eq!(le(&Value::symbol("ab")), b"\xF5ab\x00");
        assert_eq!(le(&Value::Error("type".into())), b"\x80type\x00");
    }

    #[test]
    fn test_nul_in_symbol_rejected() {
        let result = encode_value(&Value::symbol("a\0b"), Endianness::Little, Capacity::V3);
        assert!(matches!(result, Err(QwireError::InvalidValue(_))));
    }

    #[test]
    fn test_table_layout() {
        let table = Table::new(
            vec!["a".into()],
            vec![Vector::new(VectorData::Boolean(vec![true]))],
        )
        .unwrap();
        assert_eq!(
            le(&table.into()),
            b"\x62\x00\x63\x0B\x00\x01\x00\x00\x00a\x00\x00\x00\x01\x00\x00\x00\x01\x00\x01\x00\x00\x00\x01"
        );
    }

    #[test]
    fn test_functional_call_list() {
        let call = Value::list(vec![Value::string("f"), Value::from(1i64)]);
        let bytes = le(&call);
        assert_eq!(&bytes[..6], [0, 0, 2, 0, 0, 0]);
        assert_eq!(&bytes[6..13], [10, 0, 1, 0, 0, 0, b'f']);
        assert_eq!(bytes[13], 0xF9);
    }
}
