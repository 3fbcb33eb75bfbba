//! Payload decoder.
//!
//! Reads a value tree from a payload slice using the message's byte order.
//! Every read is bounds-checked; a payload that ends early, names an
//! unknown tag, or nests deeper than [`MAX_DEPTH`] is a protocol error.

use bytes::Buf;

use super::types::{Attribute, Guid, Kind, TypeTag};
use super::value::{Atom, Dictionary, Table, Value, Vector, VectorData};
use crate::error::{QwireError, Result};
use crate::protocol::{Capacity, Endianness};

/// Deepest nesting of lists, dictionaries and tables accepted.
pub const MAX_DEPTH: usize = 256;

/// Reads one number with the decoder's byte order.
macro_rules! get_num {
    ($self:ident, $width:expr, $be:ident, $le:ident) => {{
        $self.ensure($width)?;
        match $self.endianness {
            Endianness::Big => $self.src.$be(),
            Endianness::Little => $self.src.$le(),
        }
    }};
}

/// Reads `count` numbers into a vector.
macro_rules! get_nums {
    ($self:ident, $count:expr, $width:expr, $be:ident, $le:ident) => {{
        let count = $count;
        $self.ensure_elements(count, $width)?;
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(match $self.endianness {
                Endianness::Big => $self.src.$be(),
                Endianness::Little => $self.src.$le(),
            });
        }
        out
    }};
}

/// Cursor over a payload.
pub struct Decoder<'a> {
    src: &'a [u8],
    total: usize,
    endianness: Endianness,
    wide_counts: bool,
    depth: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(src: &'a [u8], endianness: Endianness, capacity: Capacity) -> Self {
        Self {
            src,
            total: src.len(),
            endianness,
            wide_counts: capacity.has_wide_counts(),
            depth: 0,
        }
    }

    /// Bytes read so far.
    #[inline]
    pub fn consumed(&self) -> usize {
        self.total - self.src.len()
    }

    /// Bytes left.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.src.remaining()
    }

    fn ensure(&self, n: usize) -> Result<()> {
        if self.src.remaining() < n {
            return Err(QwireError::protocol(format!(
                "Truncated payload: need {} bytes at offset {}, {} left",
                n,
                self.consumed(),
                self.src.remaining()
            )));
        }
        Ok(())
    }

    fn ensure_elements(&self, count: usize, width: usize) -> Result<()> {
        let n = count.checked_mul(width).ok_or_else(|| {
            QwireError::protocol(format!("Vector of {} elements overflows", count))
        })?;
        self.ensure(n)
    }

    fn get_u8(&mut self) -> Result<u8> {
        self.ensure(1)?;
        Ok(self.src.get_u8())
    }

    fn get_i8(&mut self) -> Result<i8> {
        self.ensure(1)?;
        Ok(self.src.get_i8())
    }

    fn get_guid(&mut self) -> Result<Guid> {
        self.ensure(16)?;
        let mut raw = [0u8; 16];
        self.src.copy_to_slice(&mut raw);
        Ok(Guid(raw))
    }

    fn get_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        self.ensure(n)?;
        let out = self.src[..n].to_vec();
        self.src.advance(n);
        Ok(out)
    }

    /// Null-terminated text. Invalid UTF-8 is replaced, not rejected.
    fn get_cstring(&mut self) -> Result<String> {
        let end = self.src.iter().position(|&b| b == 0).ok_or_else(|| {
            QwireError::protocol(format!(
                "Truncated payload: unterminated string at offset {}",
                self.consumed()
            ))
        })?;
        let s = String::from_utf8_lossy(&self.src[..end]).into_owned();
        self.src.advance(end + 1);
        Ok(s)
    }

    fn get_count(&mut self) -> Result<usize> {
        let count = if self.wide_counts {
            get_num!(self, 8, get_i64, get_i64_le)
        } else {
            i64::from(get_num!(self, 4, get_i32, get_i32_le))
        };
        usize::try_from(count)
            .map_err(|_| QwireError::protocol(format!("Negative vector count {}", count)))
    }

    /// Decode the next value.
    pub fn decode_value(&mut self) -> Result<Value> {
        let tag = self.get_i8()?;
        match TypeTag::from(tag) {
            TypeTag::Atom(kind) => Ok(Value::Atom(self.decode_atom(kind)?)),
            TypeTag::Vector(kind) => {
                let attribute = Attribute(self.get_u8()?);
                let count = self.get_count()?;
                let data = self.decode_elements(kind, count)?;
                Ok(Value::Vector(Vector { attribute, data }))
            }
            TypeTag::MixedList => {
                let attribute = Attribute(self.get_u8()?);
                let count = self.get_count()?;
                // Every value takes at least its tag byte.
                self.ensure(count)?;
                let items = self.nested(|d| {
                    let mut items = Vec::with_capacity(count);
                    for _ in 0..count {
                        items.push(d.decode_value()?);
                    }
                    Ok(items)
                })?;
                Ok(Value::Vector(Vector {
                    attribute,
                    data: VectorData::Mixed(items),
                }))
            }
            TypeTag::Dictionary => Ok(Value::Dictionary(self.decode_dictionary()?)),
            TypeTag::Table => {
                let attribute = Attribute(self.get_u8()?);
                let inner_tag = self.get_i8()?;
                if TypeTag::from(inner_tag) != TypeTag::Dictionary {
                    return Err(QwireError::protocol(format!(
                        "Table must wrap a dictionary, got {}",
                        TypeTag::from(inner_tag)
                    )));
                }
                let dict = self.decode_dictionary()?;
                let table = Table::from_dictionary(attribute, dict).map_err(|e| match e {
                    QwireError::InvalidValue(msg) => QwireError::Protocol(msg),
                    other => other,
                })?;
                Ok(Value::Table(table))
            }
            TypeTag::UnaryPrimitive => Ok(Value::Unary(self.get_u8()?)),
            TypeTag::Error => Ok(Value::Error(self.get_cstring()?)),
            TypeTag::Other(t) => Err(QwireError::protocol(format!(
                "Unknown type tag {} at offset {}",
                t,
                self.consumed() - 1
            ))),
        }
    }

    fn decode_dictionary(&mut self) -> Result<Dictionary> {
        self.nested(|d| {
            let keys = d.decode_value()?;
            let values = d.decode_value()?;
            Ok(Dictionary::new(keys, values))
        })
    }

    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.depth >= MAX_DEPTH {
            return Err(QwireError::protocol(format!(
                "Value nested deeper than {}",
                MAX_DEPTH
            )));
        }
        self.depth += 1;
        let out = f(self);
        self.depth -= 1;
        out
    }

    fn decode_atom(&mut self, kind: Kind) -> Result<Atom> {
        let atom = match kind {
            Kind::Boolean => Atom::Boolean(self.get_u8()? != 0),
            Kind::Guid => Atom::Guid(self.get_guid()?),
            Kind::Byte => Atom::Byte(self.get_u8()?),
            Kind::Short => Atom::Short(get_num!(self, 2, get_i16, get_i16_le)),
            Kind::Int => Atom::Int(get_num!(self, 4, get_i32, get_i32_le)),
            Kind::Long => Atom::Long(get_num!(self, 8, get_i64, get_i64_le)),
            Kind::Real => Atom::Real(get_num!(self, 4, get_f32, get_f32_le)),
            Kind::Float => Atom::Float(get_num!(self, 8, get_f64, get_f64_le)),
            Kind::Char => Atom::Char(self.get_u8()?),
            Kind::Symbol => Atom::Symbol(self.get_cstring()?),
            Kind::Timestamp => Atom::Timestamp(get_num!(self, 8, get_i64, get_i64_le)),
            Kind::Month => Atom::Month(get_num!(self, 4, get_i32, get_i32_le)),
            Kind::Date => Atom::Date(get_num!(self, 4, get_i32, get_i32_le)),
            Kind::Datetime => Atom::Datetime(get_num!(self, 8, get_f64, get_f64_le)),
            Kind::Timespan => Atom::Timespan(get_num!(self, 8, get_i64, get_i64_le)),
            Kind::Minute => Atom::Minute(get_num!(self, 4, get_i32, get_i32_le)),
            Kind::Second => Atom::Second(get_num!(self, 4, get_i32, get_i32_le)),
            Kind::Time => Atom::Time(get_num!(self, 4, get_i32, get_i32_le)),
        };
        Ok(atom)
    }

    fn decode_elements(&mut self, kind: Kind, count: usize) -> Result<VectorData> {
        let data = match kind {
            Kind::Boolean => {
                let bytes = self.get_bytes(count)?;
                VectorData::Boolean(bytes.into_iter().map(|b| b != 0).collect())
            }
            Kind::Guid => {
                self.ensure_elements(count, 16)?;
                let mut out = Vec::with_capacity(count);
                for _ in 0..count {
                    out.push(self.get_guid()?);
                }
                VectorData::Guid(out)
            }
            Kind::Byte => VectorData::Byte(self.get_bytes(count)?),
            Kind::Char => VectorData::Char(self.get_bytes(count)?),
            Kind::Short => VectorData::Short(get_nums!(self, count, 2, get_i16, get_i16_le)),
            Kind::Int => VectorData::Int(get_nums!(self, count, 4, get_i32, get_i32_le)),
            Kind::Long => VectorData::Long(get_nums!(self, count, 8, get_i64, get_i64_le)),
            Kind::Real => VectorData::Real(get_nums!(self, count, 4, get_f32, get_f32_le)),
            Kind::Float => VectorData::Float(get_nums!(self, count, 8, get_f64, get_f64_le)),
            Kind::Symbol => {
                // Every symbol takes at least its terminator.
                self.ensure(count)?;
                let mut out = Vec::with_capacity(count);
                for _ in 0..count {
                    out.push(self.get_cstring()?);
                }
                VectorData::Symbol(out)
            }
            Kind::Timestamp => {
                VectorData::Timestamp(get_nums!(self, count, 8, get_i64, get_i64_le))
            }
            Kind::Month => VectorData::Month(get_nums!(self, count, 4, get_i32, get_i32_le)),
            Kind::Date => VectorData::Date(get_nums!(self, count, 4, get_i32, get_i32_le)),
            Kind::Datetime => VectorData::Datetime(get_nums!(self, count, 8, get_f64, get_f64_le)),
            Kind::Timespan => VectorData::Timespan(get_nums!(self, count, 8, get_i64, get_i64_le)),
            Kind::Minute => VectorData::Minute(get_nums!(self, count, 4, get_i32, get_i32_le)),
            Kind::Second => VectorData::Second(get_nums!(self, count, 4, get_i32, get_i32_le)),
            Kind::Time => VectorData::Time(get_nums!(self, count, 4, get_i32, get_i32_le)),
        };
        Ok(data)
    }
}

/// Decode one value from the front of `buf`.
///
/// Returns the value and the number of bytes it occupied.
///
/// # Example
///
/// ```
/// use qwire_client::codec::{decode_value, Value, VectorData};
/// use qwire_client::protocol::{Capacity, Endianness};
///
/// let payload = [6, 0, 3, 0, 0, 0, 1, 0, 0, 0, 2, 0, 0, 0, 3, 0, 0, 0];
/// let (value, used) = decode_value(&payload, Endianness::Little, Capacity::V3).unwrap();
///
/// assert_eq!(value, Value::from(VectorData::Int(vec![1, 2, 3])));
/// assert_eq!(used, payload.len());
/// ```
pub fn decode_value(
    buf: &[u8],
    endianness: Endianness,
    capacity: Capacity,
) -> Result<(Value, usize)> {
    let mut decoder = Decoder::new(buf, endianness, capacity);
    let value = decoder.decode_value()?;
    Ok((value, decoder.consumed()))
}

/// Decode a whole message payload, which must hold exactly one value.
pub fn decode_payload(buf: &[u8], endianness: Endianness, capacity: Capacity) -> Result<Value> {
    let (value, used) = decode_value(buf, endianness, capacity)?;
    if used != buf.len() {
        return Err(QwireError::protocol(format!(
            "{} trailing bytes after payload value",
            buf.len() - used
        )));
    }
    Ok(value)
}
