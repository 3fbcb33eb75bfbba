//! Type tags and small fixed-layout types of the q type system.
//!
//! Every value on the wire starts with a signed tag byte. A negative tag is
//! an atom, the matching positive tag a vector of the same element kind.
//! See <https://code.kx.com/q/basics/datatypes/>.

use std::fmt;

use uuid::Uuid;

/// Element kind shared by an atom and its vector.
///
/// The discriminant is the vector tag; the atom tag is its negation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i8)]
pub enum Kind {
    Boolean = 1,
    Guid = 2,
    Byte = 4,
    Short = 5,
    Int = 6,
    Long = 7,
    Real = 8,
    Float = 9,
    Char = 10,
    Symbol = 11,
    /// Nanoseconds since 2000.01.01.
    Timestamp = 12,
    /// Months since 2000.01.01.
    Month = 13,
    /// Days since 2000.01.01.
    Date = 14,
    /// Fractional days since 2000.01.01. Deprecated in q, still decoded.
    Datetime = 15,
    /// Nanoseconds.
    Timespan = 16,
    Minute = 17,
    Second = 18,
    /// Milliseconds since midnight.
    Time = 19,
}

impl Kind {
    /// Kind for a vector tag (1..=19, except 3).
    pub fn from_vector_tag(tag: i8) -> Option<Self> {
        let kind = match tag {
            1 => Kind::Boolean,
            2 => Kind::Guid,
            4 => Kind::Byte,
            5 => Kind::Short,
            6 => Kind::Int,
            7 => Kind::Long,
            8 => Kind::Real,
            9 => Kind::Float,
            10 => Kind::Char,
            11 => Kind::Symbol,
            12 => Kind::Timestamp,
            13 => Kind::Month,
            14 => Kind::Date,
            15 => Kind::Datetime,
            16 => Kind::Timespan,
            17 => Kind::Minute,
            18 => Kind::Second,
            19 => Kind::Time,
            _ => return None,
        };
        Some(kind)
    }

    /// Positive tag of a vector of this kind.
    #[inline]
    pub fn vector_tag(self) -> i8 {
        self as i8
    }

    /// Negative tag of an atom of this kind.
    #[inline]
    pub fn atom_tag(self) -> i8 {
        -(self as i8)
    }

    /// Bytes per element, or `None` for null-terminated symbols.
    pub fn width(self) -> Option<usize> {
        match self {
            Kind::Boolean | Kind::Byte | Kind::Char => Some(1),
            Kind::Short => Some(2),
            Kind::Int
            | Kind::Real
            | Kind::Month
            | Kind::Date
            | Kind::Minute
            | Kind::Second
            | Kind::Time => Some(4),
            Kind::Long | Kind::Float | Kind::Timestamp | Kind::Timespan | Kind::Datetime => Some(8),
            Kind::Guid => Some(16),
            Kind::Symbol => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Kind::Boolean => "boolean",
            Kind::Guid => "guid",
            Kind::Byte => "byte",
            Kind::Short => "short",
            Kind::Int => "int",
            Kind::Long => "long",
            Kind::Real => "real",
            Kind::Float => "float",
            Kind::Char => "char",
            Kind::Symbol => "symbol",
            Kind::Timestamp => "timestamp",
            Kind::Month => "month",
            Kind::Date => "date",
            Kind::Datetime => "datetime",
            Kind::Timespan => "timespan",
            Kind::Minute => "minute",
            Kind::Second => "second",
            Kind::Time => "time",
        }
    }
}

/// Tag for a mixed (general) list.
pub const MIXED_LIST_TAG: i8 = 0;
/// Tag for a table.
pub const TABLE_TAG: i8 = 98;
/// Tag for a dictionary.
pub const DICTIONARY_TAG: i8 = 99;
/// Tag for a unary primitive; `(::)` is unary primitive 0.
pub const UNARY_PRIMITIVE_TAG: i8 = 101;
/// Tag for an error value.
pub const ERROR_TAG: i8 = -128;

/// Decoded type tag.
///
/// Tags this crate cannot lay out are kept as [`TypeTag::Other`]; the
/// decoder rejects them because the size of what follows is unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Atom(Kind),
    Vector(Kind),
    MixedList,
    Table,
    Dictionary,
    UnaryPrimitive,
    Error,
    Other(i8),
}

impl TypeTag {
    /// Raw tag byte.
    pub fn as_i8(self) -> i8 {
        match self {
            TypeTag::Atom(kind) => kind.atom_tag(),
            TypeTag::Vector(kind) => kind.vector_tag(),
            TypeTag::MixedList => MIXED_LIST_TAG,
            TypeTag::Table => TABLE_TAG,
            TypeTag::Dictionary => DICTIONARY_TAG,
            TypeTag::UnaryPrimitive => UNARY_PRIMITIVE_TAG,
            TypeTag::Error => ERROR_TAG,
            TypeTag::Other(t) => t,
        }
    }

    /// True for every negative tag except the error tag, known or not.
    #[inline]
    pub fn is_atomic(self) -> bool {
        is_atomic(self.as_i8())
    }
}

/// Atom test on a raw tag byte.
#[inline]
pub fn is_atomic(tag: i8) -> bool {
    tag < 0 && tag != ERROR_TAG
}

impl From<i8> for TypeTag {
    fn from(tag: i8) -> Self {
        match tag {
            MIXED_LIST_TAG => TypeTag::MixedList,
            TABLE_TAG => TypeTag::Table,
            DICTIONARY_TAG => TypeTag::Dictionary,
            UNARY_PRIMITIVE_TAG => TypeTag::UnaryPrimitive,
            ERROR_TAG => TypeTag::Error,
            t if t < 0 => Kind::from_vector_tag(-t).map_or(TypeTag::Other(t), TypeTag::Atom),
            t => Kind::from_vector_tag(t).map_or(TypeTag::Other(t), TypeTag::Vector),
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeTag::Atom(kind) => write!(f, "{} atom", kind.name()),
            TypeTag::Vector(kind) => write!(f, "{} vector", kind.name()),
            TypeTag::MixedList => f.write_str("mixed list"),
            TypeTag::Table => f.write_str("table"),
            TypeTag::Dictionary => f.write_str("dictionary"),
            TypeTag::UnaryPrimitive => f.write_str("unary primitive"),
            TypeTag::Error => f.write_str("error"),
            TypeTag::Other(t) => write!(f, "type {}", t),
        }
    }
}

/// Vector attribute byte. Passed through untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Attribute(pub u8);

impl Attribute {
    pub const NONE: Attribute = Attribute(0);
    /// `s#`
    pub const SORTED: Attribute = Attribute(1);
    /// `u#`
    pub const UNIQUE: Attribute = Attribute(2);
    /// `p#`
    pub const PARTED: Attribute = Attribute(3);
}

/// 16-byte GUID, compared by bytes only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Guid(pub [u8; 16]);

impl Guid {
    /// The null GUID `0Ng`.
    pub const NULL: Guid = Guid([0; 16]);

    #[inline]
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// View as a standard UUID. The bytes are used in wire order.
    pub fn to_uuid(self) -> Uuid {
        Uuid::from_bytes(self.0)
    }
}

impl From<Uuid> for Guid {
    fn from(uuid: Uuid) -> Self {
        Guid(uuid.into_bytes())
    }
}

impl From<Guid> for Uuid {
    fn from(guid: Guid) -> Self {
        guid.to_uuid()
    }
}

impl From<[u8; 16]> for Guid {
    fn from(bytes: [u8; 16]) -> Self {
        Guid(bytes)
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.to_uuid().hyphenated(), f)
    }
}
