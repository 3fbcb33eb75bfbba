//! The value tree carried in message payloads.
//!
//! ```text
//! Value ─┬─ Atom        one scalar
//!        ├─ Vector      attribute + elements of one kind, or a mixed list
//!        ├─ Dictionary  keys value -> values value
//!        ├─ Table       dictionary of column names -> column vectors
//!        ├─ Unary       unary primitive, `(::)` is Unary(0)
//!        └─ Error       error text sent by the server
//! ```

use super::types::{Attribute, Guid, Kind, TypeTag};
use crate::error::{QwireError, Result};

/// A single scalar.
#[derive(Debug, Clone, PartialEq)]
pub enum Atom {
    Boolean(bool),
    Guid(Guid),
    Byte(u8),
    Short(i16),
    Int(i32),
    Long(i64),
    Real(f32),
    Float(f64),
    Char(u8),
    Symbol(String),
    Timestamp(i64),
    Month(i32),
    Date(i32),
    Datetime(f64),
    Timespan(i64),
    Minute(i32),
    Second(i32),
    Time(i32),
}

impl Atom {
    pub fn kind(&self) -> Kind {
        match self {
            Atom::Boolean(_) => Kind::Boolean,
            Atom::Guid(_) => Kind::Guid,
            Atom::Byte(_) => Kind::Byte,
            Atom::Short(_) => Kind::Short,
            Atom::Int(_) => Kind::Int,
            Atom::Long(_) => Kind::Long,
            Atom::Real(_) => Kind::Real,
            Atom::Float(_) => Kind::Float,
            Atom::Char(_) => Kind::Char,
            Atom::Symbol(_) => Kind::Symbol,
            Atom::Timestamp(_) => Kind::Timestamp,
            Atom::Month(_) => Kind::Month,
            Atom::Date(_) => Kind::Date,
            Atom::Datetime(_) => Kind::Datetime,
            Atom::Timespan(_) => Kind::Timespan,
            Atom::Minute(_) => Kind::Minute,
            Atom::Second(_) => Kind::Second,
            Atom::Time(_) => Kind::Time,
        }
    }
}

/// Element storage of a vector, one variant per element kind.
#[derive(Debug, Clone, PartialEq)]
pub enum VectorData {
    Boolean(Vec<bool>),
    Guid(Vec<Guid>),
    Byte(Vec<u8>),
    Short(Vec<i16>),
    Int(Vec<i32>),
    Long(Vec<i64>),
    Real(Vec<f32>),
    Float(Vec<f64>),
    /// Raw bytes; a q string.
    Char(Vec<u8>),
    Symbol(Vec<String>),
    Timestamp(Vec<i64>),
    Month(Vec<i32>),
    Date(Vec<i32>),
    Datetime(Vec<f64>),
    Timespan(Vec<i64>),
    Minute(Vec<i32>),
    Second(Vec<i32>),
    Time(Vec<i32>),
    /// General list (tag 0) of arbitrary values.
    Mixed(Vec<Value>),
}

impl VectorData {
    /// Element kind, `None` for a mixed list.
    pub fn kind(&self) -> Option<Kind> {
        let kind = match self {
            VectorData::Boolean(_) => Kind::Boolean,
            VectorData::Guid(_) => Kind::Guid,
            VectorData::Byte(_) => Kind::Byte,
            VectorData::Short(_) => Kind::Short,
            VectorData::Int(_) => Kind::Int,
            VectorData::Long(_) => Kind::Long,
            VectorData::Real(_) => Kind::Real,
            VectorData::Float(_) => Kind::Float,
            VectorData::Char(_) => Kind::Char,
            VectorData::Symbol(_) => Kind::Symbol,
            VectorData::Timestamp(_) => Kind::Timestamp,
            VectorData::Month(_) => Kind::Month,
            VectorData::Date(_) => Kind::Date,
            VectorData::Datetime(_) => Kind::Datetime,
            VectorData::Timespan(_) => Kind::Timespan,
            VectorData::Minute(_) => Kind::Minute,
            VectorData::Second(_) => Kind::Second,
            VectorData::Time(_) => Kind::Time,
            VectorData::Mixed(_) => return None,
        };
        Some(kind)
    }

    pub fn len(&self) -> usize {
        match self {
            VectorData::Boolean(v) => v.len(),
            VectorData::Guid(v) => v.len(),
            VectorData::Byte(v) | VectorData::Char(v) => v.len(),
            VectorData::Short(v) => v.len(),
            VectorData::Int(v)
            | VectorData::Month(v)
            | VectorData::Date(v)
            | VectorData::Minute(v)
            | VectorData::Second(v)
            | VectorData::Time(v) => v.len(),
            VectorData::Long(v) | VectorData::Timestamp(v) | VectorData::Timespan(v) => v.len(),
            VectorData::Real(v) => v.len(),
            VectorData::Float(v) | VectorData::Datetime(v) => v.len(),
            VectorData::Symbol(v) => v.len(),
            VectorData::Mixed(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element `index` as a value: an atom, or the item of a mixed list.
    pub fn get(&self, index: usize) -> Option<Value> {
        let atom = match self {
            VectorData::Boolean(v) => Atom::Boolean(*v.get(index)?),
            VectorData::Guid(v) => Atom::Guid(*v.get(index)?),
            VectorData::Byte(v) => Atom::Byte(*v.get(index)?),
            VectorData::Short(v) => Atom::Short(*v.get(index)?),
            VectorData::Int(v) => Atom::Int(*v.get(index)?),
            VectorData::Long(v) => Atom::Long(*v.get(index)?),
            VectorData::Real(v) => Atom::Real(*v.get(index)?),
            VectorData::Float(v) => Atom::Float(*v.get(index)?),
            VectorData::Char(v) => Atom::Char(*v.get(index)?),
            VectorData::Symbol(v) => Atom::Symbol(v.get(index)?.clone()),
            VectorData::Timestamp(v) => Atom::Timestamp(*v.get(index)?),
            VectorData::Month(v) => Atom::Month(*v.get(index)?),
            VectorData::Date(v) => Atom::Date(*v.get(index)?),
            VectorData::Datetime(v) => Atom::Datetime(*v.get(index)?),
            VectorData::Timespan(v) => Atom::Timespan(*v.get(index)?),
            VectorData::Minute(v) => Atom::Minute(*v.get(index)?),
            VectorData::Second(v) => Atom::Second(*v.get(index)?),
            VectorData::Time(v) => Atom::Time(*v.get(index)?),
            VectorData::Mixed(v) => return v.get(index).cloned(),
        };
        Some(Value::Atom(atom))
    }
}

/// A vector: attribute byte plus elements.
#[derive(Debug, Clone, PartialEq)]
pub struct Vector {
    pub attribute: Attribute,
    pub data: VectorData,
}

impl Vector {
    /// Vector with no attribute.
    pub fn new(data: VectorData) -> Self {
        Self {
            attribute: Attribute::NONE,
            data,
        }
    }

    pub fn with_attribute(mut self, attribute: Attribute) -> Self {
        self.attribute = attribute;
        self
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn type_tag(&self) -> TypeTag {
        match self.data.kind() {
            Some(kind) => TypeTag::Vector(kind),
            None => TypeTag::MixedList,
        }
    }
}

impl From<VectorData> for Vector {
    fn from(data: VectorData) -> Self {
        Vector::new(data)
    }
}

/// Map from a keys value to a values value of the same length.
#[derive(Debug, Clone, PartialEq)]
pub struct Dictionary {
    pub keys: Box<Value>,
    pub values: Box<Value>,
}

impl Dictionary {
    pub fn new(keys: impl Into<Value>, values: impl Into<Value>) -> Self {
        Self {
            keys: Box::new(keys.into()),
            values: Box::new(values.into()),
        }
    }
}

/// A table: a dictionary from a symbol vector of column names to a mixed
/// list of equally long column vectors.
///
/// The shape is checked on construction, so the accessors never fail.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    attribute: Attribute,
    columns: Dictionary,
}

impl Table {
    /// Build a table from column names and columns.
    ///
    /// # Example
    ///
    /// ```
    /// use qwire_client::codec::{Table, Vector, VectorData};
    ///
    /// let trades = Table::new(
    ///     vec!["sym".into(), "px".into()],
    ///     vec![
    ///         Vector::new(VectorData::Symbol(vec!["a".into(), "b".into()])),
    ///         Vector::new(VectorData::Float(vec![1.5, 2.5])),
    ///     ],
    /// )
    /// .unwrap();
    ///
    /// assert_eq!(trades.num_rows(), 2);
    /// assert!(trades.column("px").is_some());
    /// ```
    pub fn new(names: Vec<String>, columns: Vec<Vector>) -> Result<Self> {
        let dict = Dictionary::new(
            Vector::new(VectorData::Symbol(names)),
            Vector::new(VectorData::Mixed(
                columns.into_iter().map(Value::Vector).collect(),
            )),
        );
        Self::from_dictionary(Attribute::NONE, dict)
    }

    /// Wrap a dictionary, checking it has the shape of a table.
    pub fn from_dictionary(attribute: Attribute, columns: Dictionary) -> Result<Self> {
        let names = match &*columns.keys {
            Value::Vector(Vector {
                data: VectorData::Symbol(names),
                ..
            }) => names.len(),
            other => {
                return Err(QwireError::InvalidValue(format!(
                    "Table column names must be a symbol vector, got {}",
                    other.type_tag()
                )))
            }
        };

        let cols = match &*columns.values {
            Value::Vector(Vector {
                data: VectorData::Mixed(cols),
                ..
            }) => cols,
            other => {
                return Err(QwireError::InvalidValue(format!(
                    "Table columns must be a mixed list, got {}",
                    other.type_tag()
                )))
            }
        };

        if cols.len() != names {
            return Err(QwireError::InvalidValue(format!(
                "Table has {} column names but {} columns",
                names,
                cols.len()
            )));
        }

        let mut rows = None;
        for col in cols {
            let len = match col {
                Value::Vector(v) => v.len(),
                other => {
                    return Err(QwireError::InvalidValue(format!(
                        "Table column must be a vector, got {}",
                        other.type_tag()
                    )))
                }
            };
            match rows {
                None => rows = Some(len),
                Some(n) if n != len => {
                    return Err(QwireError::InvalidValue(format!(
                        "Table columns differ in length: {} and {}",
                        n, len
                    )))
                }
                Some(_) => {}
            }
        }

        Ok(Self { attribute, columns })
    }

    #[inline]
    pub fn attribute(&self) -> Attribute {
        self.attribute
    }

    /// The underlying column dictionary.
    #[inline]
    pub fn as_dictionary(&self) -> &Dictionary {
        &self.columns
    }

    pub fn into_dictionary(self) -> Dictionary {
        self.columns
    }

    pub fn column_names(&self) -> &[String] {
        match &*self.columns.keys {
            Value::Vector(Vector {
                data: VectorData::Symbol(names),
                ..
            }) => names,
            _ => &[],
        }
    }

    /// Columns in order.
    pub fn columns(&self) -> impl Iterator<Item = &Vector> {
        let cols: &[Value] = match &*self.columns.values {
            Value::Vector(Vector {
                data: VectorData::Mixed(cols),
                ..
            }) => cols,
            _ => &[],
        };
        cols.iter().filter_map(Value::as_vector)
    }

    pub fn column(&self, name: &str) -> Option<&Vector> {
        let idx = self.column_names().iter().position(|n| n == name)?;
        self.columns().nth(idx)
    }

    pub fn num_rows(&self) -> usize {
        self.columns().next().map_or(0, Vector::len)
    }
}

/// Recursive payload value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Atom(Atom),
    Vector(Vector),
    Dictionary(Dictionary),
    Table(Table),
    /// Unary primitive; the server sends `(::)` as `Unary(0)`.
    Unary(u8),
    /// Error raised by the server.
    Error(String),
}

impl Value {
    /// The generic null `(::)`.
    pub const IDENTITY: Value = Value::Unary(0);

    pub fn symbol(s: impl Into<String>) -> Self {
        Value::Atom(Atom::Symbol(s.into()))
    }

    /// A q string, i.e. a char vector. This is how query text is sent.
    pub fn string(s: impl AsRef<str>) -> Self {
        Value::Vector(Vector::new(VectorData::Char(s.as_ref().as_bytes().to_vec())))
    }

    /// A mixed list; `(f; x; y)` calls `f` with `x` and `y` on the server.
    pub fn list(items: Vec<Value>) -> Self {
        Value::Vector(Vector::new(VectorData::Mixed(items)))
    }

    pub fn type_tag(&self) -> TypeTag {
        match self {
            Value::Atom(a) => TypeTag::Atom(a.kind()),
            Value::Vector(v) => v.type_tag(),
            Value::Dictionary(_) => TypeTag::Dictionary,
            Value::Table(_) => TypeTag::Table,
            Value::Unary(_) => TypeTag::UnaryPrimitive,
            Value::Error(_) => TypeTag::Error,
        }
    }

    #[inline]
    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    pub fn as_atom(&self) -> Option<&Atom> {
        match self {
            Value::Atom(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<&Vector> {
        match self {
            Value::Vector(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_dictionary(&self) -> Option<&Dictionary> {
        match self {
            Value::Dictionary(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&Table> {
        match self {
            Value::Table(t) => Some(t),
            _ => None,
        }
    }

    /// Text of a char vector, a symbol atom or an error.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Vector(Vector {
                data: VectorData::Char(bytes),
                ..
            }) => std::str::from_utf8(bytes).ok(),
            Value::Atom(Atom::Symbol(s)) | Value::Error(s) => Some(s),
            _ => None,
        }
    }

    /// Turn an error value into [`QwireError::Remote`].
    pub fn into_result(self) -> Result<Value> {
        match self {
            Value::Error(msg) => Err(QwireError::Remote(msg)),
            other => Ok(other),
        }
    }
}

impl From<Atom> for Value {
    fn from(a: Atom) -> Self {
        Value::Atom(a)
    }
}

impl From<Vector> for Value {
    fn from(v: Vector) -> Self {
        Value::Vector(v)
    }
}

impl From<VectorData> for Value {
    fn from(data: VectorData) -> Self {
        Value::Vector(Vector::new(data))
    }
}

impl From<Dictionary> for Value {
    fn from(d: Dictionary) -> Self {
        Value::Dictionary(d)
    }
}

impl From<Table> for Value {
    fn from(t: Table) -> Self {
        Value::Table(t)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Atom(Atom::Boolean(b))
    }
}

impl From<i16> for Value {
    fn from(n: i16) -> Self {
        Value::Atom(Atom::Short(n))
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Atom(Atom::Int(n))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Atom(Atom::Long(n))
    }
}

impl From<f32> for Value {
    fn from(x: f32) -> Self {
        Value::Atom(Atom::Real(x))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Atom(Atom::Float(x))
    }
}

impl From<Guid> for Value {
    fn from(g: Guid) -> Self {
        Value::Atom(Atom::Guid(g))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_get() {
        let syms = VectorData::Symbol(vec!["a".into(), "b".into()]);
        assert_eq!(syms.get(1), Some(Value::symbol("b")));
        assert_eq!(syms.get(2), None);

        let mixed = VectorData::Mixed(vec![Value::string("x")]);
        assert_eq!(mixed.get(0), Some(Value::string("x")));
    }

    fn trades() -> Table {
        Table::new(
            vec!["sym".into(), "size".into()],
            vec![
                Vector::new(VectorData::Symbol(vec!["ibm".into(), "msft".into()])),
                Vector::new(VectorData::Long(vec![100, 200])),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_table_accessors() {
        let t = trades();
        assert_eq!(t.column_names(), ["sym", "size"]);
        assert_eq!(t.num_rows(), 2);
        assert_eq!(
            t.column("size").map(|c| &c.data),
            Some(&VectorData::Long(vec![100, 200]))
        );
        assert!(t.column("price").is_none());
    }

    #[test]
    fn test_table_rejects_ragged_columns() {
        let result = Table::new(
            vec!["a".into(), "b".into()],
            vec![
                Vector::new(VectorData::Int(vec![1, 2])),
                Vector::new(VectorData::Int(vec![1])),
            ],
        );
        assert!(matches!(result, Err(QwireError::InvalidValue(_))));
    }

    #[test]
    fn test_table_rejects_name_count_mismatch() {
        let result = Table::new(vec!["a".into()], vec![]);
        assert!(result.is_err());
    }

    #[test]
    fn test_table_rejects_non_symbol_keys() {
        let dict = Dictionary::new(
            VectorData::Int(vec![1]),
            VectorData::Mixed(vec![VectorData::Int(vec![1]).into()]),
        );
        assert!(Table::from_dictionary(Attribute::NONE, dict).is_err());
    }

    #[test]
    fn test_error_into_result() {
        let err = Value::Error("access".into()).into_result().unwrap_err();
        assert!(matches!(err, QwireError::Remote(ref m) if m == "access"));
        assert_eq!(Value::from(1i64).into_result().unwrap(), Value::Atom(Atom::Long(1)));
    }

    #[test]
    fn test_string_and_symbol() {
        assert_eq!(Value::string("1+1").as_str(), Some("1+1"));
        assert_eq!(Value::symbol("trade").as_str(), Some("trade"));
        assert_eq!(Value::string("x").type_tag(), TypeTag::Vector(Kind::Char));
        assert_eq!(Value::symbol("x").type_tag(), TypeTag::Atom(Kind::Symbol));
    }

    #[test]
    fn test_type_tags() {
        assert_eq!(Value::list(vec![]).type_tag(), TypeTag::MixedList);
        assert_eq!(Value::IDENTITY.type_tag(), TypeTag::UnaryPrimitive);
        assert_eq!(Value::from(trades()).type_tag(), TypeTag::Table);
        assert_eq!(Value::Error("x".into()).type_tag().as_i8(), -128);
    }
}
