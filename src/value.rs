//! Cell values, row keys and field maps
//!
//! Every cell in a [`Table`](crate::table::Table) is a [`Value`], a closed set of
//! variants. Scalars get their own variant; JSON arrays and objects are kept
//! verbatim as [`Value::Opaque`].

use std::fmt;

use indexmap::IndexMap;
use serde_json::Number;

/// Insertion-ordered mapping from column name to a single value.
pub type Fields = IndexMap<String, Value>;

/// Insertion-ordered mapping from column name to an equal-length sequence of values.
pub type Packed = IndexMap<String, Vec<Value>>;

/// A single cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Explicit `null`
    Null,
    /// Signed integer
    Integer(i64),
    /// Floating point (`NaN` marks a missing cell after materialization)
    Float(f64),
    /// Boolean
    Boolean(bool),
    /// UTF-8 text
    Text(String),
    /// Any JSON array or object
    Opaque(serde_json::Value),
}

/// The variant of a [`Value`], used by dtype inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// `Value::Null`
    Null,
    /// `Value::Integer`
    Integer,
    /// `Value::Float`
    Float,
    /// `Value::Boolean`
    Boolean,
    /// `Value::Text`
    Text,
    /// `Value::Opaque`
    Opaque,
}

impl Value {
    /// The value used for a missing cell.
    #[must_use]
    pub const fn missing() -> Self {
        Self::Float(f64::NAN)
    }

    /// Variant tag.
    #[must_use]
    pub const fn kind(&self) -> ValueKind {
        match self {
            Self::Null => ValueKind::Null,
            Self::Integer(_) => ValueKind::Integer,
            Self::Float(_) => ValueKind::Float,
            Self::Boolean(_) => ValueKind::Boolean,
            Self::Text(_) => ValueKind::Text,
            Self::Opaque(_) => ValueKind::Opaque,
        }
    }

    /// True for `Null` and `NaN`.
    #[must_use]
    pub fn is_missing(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Float(f) => f.is_nan(),
            _ => false,
        }
    }

    /// Integer payload, if any.
    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric payload widened to `f64` (integers included).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Text payload, if any.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// JSON array payload, if any.
    #[must_use]
    pub fn as_array(&self) -> Option<&Vec<serde_json::Value>> {
        match self {
            Self::Opaque(serde_json::Value::Array(items)) => Some(items),
            _ => None,
        }
    }

    /// Encode as JSON. Non-finite floats become `null`.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Integer(i) => serde_json::Value::from(*i),
            Self::Float(f) => {
                Number::from_f64(*f).map_or(serde_json::Value::Null, serde_json::Value::Number)
            }
            Self::Boolean(b) => serde_json::Value::Bool(*b),
            Self::Text(s) => serde_json::Value::String(s.clone()),
            Self::Opaque(v) => v.clone(),
        }
    }

    /// Wrap a sequence of values as an `Opaque` JSON array.
    #[must_use]
    pub fn list(values: &[Self]) -> Self {
        Self::Opaque(serde_json::Value::Array(
            values.iter().map(Self::to_json).collect(),
        ))
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Boolean(b),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map_or_else(|| Self::Float(n.as_f64().unwrap_or(f64::NAN)), Self::Integer),
            serde_json::Value::String(s) => Self::Text(s),
            other => Self::Opaque(other),
        }
    }
}

impl From<&Value> for serde_json::Value {
    fn from(value: &Value) -> Self {
        value.to_json()
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("None"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(x) if x.is_nan() => f.write_str("nan"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Text(s) => f.write_str(s),
            Self::Opaque(v) => write!(f, "{v}"),
        }
    }
}

/// Build a [`Fields`] map from `(name, value)` pairs.
///
/// ```rust
/// use benchmark_store::value::{fields, Value};
///
/// let row = fields([("family", Value::from("UCB")), ("alpha", Value::from(0.5))]);
/// assert_eq!(row["family"], Value::from("UCB"));
/// ```
pub fn fields<K, I>(pairs: I) -> Fields
where
    K: Into<String>,
    I: IntoIterator<Item = (K, Value)>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

/// Build a [`Packed`] map from `(name, values)` pairs.
pub fn packed<K, I>(pairs: I) -> Packed
where
    K: Into<String>,
    I: IntoIterator<Item = (K, Vec<Value>)>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

/// Convert a JSON object into [`Fields`], preserving key order.
#[must_use]
pub fn fields_from_json(map: serde_json::Map<String, serde_json::Value>) -> Fields {
    map.into_iter().map(|(k, v)| (k, Value::from(v))).collect()
}

/// Convert [`Fields`] into a JSON object, preserving key order.
#[must_use]
pub fn fields_to_json(fields: &Fields) -> serde_json::Map<String, serde_json::Value> {
    fields.iter().map(|(k, v)| (k.clone(), v.to_json())).collect()
}

/// Reserved field name carrying the packed part of a row on the wire.
pub const PACKED_FIELD: &str = "_packed";

/// Remove the reserved `_packed` entry from wire-shaped fields.
///
/// The entry must be a JSON object whose values are all arrays.
pub(crate) fn take_packed(fields: &mut Fields) -> std::result::Result<Option<Packed>, String> {
    let Some(entry) = fields.shift_remove(PACKED_FIELD) else {
        return Ok(None);
    };

    let Value::Opaque(serde_json::Value::Object(map)) = entry else {
        return Err(format!("'{PACKED_FIELD}' must be an object of arrays, got {entry}"));
    };

    map.into_iter()
        .map(|(column, values)| match values {
            serde_json::Value::Array(items) => {
                Ok((column, items.into_iter().map(Value::from).collect()))
            }
            other => Err(format!(
                "packed column '{column}' must be an array, got {other}"
            )),
        })
        .collect::<std::result::Result<Packed, String>>()
        .map(Some)
}

/// Encode a packed part as the JSON object stored under `_packed`.
#[must_use]
pub fn packed_to_json(packed: &Packed) -> serde_json::Value {
    serde_json::Value::Object(
        packed
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::Array(v.iter().map(Value::to_json).collect())))
            .collect(),
    )
}

/// One component of a row key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyPart {
    /// Integer id
    Integer(i64),
    /// Text id
    Text(String),
}

impl KeyPart {
    /// The key part as a cell value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Integer(i) => Value::Integer(*i),
            Self::Text(s) => Value::Text(s.clone()),
        }
    }
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(i) => write!(f, "{i}"),
            Self::Text(s) => write!(f, "'{s}'"),
        }
    }
}

impl From<i64> for KeyPart {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for KeyPart {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<&str> for KeyPart {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for KeyPart {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Ordered tuple of key parts identifying one row of a table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowKey(Vec<KeyPart>);

impl RowKey {
    /// Build a key from its parts.
    #[must_use]
    pub const fn new(parts: Vec<KeyPart>) -> Self {
        Self(parts)
    }

    /// Number of key components.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.0.len()
    }

    /// Key components in order.
    #[must_use]
    pub fn parts(&self) -> &[KeyPart] {
        &self.0
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let [single] = self.0.as_slice() {
            return write!(f, "{single}");
        }
        f.write_str("(")?;
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{part}")?;
        }
        f.write_str(")")
    }
}

impl From<Vec<KeyPart>> for RowKey {
    fn from(parts: Vec<KeyPart>) -> Self {
        Self(parts)
    }
}

impl From<KeyPart> for RowKey {
    fn from(part: KeyPart) -> Self {
        Self(vec![part])
    }
}

impl From<i64> for RowKey {
    fn from(value: i64) -> Self {
        Self(vec![KeyPart::from(value)])
    }
}

impl From<i32> for RowKey {
    fn from(value: i32) -> Self {
        Self(vec![KeyPart::from(value)])
    }
}

impl From<&str> for RowKey {
    fn from(value: &str) -> Self {
        Self(vec![KeyPart::from(value)])
    }
}

impl From<String> for RowKey {
    fn from(value: String) -> Self {
        Self(vec![KeyPart::from(value)])
    }
}

impl From<(i64, i64)> for RowKey {
    fn from((a, b): (i64, i64)) -> Self {
        Self(vec![KeyPart::from(a), KeyPart::from(b)])
    }
}

impl From<(i32, i32)> for RowKey {
    fn from((a, b): (i32, i32)) -> Self {
        Self(vec![KeyPart::from(a), KeyPart::from(b)])
    }
}

impl From<&RowKey> for RowKey {
    fn from(key: &RowKey) -> Self {
        key.clone()
    }
}
