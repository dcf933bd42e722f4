//! Column dtypes and typed column buffers

use std::iter;

use serde::{Deserialize, Serialize};

use crate::value::{Value, ValueKind};

/// Inferred storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DType {
    /// Every cell is an integer
    Integer,
    /// Every cell is numeric or missing
    Float,
    /// Every cell is a boolean
    Boolean,
    /// Anything else (text, arrays, objects, mixed kinds)
    Opaque,
}

/// Set of value kinds observed in one column.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct KindSet(u8);

impl KindSet {
    const fn bit(kind: ValueKind) -> u8 {
        match kind {
            ValueKind::Null => 1,
            ValueKind::Integer => 1 << 1,
            ValueKind::Float => 1 << 2,
            ValueKind::Boolean => 1 << 3,
            ValueKind::Text => 1 << 4,
            ValueKind::Opaque => 1 << 5,
        }
    }

    pub(crate) fn insert(&mut self, kind: ValueKind) {
        self.0 |= Self::bit(kind);
    }

    const fn has(self, kind: ValueKind) -> bool {
        self.0 & Self::bit(kind) != 0
    }

    /// Single numeric kind wins, int/float/null widens to float, everything else is opaque.
    pub(crate) fn resolve(self) -> DType {
        if self.has(ValueKind::Text) || self.has(ValueKind::Opaque) {
            return DType::Opaque;
        }

        let numeric = [
            (ValueKind::Integer, DType::Integer),
            (ValueKind::Float, DType::Float),
            (ValueKind::Boolean, DType::Boolean),
        ];
        let mut seen = numeric.iter().filter(|(kind, _)| self.has(*kind));

        match (seen.next(), seen.next(), self.has(ValueKind::Null)) {
            (Some((_, dtype)), None, false) => *dtype,
            _ if !self.has(ValueKind::Boolean) => DType::Float,
            _ => DType::Opaque,
        }
    }
}

/// Contiguous, typed storage for one materialized column.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnBuffer {
    /// `i64` cells
    Integer(Vec<i64>),
    /// `f64` cells (`NaN` for missing)
    Float(Vec<f64>),
    /// `bool` cells
    Boolean(Vec<bool>),
    /// Untyped cells
    Opaque(Vec<Value>),
}

impl ColumnBuffer {
    /// Empty buffer of the given dtype with room for `capacity` cells.
    #[must_use]
    pub fn with_capacity(dtype: DType, capacity: usize) -> Self {
        match dtype {
            DType::Integer => Self::Integer(Vec::with_capacity(capacity)),
            DType::Float => Self::Float(Vec::with_capacity(capacity)),
            DType::Boolean => Self::Boolean(Vec::with_capacity(capacity)),
            DType::Opaque => Self::Opaque(Vec::with_capacity(capacity)),
        }
    }

    /// Storage dtype of the buffer.
    #[must_use]
    pub const fn dtype(&self) -> DType {
        match self {
            Self::Integer(_) => DType::Integer,
            Self::Float(_) => DType::Float,
            Self::Boolean(_) => DType::Boolean,
            Self::Opaque(_) => DType::Opaque,
        }
    }

    /// Number of cells.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Integer(buf) => buf.len(),
            Self::Float(buf) => buf.len(),
            Self::Boolean(buf) => buf.len(),
            Self::Opaque(buf) => buf.len(),
        }
    }

    /// True if the buffer holds no cells.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cell at `index` as a [`Value`].
    #[must_use]
    pub fn value(&self, index: usize) -> Option<Value> {
        match self {
            Self::Integer(buf) => buf.get(index).copied().map(Value::Integer),
            Self::Float(buf) => buf.get(index).copied().map(Value::Float),
            Self::Boolean(buf) => buf.get(index).copied().map(Value::Boolean),
            Self::Opaque(buf) => buf.get(index).cloned(),
        }
    }

    /// Append one cell.
    pub fn push(&mut self, value: &Value) {
        self.push_repeated(value, 1);
    }

    /// Append `count` copies of a cell.
    ///
    /// A value that does not fit the buffer's dtype promotes the buffer to
    /// [`ColumnBuffer::Opaque`] first.
    #[allow(clippy::cast_precision_loss)]
    pub fn push_repeated(&mut self, value: &Value, count: usize) {
        match (&mut *self, value) {
            (Self::Integer(buf), Value::Integer(i)) => buf.extend(iter::repeat(*i).take(count)),
            (Self::Boolean(buf), Value::Boolean(b)) => buf.extend(iter::repeat(*b).take(count)),
            (Self::Float(buf), Value::Float(f)) => buf.extend(iter::repeat(*f).take(count)),
            (Self::Float(buf), Value::Integer(i)) => {
                buf.extend(iter::repeat(*i as f64).take(count));
            }
            (Self::Float(buf), Value::Null) => buf.extend(iter::repeat(f64::NAN).take(count)),
            (Self::Opaque(buf), v) => buf.extend(iter::repeat(v).take(count).cloned()),
            _ => {
                self.promote_to_opaque();
                self.push_repeated(value, count);
            }
        }
    }

    fn promote_to_opaque(&mut self) {
        let cells = match std::mem::replace(self, Self::Opaque(Vec::new())) {
            Self::Integer(buf) => buf.into_iter().map(Value::Integer).collect(),
            Self::Float(buf) => buf.into_iter().map(Value::Float).collect(),
            Self::Boolean(buf) => buf.into_iter().map(Value::Boolean).collect(),
            Self::Opaque(buf) => buf,
        };
        *self = Self::Opaque(cells);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(kinds: &[ValueKind]) -> DType {
        let mut set = KindSet::default();
        for kind in kinds {
            set.insert(*kind);
        }
        set.resolve()
    }

    #[test]
    fn test_resolve_single_kinds() {
        assert_eq!(resolve(&[ValueKind::Integer]), DType::Integer);
        assert_eq!(resolve(&[ValueKind::Float]), DType::Float);
        assert_eq!(resolve(&[ValueKind::Boolean]), DType::Boolean);
        assert_eq!(resolve(&[ValueKind::Text]), DType::Opaque);
        assert_eq!(resolve(&[ValueKind::Opaque]), DType::Opaque);
    }

    #[test]
    fn test_resolve_mixed_kinds() {
        assert_eq!(resolve(&[ValueKind::Integer, ValueKind::Float]), DType::Float);
        assert_eq!(resolve(&[ValueKind::Integer, ValueKind::Null]), DType::Float);
        assert_eq!(resolve(&[ValueKind::Null]), DType::Float);
        assert_eq!(resolve(&[]), DType::Float);
        assert_eq!(resolve(&[ValueKind::Boolean, ValueKind::Integer]), DType::Opaque);
        assert_eq!(resolve(&[ValueKind::Boolean, ValueKind::Null]), DType::Opaque);
        assert_eq!(resolve(&[ValueKind::Integer, ValueKind::Text]), DType::Opaque);
    }

    #[test]
    fn test_push_widens_integers_into_float_buffer() {
        let mut buffer = ColumnBuffer::with_capacity(DType::Float, 3);
        buffer.push(&Value::Integer(2));
        buffer.push(&Value::missing());
        buffer.push(&Value::Null);

        let ColumnBuffer::Float(cells) = &buffer else {
            panic!("expected float buffer, got {buffer:?}");
        };
        assert!((cells[0] - 2.0).abs() < f64::EPSILON);
        assert!(cells[1].is_nan());
        assert!(cells[2].is_nan());
    }

    #[test]
    fn test_misfit_value_promotes_to_opaque() {
        let mut buffer = ColumnBuffer::with_capacity(DType::Integer, 2);
        buffer.push(&Value::Integer(1));
        buffer.push_repeated(&Value::from("x"), 2);

        assert_eq!(buffer.dtype(), DType::Opaque);
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.value(0), Some(Value::Integer(1)));
        assert_eq!(buffer.value(2), Some(Value::from("x")));
    }
}
