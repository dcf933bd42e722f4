//! Keyed tabular container with flat and packed row parts
//!
//! A [`Table`] stores one logical entity type (learners, simulations or
//! interactions). Each key owns a *flat* part (one value per column) and an
//! optional *packed* part (equal-length sequences that expand into several
//! sub-rows under the same key).
//!
//! ## Row expansion
//!
//! ```text
//! key (0,1)  flat {N: 5}  packed {reward: [1, 0, 1]}
//!
//!   simulation_id  learner_id  index  N  reward
//!   0              1           1      5  1
//!   0              1           2      5  0
//!   0              1           3      5  1
//! ```
//!
//! ## Materialization
//!
//! [`Table::materialize_columnar`] runs in two passes: dtypes and the total
//! row count are computed first, then every column is filled into a buffer
//! allocated once at full size.

mod column;

use std::fmt;

use indexmap::{IndexMap, IndexSet};
use tracing::warn;

pub use column::{ColumnBuffer, DType};

use crate::value::{take_packed, Fields, Packed, RowKey, Value, PACKED_FIELD};
use crate::{Error, Result};

use column::KindSet;

/// Synthesized 1-based position column of packed rows.
pub const INDEX_COLUMN: &str = "index";

/// Column-major materialization of a table, in column registry order.
pub type Columns = IndexMap<String, ColumnBuffer>;

#[derive(Debug, Clone, Default)]
struct StoredRow {
    flat: Fields,
    packed: Packed,
}

impl StoredRow {
    /// Number of materialized sub-rows.
    fn size(&self) -> usize {
        if self.packed.is_empty() {
            1
        } else {
            self.packed.get(INDEX_COLUMN).map_or(0, Vec::len)
        }
    }

    fn to_fields(&self) -> Fields {
        let mut fields = self.flat.clone();
        for (column, values) in &self.packed {
            fields.insert(column.clone(), Value::list(values));
        }
        fields
    }

    fn cell(&self, column: &str, position: usize) -> Value {
        self.packed
            .get(column)
            .and_then(|values| values.get(position))
            .or_else(|| self.flat.get(column))
            .cloned()
            .unwrap_or_else(|| default_cell(column))
    }
}

/// Value of a column a row does not have.
fn default_cell(column: &str) -> Value {
    if column == INDEX_COLUMN {
        Value::Integer(1)
    } else {
        Value::missing()
    }
}

/// A keyed, upsert-only columnar container.
#[derive(Debug, Clone)]
pub struct Table {
    name: String,
    primary: Vec<String>,
    columns: IndexSet<String>,
    rows: IndexMap<RowKey, StoredRow>,
    n_rows: usize,
}

impl Table {
    /// Create an empty table with the given primary key columns.
    ///
    /// # Example
    ///
    /// ```rust
    /// use benchmark_store::table::Table;
    ///
    /// let table = Table::new("Interactions", &["simulation_id", "learner_id"]);
    /// assert_eq!(table.columns(), vec!["simulation_id", "learner_id"]);
    /// assert!(table.is_empty());
    /// ```
    #[must_use]
    pub fn new(name: impl Into<String>, primary: &[&str]) -> Self {
        Self {
            name: name.into(),
            primary: primary.iter().map(|c| (*c).to_string()).collect(),
            columns: primary.iter().map(|c| (*c).to_string()).collect(),
            rows: IndexMap::new(),
            n_rows: 0,
        }
    }

    /// Table name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Primary key column names.
    #[must_use]
    pub fn primary(&self) -> &[String] {
        &self.primary
    }

    /// Column registry snapshot, in first-seen order.
    #[must_use]
    pub fn columns(&self) -> Vec<&str> {
        self.columns.iter().map(String::as_str).collect()
    }

    /// Number of materialized rows (packed rows count once per element).
    #[must_use]
    pub const fn len(&self) -> usize {
        self.n_rows
    }

    /// True if the table has no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &RowKey> + '_ {
        self.rows.keys()
    }

    /// Insert or fully replace the row under `key`.
    ///
    /// Primary key columns are filled from `key`. When `packed` is given,
    /// an `index` column numbering its elements from 1 is added to it.
    ///
    /// # Errors
    ///
    /// - [`Error::KeyArityMismatch`] if `key` has the wrong number of parts
    /// - [`Error::InvalidShape`] if the packed columns have unequal lengths,
    ///   or if `flat` holds the reserved `_packed` column
    ///
    /// The table is unchanged when an error is returned.
    pub fn set(
        &mut self,
        key: impl Into<RowKey>,
        flat: Fields,
        packed: Option<Packed>,
    ) -> Result<()> {
        let key = key.into();
        self.check_arity(&key)?;
        if flat.contains_key(PACKED_FIELD) {
            return Err(self.invalid_shape(format!(
                "'{PACKED_FIELD}' is reserved for the packed part"
            )));
        }

        let has_packed = packed.is_some();
        let mut row_packed = packed.unwrap_or_default();
        row_packed.shift_remove(INDEX_COLUMN);
        let packed_len = self.packed_length(&row_packed)?;

        let mut row_flat = Fields::with_capacity(self.primary.len() + flat.len());
        for (column, part) in self.primary.iter().zip(key.parts()) {
            row_flat.insert(column.clone(), part.to_value());
        }
        for (column, value) in flat {
            if self.primary.contains(&column) {
                warn!(table = %self.name, %column, "ignoring field that shadows a primary key column");
                continue;
            }
            row_flat.insert(column, value);
        }

        if let Some(len) = packed_len {
            let index = (1..=len)
                .map(|i| Value::Integer(i64::try_from(i).unwrap_or(i64::MAX)))
                .collect();
            row_packed.insert(INDEX_COLUMN.to_string(), index);
        }

        if has_packed {
            self.columns.insert(INDEX_COLUMN.to_string());
        }
        self.columns.extend(row_flat.keys().cloned());
        self.columns.extend(row_packed.keys().cloned());

        let row = StoredRow {
            flat: row_flat,
            packed: row_packed,
        };
        let size = row.size();
        if let Some(previous) = self.rows.insert(key, row) {
            self.n_rows -= previous.size();
        }
        self.n_rows += size;

        Ok(())
    }

    /// Insert wire-shaped fields, routing a reserved `_packed` entry to the packed part.
    ///
    /// # Errors
    ///
    /// Same as [`Table::set`]; additionally [`Error::InvalidShape`] if
    /// `_packed` is not an object of arrays.
    pub fn set_fields(&mut self, key: impl Into<RowKey>, mut fields: Fields) -> Result<()> {
        let packed = take_packed(&mut fields).map_err(|reason| self.invalid_shape(reason))?;
        self.set(key, fields, packed)
    }

    /// Row under `key` as the union of its flat and packed parts.
    ///
    /// Packed columns (including `index`) are returned as JSON arrays.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if the key is absent, [`Error::KeyArityMismatch`]
    /// if it has the wrong number of parts.
    pub fn get(&self, key: impl Into<RowKey>) -> Result<Fields> {
        let key = key.into();
        self.check_arity(&key)?;
        self.rows
            .get(&key)
            .map(StoredRow::to_fields)
            .ok_or_else(|| self.not_found(&key))
    }

    /// True if a row exists under `key`.
    pub fn contains(&self, key: impl Into<RowKey>) -> bool {
        let key = key.into();
        key.arity() == self.primary.len() && self.rows.contains_key(&key)
    }

    /// Remove the row under `key`.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if the key is absent, [`Error::KeyArityMismatch`]
    /// if it has the wrong number of parts.
    pub fn delete(&mut self, key: impl Into<RowKey>) -> Result<()> {
        let key = key.into();
        self.check_arity(&key)?;
        let row = self
            .rows
            .shift_remove(&key)
            .ok_or_else(|| self.not_found(&key))?;
        self.n_rows -= row.size();
        Ok(())
    }

    /// Rows as mappings, one per key, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = Fields> + '_ {
        self.rows.values().map(StoredRow::to_fields)
    }

    /// Storage dtype of every column, aligned with [`Table::columns`].
    #[must_use]
    pub fn infer_dtypes(&self) -> Vec<DType> {
        self.columns
            .iter()
            .map(|column| {
                let mut kinds = KindSet::default();
                for row in self.rows.values() {
                    if let Some(values) = row.packed.get(column) {
                        for value in values {
                            kinds.insert(value.kind());
                        }
                    } else if let Some(value) = row.flat.get(column) {
                        kinds.insert(value.kind());
                    } else {
                        kinds.insert(default_cell(column).kind());
                    }
                }
                kinds.resolve()
            })
            .collect()
    }

    /// Row-major materialization: one tuple per sub-row, in column order.
    #[must_use]
    pub fn materialize_rows(&self) -> Vec<Vec<Value>> {
        let mut tuples = Vec::with_capacity(self.n_rows);

        for row in self.rows.values() {
            if row.packed.is_empty() {
                tuples.push(
                    self.columns
                        .iter()
                        .map(|column| {
                            row.flat
                                .get(column)
                                .cloned()
                                .unwrap_or_else(|| default_cell(column))
                        })
                        .collect(),
                );
            } else {
                for position in 0..row.size() {
                    tuples.push(
                        self.columns
                            .iter()
                            .map(|column| row.cell(column, position))
                            .collect(),
                    );
                }
            }
        }

        tuples
    }

    /// Column-major materialization into preallocated typed buffers.
    #[must_use]
    pub fn materialize_columnar(&self) -> Columns {
        let capacity = self.n_rows;
        let mut buffers: Vec<ColumnBuffer> = self
            .infer_dtypes()
            .into_iter()
            .map(|dtype| ColumnBuffer::with_capacity(dtype, capacity))
            .collect();

        for row in self.rows.values() {
            let size = row.size();
            for (column, buffer) in self.columns.iter().zip(buffers.iter_mut()) {
                if let Some(values) = row.packed.get(column) {
                    for value in values {
                        buffer.push(value);
                    }
                } else if let Some(value) = row.flat.get(column) {
                    buffer.push_repeated(value, size);
                } else {
                    buffer.push_repeated(&default_cell(column), size);
                }
            }
        }

        self.columns.iter().cloned().zip(buffers).collect()
    }

    fn check_arity(&self, key: &RowKey) -> Result<()> {
        if key.arity() == self.primary.len() {
            Ok(())
        } else {
            Err(Error::KeyArityMismatch {
                table: self.name.clone(),
                expected: self.primary.len(),
                actual: key.arity(),
            })
        }
    }

    /// Common length of the packed columns, `None` if there are none.
    fn packed_length(&self, packed: &Packed) -> Result<Option<usize>> {
        let mut lengths = packed.iter().map(|(column, values)| (column, values.len()));

        let Some((first_column, first_len)) = lengths.next() else {
            return Ok(None);
        };

        if let Some((column, len)) = lengths.find(|(_, len)| *len != first_len) {
            return Err(self.invalid_shape(format!(
                "all packed columns must be equal length ('{first_column}' has {first_len}, '{column}' has {len})"
            )));
        }

        Ok(Some(first_len))
    }

    fn invalid_shape(&self, reason: String) -> Error {
        Error::InvalidShape {
            table: self.name.clone(),
            reason,
        }
    }

    fn not_found(&self, key: &RowKey) -> Error {
        Error::NotFound {
            table: self.name.clone(),
            key: key.to_string(),
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{Table: {}, Columns: [{}], Rows: {}}}",
            self.name,
            self.columns().join(", "),
            self.n_rows
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{fields, packed};
    use serde_json::json;

    fn text(s: &str) -> Value {
        Value::from(s)
    }

    fn same_cell(expected: &Value, actual: &Value) -> bool {
        (expected.is_missing() && actual.is_missing()) || expected == actual
    }

    #[test]
    fn test_insert_item() {
        let mut table = Table::new("test", &["a"]);

        table.set("A", fields([("b", text("B"))]), None).unwrap();
        table.set("a", fields([("b", text("B"))]), None).unwrap();

        assert!(table.contains("A"));
        assert!(table.contains("a"));
        assert_eq!(table.get("a").unwrap(), fields([("a", text("a")), ("b", text("B"))]));
        assert_eq!(table.get("A").unwrap(), fields([("a", text("A")), ("b", text("B"))]));
        assert_eq!(table.len(), 2);
        assert_eq!(
            table.materialize_rows(),
            vec![vec![text("A"), text("B")], vec![text("a"), text("B")]]
        );
    }

    #[test]
    fn test_update_item_replaces_row() {
        let mut table = Table::new("test", &["a"]);

        table.set("a", fields([("b", text("B"))]), None).unwrap();
        table.set("a", fields([("c", text("C"))]), None).unwrap();

        assert_eq!(table.len(), 1);
        assert_eq!(table.get("a").unwrap(), fields([("a", text("a")), ("c", text("C"))]));
        // columns are never removed
        assert_eq!(table.columns(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_missing_columns_materialize_as_nan() {
        let mut table = Table::new("test", &["a"]);

        table
            .set("A", fields([("b", text("B")), ("c", Value::from(1))]), None)
            .unwrap();
        table.set("B", fields([("e", text("E"))]), None).unwrap();

        assert_eq!(table.columns(), vec!["a", "b", "c", "e"]);

        let expected = [
            vec![text("A"), text("B"), Value::from(1), Value::missing()],
            vec![text("B"), Value::missing(), Value::missing(), text("E")],
        ];
        let actual = table.materialize_rows();

        assert_eq!(actual.len(), expected.len());
        for (expected_row, actual_row) in expected.iter().zip(&actual) {
            assert!(expected_row
                .iter()
                .zip(actual_row)
                .all(|(e, a)| same_cell(e, a)));
        }
    }

    #[test]
    fn test_two_pack_item() {
        let mut table = Table::new("test", &["a"]);

        table
            .set(
                "A",
                fields([("c", Value::from(1))]),
                Some(packed([
                    ("b", vec![text("B"), text("b")]),
                    ("d", vec![text("D"), text("d")]),
                ])),
            )
            .unwrap();

        assert!(table.contains("A"));
        assert_eq!(table.len(), 2);

        let row = table.get("A").unwrap();
        assert_eq!(row["a"], text("A"));
        assert_eq!(row["c"], Value::from(1));
        assert_eq!(row["index"], Value::Opaque(json!([1, 2])));
        assert_eq!(row["b"], Value::Opaque(json!(["B", "b"])));
        assert_eq!(row["d"], Value::Opaque(json!(["D", "d"])));

        assert_eq!(table.columns(), vec!["a", "index", "c", "b", "d"]);
        assert_eq!(
            table.materialize_rows(),
            vec![
                vec![text("A"), Value::from(1), Value::from(1), text("B"), text("D")],
                vec![text("A"), Value::from(2), Value::from(1), text("b"), text("d")],
            ]
        );
    }

    #[test]
    fn test_unequal_pack_rejected_before_mutation() {
        let mut table = Table::new("test", &["a"]);
        table.set("A", fields([("c", Value::from(1))]), None).unwrap();

        let result = table.set(
            "A",
            fields([("c", Value::from(2))]),
            Some(packed([
                ("b", vec![Value::from(1), Value::from(2)]),
                ("d", vec![Value::from(3)]),
            ])),
        );

        assert!(matches!(result, Err(Error::InvalidShape { .. })));
        assert_eq!(table.get("A").unwrap()["c"], Value::from(1));
        assert_eq!(table.columns(), vec!["a", "c"]);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_key_arity_mismatch() {
        let mut table = Table::new("Interactions", &["simulation_id", "learner_id"]);

        let result = table.set(0, Fields::new(), None);
        assert!(matches!(
            result,
            Err(Error::KeyArityMismatch {
                expected: 2,
                actual: 1,
                ..
            })
        ));
        assert!(!table.contains(0));
        assert!(table.is_empty());
    }

    #[test]
    fn test_get_and_delete_missing_key() {
        let mut table = Table::new("test", &["a"]);
        assert!(matches!(table.get("x"), Err(Error::NotFound { .. })));
        assert!(matches!(table.delete("x"), Err(Error::NotFound { .. })));
    }

    #[test]
    fn test_delete_updates_row_count_and_order() {
        let mut table = Table::new("test", &["a"]);
        table
            .set("A", Fields::new(), Some(packed([("r", vec![Value::from(1); 3])])))
            .unwrap();
        table.set("B", Fields::new(), None).unwrap();
        table.set("C", Fields::new(), None).unwrap();
        assert_eq!(table.len(), 5);

        table.delete("A").unwrap();
        assert_eq!(table.len(), 2);
        assert!(!table.contains("A"));

        let keys: Vec<String> = table.keys().map(ToString::to_string).collect();
        assert_eq!(keys, vec!["'B'", "'C'"]);
    }

    #[test]
    fn test_set_fields_routes_packed_entry() {
        let mut table = Table::new("Interactions", &["simulation_id", "learner_id"]);

        let wire = fields([
            ("N", Value::from(5)),
            ("_packed", Value::Opaque(json!({"reward": [1, 0, 1]}))),
        ]);
        table.set_fields((0, 1), wire).unwrap();

        assert_eq!(table.len(), 3);
        let row = table.get((0, 1)).unwrap();
        assert_eq!(row["reward"], Value::Opaque(json!([1, 0, 1])));
        assert!(!row.contains_key("_packed"));
    }

    #[test]
    fn test_set_fields_rejects_non_array_packed() {
        let mut table = Table::new("test", &["a"]);
        let wire = fields([("_packed", Value::Opaque(json!({"reward": 1})))]);
        assert!(matches!(
            table.set_fields("A", wire),
            Err(Error::InvalidShape { .. })
        ));
        assert!(table.is_empty());
    }

    #[test]
    fn test_set_rejects_reserved_flat_column() {
        let mut table = Table::new("Interactions", &["simulation_id", "learner_id"]);
        let flat = fields([("_packed", Value::Opaque(json!({"reward": [1, 0]})))]);

        assert!(matches!(
            table.set((0, 0), flat, None),
            Err(Error::InvalidShape { .. })
        ));
        assert!(table.is_empty());
        assert_eq!(table.columns(), vec!["simulation_id", "learner_id"]);
    }

    #[test]
    fn test_dtypes_int_with_gap_is_float() {
        let mut table = Table::new("test", &["a"]);
        table.set("A", fields([("c", Value::from(1))]), None).unwrap();
        table.set("B", fields([("e", text("E"))]), None).unwrap();
        table.set("C", fields([("m", Value::Opaque(json!({"z": 5})))]), None).unwrap();

        assert_eq!(
            table.infer_dtypes(),
            vec![DType::Opaque, DType::Float, DType::Opaque, DType::Opaque]
        );
    }

    #[test]
    fn test_dtypes_packed_elements() {
        let mut table = Table::new("test", &["a"]);
        table
            .set(
                "A",
                fields([("b", Value::from(1.0))]),
                Some(packed([("z", vec![Value::from(true), Value::from(false)])])),
            )
            .unwrap();
        table.set("B", fields([("b", Value::from(2.0))]), None).unwrap();

        // a, index, b, z
        assert_eq!(
            table.infer_dtypes(),
            vec![DType::Opaque, DType::Integer, DType::Float, DType::Opaque]
        );
    }

    #[test]
    fn test_columnar_matches_row_expansion() {
        let mut table = Table::new("test", &["a"]);
        table
            .set(
                "A",
                fields([("b", Value::from(1.0)), ("d", text("d"))]),
                Some(packed([("z", vec![Value::from(1), Value::from(2)])])),
            )
            .unwrap();
        table
            .set("B", fields([("b", Value::from(2.0)), ("e", text("E"))]), None)
            .unwrap();

        let columns = table.materialize_columnar();
        assert_eq!(columns.len(), 6);
        assert_eq!(columns["index"], ColumnBuffer::Integer(vec![1, 2, 1]));
        assert_eq!(columns["b"], ColumnBuffer::Float(vec![1.0, 1.0, 2.0]));
        assert_eq!(columns["d"].dtype(), DType::Opaque);

        let ColumnBuffer::Float(z) = &columns["z"] else {
            panic!("z should widen to float, got {:?}", columns["z"]);
        };
        assert_eq!(z.len(), 3);
        assert!((z[1] - 2.0).abs() < f64::EPSILON);
        assert!(z[2].is_nan());

        let rows = table.materialize_rows();
        for (i, row) in rows.iter().enumerate() {
            for (j, column) in table.columns().iter().enumerate() {
                let cell = columns[*column].value(i).unwrap();
                let expected = match (&row[j], cell.kind()) {
                    (Value::Integer(v), crate::value::ValueKind::Float) => {
                        Value::Float(f64::from(i32::try_from(*v).unwrap()))
                    }
                    (other, _) => other.clone(),
                };
                assert!(same_cell(&expected, &cell), "row {i} column {column}");
            }
        }
    }

    #[test]
    fn test_display() {
        let mut table = Table::new("Learners", &["learner_id"]);
        table.set(0, fields([("family", text("UCB"))]), None).unwrap();
        assert_eq!(
            table.to_string(),
            "{Table: Learners, Columns: [learner_id, family], Rows: 1}"
        );
    }
}
