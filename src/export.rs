//! Arrow and Parquet export of materialized tables
//!
//! | Column dtype | Arrow type          |
//! |--------------|---------------------|
//! | Integer      | `Int64`             |
//! | Float        | `Float64` (NaN kept)|
//! | Boolean      | `Boolean`           |
//! | Opaque       | nullable `Utf8`     |
//!
//! Opaque text cells are written verbatim, null and NaN cells as Arrow nulls,
//! and every other opaque cell as its JSON encoding.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;

use crate::table::{ColumnBuffer, Table};
use crate::value::Value;
use crate::{Error, Result};

impl Table {
    /// Materialize the table into a single Arrow [`RecordBatch`].
    ///
    /// # Errors
    ///
    /// [`Error::Arrow`] if the batch cannot be assembled.
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let columns = self.materialize_columnar();

        let mut fields = Vec::with_capacity(columns.len());
        let mut arrays: Vec<ArrayRef> = Vec::with_capacity(columns.len());
        for (name, buffer) in columns {
            let (data_type, nullable, array) = to_array(buffer);
            fields.push(Field::new(name, data_type, nullable));
            arrays.push(array);
        }

        let options = RecordBatchOptions::new().with_row_count(Some(self.len()));
        let batch =
            RecordBatch::try_new_with_options(Arc::new(Schema::new(fields)), arrays, &options)?;
        Ok(batch)
    }
}

fn to_array(buffer: ColumnBuffer) -> (DataType, bool, ArrayRef) {
    match buffer {
        ColumnBuffer::Integer(cells) => (DataType::Int64, false, Arc::new(Int64Array::from(cells))),
        ColumnBuffer::Float(cells) => {
            (DataType::Float64, false, Arc::new(Float64Array::from(cells)))
        }
        ColumnBuffer::Boolean(cells) => {
            (DataType::Boolean, false, Arc::new(BooleanArray::from(cells)))
        }
        ColumnBuffer::Opaque(cells) => {
            let text: StringArray = cells.iter().map(opaque_text).collect();
            (DataType::Utf8, true, Arc::new(text))
        }
    }
}

fn opaque_text(value: &Value) -> Option<String> {
    match value {
        Value::Text(text) => Some(text.clone()),
        v if v.is_missing() => None,
        v => Some(v.to_json().to_string()),
    }
}

/// Write `table` to a Parquet file at `path`.
///
/// # Errors
///
/// [`Error::StorageError`] if the file cannot be created or written.
pub fn write_parquet<P: AsRef<Path>>(table: &Table, path: P) -> Result<()> {
    let batch = table.to_record_batch()?;

    let file = File::create(path.as_ref())
        .map_err(|e| Error::StorageError(format!("Failed to create Parquet file: {e}")))?;

    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)
        .map_err(|e| Error::StorageError(format!("Failed to create Parquet writer: {e}")))?;
    writer
        .write(&batch)
        .map_err(|e| Error::StorageError(format!("Failed to write record batch: {e}")))?;
    writer
        .close()
        .map_err(|e| Error::StorageError(format!("Failed to finish Parquet file: {e}")))?;

    Ok(())
}

/// Read every record batch of the Parquet file at `path`.
///
/// # Errors
///
/// [`Error::StorageError`] if the file cannot be opened or decoded.
pub fn read_parquet<P: AsRef<Path>>(path: P) -> Result<Vec<RecordBatch>> {
    let file = File::open(path.as_ref())
        .map_err(|e| Error::StorageError(format!("Failed to open Parquet file: {e}")))?;

    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .map_err(|e| Error::StorageError(format!("Failed to parse Parquet file: {e}")))?
        .build()
        .map_err(|e| Error::StorageError(format!("Failed to create Parquet reader: {e}")))?;

    reader
        .map(|batch| {
            batch.map_err(|e| Error::StorageError(format!("Failed to read record batch: {e}")))
        })
        .collect()
}
