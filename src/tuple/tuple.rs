use std::sync::Arc;

use bytes::BufMut;

use super::{Schema, Value};
use crate::common::{RecordId, Result, ShaleError};

/// A single row of a table.
///
/// A tuple holds one value per schema column and, once it has been placed in
/// a heap page, the `RecordId` of the slot it lives in.
///
/// ## Tuple Binary Format
///
/// ```text
/// +----------------+----------+----------+-----+
/// | Null Bitmap    | Column 0 | Column 1 | ... |
/// | (N bytes)      |          |          |     |
/// +----------------+----------+----------+-----+
/// ```
///
/// - **Null Bitmap**: ceil(column_count / 8) bytes, bit `i % 8` of byte `i / 8`
///   set when column `i` is NULL
/// - **Columns**: every column at its fixed width, NULL columns zero-filled
///
/// The encoded length is always `schema.tuple_size()`, which is what lets a
/// heap page carve itself into equal slots.
#[derive(Debug, Clone)]
pub struct Tuple {
    schema: Arc<Schema>,
    values: Vec<Value>,
    record_id: Option<RecordId>,
}

impl Tuple {
    /// Creates a new tuple with the given schema and values.
    ///
    /// # Panics
    /// Panics if the number of values doesn't match the schema column count.
    pub fn new(schema: Arc<Schema>, values: Vec<Value>) -> Self {
        assert_eq!(
            values.len(),
            schema.column_count(),
            "Value count must match schema column count"
        );
        Self {
            schema,
            values,
            record_id: None,
        }
    }

    /// Decodes a tuple from exactly one slot's worth of bytes.
    pub fn from_bytes(schema: Arc<Schema>, data: &[u8]) -> Result<Self> {
        if data.len() < schema.tuple_size() {
            return Err(ShaleError::SchemaMismatch(format!(
                "tuple needs {} bytes, slot has {}",
                schema.tuple_size(),
                data.len()
            )));
        }

        let bitmap = &data[..schema.null_bitmap_size()];
        let mut cursor = &data[schema.null_bitmap_size()..schema.tuple_size()];
        let mut values = Vec::with_capacity(schema.column_count());

        for (i, col) in schema.columns().enumerate() {
            let value = Value::deserialize_from(&mut cursor, col.data_type()).ok_or_else(|| {
                ShaleError::SchemaMismatch(format!("truncated column {}", col.name()))
            })?;
            if bitmap[i / 8] & (1 << (i % 8)) != 0 {
                values.push(Value::Null);
            } else {
                values.push(value);
            }
        }

        Ok(Self {
            schema,
            values,
            record_id: None,
        })
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn value(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn value_by_name(&self, name: &str) -> Option<&Value> {
        self.schema
            .column_index(name)
            .and_then(|i| self.values.get(i))
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Sets the value at the given column index.
    pub fn set_value(&mut self, index: usize, value: Value) -> bool {
        if index < self.values.len() {
            self.values[index] = value;
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns where this tuple is stored, if it has been placed in a page.
    pub fn record_id(&self) -> Option<RecordId> {
        self.record_id
    }

    pub fn set_record_id(&mut self, record_id: Option<RecordId>) {
        self.record_id = record_id;
    }

    /// Encodes the tuple into `out`, which must be at least `tuple_size()` bytes.
    pub fn write_to(&self, out: &mut [u8]) -> Result<()> {
        let size = self.schema.tuple_size();
        if out.len() < size {
            return Err(ShaleError::SchemaMismatch(format!(
                "slot of {} bytes cannot hold a {} byte tuple",
                out.len(),
                size
            )));
        }

        let (bitmap, mut rest) = out[..size].split_at_mut(self.schema.null_bitmap_size());
        bitmap.fill(0);

        for (i, (col, value)) in self.schema.columns().zip(&self.values).enumerate() {
            if value.is_null() {
                if !col.is_nullable() {
                    return Err(ShaleError::SchemaMismatch(format!(
                        "column {} is not nullable",
                        col.name()
                    )));
                }
                bitmap[i / 8] |= 1 << (i % 8);
            }
            if !value.serialize_into(col.data_type(), &mut rest) {
                return Err(ShaleError::SchemaMismatch(format!(
                    "value {} does not fit column {} of type {}",
                    value,
                    col.name(),
                    col.data_type()
                )));
            }
        }

        Ok(())
    }

    /// Encodes the tuple into a fresh buffer of `tuple_size()` bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = vec![0u8; self.schema.tuple_size()];
        self.write_to(&mut bytes)?;
        Ok(bytes)
    }
}

/// Tuples compare by schema and values; where they are stored is not part of equality.
impl PartialEq for Tuple {
    fn eq(&self, other: &Self) -> bool {
        self.schema == other.schema && self.values == other.values
    }
}

/// Builder for constructing tuples fluently.
pub struct TupleBuilder {
    schema: Arc<Schema>,
    values: Vec<Value>,
    current_index: usize,
}

impl TupleBuilder {
    pub fn new(schema: Arc<Schema>) -> Self {
        let count = schema.column_count();
        Self {
            schema,
            values: vec![Value::Null; count],
            current_index: 0,
        }
    }

    /// Sets the value at the current position and advances.
    pub fn value(mut self, value: impl Into<Value>) -> Self {
        if self.current_index < self.values.len() {
            self.values[self.current_index] = value.into();
            self.current_index += 1;
        }
        self
    }

    /// Sets a null value at the current position and advances.
    pub fn null(mut self) -> Self {
        self.current_index += 1;
        self
    }

    /// Sets the value for a specific column by name.
    pub fn set(mut self, name: &str, value: impl Into<Value>) -> Self {
        if let Some(index) = self.schema.column_index(name) {
            self.values[index] = value.into();
        }
        self
    }

    pub fn build(self) -> Tuple {
        Tuple::new(self.schema, self.values)
    }
}
