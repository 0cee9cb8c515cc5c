use std::collections::HashMap;
use std::sync::Arc;

use super::DataType;

/// A single column of a table schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    name: String,
    data_type: DataType,
    nullable: bool,
    /// Byte offset of the column inside the tuple, after the null bitmap
    offset: usize,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable,
            offset: 0, // Set by Schema
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    /// Returns the byte offset of this column within an encoded tuple.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn size(&self) -> usize {
        self.data_type.size()
    }
}

/// The tuple descriptor of a table.
///
/// All column types are fixed width, so every tuple of a table encodes to
/// exactly `tuple_size()` bytes: a null bitmap followed by the columns in order.
#[derive(Debug, Clone)]
pub struct Schema {
    columns: Vec<Column>,
    name_to_index: HashMap<String, usize>,
    null_bitmap_size: usize,
    tuple_size: usize,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Self {
        let mut columns = columns;
        let mut name_to_index = HashMap::new();
        let null_bitmap_size = (columns.len() + 7) / 8;

        let mut offset = null_bitmap_size;
        for (i, col) in columns.iter_mut().enumerate() {
            col.offset = offset;
            offset += col.size();
            name_to_index.insert(col.name.clone(), i);
        }

        Self {
            columns,
            name_to_index,
            null_bitmap_size,
            tuple_size: offset,
        }
    }

    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    pub fn column_by_name(&self, name: &str) -> Option<&Column> {
        self.column_index(name).and_then(|i| self.columns.get(i))
    }

    pub fn columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter()
    }

    /// Returns the size of the null bitmap in bytes (one bit per column).
    pub fn null_bitmap_size(&self) -> usize {
        self.null_bitmap_size
    }

    /// Returns the encoded width of every tuple with this schema.
    pub fn tuple_size(&self) -> usize {
        self.tuple_size
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.columns == other.columns
    }
}

impl Eq for Schema {}

/// Builder for constructing schemas fluently.
pub struct SchemaBuilder {
    columns: Vec<Column>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self {
            columns: Vec::new(),
        }
    }

    /// Adds a non-nullable column.
    pub fn column(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        self.columns.push(Column::new(name, data_type, false));
        self
    }

    /// Adds a nullable column.
    pub fn nullable_column(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        self.columns.push(Column::new(name, data_type, true));
        self
    }

    pub fn build(self) -> Schema {
        Schema::new(self.columns)
    }

    /// Builds the schema wrapped in an Arc for sharing between the catalog and heap file.
    pub fn build_arc(self) -> Arc<Schema> {
        Arc::new(self.build())
    }
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_schema() -> Schema {
        Schema::builder()
            .column("id", DataType::Integer)
            .column("name", DataType::Char(16))
            .nullable_column("email", DataType::Char(32))
            .column("age", DataType::SmallInt)
            .build()
    }

    #[test]
    fn test_schema_creation() {
        let schema = create_test_schema();

        assert_eq!(schema.column_count(), 4);
        assert_eq!(schema.column(0).unwrap().name(), "id");
        assert_eq!(schema.column(3).unwrap().name(), "age");
        assert_eq!(schema.column_index("email"), Some(2));
        assert_eq!(schema.column_index("nonexistent"), None);
        assert!(schema.column_by_name("email").unwrap().is_nullable());
    }

    #[test]
    fn test_offsets_and_width() {
        let schema = create_test_schema();

        // Null bitmap: 4 columns = 1 byte
        assert_eq!(schema.null_bitmap_size(), 1);
        assert_eq!(schema.column(0).unwrap().offset(), 1);
        assert_eq!(schema.column(1).unwrap().offset(), 5);
        assert_eq!(schema.column(2).unwrap().offset(), 21);
        assert_eq!(schema.column(3).unwrap().offset(), 53);

        // 1 + 4 + 16 + 32 + 2
        assert_eq!(schema.tuple_size(), 55);
    }

    #[test]
    fn test_wide_bitmap() {
        let mut builder = Schema::builder();
        for i in 0..9 {
            builder = builder.column(format!("c{}", i), DataType::Boolean);
        }
        let schema = builder.build();

        assert_eq!(schema.null_bitmap_size(), 2);
        assert_eq!(schema.tuple_size(), 11);
    }
}
