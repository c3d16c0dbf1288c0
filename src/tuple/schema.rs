//! # Tuple Schema
//!
//! [`TupleSchema`] is an ordered list of `(type, size, nullable, in_bytes)`
//! columns. Offsets into the fixed-width row are pre-computed at
//! construction so cell access never scans. Schemas are immutable once
//! constructed and shared behind `Arc`.

use crate::config::INLINE_TEXT_CAPACITY;
use crate::types::DataType;
use std::sync::Arc;

/// One column of a tuple schema.
#[derive(Debug, Clone)]
pub struct ColumnInfo {
    pub data_type: DataType,
    /// Declared size. For TEXT this is the inline capacity in bytes or
    /// characters (see `in_bytes`); fixed types carry their intrinsic size.
    pub size_bytes: usize,
    pub nullable: bool,
    /// True when a TEXT size is measured in bytes rather than characters.
    pub in_bytes: bool,
}

impl ColumnInfo {
    pub fn new(data_type: DataType) -> Self {
        let size = data_type.fixed_size().unwrap_or(INLINE_TEXT_CAPACITY);
        Self {
            data_type,
            size_bytes: size,
            nullable: true,
            in_bytes: true,
        }
    }

    pub fn with_size(data_type: DataType, size_bytes: usize) -> Self {
        Self {
            data_type,
            size_bytes,
            nullable: true,
            in_bytes: true,
        }
    }

    /// Stored width of this cell, including the TEXT length prefix.
    pub fn cell_width(&self) -> usize {
        match self.data_type.fixed_size() {
            Some(n) => n,
            None => 2 + self.size_bytes,
        }
    }
}

#[derive(Debug)]
pub struct TupleSchema {
    columns: Vec<ColumnInfo>,
    cell_offsets: Vec<usize>,
    bitmap_size: usize,
    tuple_size: usize,
}

impl TupleSchema {
    pub fn new(columns: Vec<ColumnInfo>) -> Arc<Self> {
        let bitmap_size = Self::null_bitmap_size(columns.len());
        let mut cell_offsets = Vec::with_capacity(columns.len());
        let mut offset = bitmap_size;
        for col in &columns {
            cell_offsets.push(offset);
            offset += col.cell_width();
        }
        Arc::new(Self {
            columns,
            cell_offsets,
            bitmap_size,
            tuple_size: offset,
        })
    }

    /// Convenience constructor from bare types with default sizes.
    pub fn from_types(types: &[DataType]) -> Arc<Self> {
        Self::new(types.iter().map(|&t| ColumnInfo::new(t)).collect())
    }

    pub fn null_bitmap_size(column_count: usize) -> usize {
        column_count.div_ceil(8)
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, idx: usize) -> &ColumnInfo {
        &self.columns[idx]
    }

    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    /// Absolute byte offset of a cell within the row.
    pub fn cell_offset(&self, idx: usize) -> usize {
        self.cell_offsets[idx]
    }

    pub fn bitmap_size(&self) -> usize {
        self.bitmap_size
    }

    /// Total row width: null bitmap plus all cells.
    pub fn tuple_size(&self) -> usize {
        self.tuple_size
    }

    /// True when both schemas lay rows out identically.
    pub fn is_compatible_with(&self, other: &TupleSchema) -> bool {
        self.column_count() == other.column_count()
            && self
                .columns
                .iter()
                .zip(other.columns.iter())
                .all(|(a, b)| a.data_type == b.data_type && a.cell_width() == b.cell_width())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_follow_the_bitmap_and_cell_widths() {
        let schema = TupleSchema::new(vec![
            ColumnInfo::new(DataType::BigInt),
            ColumnInfo::with_size(DataType::Text, 10),
            ColumnInfo::new(DataType::Double),
        ]);
        assert_eq!(schema.bitmap_size(), 1);
        assert_eq!(schema.cell_offset(0), 1);
        assert_eq!(schema.cell_offset(1), 9);
        assert_eq!(schema.cell_offset(2), 21);
        assert_eq!(schema.tuple_size(), 29);
    }

    #[test]
    fn bitmap_grows_by_eight_columns() {
        assert_eq!(TupleSchema::null_bitmap_size(0), 0);
        assert_eq!(TupleSchema::null_bitmap_size(8), 1);
        assert_eq!(TupleSchema::null_bitmap_size(9), 2);
    }

    #[test]
    fn compatibility_ignores_nullability_but_not_layout() {
        let a = TupleSchema::from_types(&[DataType::BigInt, DataType::Text]);
        let b = TupleSchema::from_types(&[DataType::BigInt, DataType::Text]);
        let c = TupleSchema::new(vec![
            ColumnInfo::new(DataType::BigInt),
            ColumnInfo::with_size(DataType::Text, 10),
        ]);
        assert!(a.is_compatible_with(&b));
        assert!(!a.is_compatible_with(&c));
    }
}
