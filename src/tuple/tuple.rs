//! # Tuple Storage and Views
//!
//! Three faces over the same fixed-width row layout:
//!
//! - [`Tuple`]: an owned scratch row whose storage can be detached. A tuple
//!   with no storage is *null* — the state every scratch tuple is moved to
//!   before its owner releases working memory. `swap_data` exchanges the
//!   storage of two tuples without copying a cell, which is how the window
//!   scan flips "current" and "previous" key tuples each row.
//! - [`PoolBackedTuple`]: a scratch row whose bytes come from a
//!   [`crate::memory::Pool`], borrowed for the duration of one execute.
//!   Same null/swap discipline as [`Tuple`]; the owner must move it to
//!   null before purging the pool it points into.
//! - [`TupleView`]: a zero-copy read view over a row in a table slab.
//!
//! Cell encoding is shared by all through [`read_cell`] / [`write_cell`].

use crate::memory::Pool;
use crate::tuple::TupleSchema;
use crate::types::{DataType, SqlValue};
use eyre::{bail, ensure, Result};
use std::sync::Arc;

fn null_bit(data: &[u8], idx: usize) -> bool {
    data[idx / 8] & (1 << (idx % 8)) != 0
}

fn set_null_bit(data: &mut [u8], idx: usize, null: bool) {
    if null {
        data[idx / 8] |= 1 << (idx % 8);
    } else {
        data[idx / 8] &= !(1 << (idx % 8));
    }
}

/// Writes one cell into a row buffer.
pub fn write_cell(data: &mut [u8], schema: &TupleSchema, idx: usize, value: &SqlValue) -> Result<()> {
    ensure!(idx < schema.column_count(), "column {} out of range", idx);
    let col = schema.column(idx);
    let offset = schema.cell_offset(idx);
    if value.is_null() {
        ensure!(col.nullable, "NULL written to non-nullable column {}", idx);
        set_null_bit(data, idx, true);
        data[offset..offset + col.cell_width()].fill(0);
        return Ok(());
    }
    set_null_bit(data, idx, false);
    match (col.data_type, value) {
        (DataType::Boolean, SqlValue::Boolean(b)) => data[offset] = *b as u8,
        (DataType::BigInt, SqlValue::BigInt(i)) => {
            data[offset..offset + 8].copy_from_slice(&i.to_le_bytes())
        }
        (DataType::Double, SqlValue::Double(f)) => {
            data[offset..offset + 8].copy_from_slice(&f.to_le_bytes())
        }
        (DataType::Timestamp, SqlValue::Timestamp(t)) => {
            data[offset..offset + 8].copy_from_slice(&t.to_le_bytes())
        }
        (DataType::Text, SqlValue::Text(s)) => {
            let bytes = s.as_bytes();
            ensure!(
                bytes.len() <= col.size_bytes,
                "text of {} bytes exceeds column capacity {}",
                bytes.len(),
                col.size_bytes
            );
            data[offset..offset + 2].copy_from_slice(&(bytes.len() as u16).to_le_bytes());
            data[offset + 2..offset + 2 + bytes.len()].copy_from_slice(bytes);
            data[offset + 2 + bytes.len()..offset + 2 + col.size_bytes].fill(0);
        }
        (t, v) => bail!(
            "type error: cannot store {:?} in {:?} column {}",
            v.data_type(),
            t,
            idx
        ),
    }
    Ok(())
}

/// Reads one cell out of a row buffer.
pub fn read_cell(data: &[u8], schema: &TupleSchema, idx: usize) -> Result<SqlValue> {
    ensure!(idx < schema.column_count(), "column {} out of range", idx);
    if null_bit(data, idx) {
        return Ok(SqlValue::Null);
    }
    let col = schema.column(idx);
    let offset = schema.cell_offset(idx);
    let value = match col.data_type {
        DataType::Boolean => SqlValue::Boolean(data[offset] != 0),
        DataType::BigInt => {
            SqlValue::BigInt(i64::from_le_bytes(data[offset..offset + 8].try_into()?))
        }
        DataType::Double => {
            SqlValue::Double(f64::from_le_bytes(data[offset..offset + 8].try_into()?))
        }
        DataType::Timestamp => {
            SqlValue::Timestamp(i64::from_le_bytes(data[offset..offset + 8].try_into()?))
        }
        DataType::Text => {
            let len = u16::from_le_bytes(data[offset..offset + 2].try_into()?) as usize;
            ensure!(len <= col.size_bytes, "corrupt text length {}", len);
            SqlValue::Text(String::from_utf8(data[offset + 2..offset + 2 + len].to_vec())?)
        }
    };
    Ok(value)
}

/// Owned scratch row. Null when it has no storage attached.
#[derive(Debug)]
pub struct Tuple {
    schema: Arc<TupleSchema>,
    data: Option<Box<[u8]>>,
}

impl Tuple {
    /// A null tuple: schema-typed but with no storage.
    pub fn null(schema: Arc<TupleSchema>) -> Self {
        Self { schema, data: None }
    }

    /// A tuple with freshly zeroed storage (all cells NULL-bit clear).
    pub fn allocated(schema: Arc<TupleSchema>) -> Self {
        let size = schema.tuple_size();
        Self {
            schema,
            data: Some(vec![0u8; size].into_boxed_slice()),
        }
    }

    pub fn is_null(&self) -> bool {
        self.data.is_none()
    }

    /// Attaches zeroed storage to a null tuple.
    pub fn allocate(&mut self) {
        if self.data.is_none() {
            self.data = Some(vec![0u8; self.schema.tuple_size()].into_boxed_slice());
        }
    }

    /// Detaches the storage, leaving a null tuple.
    pub fn move_to_null(&mut self) {
        self.data = None;
    }

    /// Exchanges the storage of two tuples. Cells stay put; only the
    /// identity of which tuple owns which buffer flips.
    pub fn swap_data(&mut self, other: &mut Tuple) {
        std::mem::swap(&mut self.data, &mut other.data);
    }

    pub fn schema(&self) -> &Arc<TupleSchema> {
        &self.schema
    }

    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    pub fn set_value(&mut self, idx: usize, value: &SqlValue) -> Result<()> {
        let Self { schema, data } = self;
        let data = data
            .as_deref_mut()
            .ok_or_else(|| eyre::eyre!("write to null tuple"))?;
        write_cell(data, schema, idx, value)
    }

    pub fn value(&self, idx: usize) -> Result<SqlValue> {
        let data = self
            .data
            .as_deref()
            .ok_or_else(|| eyre::eyre!("read from null tuple"))?;
        read_cell(data, &self.schema, idx)
    }

    /// Copies a row of the same layout into this tuple's storage.
    pub fn copy_from_view(&mut self, view: &TupleView<'_>) -> Result<()> {
        ensure!(
            self.schema.tuple_size() == view.schema().tuple_size(),
            "tuple copy between incompatible layouts"
        );
        self.allocate();
        let data = self.data.as_deref_mut().expect("storage just attached");
        data.copy_from_slice(view.data());
        Ok(())
    }

    /// Read view over this tuple's storage; errors on a null tuple.
    pub fn as_view(&self) -> Result<TupleView<'_>> {
        let data = self
            .data
            .as_deref()
            .ok_or_else(|| eyre::eyre!("view of null tuple"))?;
        Ok(TupleView::new(data, &self.schema))
    }
}

/// Scratch row backed by a memory pool. Null when it holds no storage.
#[derive(Debug)]
pub struct PoolBackedTuple<'pool> {
    schema: Arc<TupleSchema>,
    data: Option<&'pool mut [u8]>,
}

impl<'pool> PoolBackedTuple<'pool> {
    /// Allocates zeroed storage from the pool.
    pub fn allocate(pool: &'pool Pool, schema: Arc<TupleSchema>) -> Self {
        let data = pool.allocate_zeroes(schema.tuple_size());
        Self {
            schema,
            data: Some(data),
        }
    }

    pub fn is_null(&self) -> bool {
        self.data.is_none()
    }

    /// Detaches the pooled storage, leaving a null tuple. Required before
    /// the backing pool is purged.
    pub fn move_to_null(&mut self) {
        self.data = None;
    }

    /// Exchanges the storage of two tuples. Cells stay put; only the
    /// identity of which tuple owns which buffer flips.
    pub fn swap_data(&mut self, other: &mut PoolBackedTuple<'pool>) {
        std::mem::swap(&mut self.data, &mut other.data);
    }

    pub fn schema(&self) -> &Arc<TupleSchema> {
        &self.schema
    }

    pub fn set_value(&mut self, idx: usize, value: &SqlValue) -> Result<()> {
        let Self { schema, data } = self;
        let data = data
            .as_deref_mut()
            .ok_or_else(|| eyre::eyre!("write to null tuple"))?;
        write_cell(data, schema, idx, value)
    }

    pub fn value(&self, idx: usize) -> Result<SqlValue> {
        let data = self
            .data
            .as_deref()
            .ok_or_else(|| eyre::eyre!("read from null tuple"))?;
        read_cell(data, &self.schema, idx)
    }

    /// Copies a row of the same layout into the pooled storage.
    pub fn copy_from_view(&mut self, view: &TupleView<'_>) -> Result<()> {
        ensure!(
            self.schema.tuple_size() == view.schema().tuple_size(),
            "tuple copy between incompatible layouts"
        );
        let data = self
            .data
            .as_deref_mut()
            .ok_or_else(|| eyre::eyre!("copy into null tuple"))?;
        data.copy_from_slice(view.data());
        Ok(())
    }

    /// Read view over the pooled storage; errors on a null tuple.
    pub fn as_view(&self) -> Result<TupleView<'_>> {
        let data = self
            .data
            .as_deref()
            .ok_or_else(|| eyre::eyre!("view of null tuple"))?;
        Ok(TupleView::new(data, &self.schema))
    }
}

/// Zero-copy read view over a row in a table slab.
#[derive(Debug, Clone, Copy)]
pub struct TupleView<'a> {
    data: &'a [u8],
    schema: &'a TupleSchema,
}

impl<'a> TupleView<'a> {
    pub fn new(data: &'a [u8], schema: &'a TupleSchema) -> Self {
        debug_assert_eq!(data.len(), schema.tuple_size());
        Self { data, schema }
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn schema(&self) -> &'a TupleSchema {
        self.schema
    }

    pub fn column_count(&self) -> usize {
        self.schema.column_count()
    }

    pub fn value(&self, idx: usize) -> Result<SqlValue> {
        read_cell(self.data, self.schema, idx)
    }

    pub fn is_null_at(&self, idx: usize) -> bool {
        null_bit(self.data, idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_schema() -> Arc<TupleSchema> {
        TupleSchema::from_types(&[DataType::BigInt, DataType::Text, DataType::Double])
    }

    #[test]
    fn cells_round_trip_through_the_row_buffer() {
        let schema = sample_schema();
        let mut t = Tuple::allocated(Arc::clone(&schema));
        t.set_value(0, &SqlValue::BigInt(-42)).unwrap();
        t.set_value(1, &SqlValue::Text("hello".into())).unwrap();
        t.set_value(2, &SqlValue::Double(2.5)).unwrap();
        assert_eq!(t.value(0).unwrap(), SqlValue::BigInt(-42));
        assert_eq!(t.value(1).unwrap(), SqlValue::Text("hello".into()));
        assert_eq!(t.value(2).unwrap(), SqlValue::Double(2.5));
    }

    #[test]
    fn null_cells_read_back_null_after_overwrite() {
        let schema = sample_schema();
        let mut t = Tuple::allocated(Arc::clone(&schema));
        t.set_value(0, &SqlValue::BigInt(7)).unwrap();
        t.set_value(0, &SqlValue::Null).unwrap();
        assert_eq!(t.value(0).unwrap(), SqlValue::Null);
    }

    #[test]
    fn oversized_text_is_refused() {
        let schema = TupleSchema::new(vec![crate::tuple::ColumnInfo::with_size(
            DataType::Text,
            4,
        )]);
        let mut t = Tuple::allocated(schema);
        assert!(t.set_value(0, &SqlValue::Text("long text".into())).is_err());
        assert!(t.set_value(0, &SqlValue::Text("ok".into())).is_ok());
    }

    #[test]
    fn type_mismatch_is_refused() {
        let schema = sample_schema();
        let mut t = Tuple::allocated(schema);
        assert!(t.set_value(0, &SqlValue::Text("nope".into())).is_err());
    }

    #[test]
    fn swap_data_flips_storage_without_copying_cells() {
        let schema = sample_schema();
        let mut a = Tuple::allocated(Arc::clone(&schema));
        let mut b = Tuple::allocated(Arc::clone(&schema));
        a.set_value(0, &SqlValue::BigInt(1)).unwrap();
        b.set_value(0, &SqlValue::BigInt(2)).unwrap();
        a.swap_data(&mut b);
        assert_eq!(a.value(0).unwrap(), SqlValue::BigInt(2));
        assert_eq!(b.value(0).unwrap(), SqlValue::BigInt(1));
    }

    #[test]
    fn move_to_null_detaches_storage() {
        let schema = sample_schema();
        let mut t = Tuple::allocated(schema);
        assert!(!t.is_null());
        t.move_to_null();
        assert!(t.is_null());
        assert!(t.value(0).is_err());
    }

    #[test]
    fn pool_backed_tuples_live_in_the_pool_until_nulled() {
        let pool = Pool::new();
        let schema = sample_schema();
        let mut a = PoolBackedTuple::allocate(&pool, Arc::clone(&schema));
        let mut b = PoolBackedTuple::allocate(&pool, Arc::clone(&schema));
        assert!(pool.allocated_bytes() >= 2 * schema.tuple_size());

        a.set_value(0, &SqlValue::BigInt(1)).unwrap();
        b.set_value(0, &SqlValue::BigInt(2)).unwrap();
        a.swap_data(&mut b);
        assert_eq!(a.value(0).unwrap(), SqlValue::BigInt(2));
        assert_eq!(b.value(0).unwrap(), SqlValue::BigInt(1));

        let mut copy = Tuple::null(Arc::clone(&schema));
        copy.copy_from_view(&a.as_view().unwrap()).unwrap();
        assert_eq!(copy.value(0).unwrap(), SqlValue::BigInt(2));

        a.move_to_null();
        b.move_to_null();
        assert!(a.is_null() && b.is_null());
        assert!(a.value(0).is_err());
    }

    #[test]
    fn views_share_the_cell_encoding() {
        let schema = sample_schema();
        let mut t = Tuple::allocated(Arc::clone(&schema));
        t.set_value(0, &SqlValue::BigInt(9)).unwrap();
        t.set_value(1, &SqlValue::Null).unwrap();
        let view = t.as_view().unwrap();
        assert_eq!(view.value(0).unwrap(), SqlValue::BigInt(9));
        assert!(view.is_null_at(1));

        let mut copy = Tuple::null(Arc::clone(&schema));
        copy.copy_from_view(&view).unwrap();
        assert_eq!(copy.value(0).unwrap(), SqlValue::BigInt(9));
    }
}
