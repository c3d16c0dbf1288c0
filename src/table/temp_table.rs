//! # Temp Tables
//!
//! Per-executor scratch tables. Rows live in owned slabs, the byte budget
//! is enforced on every insert, and the whole table is released when its
//! executor cleans up or is dropped.

use crate::memory::TempTableLimits;
use crate::table::{DrainingIterator, TableIterator};
use crate::tuple::{Tuple, TupleSchema, TupleView};
use eyre::{ensure, Result};
use std::sync::Arc;

#[derive(Debug)]
pub struct TempTable {
    name: String,
    schema: Arc<TupleSchema>,
    rows: Vec<Box<[u8]>>,
    limits: TempTableLimits,
    used_bytes: usize,
}

impl TempTable {
    pub fn new(name: impl Into<String>, schema: Arc<TupleSchema>, limits: TempTableLimits) -> Self {
        Self {
            name: name.into(),
            schema,
            rows: Vec::new(),
            limits,
            used_bytes: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Arc<TupleSchema> {
        &self.schema
    }

    pub fn column_count(&self) -> usize {
        self.schema.column_count()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// A scratch tuple sharing this table's schema.
    pub fn temp_tuple(&self) -> Tuple {
        Tuple::allocated(Arc::clone(&self.schema))
    }

    /// Copies a populated scratch tuple into the table.
    pub fn insert_temp_tuple(&mut self, tuple: &Tuple) -> Result<()> {
        let data = tuple
            .data()
            .ok_or_else(|| eyre::eyre!("insert of null tuple into {}", self.name))?;
        ensure!(
            tuple.schema().column_count() == self.schema.column_count(),
            "tuple width {} does not match table {} width {}",
            tuple.schema().column_count(),
            self.name,
            self.schema.column_count()
        );
        self.insert_row(data.to_vec().into_boxed_slice())
    }

    pub(crate) fn insert_row(&mut self, row: Box<[u8]>) -> Result<()> {
        ensure!(
            row.len() == self.schema.tuple_size(),
            "row of {} bytes does not match table {} layout",
            row.len(),
            self.name
        );
        self.limits.check(self.used_bytes, row.len())?;
        self.used_bytes += row.len();
        self.rows.push(row);
        Ok(())
    }

    pub fn iterator(&self) -> TableIterator<'_> {
        TableIterator::new(&self.rows, &self.schema)
    }

    /// Draining cursor; the table is empty once the cursor is taken.
    pub fn iterator_deleting_as_we_go(&mut self) -> DrainingIterator {
        self.used_bytes = 0;
        DrainingIterator::new(std::mem::take(&mut self.rows), Arc::clone(&self.schema))
    }

    pub fn delete_all_temp_tuples(&mut self) {
        self.rows.clear();
        self.used_bytes = 0;
    }

    pub fn used_bytes(&self) -> usize {
        self.used_bytes
    }

    /// Materializes every row as values; test and debugging aid.
    pub fn collect_values(&self) -> Result<Vec<Vec<crate::types::SqlValue>>> {
        let mut out = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            let view = TupleView::new(row, &self.schema);
            let mut cells = Vec::with_capacity(self.schema.column_count());
            for i in 0..self.schema.column_count() {
                cells.push(view.value(i)?);
            }
            out.push(cells);
        }
        Ok(out)
    }
}
