//! # Persistent Tables
//!
//! Named durable-tier tables. At this layer a persistent table is its row
//! slabs plus the metadata the executors act on: index structures,
//! materialized-view bindings, and the replicated flag that routes inserts
//! through the host coordination protocol.
//!
//! `swap_table` exchanges the bodies of two tables — rows, indexes, and
//! view bindings — while both names stay put. It is a metadata operation;
//! no row is copied.

use crate::table::TableIterator;
use crate::tuple::{Tuple, TupleSchema, TupleView};
use eyre::{ensure, Result};
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::sync::Arc;

/// Handle shared across sites; replicated tables clone the same handle.
pub type SharedPersistentTable = Arc<Mutex<PersistentTable>>;

/// Index metadata carried through a table swap.
#[derive(Debug, Clone)]
pub struct TableIndex {
    pub name: String,
    pub columns: SmallVec<[usize; 4]>,
}

pub struct PersistentTable {
    name: String,
    schema: Arc<TupleSchema>,
    rows: Vec<Box<[u8]>>,
    indexes: Vec<TableIndex>,
    view_bindings: Vec<String>,
    replicated: bool,
}

impl PersistentTable {
    pub fn new(name: impl Into<String>, schema: Arc<TupleSchema>, replicated: bool) -> Self {
        Self {
            name: name.into(),
            schema,
            rows: Vec::new(),
            indexes: Vec::new(),
            view_bindings: Vec::new(),
            replicated,
        }
    }

    /// Wraps a table in the shared handle sibling sites clone.
    pub fn shared(self) -> SharedPersistentTable {
        Arc::new(Mutex::new(self))
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

    pub fn is_replicated_table(&self) -> bool {
        self.replicated
    }

    /// Rows visible to a scan; the DML count a swap reports is built on it.
    pub fn visible_tuple_count(&self) -> i64 {
        self.rows.len() as i64
    }

    pub fn add_index(&mut self, index: TableIndex) {
        self.indexes.push(index);
    }

    pub fn indexes(&self) -> &[TableIndex] {
        &self.indexes
    }

    pub fn bind_view(&mut self, view_name: impl Into<String>) {
        self.view_bindings.push(view_name.into());
    }

    pub fn view_bindings(&self) -> &[String] {
        &self.view_bindings
    }

    pub fn temp_tuple(&self) -> Tuple {
        Tuple::allocated(Arc::clone(&self.schema))
    }

    pub fn insert_tuple(&mut self, view: &TupleView<'_>) -> Result<()> {
        ensure!(
            view.schema().tuple_size() == self.schema.tuple_size(),
            "tuple layout does not match table {}",
            self.name
        );
        self.rows.push(view.data().to_vec().into_boxed_slice());
        Ok(())
    }

    pub fn iterator(&self) -> TableIterator<'_> {
        TableIterator::new(&self.rows, &self.schema)
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

    /// Atomically exchanges table bodies, index structures, and
    /// materialized-view bindings with `other`. Names stay with their
    /// original tables. Both tables must have compatible layouts and the
    /// same number of indexes.
    pub fn swap_table(&mut self, other: &mut PersistentTable) -> Result<()> {
        ensure!(
            self.schema.is_compatible_with(&other.schema),
            "cannot swap {} with {}: incompatible schemas",
            self.name,
            other.name
        );
        ensure!(
            self.indexes.len() == other.indexes.len(),
            "cannot swap {} with {}: index counts differ",
            self.name,
            other.name
        );
        tracing::debug!(from = %self.name, to = %other.name, "swapping table bodies");
        std::mem::swap(&mut self.rows, &mut other.rows);
        std::mem::swap(&mut self.indexes, &mut other.indexes);
        std::mem::swap(&mut self.view_bindings, &mut other.view_bindings);
        std::mem::swap(&mut self.schema, &mut other.schema);
        Ok(())
    }
}
