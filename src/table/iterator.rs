//! # Table Iterators
//!
//! [`TableIterator`] is a forward cursor over a table's row slabs. Cursors
//! are cheap to clone, compare equal when at the same position, and report
//! their position through `location()` — the window scan keeps two of them
//! over one table and relies on position ordering between the pair.
//!
//! [`DrainingIterator`] consumes a temp table's rows as it scans, releasing
//! storage as it goes; it is the delete-as-we-go cursor streaming executors
//! use on their input.

use crate::tuple::{TupleSchema, TupleView};
use std::sync::Arc;

/// Forward cursor over borrowed row slabs.
#[derive(Clone, Debug)]
pub struct TableIterator<'a> {
    rows: &'a [Box<[u8]>],
    schema: &'a TupleSchema,
    pos: usize,
}

impl<'a> TableIterator<'a> {
    pub fn new(rows: &'a [Box<[u8]>], schema: &'a TupleSchema) -> Self {
        Self {
            rows,
            schema,
            pos: 0,
        }
    }

    pub fn has_next(&self) -> bool {
        self.pos < self.rows.len()
    }

    /// Advances and returns a view of the next row.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<TupleView<'a>> {
        let row = self.rows.get(self.pos)?;
        self.pos += 1;
        Some(TupleView::new(row, self.schema))
    }

    /// Index of the next row to be returned.
    pub fn location(&self) -> usize {
        self.pos
    }
}

impl PartialEq for TableIterator<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.pos == other.pos
    }
}

/// Draining cursor: yields owned rows, dropping table storage as it scans.
pub struct DrainingIterator {
    rows: std::vec::IntoIter<Box<[u8]>>,
    schema: Arc<TupleSchema>,
}

impl DrainingIterator {
    pub fn new(rows: Vec<Box<[u8]>>, schema: Arc<TupleSchema>) -> Self {
        Self {
            rows: rows.into_iter(),
            schema,
        }
    }

    pub fn schema(&self) -> &Arc<TupleSchema> {
        &self.schema
    }

    pub fn next_row(&mut self) -> Option<Box<[u8]>> {
        self.rows.next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DataType, SqlValue};

    fn rows_of(values: &[i64]) -> (Vec<Box<[u8]>>, Arc<TupleSchema>) {
        let schema = TupleSchema::from_types(&[DataType::BigInt]);
        let rows = values
            .iter()
            .map(|v| {
                let mut t = crate::tuple::Tuple::allocated(Arc::clone(&schema));
                t.set_value(0, &SqlValue::BigInt(*v)).unwrap();
                t.data().unwrap().to_vec().into_boxed_slice()
            })
            .collect();
        (rows, schema)
    }

    #[test]
    fn cursor_walks_rows_in_order_and_tracks_location() {
        let (rows, schema) = rows_of(&[10, 20, 30]);
        let mut it = TableIterator::new(&rows, &schema);
        assert!(it.has_next());
        assert_eq!(it.location(), 0);
        assert_eq!(it.next().unwrap().value(0).unwrap(), SqlValue::BigInt(10));
        assert_eq!(it.location(), 1);
        it.next();
        it.next();
        assert!(!it.has_next());
        assert!(it.next().is_none());
    }

    #[test]
    fn cloned_cursors_advance_independently() {
        let (rows, schema) = rows_of(&[1, 2]);
        let mut leading = TableIterator::new(&rows, &schema);
        let mut middle = leading.clone();
        assert_eq!(leading, middle);
        leading.next();
        assert_ne!(leading, middle);
        assert!(middle.location() <= leading.location());
        middle.next();
        assert_eq!(leading, middle);
    }

    #[test]
    fn draining_cursor_yields_owned_rows() {
        let (rows, schema) = rows_of(&[5, 6]);
        let mut it = DrainingIterator::new(rows, schema);
        let first = it.next_row().unwrap();
        let view = TupleView::new(&first, it.schema());
        assert_eq!(view.value(0).unwrap(), SqlValue::BigInt(5));
        assert!(it.next_row().is_some());
        assert!(it.next_row().is_none());
    }
}
