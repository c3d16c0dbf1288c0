//! # Tuples and Schemas
//!
//! Fixed-width row storage for the execution core.
//!
//! - `schema`: [`TupleSchema`] defines the cell layout of a row and
//!   pre-computes offsets for O(1) column access.
//! - `tuple`: [`Tuple`] is an owned, nullable scratch row;
//!   [`PoolBackedTuple`] is the same discipline over storage borrowed from
//!   a memory pool; [`TupleView`] is a zero-copy read view over a row
//!   living in a table slab.
//!
//! ## Row Layout
//!
//! ```text
//! +-------------+-----------+-----------+-----+-----------+
//! | null bitmap | cell 0    | cell 1    | ... | cell n-1  |
//! | ceil(n/8) B | fixed     | fixed     |     | fixed     |
//! +-------------+-----------+-----------+-----+-----------+
//! ```
//!
//! Every cell is fixed-width; TEXT cells carry a 2-byte length prefix
//! inside a schema-declared capacity. A set bit in the null bitmap marks a
//! NULL cell; the cell bytes are zeroed but ignored.

mod schema;
#[allow(clippy::module_inception)]
mod tuple;

pub use schema::{ColumnInfo, TupleSchema};
pub use tuple::{read_cell, write_cell, PoolBackedTuple, Tuple, TupleView};
