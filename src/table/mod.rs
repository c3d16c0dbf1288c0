//! # Tables
//!
//! In-memory row-slab tables sharing a [`crate::tuple::TupleSchema`].
//!
//! - `iterator`: cloneable forward cursors with position equality, plus a
//!   draining variant for streaming temp-table input.
//! - `temp_table`: per-executor scratch tables bounded by
//!   [`crate::memory::TempTableLimits`].
//! - `persistent`: named durable-tier tables with index metadata,
//!   materialized-view bindings, a replicated flag, and the atomic
//!   `swap_table` operation. Persistent tables shared across sites are held
//!   behind `Arc<parking_lot::Mutex<..>>`.

mod iterator;
mod persistent;
mod temp_table;

pub use iterator::{DrainingIterator, TableIterator};
pub use persistent::{PersistentTable, SharedPersistentTable, TableIndex};
pub use temp_table::TempTable;
