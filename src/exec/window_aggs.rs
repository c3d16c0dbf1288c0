//! # Window Aggregates
//!
//! Per-function stateful accumulators behind the window-function executor.
//! The input to each aggregate is a sequence of order-by groups within a
//! partition:
//!
//! - `lookahead_one_row` runs for each row the leading cursor scans inside
//!   the current group (only for aggregates that opt in — the rank family
//!   skips it);
//! - `lookahead_next_group` runs once per edge, after the group has been
//!   sized;
//! - `end_group` runs after the group's output rows have been emitted;
//! - `finalize` casts and returns the current value, once per output row;
//! - `reset_agg` runs at each partition boundary.
//!
//! ## Shipped Aggregates
//!
//! | Aggregate | Semantics |
//! |-----------|-----------|
//! | DENSE_RANK | starts at 1; +1 per order-by group |
//! | RANK | starts at 1; +group size per order-by group (1,1,3,3,3,6,...) |
//! | COUNT | rows seen so far in the partition, counted during lookahead so the group's final value is ready before its rows are emitted; `COUNT(E)` skips NULL `E` |

use crate::exec::window::{EdgeType, TableWindow};
use crate::memory::Pool;
use crate::plan::WindowAggregateType;
use crate::tuple::{PoolBackedTuple, TupleSchema, TupleView};
use crate::types::{DataType, SqlValue};
use eyre::{bail, Result};
use std::sync::Arc;

pub trait WindowAggregate: std::fmt::Debug {
    /// Aggregates that return false skip the per-row lookahead entirely.
    fn needs_lookahead(&self) -> bool {
        false
    }

    /// One row scanned by the leading cursor within the current group,
    /// with its argument expressions already evaluated.
    fn lookahead_one_row(&mut self, _window: &TableWindow<'_>, _args: &[SqlValue]) -> Result<()> {
        Ok(())
    }

    /// The current group has been sized; runs once per edge.
    fn lookahead_next_group(&mut self, _window: &TableWindow<'_>) {}

    /// All output rows for the group have been emitted.
    fn end_group(&mut self, _window: &TableWindow<'_>, _etype: EdgeType) {}

    /// Casts and returns the current value.
    fn finalize(&mut self, value_type: DataType) -> Result<SqlValue>;

    /// Partition boundary.
    fn reset_agg(&mut self);
}

/// DENSE_RANK: counts order-by group changes. The bump after the final
/// group of the input is unobservable — no output row follows it.
#[derive(Debug)]
struct DenseRankAgg {
    rank: i64,
}

impl DenseRankAgg {
    fn new() -> Self {
        Self { rank: 1 }
    }
}

impl WindowAggregate for DenseRankAgg {
    fn end_group(&mut self, _window: &TableWindow<'_>, _etype: EdgeType) {
        self.rank += 1;
    }

    fn finalize(&mut self, value_type: DataType) -> Result<SqlValue> {
        SqlValue::big_int(self.rank).cast_as(value_type)
    }

    fn reset_agg(&mut self) {
        self.rank = 1;
    }
}

/// RANK: like dense rank, but the increment between order-by groups is the
/// size of the group just emitted.
#[derive(Debug)]
struct RankAgg {
    rank: i64,
    order_by_peer_increment: i64,
}

impl RankAgg {
    fn new() -> Self {
        Self {
            rank: 1,
            order_by_peer_increment: 0,
        }
    }
}

impl WindowAggregate for RankAgg {
    fn lookahead_next_group(&mut self, window: &TableWindow<'_>) {
        self.order_by_peer_increment = window.group_size as i64;
    }

    fn end_group(&mut self, _window: &TableWindow<'_>, _etype: EdgeType) {
        self.rank += self.order_by_peer_increment;
    }

    fn finalize(&mut self, value_type: DataType) -> Result<SqlValue> {
        SqlValue::big_int(self.rank).cast_as(value_type)
    }

    fn reset_agg(&mut self) {
        self.rank = 1;
        self.order_by_peer_increment = 0;
    }
}

/// COUNT: bumped during lookahead so the value is complete before the
/// group's rows are emitted — giving the running count through the end of
/// the current peer group, constant within it. `COUNT(*)` (no arguments)
/// counts every row; `COUNT(E)` counts rows where `E` is non-NULL.
#[derive(Debug)]
struct CountAgg {
    count: i64,
}

impl CountAgg {
    fn new() -> Self {
        Self { count: 0 }
    }
}

impl WindowAggregate for CountAgg {
    fn needs_lookahead(&self) -> bool {
        true
    }

    fn lookahead_one_row(&mut self, _window: &TableWindow<'_>, args: &[SqlValue]) -> Result<()> {
        if args.is_empty() || !args[0].is_null() {
            self.count += 1;
        }
        Ok(())
    }

    fn finalize(&mut self, value_type: DataType) -> Result<SqlValue> {
        SqlValue::big_int(self.count).cast_as(value_type)
    }

    fn reset_agg(&mut self) {
        self.count = 0;
    }
}

/// Places the aggregate for the requested type into the scan's memory
/// pool. An aggregate the engine does not implement is fatal for the
/// query.
pub fn build_window_aggregate(
    pool: &Pool,
    agg_type: WindowAggregateType,
) -> Result<&mut (dyn WindowAggregate + Send)> {
    Ok(match agg_type {
        WindowAggregateType::Rank => pool.alloc(RankAgg::new()),
        WindowAggregateType::DenseRank => pool.alloc(DenseRankAgg::new()),
        WindowAggregateType::Count => pool.alloc(CountAgg::new()),
        other => bail!("unknown aggregate type {:?}", other),
    })
}

/// The pass-through tuple plus the aggregates computing the current row's
/// window values. Both live in the executor's memory pool and are freed
/// wholesale by its purge.
pub struct WindowAggregateRow<'pool> {
    pass_through_tuple: PoolBackedTuple<'pool>,
    aggregates: Vec<&'pool mut (dyn WindowAggregate + Send)>,
}

impl<'pool> WindowAggregateRow<'pool> {
    pub fn new(
        pool: &'pool Pool,
        input_schema: Arc<TupleSchema>,
        aggregates: Vec<&'pool mut (dyn WindowAggregate + Send)>,
    ) -> Self {
        Self {
            pass_through_tuple: PoolBackedTuple::allocate(pool, input_schema),
            aggregates,
        }
    }

    pub fn aggregate_count(&self) -> usize {
        self.aggregates.len()
    }

    pub fn aggregates_mut(&mut self) -> &mut [&'pool mut (dyn WindowAggregate + Send)] {
        &mut self.aggregates
    }

    pub fn reset_aggs(&mut self) {
        for agg in &mut self.aggregates {
            agg.reset_agg();
        }
    }

    /// Copies the current input row into the pass-through storage.
    pub fn record_pass_through_tuple(&mut self, row: &TupleView<'_>) -> Result<()> {
        self.pass_through_tuple.copy_from_view(row)
    }

    pub fn pass_through_view(&self) -> Result<TupleView<'_>> {
        self.pass_through_tuple.as_view()
    }

    /// Detaches the pass-through storage; part of scratch teardown.
    pub fn release(&mut self) {
        self.pass_through_tuple.move_to_null();
    }
}
