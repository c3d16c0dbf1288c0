//! # Window Function Executor
//!
//! Computes `OVER (PARTITION BY ... ORDER BY ...)` aggregates over an input
//! table pre-sorted by the partition-by key and then the order-by key,
//! emitting one output row per input row: the aggregate values first, then
//! pass-through columns evaluated over the input row.
//!
//! ## Two-Cursor Scan
//!
//! A [`TableWindow`] holds two cursors over the input. The leading edge
//! scans ahead to find the next group boundary and size the group; the
//! middle edge then emits that many output rows. The middle edge never
//! passes the leading edge.
//!
//! ```text
//!   rows:   r0  r1  r2 | r3  r4 | r5 ...      | = order-by edges
//!                ^middle        ^leading        group_size = 2 (r3, r4)
//! ```
//!
//! ## Edge State Machine
//!
//! `StartOfInput → {StartOfPartitionByGroup | StartOfOrderByGroup |
//! EndOfInput}`. Aggregates reset on partition edges only. `find_next_edge`
//! recomputes the two key tuples per scanned row, comparing from the last
//! key column backwards; the row that breaks a group is inherited by the
//! next call, so no row is lost at a boundary.
//!
//! ## Scratch Discipline
//!
//! Every piece of working state — the four key tuples, the buffered input
//! tuple, the pass-through tuple, and the aggregates themselves — is
//! allocated from the executor's memory pool at the start of one execute.
//! The key tuples flip between "current" and "previous" by swapping
//! storage, never by copying cells. On both normal and abnormal exit the
//! working tuples are moved to null and the pool is purged, freeing the
//! whole execute's scratch at once.

use crate::engine::{ProgressMonitor, SiteEngine};
use crate::exec::window_aggs::{build_window_aggregate, WindowAggregateRow};
use crate::expr::schema_from_expressions;
use crate::memory::{Pool, TempTableLimits};
use crate::plan::WindowFunctionNode;
use crate::table::{TableIterator, TempTable};
use crate::tuple::{PoolBackedTuple, TupleSchema, TupleView};
use crate::types::SqlValue;
use eyre::{ensure, Result};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Where the leading edge stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeType {
    StartOfInput,
    StartOfPartitionByGroup,
    StartOfOrderByGroup,
    EndOfInput,
}

/// Cursor pair over the input plus the size of the current order-by group.
pub struct TableWindow<'a> {
    pub middle_edge: TableIterator<'a>,
    pub leading_edge: TableIterator<'a>,
    pub group_size: usize,
}

impl<'a> TableWindow<'a> {
    pub fn new(iterator: TableIterator<'a>) -> Self {
        Self {
            middle_edge: iterator.clone(),
            leading_edge: iterator,
            group_size: 0,
        }
    }
}

impl fmt::Debug for TableWindow<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TableWindow [{}, {}] group_size={}",
            self.middle_edge.location(),
            self.leading_edge.location(),
            self.group_size
        )
    }
}

/// Lexicographic key comparison from the last column backwards, the order
/// boundaries are most likely to differ in.
fn compare_key_tuples(
    tuple1: &PoolBackedTuple<'_>,
    tuple2: &PoolBackedTuple<'_>,
) -> Result<Ordering> {
    ensure!(
        !tuple1.is_null() && !tuple2.is_null(),
        "window key comparison over null tuple"
    );
    let column_count = tuple1.schema().column_count();
    for ii in (0..column_count).rev() {
        let cmp = tuple2.value(ii)?.compare(&tuple1.value(ii)?)?;
        if cmp != Ordering::Equal {
            return Ok(cmp);
        }
    }
    Ok(Ordering::Equal)
}

/// The four key tuples plus the buffered input row the leading edge scans
/// into. All storage comes from the executor's memory pool; the owner
/// moves every tuple to null before purging it.
struct ScratchTuples<'pool> {
    in_progress_partition_by_key: PoolBackedTuple<'pool>,
    last_partition_by_key: PoolBackedTuple<'pool>,
    in_progress_order_by_key: PoolBackedTuple<'pool>,
    last_order_by_key: PoolBackedTuple<'pool>,
    buffered_input_tuple: PoolBackedTuple<'pool>,
}

impl<'pool> ScratchTuples<'pool> {
    fn allocate(
        pool: &'pool Pool,
        partition_by_key_schema: &Arc<TupleSchema>,
        order_by_key_schema: &Arc<TupleSchema>,
        input_schema: &Arc<TupleSchema>,
    ) -> Self {
        Self {
            in_progress_partition_by_key: PoolBackedTuple::allocate(
                pool,
                Arc::clone(partition_by_key_schema),
            ),
            last_partition_by_key: PoolBackedTuple::allocate(
                pool,
                Arc::clone(partition_by_key_schema),
            ),
            in_progress_order_by_key: PoolBackedTuple::allocate(
                pool,
                Arc::clone(order_by_key_schema),
            ),
            last_order_by_key: PoolBackedTuple::allocate(pool, Arc::clone(order_by_key_schema)),
            buffered_input_tuple: PoolBackedTuple::allocate(pool, Arc::clone(input_schema)),
        }
    }

    fn release_all(&mut self) {
        self.in_progress_partition_by_key.move_to_null();
        self.last_partition_by_key.move_to_null();
        self.in_progress_order_by_key.move_to_null();
        self.last_order_by_key.move_to_null();
        self.buffered_input_tuple.move_to_null();
    }

    fn all_null(&self) -> bool {
        self.in_progress_partition_by_key.is_null()
            && self.last_partition_by_key.is_null()
            && self.in_progress_order_by_key.is_null()
            && self.last_order_by_key.is_null()
            && self.buffered_input_tuple.is_null()
    }
}

pub struct WindowFunctionExecutor {
    node: WindowFunctionNode,
    output: Option<TempTable>,
    memory_pool: Pool,
    partition_by_key_schema: Option<Arc<TupleSchema>>,
    order_by_key_schema: Option<Arc<TupleSchema>>,
}

impl WindowFunctionExecutor {
    pub fn new(node: WindowFunctionNode) -> Self {
        Self {
            node,
            output: None,
            memory_pool: Pool::new(),
            partition_by_key_schema: None,
            order_by_key_schema: None,
        }
    }

    pub fn node(&self) -> &WindowFunctionNode {
        &self.node
    }

    pub fn init(&mut self, limits: &TempTableLimits) -> Result<()> {
        ensure!(
            self.node.output_columns.len() == self.node.output_schema.column_count(),
            "window function has {} expressions for {} output columns",
            self.node.output_columns.len(),
            self.node.output_schema.column_count()
        );
        ensure!(
            self.node.aggregates.len() <= self.node.output_columns.len(),
            "window function declares more aggregates than output columns"
        );
        self.output = Some(TempTable::new(
            "window_function_temp_out",
            Arc::clone(&self.node.output_schema),
            *limits,
        ));
        self.partition_by_key_schema = Some(schema_from_expressions(
            &self.node.partition_by,
            &self.node.input_schema,
        )?);
        self.order_by_key_schema = Some(schema_from_expressions(
            &self.node.order_by,
            &self.node.input_schema,
        )?);
        Ok(())
    }

    pub fn execute(
        &mut self,
        input: Option<&mut TempTable>,
        params: &[SqlValue],
        engine: &SiteEngine,
    ) -> Result<()> {
        let input = input.ok_or_else(|| eyre::eyre!("window function requires an input table"))?;
        tracing::trace!(rows = input.row_count(), "window function start");
        let result = self.execute_scan(input, params, engine);
        // The purge frees every pool-backed working tuple and aggregate at
        // once, on success and failure alike; the scan has already moved
        // the working tuples to null.
        self.memory_pool.purge();
        if result.is_ok() {
            input.delete_all_temp_tuples();
        }
        tracing::trace!(ok = result.is_ok(), "window function done");
        result
    }

    fn execute_scan(
        &mut self,
        input: &TempTable,
        params: &[SqlValue],
        engine: &SiteEngine,
    ) -> Result<()> {
        ensure!(
            input
                .schema()
                .is_compatible_with(&self.node.input_schema),
            "window function input does not match the planned input schema"
        );
        let Self {
            node,
            output,
            memory_pool,
            partition_by_key_schema,
            order_by_key_schema,
        } = self;
        let (Some(output), Some(partition_by_key_schema), Some(order_by_key_schema)) = (
            output.as_mut(),
            partition_by_key_schema.as_ref(),
            order_by_key_schema.as_ref(),
        ) else {
            eyre::bail!("window function executed before init");
        };
        let memory_pool: &Pool = memory_pool;

        let mut scratch = ScratchTuples::allocate(
            memory_pool,
            partition_by_key_schema,
            order_by_key_schema,
            input.schema(),
        );
        let aggregates = node
            .aggregates
            .iter()
            .map(|spec| build_window_aggregate(memory_pool, spec.agg_type))
            .collect::<Result<Vec<_>>>()?;
        let mut aggregate_row =
            WindowAggregateRow::new(memory_pool, Arc::clone(input.schema()), aggregates);

        let mut scan = WindowScan {
            node,
            scratch: &mut scratch,
            aggregate_row: &mut aggregate_row,
            output,
            params,
        };
        let result = scan.run(input, engine);
        // Working tuples go to null before the pool they point into is
        // purged by the caller.
        scratch.release_all();
        aggregate_row.release();
        debug_assert!(scratch.all_null());
        result
    }

    pub fn output_table(&self) -> Option<&TempTable> {
        self.output.as_ref()
    }

    pub fn output_table_mut(&mut self) -> Option<&mut TempTable> {
        self.output.as_mut()
    }

    /// True when the memory pool holds no working storage — the state this
    /// executor is in whenever it is not mid-execute.
    pub fn working_storage_is_released(&self) -> bool {
        self.memory_pool.allocated_bytes() == 0
    }

    /// Releases per-execute scratch; callable by the dispatcher when
    /// recovering from a failure elsewhere in the list.
    pub fn cleanup_memory_pool(&mut self) {
        self.memory_pool.purge();
    }
}

/// One execute call's borrow of everything the scan touches.
struct WindowScan<'a, 'pool> {
    node: &'a WindowFunctionNode,
    scratch: &'a mut ScratchTuples<'pool>,
    aggregate_row: &'a mut WindowAggregateRow<'pool>,
    output: &'a mut TempTable,
    params: &'a [SqlValue],
}

impl WindowScan<'_, '_> {
    fn run(&mut self, input: &TempTable, engine: &SiteEngine) -> Result<()> {
        let mut window = TableWindow::new(input.iterator());
        let mut progress = ProgressMonitor::new(engine);
        let mut etype = EdgeType::StartOfInput;
        loop {
            if matches!(
                etype,
                EdgeType::StartOfInput | EdgeType::StartOfPartitionByGroup
            ) {
                self.aggregate_row.reset_aggs();
            }
            let next_etype = self.find_next_edge(&mut window, etype)?;
            tracing::trace!(?window, ?next_etype, "window edge");
            self.lookahead_next_group_for_aggs(&window);
            for _ in 0..window.group_size {
                let row = window
                    .middle_edge
                    .next()
                    .ok_or_else(|| eyre::eyre!("middle edge ran past the leading edge"))?;
                progress.countdown_progress();
                self.aggregate_row.record_pass_through_tuple(&row)?;
                self.insert_output_tuple()?;
                debug_assert!(window.middle_edge.location() <= window.leading_edge.location());
            }
            self.end_group_for_aggs(&window, etype);
            if next_etype == EdgeType::EndOfInput {
                break;
            }
            etype = next_etype;
        }
        Ok(())
    }

    /// Advances the leading edge to the next group boundary, keying every
    /// scanned row and sizing the group. On the first call the first row
    /// primes both keys; on later calls the row that broke the previous
    /// group — already buffered and keyed — opens this one.
    fn find_next_edge(
        &mut self,
        window: &mut TableWindow<'_>,
        etype: EdgeType,
    ) -> Result<EdgeType> {
        if etype == EdgeType::StartOfInput {
            let Some(row) = window.leading_edge.next() else {
                window.group_size = 0;
                return Ok(EdgeType::EndOfInput);
            };
            self.scratch.buffered_input_tuple.copy_from_view(&row)?;
            self.init_partition_by_key_tuple(&row)?;
            self.init_order_by_key_tuple(&row)?;
            window.group_size = 1;
            self.lookahead_one_row_for_aggs(window)?;
        } else {
            window.group_size = 1;
            self.lookahead_one_row_for_aggs(window)?;
        }
        loop {
            let Some(row) = window.leading_edge.next() else {
                return Ok(EdgeType::EndOfInput);
            };
            self.scratch.buffered_input_tuple.copy_from_view(&row)?;
            self.init_partition_by_key_tuple(&row)?;
            self.init_order_by_key_tuple(&row)?;
            if compare_key_tuples(
                &self.scratch.in_progress_partition_by_key,
                &self.scratch.last_partition_by_key,
            )? != Ordering::Equal
            {
                return Ok(EdgeType::StartOfPartitionByGroup);
            }
            if compare_key_tuples(
                &self.scratch.in_progress_order_by_key,
                &self.scratch.last_order_by_key,
            )? != Ordering::Equal
            {
                return Ok(EdgeType::StartOfOrderByGroup);
            }
            window.group_size += 1;
            self.lookahead_one_row_for_aggs(window)?;
        }
    }

    /// Flips the in-progress and last partition keys by storage swap, then
    /// overwrites the in-progress key from the scanned row.
    fn init_partition_by_key_tuple(&mut self, row: &TupleView<'_>) -> Result<()> {
        let scratch = &mut *self.scratch;
        ensure!(
            !scratch.in_progress_partition_by_key.is_null()
                && !scratch.last_partition_by_key.is_null(),
            "partition key tuples not allocated"
        );
        scratch
            .in_progress_partition_by_key
            .swap_data(&mut scratch.last_partition_by_key);
        for (ii, expr) in self.node.partition_by.iter().enumerate() {
            scratch
                .in_progress_partition_by_key
                .set_value(ii, &expr.eval(Some(row), self.params)?)?;
        }
        Ok(())
    }

    fn init_order_by_key_tuple(&mut self, row: &TupleView<'_>) -> Result<()> {
        let scratch = &mut *self.scratch;
        ensure!(
            !scratch.in_progress_order_by_key.is_null() && !scratch.last_order_by_key.is_null(),
            "order-by key tuples not allocated"
        );
        scratch
            .in_progress_order_by_key
            .swap_data(&mut scratch.last_order_by_key);
        for (ii, expr) in self.node.order_by.iter().enumerate() {
            scratch
                .in_progress_order_by_key
                .set_value(ii, &expr.eval(Some(row), self.params)?)?;
        }
        Ok(())
    }

    /// Feeds the buffered row to every aggregate that opted into per-row
    /// lookahead, with its argument expressions evaluated.
    fn lookahead_one_row_for_aggs(&mut self, window: &TableWindow<'_>) -> Result<()> {
        let row = self.scratch.buffered_input_tuple.as_view()?;
        for (spec, agg) in self
            .node
            .aggregates
            .iter()
            .zip(self.aggregate_row.aggregates_mut())
        {
            if !agg.needs_lookahead() {
                continue;
            }
            let mut args = smallvec::SmallVec::<[SqlValue; 2]>::new();
            for input_expr in &spec.inputs {
                args.push(input_expr.eval(Some(&row), self.params)?);
            }
            agg.lookahead_one_row(window, &args)?;
        }
        Ok(())
    }

    fn lookahead_next_group_for_aggs(&mut self, window: &TableWindow<'_>) {
        for agg in self.aggregate_row.aggregates_mut() {
            agg.lookahead_next_group(window);
        }
    }

    fn end_group_for_aggs(&mut self, window: &TableWindow<'_>, etype: EdgeType) {
        for agg in self.aggregate_row.aggregates_mut() {
            agg.end_group(window, etype);
        }
    }

    /// Finalizes each aggregate into the leading output columns, then
    /// evaluates the pass-through columns over the pass-through tuple.
    fn insert_output_tuple(&mut self) -> Result<()> {
        let aggregate_count = self.aggregate_row.aggregate_count();
        let mut temp_tuple = self.output.temp_tuple();
        for ii in 0..aggregate_count {
            let value_type = self.node.output_schema.column(ii).data_type;
            let value = self.aggregate_row.aggregates_mut()[ii].finalize(value_type)?;
            temp_tuple.set_value(ii, &value)?;
        }
        let pass_through = self.aggregate_row.pass_through_view()?;
        for ii in aggregate_count..self.node.output_columns.len() {
            temp_tuple.set_value(
                ii,
                &self.node.output_columns[ii].eval(Some(&pass_through), self.params)?,
            )?;
        }
        self.output.insert_temp_tuple(&temp_tuple)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DataType;

    #[test]
    fn scratch_tuples_are_pool_backed_and_nulled_on_release() {
        let pool = Pool::new();
        let key_schema = TupleSchema::from_types(&[DataType::Text]);
        let input_schema = TupleSchema::from_types(&[DataType::Text, DataType::BigInt]);
        let mut scratch = ScratchTuples::allocate(&pool, &key_schema, &key_schema, &input_schema);

        assert!(!scratch.all_null());
        assert!(
            pool.allocated_bytes() >= 4 * key_schema.tuple_size() + input_schema.tuple_size(),
            "all five working tuples SHOULD draw their storage from the pool"
        );

        scratch
            .in_progress_partition_by_key
            .set_value(0, &SqlValue::Text("k".into()))
            .unwrap();
        scratch
            .in_progress_partition_by_key
            .swap_data(&mut scratch.last_partition_by_key);
        assert_eq!(
            scratch.last_partition_by_key.value(0).unwrap(),
            SqlValue::Text("k".into())
        );

        scratch.release_all();
        assert!(scratch.all_null());
    }

    #[test]
    fn key_comparison_refuses_null_tuples() {
        let pool = Pool::new();
        let key_schema = TupleSchema::from_types(&[DataType::BigInt]);
        let mut a = PoolBackedTuple::allocate(&pool, Arc::clone(&key_schema));
        let b = PoolBackedTuple::allocate(&pool, Arc::clone(&key_schema));
        assert!(compare_key_tuples(&a, &b).is_ok());
        a.move_to_null();
        assert!(compare_key_tuples(&a, &b).is_err());
    }
}
