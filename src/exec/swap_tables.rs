//! # Swap-Tables Executor
//!
//! Atomic metadata swap of two persistent tables. The executor counts the
//! visible tuples of both targets *before* the swap, performs the swap, and
//! emits that count as a one-row DML output, also adding it to the engine's
//! modified-tuple tally. No input stream.

use crate::engine::SiteEngine;
use crate::memory::TempTableLimits;
use crate::plan::{dml_count_schema, SwapTablesNode};
use crate::table::TempTable;
use crate::types::SqlValue;
use eyre::{ensure, Result};
use std::sync::Arc;

pub struct SwapTablesExecutor {
    node: SwapTablesNode,
    output: Option<TempTable>,
}

impl SwapTablesExecutor {
    pub fn new(node: SwapTablesNode) -> Self {
        Self { node, output: None }
    }

    pub fn init(&mut self, limits: &TempTableLimits) -> Result<()> {
        self.output = Some(TempTable::new(
            "swap_tables_dml_count",
            dml_count_schema(),
            *limits,
        ));
        Ok(())
    }

    pub fn execute(
        &mut self,
        _input: Option<&mut TempTable>,
        _params: &[SqlValue],
        engine: &SiteEngine,
    ) -> Result<()> {
        let output = self
            .output
            .as_mut()
            .ok_or_else(|| eyre::eyre!("swap-tables executed before init"))?;
        ensure!(
            !Arc::ptr_eq(&self.node.target1, &self.node.target2),
            "cannot swap a table with itself"
        );

        // Lock in address order so concurrent swaps over the same pair
        // cannot deadlock.
        let (first, second) = if Arc::as_ptr(&self.node.target1) < Arc::as_ptr(&self.node.target2) {
            (&self.node.target1, &self.node.target2)
        } else {
            (&self.node.target2, &self.node.target1)
        };
        let mut first_guard = first.lock();
        let mut second_guard = second.lock();

        let modified_tuples =
            first_guard.visible_tuple_count() + second_guard.visible_tuple_count();
        tracing::trace!(
            t1 = %first_guard.name(),
            t2 = %second_guard.name(),
            modified_tuples,
            "swap tables"
        );
        first_guard.swap_table(&mut second_guard)?;
        drop(second_guard);
        drop(first_guard);

        let mut count_tuple = output.temp_tuple();
        count_tuple.set_value(0, &SqlValue::big_int(modified_tuples))?;
        output.insert_temp_tuple(&count_tuple)?;
        engine.add_to_tuples_modified(modified_tuples);
        Ok(())
    }

    pub fn output_table(&self) -> Option<&TempTable> {
        self.output.as_ref()
    }

    pub fn output_table_mut(&mut self) -> Option<&mut TempTable> {
        self.output.as_mut()
    }
}
