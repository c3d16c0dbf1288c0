//! # Projection Executor
//!
//! Streaming per-row expression evaluation with two fast paths:
//!
//! - **Fast path A**: every output column is a bare input-column reference;
//!   the executor copies cells by source index.
//! - **Fast path B**: every output column is a bare parameter reference;
//!   the executor copies from the parameter vector without touching the
//!   input row's cells.
//!
//! Otherwise each output column runs full expression evaluation. The input
//! is consumed through a delete-as-we-go cursor; no state is carried
//! between rows.

use crate::engine::SiteEngine;
use crate::expr::{all_column_refs, all_param_refs};
use crate::memory::TempTableLimits;
use crate::plan::ProjectionNode;
use crate::table::TempTable;
use crate::tuple::TupleView;
use crate::types::SqlValue;
use eyre::{ensure, Result};
use std::sync::Arc;

pub struct ProjectionExecutor {
    node: ProjectionNode,
    output: Option<TempTable>,
    all_tuple_array: Option<Vec<usize>>,
    all_param_array: Option<Vec<usize>>,
}

impl ProjectionExecutor {
    pub fn new(node: ProjectionNode) -> Self {
        Self {
            node,
            output: None,
            all_tuple_array: None,
            all_param_array: None,
        }
    }

    pub fn node(&self) -> &ProjectionNode {
        &self.node
    }

    pub fn init(&mut self, limits: &TempTableLimits) -> Result<()> {
        ensure!(
            self.node.output_columns.len() == self.node.output_schema.column_count(),
            "projection has {} expressions for {} output columns",
            self.node.output_columns.len(),
            self.node.output_schema.column_count()
        );
        self.output = Some(TempTable::new(
            "projection_temp_out",
            Arc::clone(&self.node.output_schema),
            *limits,
        ));
        self.all_tuple_array = all_column_refs(&self.node.output_columns);
        self.all_param_array = all_param_refs(&self.node.output_columns);
        Ok(())
    }

    pub fn execute(
        &mut self,
        input: Option<&mut TempTable>,
        params: &[SqlValue],
        _engine: &SiteEngine,
    ) -> Result<()> {
        let input = input.ok_or_else(|| eyre::eyre!("projection requires an input table"))?;
        let output = self
            .output
            .as_mut()
            .ok_or_else(|| eyre::eyre!("projection executed before init"))?;
        let column_count = output.column_count();
        tracing::trace!(rows = input.row_count(), "projection start");

        // The input must be wide enough for every column this projection
        // touches, whichever path runs.
        let input_width = input.column_count();
        if let Some(cols) = &self.all_tuple_array {
            ensure!(
                cols.iter().all(|&c| c < input_width),
                "projection references a column past input width {}",
                input_width
            );
        } else if self.all_param_array.is_none() {
            for expr in &self.node.output_columns {
                if let Some(max) = expr.max_column_ref() {
                    ensure!(
                        max < input_width,
                        "projection references column {} past input width {}",
                        max,
                        input_width
                    );
                }
            }
        }

        let mut iterator = input.iterator_deleting_as_we_go();
        while let Some(row) = iterator.next_row() {
            let view = TupleView::new(&row, iterator.schema());
            let mut temp_tuple = output.temp_tuple();
            if let Some(cols) = &self.all_tuple_array {
                for ctr in (0..column_count).rev() {
                    temp_tuple.set_value(ctr, &view.value(cols[ctr])?)?;
                }
            } else if let Some(param_idx) = &self.all_param_array {
                for ctr in (0..column_count).rev() {
                    let value = params.get(param_idx[ctr]).ok_or_else(|| {
                        eyre::eyre!("parameter {} out of range", param_idx[ctr])
                    })?;
                    temp_tuple.set_value(ctr, value)?;
                }
            } else {
                for ctr in (0..column_count).rev() {
                    temp_tuple
                        .set_value(ctr, &self.node.output_columns[ctr].eval(Some(&view), params)?)?;
                }
            }
            output.insert_temp_tuple(&temp_tuple)?;
        }
        tracing::trace!(rows = output.row_count(), "projection done");
        Ok(())
    }

    pub fn output_table(&self) -> Option<&TempTable> {
        self.output.as_ref()
    }

    pub fn output_table_mut(&mut self) -> Option<&mut TempTable> {
        self.output.as_mut()
    }

    /// True when fast path A (all bare column references) is active.
    pub fn all_tuple_fast_path(&self) -> bool {
        self.all_tuple_array.is_some()
    }

    /// True when fast path B (all bare parameter references) is active.
    pub fn all_param_fast_path(&self) -> bool {
        self.all_param_array.is_some()
    }
}
