//! # Executors
//!
//! The stateful runners behind plan nodes. Executors are dumb building
//! blocks: `init` is one-time setup (allocating the temp output table),
//! `execute` is one run against the shared parameter vector, and the two
//! cleanup entry points release scratch so the dispatcher can recover from
//! a failure anywhere in a list. Executors own no persistent state between
//! queries.
//!
//! Dispatch is a closed enum — the executor set is small and the dispatcher
//! matches on it directly, in particular to spot the replicated-insert case
//! it must gate through the host coordinator.

mod insert;
mod projection;
mod swap_tables;
mod window;
mod window_aggs;

pub use insert::InsertExecutor;
pub use projection::ProjectionExecutor;
pub use swap_tables::SwapTablesExecutor;
pub use window::{EdgeType, TableWindow, WindowFunctionExecutor};
pub use window_aggs::{build_window_aggregate, WindowAggregate, WindowAggregateRow};

use crate::engine::SiteEngine;
use crate::memory::TempTableLimits;
use crate::plan::PlanNode;
use crate::table::TempTable;
use crate::types::SqlValue;
use eyre::Result;

pub enum PlanExecutor {
    Projection(ProjectionExecutor),
    SwapTables(SwapTablesExecutor),
    WindowFunction(WindowFunctionExecutor),
    Insert(InsertExecutor),
}

impl PlanExecutor {
    /// Wraps a plan node in its executor.
    pub fn build(node: PlanNode) -> Self {
        match node {
            PlanNode::Projection(n) => PlanExecutor::Projection(ProjectionExecutor::new(n)),
            PlanNode::SwapTables(n) => PlanExecutor::SwapTables(SwapTablesExecutor::new(n)),
            PlanNode::WindowFunction(n) => {
                PlanExecutor::WindowFunction(WindowFunctionExecutor::new(n))
            }
            PlanNode::Insert(n) => PlanExecutor::Insert(InsertExecutor::new(n)),
        }
    }

    pub fn init(&mut self, limits: &TempTableLimits) -> Result<()> {
        match self {
            PlanExecutor::Projection(e) => e.init(limits),
            PlanExecutor::SwapTables(e) => e.init(limits),
            PlanExecutor::WindowFunction(e) => e.init(limits),
            PlanExecutor::Insert(e) => e.init(limits),
        }
    }

    pub fn execute(
        &mut self,
        input: Option<&mut TempTable>,
        params: &[SqlValue],
        engine: &SiteEngine,
    ) -> Result<()> {
        match self {
            PlanExecutor::Projection(e) => e.execute(input, params, engine),
            PlanExecutor::SwapTables(e) => e.execute(input, params, engine),
            PlanExecutor::WindowFunction(e) => e.execute(input, params, engine),
            PlanExecutor::Insert(e) => e.execute(input, params, engine),
        }
    }

    /// List index of the child whose output feeds this executor.
    pub fn child(&self) -> Option<usize> {
        match self {
            PlanExecutor::Projection(e) => e.node().child,
            PlanExecutor::SwapTables(_) => None,
            PlanExecutor::WindowFunction(e) => e.node().child,
            PlanExecutor::Insert(e) => e.node().child,
        }
    }

    /// True when this executor is an insert targeting a replicated
    /// persistent table — the case the dispatcher must gate through the
    /// host coordination protocol.
    pub fn is_replicated_insert(&self) -> bool {
        match self {
            PlanExecutor::Insert(e) => e.targets_replicated_table(),
            _ => false,
        }
    }

    pub fn output_table(&self) -> Option<&TempTable> {
        match self {
            PlanExecutor::Projection(e) => e.output_table(),
            PlanExecutor::SwapTables(e) => e.output_table(),
            PlanExecutor::WindowFunction(e) => e.output_table(),
            PlanExecutor::Insert(e) => e.output_table(),
        }
    }

    pub fn output_table_mut(&mut self) -> Option<&mut TempTable> {
        match self {
            PlanExecutor::Projection(e) => e.output_table_mut(),
            PlanExecutor::SwapTables(e) => e.output_table_mut(),
            PlanExecutor::WindowFunction(e) => e.output_table_mut(),
            PlanExecutor::Insert(e) => e.output_table_mut(),
        }
    }

    pub fn output_temp_table_is_empty(&self) -> bool {
        self.output_table().map_or(true, TempTable::is_empty)
    }

    /// Releases the temp output table's rows. Safe to call repeatedly.
    pub fn cleanup_temp_output_table(&mut self) {
        if let Some(table) = self.output_table_mut() {
            table.delete_all_temp_tuples();
        }
    }

    /// Releases per-executor scratch memory. Safe to call repeatedly.
    pub fn cleanup_memory_pool(&mut self) {
        if let PlanExecutor::WindowFunction(e) = self {
            e.cleanup_memory_pool();
        }
    }
}
