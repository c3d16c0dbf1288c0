//! # Plan Nodes
//!
//! Pre-compiled plan fragments. A plan node names its input (the list
//! index of its child executor), its output schema, and whatever targets
//! or expressions its executor acts on. The planner that produces these
//! lives outside this crate; executor lists arrive topologically ordered —
//! every child precedes its parent.

use crate::expr::Expression;
use crate::table::SharedPersistentTable;
use crate::tuple::{ColumnInfo, TupleSchema};
use crate::types::DataType;
use smallvec::SmallVec;
use std::sync::Arc;

/// Window aggregate selector carried by a window-function plan node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowAggregateType {
    Rank,
    DenseRank,
    Count,
    /// Declared by the planner grammar but not implemented by this engine;
    /// reaching an executor with one of these is a query-fatal error.
    Min,
    Max,
}

/// One window aggregate: the function and its argument expressions.
#[derive(Debug, Clone)]
pub struct WindowAggregateSpec {
    pub agg_type: WindowAggregateType,
    pub inputs: SmallVec<[Expression; 2]>,
}

pub struct ProjectionNode {
    /// List index of the child producing this node's input table.
    pub child: Option<usize>,
    pub output_columns: Vec<Expression>,
    pub output_schema: Arc<TupleSchema>,
}

pub struct SwapTablesNode {
    pub target1: SharedPersistentTable,
    pub target2: SharedPersistentTable,
}

pub struct WindowFunctionNode {
    pub child: Option<usize>,
    pub aggregates: Vec<WindowAggregateSpec>,
    pub partition_by: Vec<Expression>,
    pub order_by: Vec<Expression>,
    /// Output expressions: one per output column. Columns past the
    /// aggregate count are pass-through expressions over the input row.
    pub output_columns: Vec<Expression>,
    pub input_schema: Arc<TupleSchema>,
    pub output_schema: Arc<TupleSchema>,
}

pub struct InsertNode {
    pub child: Option<usize>,
    pub target: SharedPersistentTable,
}

pub enum PlanNode {
    Projection(ProjectionNode),
    SwapTables(SwapTablesNode),
    WindowFunction(WindowFunctionNode),
    Insert(InsertNode),
}

impl PlanNode {
    /// List index of this node's child, if it reads one.
    pub fn child(&self) -> Option<usize> {
        match self {
            PlanNode::Projection(n) => n.child,
            PlanNode::SwapTables(_) => None,
            PlanNode::WindowFunction(n) => n.child,
            PlanNode::Insert(n) => n.child,
        }
    }
}

/// Schema of the one-row DML count output DML-style executors emit.
pub fn dml_count_schema() -> Arc<TupleSchema> {
    TupleSchema::new(vec![ColumnInfo::new(DataType::BigInt)])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dml_count_schema_is_one_bigint_column() {
        let schema = dml_count_schema();
        assert_eq!(schema.column_count(), 1);
        assert_eq!(schema.column(0).data_type, DataType::BigInt);
    }
}
