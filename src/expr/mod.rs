//! # Expressions
//!
//! The closed expression tree executors evaluate: column references,
//! parameter references, constants, and addition. Plans arrive
//! pre-compiled, so there is no name resolution here — a column reference
//! is already an index into the input row and a parameter reference an
//! index into the parameter vector.
//!
//! The projection executor's two fast paths are detected over whole
//! expression lists: [`all_column_refs`] when every output column is a bare
//! input-column reference, [`all_param_refs`] when every output column is a
//! bare parameter reference.

use crate::tuple::{ColumnInfo, TupleSchema, TupleView};
use crate::types::{DataType, SqlValue};
use eyre::{bail, Result};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum Expression {
    /// Bare input-column reference.
    TupleValue { column: usize },
    /// Bare parameter reference with its planner-declared type.
    ParameterValue { index: usize, value_type: DataType },
    /// Literal constant.
    ConstantValue(SqlValue),
    /// Addition with numeric promotion.
    OpPlus {
        left: Box<Expression>,
        right: Box<Expression>,
    },
}

impl Expression {
    pub fn column(column: usize) -> Self {
        Expression::TupleValue { column }
    }

    pub fn parameter(index: usize, value_type: DataType) -> Self {
        Expression::ParameterValue { index, value_type }
    }

    pub fn constant(value: SqlValue) -> Self {
        Expression::ConstantValue(value)
    }

    pub fn add(left: Expression, right: Expression) -> Self {
        Expression::OpPlus {
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Evaluates against an optional input row and the parameter vector.
    pub fn eval(&self, row: Option<&TupleView<'_>>, params: &[SqlValue]) -> Result<SqlValue> {
        match self {
            Expression::TupleValue { column } => {
                let row = row.ok_or_else(|| {
                    eyre::eyre!("column reference {} evaluated without an input row", column)
                })?;
                row.value(*column)
            }
            Expression::ParameterValue { index, .. } => params
                .get(*index)
                .cloned()
                .ok_or_else(|| eyre::eyre!("parameter {} out of range", index)),
            Expression::ConstantValue(v) => Ok(v.clone()),
            Expression::OpPlus { left, right } => {
                left.eval(row, params)?.op_add(&right.eval(row, params)?)
            }
        }
    }

    /// Output column info for this expression over the given input schema.
    pub fn output_column(&self, input: &TupleSchema) -> Result<ColumnInfo> {
        match self {
            Expression::TupleValue { column } => {
                if *column >= input.column_count() {
                    bail!("column reference {} out of input range", column);
                }
                Ok(input.column(*column).clone())
            }
            Expression::ParameterValue { value_type, .. } => Ok(ColumnInfo::new(*value_type)),
            Expression::ConstantValue(v) => Ok(ColumnInfo::new(
                v.data_type()
                    .ok_or_else(|| eyre::eyre!("untyped NULL constant in key expression"))?,
            )),
            Expression::OpPlus { left, right } => {
                let l = left.output_column(input)?;
                let r = right.output_column(input)?;
                let t = match (l.data_type, r.data_type) {
                    (DataType::BigInt, DataType::BigInt) => DataType::BigInt,
                    (DataType::Double, _) | (_, DataType::Double) => DataType::Double,
                    (a, b) => bail!("type error: cannot add {:?} and {:?}", a, b),
                };
                Ok(ColumnInfo::new(t))
            }
        }
    }

    /// Largest input column this expression touches, if any.
    pub fn max_column_ref(&self) -> Option<usize> {
        match self {
            Expression::TupleValue { column } => Some(*column),
            Expression::ParameterValue { .. } | Expression::ConstantValue(_) => None,
            Expression::OpPlus { left, right } => {
                match (left.max_column_ref(), right.max_column_ref()) {
                    (Some(a), Some(b)) => Some(a.max(b)),
                    (a, b) => a.or(b),
                }
            }
        }
    }
}

/// Builds the key schema for a window scan from its key expression list.
pub fn schema_from_expressions(
    exprs: &[Expression],
    input: &TupleSchema,
) -> Result<Arc<TupleSchema>> {
    let mut columns = Vec::with_capacity(exprs.len());
    for expr in exprs {
        columns.push(expr.output_column(input)?);
    }
    Ok(TupleSchema::new(columns))
}

/// Source column indices when every expression is a bare column reference.
pub fn all_column_refs(exprs: &[Expression]) -> Option<Vec<usize>> {
    exprs
        .iter()
        .map(|e| match e {
            Expression::TupleValue { column } => Some(*column),
            _ => None,
        })
        .collect()
}

/// Parameter indices when every expression is a bare parameter reference.
pub fn all_param_refs(exprs: &[Expression]) -> Option<Vec<usize>> {
    exprs
        .iter()
        .map(|e| match e {
            Expression::ParameterValue { index, .. } => Some(*index),
            _ => None,
        })
        .collect()
}
