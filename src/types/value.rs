//! # Runtime Value Representation
//!
//! This module provides [`SqlValue`], the runtime scalar cell flowing
//! between tuples, expressions, and aggregates.
//!
//! ## Comparison Semantics
//!
//! - NULL compares equal to NULL and before any non-NULL value, so NULL
//!   keys group together in partition-by and order-by scans.
//! - Values compare with a total order within each type.
//! - Comparing values of different types is a type error; the engine never
//!   feeds mixed-type cells to one key column.
//!
//! ## Arithmetic
//!
//! `op_add` propagates NULL, adds like-typed numerics, and promotes
//! bigint/double mixes to double. Anything else is a type error.

use crate::types::DataType;
use eyre::{bail, Result};
use std::cmp::Ordering;

/// Runtime scalar cell.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Boolean(bool),
    BigInt(i64),
    Double(f64),
    Timestamp(i64),
    Text(String),
}

impl SqlValue {
    /// Constructs a BIGINT value.
    pub fn big_int(v: i64) -> Self {
        SqlValue::BigInt(v)
    }

    /// Returns true if this value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Storage type of this value, or `None` for NULL.
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            SqlValue::Null => None,
            SqlValue::Boolean(_) => Some(DataType::Boolean),
            SqlValue::BigInt(_) => Some(DataType::BigInt),
            SqlValue::Double(_) => Some(DataType::Double),
            SqlValue::Timestamp(_) => Some(DataType::Timestamp),
            SqlValue::Text(_) => Some(DataType::Text),
        }
    }

    /// Compares two values. NULL sorts first and equals NULL; comparing
    /// different non-NULL types is a type error.
    pub fn compare(&self, other: &SqlValue) -> Result<Ordering> {
        match (self, other) {
            (SqlValue::Null, SqlValue::Null) => Ok(Ordering::Equal),
            (SqlValue::Null, _) => Ok(Ordering::Less),
            (_, SqlValue::Null) => Ok(Ordering::Greater),
            (SqlValue::Boolean(a), SqlValue::Boolean(b)) => Ok(a.cmp(b)),
            (SqlValue::BigInt(a), SqlValue::BigInt(b)) => Ok(a.cmp(b)),
            (SqlValue::Timestamp(a), SqlValue::Timestamp(b)) => Ok(a.cmp(b)),
            (SqlValue::Double(a), SqlValue::Double(b)) => a
                .partial_cmp(b)
                .ok_or_else(|| eyre::eyre!("cannot order NaN double")),
            (SqlValue::Text(a), SqlValue::Text(b)) => Ok(a.cmp(b)),
            (a, b) => bail!(
                "type error: cannot compare {:?} with {:?}",
                a.data_type(),
                b.data_type()
            ),
        }
    }

    /// Adds two values. NULL operands yield NULL; bigint/double mixes
    /// promote to double.
    pub fn op_add(&self, other: &SqlValue) -> Result<SqlValue> {
        match (self, other) {
            (SqlValue::Null, _) | (_, SqlValue::Null) => Ok(SqlValue::Null),
            (SqlValue::BigInt(a), SqlValue::BigInt(b)) => Ok(SqlValue::BigInt(
                a.checked_add(*b)
                    .ok_or_else(|| eyre::eyre!("bigint overflow in addition"))?,
            )),
            (SqlValue::Double(a), SqlValue::Double(b)) => Ok(SqlValue::Double(a + b)),
            (SqlValue::BigInt(a), SqlValue::Double(b)) => Ok(SqlValue::Double(*a as f64 + b)),
            (SqlValue::Double(a), SqlValue::BigInt(b)) => Ok(SqlValue::Double(a + *b as f64)),
            (a, b) => bail!(
                "type error: cannot add {:?} and {:?}",
                a.data_type(),
                b.data_type()
            ),
        }
    }

    /// Casts this value to the target type. NULL casts to NULL of any type.
    pub fn cast_as(&self, target: DataType) -> Result<SqlValue> {
        match (self, target) {
            (SqlValue::Null, _) => Ok(SqlValue::Null),
            (v, t) if v.data_type() == Some(t) => Ok(v.clone()),
            (SqlValue::BigInt(i), DataType::Double) => Ok(SqlValue::Double(*i as f64)),
            (SqlValue::BigInt(i), DataType::Timestamp) => Ok(SqlValue::Timestamp(*i)),
            (SqlValue::BigInt(i), DataType::Text) => Ok(SqlValue::Text(i.to_string())),
            (SqlValue::Double(f), DataType::BigInt) => Ok(SqlValue::BigInt(*f as i64)),
            (SqlValue::Timestamp(t), DataType::BigInt) => Ok(SqlValue::BigInt(*t)),
            (SqlValue::Boolean(b), DataType::BigInt) => {
                Ok(SqlValue::BigInt(if *b { 1 } else { 0 }))
            }
            (v, t) => bail!("cannot cast {:?} to {:?}", v.data_type(), t),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_compares_equal_to_null_and_first_otherwise() {
        assert_eq!(
            SqlValue::Null.compare(&SqlValue::Null).unwrap(),
            Ordering::Equal
        );
        assert_eq!(
            SqlValue::Null.compare(&SqlValue::BigInt(0)).unwrap(),
            Ordering::Less
        );
        assert_eq!(
            SqlValue::BigInt(0).compare(&SqlValue::Null).unwrap(),
            Ordering::Greater
        );
    }

    #[test]
    fn cross_type_comparison_is_a_type_error() {
        assert!(SqlValue::BigInt(1)
            .compare(&SqlValue::Text("1".into()))
            .is_err());
        assert!(SqlValue::Boolean(true)
            .compare(&SqlValue::Double(1.0))
            .is_err());
    }

    #[test]
    fn add_propagates_null_and_promotes_mixed_numerics() {
        assert!(SqlValue::Null
            .op_add(&SqlValue::BigInt(1))
            .unwrap()
            .is_null());
        assert_eq!(
            SqlValue::BigInt(2).op_add(&SqlValue::BigInt(3)).unwrap(),
            SqlValue::BigInt(5)
        );
        assert_eq!(
            SqlValue::BigInt(2).op_add(&SqlValue::Double(0.5)).unwrap(),
            SqlValue::Double(2.5)
        );
    }

    #[test]
    fn add_overflow_is_an_error() {
        assert!(SqlValue::BigInt(i64::MAX)
            .op_add(&SqlValue::BigInt(1))
            .is_err());
    }

    #[test]
    fn casts_cover_the_numeric_paths() {
        assert_eq!(
            SqlValue::BigInt(7).cast_as(DataType::Double).unwrap(),
            SqlValue::Double(7.0)
        );
        assert_eq!(
            SqlValue::Double(7.9).cast_as(DataType::BigInt).unwrap(),
            SqlValue::BigInt(7)
        );
        assert!(SqlValue::Null.cast_as(DataType::Text).unwrap().is_null());
        assert!(SqlValue::Text("x".into()).cast_as(DataType::Double).is_err());
    }
}
