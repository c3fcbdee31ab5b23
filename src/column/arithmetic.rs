//! Type-widening column arithmetic
//!
//! Any pair of integer-family operands produces int64 (the widest safe
//! integer, so int32 x int32 cannot overflow). int64 results are checked and
//! overflow is an error. Any float64 operand produces float64. Null in either
//! operand produces null.

use serde::{Deserialize, Serialize};

use super::buffer::ColumnBuffer;
use super::column::Column;
use super::types::{DataType, ScalarValue};
use crate::error::{EngineError, EngineResult};

/// Binary arithmetic operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArithOp {
    Add,
    Subtract,
    Multiply,
}

impl ArithOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Subtract => "-",
            ArithOp::Multiply => "*",
        }
    }

    fn apply_i64(&self, a: i64, b: i64) -> Option<i64> {
        match self {
            ArithOp::Add => a.checked_add(b),
            ArithOp::Subtract => a.checked_sub(b),
            ArithOp::Multiply => a.checked_mul(b),
        }
    }

    fn apply_f64(&self, a: f64, b: f64) -> f64 {
        match self {
            ArithOp::Add => a + b,
            ArithOp::Subtract => a - b,
            ArithOp::Multiply => a * b,
        }
    }
}

/// One side of an arithmetic expression
#[derive(Debug, Clone, Copy)]
pub enum ArithInput<'a> {
    Column(&'a Column),
    Scalar(&'a ScalarValue),
}

impl ArithInput<'_> {
    fn data_type(&self) -> Option<DataType> {
        match self {
            ArithInput::Column(c) => Some(c.data_type()),
            ArithInput::Scalar(v) => v.data_type(),
        }
    }

    #[inline]
    fn i64_at(&self, row: usize) -> Option<i64> {
        match self {
            ArithInput::Column(c) => c.i64_at(row),
            ArithInput::Scalar(v) => v.as_i64(),
        }
    }

    #[inline]
    fn f64_at(&self, row: usize) -> Option<f64> {
        match self {
            ArithInput::Column(c) => c.f64_at(row),
            ArithInput::Scalar(v) => v.as_f64(),
        }
    }
}

/// Result type of `left op right`; a null literal adopts the other side's type
pub fn result_type(
    op: ArithOp,
    left: Option<DataType>,
    right: Option<DataType>,
) -> EngineResult<DataType> {
    for t in [left, right].into_iter().flatten() {
        if !t.is_numeric() {
            return Err(EngineError::type_mismatch(format!(
                "operator '{}' is not defined for {}",
                op.symbol(),
                t
            )));
        }
    }
    if left == Some(DataType::Float64) || right == Some(DataType::Float64) {
        Ok(DataType::Float64)
    } else {
        Ok(DataType::Int64)
    }
}

/// Evaluates `left op right` over `len` rows
pub fn evaluate(
    op: ArithOp,
    left: ArithInput<'_>,
    right: ArithInput<'_>,
    len: usize,
) -> EngineResult<ColumnBuffer> {
    match result_type(op, left.data_type(), right.data_type())? {
        DataType::Float64 => {
            let values = (0..len)
                .map(|row| match (left.f64_at(row), right.f64_at(row)) {
                    (Some(a), Some(b)) => Some(op.apply_f64(a, b)),
                    _ => None,
                })
                .collect();
            Ok(ColumnBuffer::from_opt_f64(values))
        }
        _ => {
            let mut values = Vec::with_capacity(len);
            for row in 0..len {
                let value = match (left.i64_at(row), right.i64_at(row)) {
                    (Some(a), Some(b)) => Some(op.apply_i64(a, b).ok_or_else(|| {
                        EngineError::ArithmeticOverflow(format!(
                            "{} {} {} at row {}",
                            a,
                            op.symbol(),
                            b,
                            row
                        ))
                    })?),
                    _ => None,
                };
                values.push(value);
            }
            Ok(ColumnBuffer::from_opt_i64(values))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int32_product_widens() {
        let a = Column::new(ColumnBuffer::from_i32(vec![i32::MAX, 3]));
        let b = Column::new(ColumnBuffer::from_i32(vec![i32::MAX, 4]));
        let out = evaluate(ArithOp::Multiply, ArithInput::Column(&a), ArithInput::Column(&b), 2)
            .unwrap();
        assert_eq!(out.data_type(), DataType::Int64);
        assert_eq!(out.value(0), ScalarValue::Int64(i32::MAX as i64 * i32::MAX as i64));
        assert_eq!(out.value(1), ScalarValue::Int64(12));
    }

    #[test]
    fn test_literal_minus_column() {
        let discount = Column::new(ColumnBuffer::from_u32(vec![5, 7]));
        let hundred = ScalarValue::Int64(100);
        let out = evaluate(
            ArithOp::Subtract,
            ArithInput::Scalar(&hundred),
            ArithInput::Column(&discount),
            2,
        )
        .unwrap();
        assert_eq!(out.value(0), ScalarValue::Int64(95));
        assert_eq!(out.value(1), ScalarValue::Int64(93));
    }

    #[test]
    fn test_int64_overflow_is_error() {
        let a = Column::new(ColumnBuffer::from_i64(vec![i64::MAX]));
        let one = ScalarValue::Int32(1);
        let err = evaluate(ArithOp::Add, ArithInput::Column(&a), ArithInput::Scalar(&one), 1)
            .unwrap_err();
        assert_eq!(err.code(), "COLEXEC_ARITHMETIC_OVERFLOW");
    }

    #[test]
    fn test_float_and_nulls() {
        let a = Column::new(ColumnBuffer::from_opt_i32(vec![Some(2), None]));
        let b = Column::new(ColumnBuffer::from_f64(vec![0.5, 1.0]));
        let out = evaluate(ArithOp::Multiply, ArithInput::Column(&a), ArithInput::Column(&b), 2)
            .unwrap();
        assert_eq!(out.value(0), ScalarValue::Float64(1.0));
        assert_eq!(out.value(1), ScalarValue::Null);
    }

    #[test]
    fn test_non_numeric_rejected() {
        assert!(result_type(ArithOp::Add, Some(DataType::Date32), Some(DataType::Int32)).is_err());
        assert!(result_type(ArithOp::Add, Some(DataType::Utf8), None).is_err());
        assert_eq!(
            result_type(ArithOp::Add, None, None).unwrap(),
            DataType::Int64
        );
    }
}
