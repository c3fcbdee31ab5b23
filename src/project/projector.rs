//! Projection and derived columns

use serde::{Deserialize, Serialize};

use crate::column::arithmetic::{self, ArithInput};
use crate::column::{ArithOp, Batch, Column, ColumnBuffer, ScalarValue};
use crate::error::{EngineError, EngineResult};
use crate::select::Literal;

/// Expression producing one output column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueExpr {
    Column(String),
    Literal(Literal),
    Binary {
        op: ArithOp,
        left: Box<ValueExpr>,
        right: Box<ValueExpr>,
    },
}

impl ValueExpr {
    pub fn column(name: impl Into<String>) -> Self {
        ValueExpr::Column(name.into())
    }

    pub fn literal(value: impl Into<Literal>) -> Self {
        ValueExpr::Literal(value.into())
    }

    pub fn binary(op: ArithOp, left: ValueExpr, right: ValueExpr) -> Self {
        ValueExpr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn add(self, other: ValueExpr) -> Self {
        Self::binary(ArithOp::Add, self, other)
    }

    pub fn subtract(self, other: ValueExpr) -> Self {
        Self::binary(ArithOp::Subtract, self, other)
    }

    pub fn multiply(self, other: ValueExpr) -> Self {
        Self::binary(ArithOp::Multiply, self, other)
    }
}

/// A named output column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    pub name: String,
    pub expr: ValueExpr,
}

impl Projection {
    pub fn new(name: impl Into<String>, expr: ValueExpr) -> Self {
        Self {
            name: name.into(),
            expr,
        }
    }

    /// Passes a column through under its own name
    pub fn keep(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            expr: ValueExpr::Column(name.clone()),
            name,
        }
    }
}

enum Value {
    Column(Column),
    Scalar(ScalarValue),
}

impl Value {
    fn as_input(&self) -> ArithInput<'_> {
        match self {
            Value::Column(c) => ArithInput::Column(c),
            Value::Scalar(v) => ArithInput::Scalar(v),
        }
    }
}

/// Builds batches of derived columns
pub struct Projector;

impl Projector {
    /// Evaluates every projection against `batch`.
    ///
    /// The result holds exactly the listed columns, in order. Column
    /// references are shared with the input, not copied.
    pub fn project(batch: &Batch, projections: &[Projection]) -> EngineResult<Batch> {
        let mut columns = Vec::with_capacity(projections.len());
        for projection in projections {
            let column = match Self::eval(batch, &projection.expr)? {
                Value::Column(column) => column,
                Value::Scalar(value) => {
                    let data_type = value.data_type().ok_or_else(|| {
                        EngineError::type_mismatch(format!(
                            "cannot infer a type for null column '{}'",
                            projection.name
                        ))
                    })?;
                    Column::new(ColumnBuffer::repeat(&value, data_type, batch.row_count())?)
                }
            };
            columns.push((projection.name.clone(), column));
        }
        Batch::with_row_count(columns, batch.row_count())
    }

    fn eval(batch: &Batch, expr: &ValueExpr) -> EngineResult<Value> {
        match expr {
            ValueExpr::Column(name) => Ok(Value::Column(batch.column(name)?.clone())),
            ValueExpr::Literal(lit) => Ok(Value::Scalar(lit.to_scalar())),
            ValueExpr::Binary { op, left, right } => {
                let left = Self::eval(batch, left)?;
                let right = Self::eval(batch, right)?;
                let buffer = arithmetic::evaluate(
                    *op,
                    left.as_input(),
                    right.as_input(),
                    batch.row_count(),
                )?;
                Ok(Value::Column(Column::new(buffer)))
            }
        }
    }
}
