//! Predicate expression trees

use std::cmp::Ordering;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::column::{date_to_days, ScalarValue};

/// Typed literal values usable in predicates and projections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Literal {
    Null,
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Date(NaiveDate),
}

impl Literal {
    pub fn to_scalar(&self) -> ScalarValue {
        match self {
            Literal::Null => ScalarValue::Null,
            Literal::Int(v) => ScalarValue::Int64(*v),
            Literal::Float(v) => ScalarValue::Float64(*v),
            Literal::Str(v) => ScalarValue::Utf8(v.clone()),
            Literal::Bool(v) => ScalarValue::Boolean(*v),
            Literal::Date(d) => ScalarValue::Date32(date_to_days(*d)),
        }
    }
}

impl From<i64> for Literal {
    fn from(v: i64) -> Self {
        Literal::Int(v)
    }
}

impl From<i32> for Literal {
    fn from(v: i32) -> Self {
        Literal::Int(v as i64)
    }
}

impl From<u32> for Literal {
    fn from(v: u32) -> Self {
        Literal::Int(v as i64)
    }
}

impl From<f64> for Literal {
    fn from(v: f64) -> Self {
        Literal::Float(v)
    }
}

impl From<&str> for Literal {
    fn from(v: &str) -> Self {
        Literal::Str(v.to_string())
    }
}

impl From<bool> for Literal {
    fn from(v: bool) -> Self {
        Literal::Bool(v)
    }
}

impl From<NaiveDate> for Literal {
    fn from(v: NaiveDate) -> Self {
        Literal::Date(v)
    }
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Lt,
    LtEq,
    Gt,
    GtEq,
    Eq,
    NotEq,
}

impl CompareOp {
    #[inline]
    pub fn matches(&self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::LtEq => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::GtEq => ordering != Ordering::Less,
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::NotEq => ordering != Ordering::Equal,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Lt => "<",
            CompareOp::LtEq => "<=",
            CompareOp::Gt => ">",
            CompareOp::GtEq => ">=",
            CompareOp::Eq => "==",
            CompareOp::NotEq => "!=",
        }
    }
}

/// A comparison operand
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    Column(String),
    Literal(Literal),
}

/// Boolean predicate over the columns of one batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    Compare {
        op: CompareOp,
        left: Operand,
        right: Operand,
    },
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    /// `column op literal`
    pub fn compare(column: impl Into<String>, op: CompareOp, value: impl Into<Literal>) -> Self {
        Predicate::Compare {
            op,
            left: Operand::Column(column.into()),
            right: Operand::Literal(value.into()),
        }
    }

    /// `left op right` over two columns
    pub fn compare_columns(
        left: impl Into<String>,
        op: CompareOp,
        right: impl Into<String>,
    ) -> Self {
        Predicate::Compare {
            op,
            left: Operand::Column(left.into()),
            right: Operand::Column(right.into()),
        }
    }

    pub fn eq(column: impl Into<String>, value: impl Into<Literal>) -> Self {
        Self::compare(column, CompareOp::Eq, value)
    }

    pub fn not_eq(column: impl Into<String>, value: impl Into<Literal>) -> Self {
        Self::compare(column, CompareOp::NotEq, value)
    }

    pub fn lt(column: impl Into<String>, value: impl Into<Literal>) -> Self {
        Self::compare(column, CompareOp::Lt, value)
    }

    pub fn lte(column: impl Into<String>, value: impl Into<Literal>) -> Self {
        Self::compare(column, CompareOp::LtEq, value)
    }

    pub fn gt(column: impl Into<String>, value: impl Into<Literal>) -> Self {
        Self::compare(column, CompareOp::Gt, value)
    }

    pub fn gte(column: impl Into<String>, value: impl Into<Literal>) -> Self {
        Self::compare(column, CompareOp::GtEq, value)
    }

    pub fn and(self, other: Predicate) -> Self {
        Predicate::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Predicate) -> Self {
        Predicate::Or(Box::new(self), Box::new(other))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Predicate::Not(Box::new(self))
    }

    /// Column names referenced anywhere in the tree, in first-seen order
    pub fn referenced_columns(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_columns(&mut names);
        names
    }

    fn collect_columns<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Predicate::Compare { left, right, .. } => {
                for operand in [left, right] {
                    if let Operand::Column(name) = operand {
                        if !names.contains(&name.as_str()) {
                            names.push(name.as_str());
                        }
                    }
                }
            }
            Predicate::And(a, b) | Predicate::Or(a, b) => {
                a.collect_columns(names);
                b.collect_columns(names);
            }
            Predicate::Not(inner) => inner.collect_columns(names),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_op_matches() {
        assert!(CompareOp::LtEq.matches(Ordering::Equal));
        assert!(!CompareOp::Lt.matches(Ordering::Equal));
        assert!(CompareOp::NotEq.matches(Ordering::Greater));
    }

    #[test]
    fn test_referenced_columns() {
        let pred = Predicate::gte("key", 10)
            .and(Predicate::lte("key", 20))
            .or(Predicate::compare_columns("a", CompareOp::Lt, "b").not());
        assert_eq!(pred.referenced_columns(), vec!["key", "a", "b"]);
    }

    #[test]
    fn test_date_literal_scalar() {
        let date = NaiveDate::from_ymd_opt(1970, 1, 2).unwrap();
        assert_eq!(Literal::from(date).to_scalar(), ScalarValue::Date32(1));
    }

    #[test]
    fn test_predicate_json() {
        let pred = Predicate::lt("l_quantity", 24);
        let json = serde_json::to_string(&pred).unwrap();
        let back: Predicate = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pred);
    }
}
