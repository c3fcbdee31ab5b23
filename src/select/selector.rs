//! Vectorized predicate evaluation
//!
//! A predicate is first compiled against a batch: column names are resolved
//! and every comparison is assigned a comparison domain, which is where
//! `UnknownColumn` and `TypeMismatch` surface. The compiled tree is then
//! evaluated bottom-up over row ranges, one boolean vector per node.
//!
//! Null handling uses three-valued logic: a comparison touching a null is
//! unknown, AND/OR/NOT follow the Kleene tables, and only the final mask
//! collapses unknown to false. `NOT (x < 5)` therefore rejects a null `x`.

use std::cmp::Ordering;
use std::ops::Range;

use super::expr::{CompareOp, Operand, Predicate};
use super::mask::SelectionMask;
use crate::column::{cmp_f64, Batch, Column, ColumnData, DataType, ScalarValue};
use crate::error::{EngineError, EngineResult};
use crate::parallel::Parallelism;

/// Per-row outcome of a predicate over a range.
///
/// `value[i]` implies `known[i]`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Truth {
    value: Vec<bool>,
    known: Vec<bool>,
}

impl Truth {
    fn unknown(len: usize) -> Self {
        Self {
            value: vec![false; len],
            known: vec![false; len],
        }
    }

    fn and(self, other: Truth) -> Truth {
        let known = (0..self.value.len())
            .map(|i| {
                (self.known[i] && other.known[i])
                    || (self.known[i] && !self.value[i])
                    || (other.known[i] && !other.value[i])
            })
            .collect();
        let value = self
            .value
            .iter()
            .zip(&other.value)
            .map(|(a, b)| *a && *b)
            .collect();
        Truth { value, known }
    }

    fn or(self, other: Truth) -> Truth {
        let value: Vec<bool> = self
            .value
            .iter()
            .zip(&other.value)
            .map(|(a, b)| *a || *b)
            .collect();
        let known = (0..value.len())
            .map(|i| (self.known[i] && other.known[i]) || value[i])
            .collect();
        Truth { value, known }
    }

    fn not(self) -> Truth {
        let value = self
            .value
            .iter()
            .zip(&self.known)
            .map(|(v, k)| *k && !*v)
            .collect();
        Truth {
            value,
            known: self.known,
        }
    }
}

/// Value domain a comparison is carried out in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Domain {
    Int,
    Float,
    Date,
    Str,
    Bool,
}

fn comparison_domain(
    op: CompareOp,
    left: Option<DataType>,
    right: Option<DataType>,
) -> EngineResult<Option<Domain>> {
    let (l, r) = match (left, right) {
        (Some(l), Some(r)) => (l, r),
        _ => return Ok(None),
    };
    let domain = if l.is_integer() && r.is_integer() {
        Domain::Int
    } else if l.is_numeric() && r.is_numeric() {
        Domain::Float
    } else {
        match (l, r) {
            (DataType::Date32, DataType::Date32) => Domain::Date,
            (DataType::Utf8, DataType::Utf8) => Domain::Str,
            (DataType::Boolean, DataType::Boolean) => Domain::Bool,
            _ => {
                return Err(EngineError::type_mismatch(format!(
                    "cannot compare {} {} {}",
                    l,
                    op.symbol(),
                    r
                )))
            }
        }
    };
    Ok(Some(domain))
}

/// Operand bound to a batch column or a literal
#[derive(Debug)]
enum Bound<'a> {
    Column(&'a Column),
    Scalar(ScalarValue),
}

impl Bound<'_> {
    fn data_type(&self) -> Option<DataType> {
        match self {
            Bound::Column(c) => Some(c.data_type()),
            Bound::Scalar(v) => v.data_type(),
        }
    }

    #[inline]
    fn i64_at(&self, row: usize) -> Option<i64> {
        match self {
            Bound::Column(c) => c.i64_at(row),
            Bound::Scalar(v) => v.as_i64(),
        }
    }

    #[inline]
    fn f64_at(&self, row: usize) -> Option<f64> {
        match self {
            Bound::Column(c) => c.f64_at(row),
            Bound::Scalar(v) => v.as_f64(),
        }
    }

    #[inline]
    fn date_at(&self, row: usize) -> Option<i32> {
        match self {
            Bound::Column(c) => c.date_at(row),
            Bound::Scalar(ScalarValue::Date32(d)) => Some(*d),
            Bound::Scalar(_) => None,
        }
    }

    #[inline]
    fn str_at(&self, row: usize) -> Option<&str> {
        match self {
            Bound::Column(c) => c.str_at(row),
            Bound::Scalar(ScalarValue::Utf8(s)) => Some(s.as_str()),
            Bound::Scalar(_) => None,
        }
    }

    #[inline]
    fn bool_at(&self, row: usize) -> Option<bool> {
        match self {
            Bound::Column(c) => c.bool_at(row),
            Bound::Scalar(ScalarValue::Boolean(b)) => Some(*b),
            Bound::Scalar(_) => None,
        }
    }

    fn scalar(&self) -> Option<&ScalarValue> {
        match self {
            Bound::Scalar(v) => Some(v),
            Bound::Column(_) => None,
        }
    }

    fn value(&self, row: usize) -> ScalarValue {
        match self {
            Bound::Column(c) => c.value(row),
            Bound::Scalar(v) => v.clone(),
        }
    }
}

/// A predicate resolved against one batch
#[derive(Debug)]
enum Compiled<'a> {
    Compare {
        op: CompareOp,
        domain: Option<Domain>,
        left: Bound<'a>,
        right: Bound<'a>,
    },
    And(Box<Compiled<'a>>, Box<Compiled<'a>>),
    Or(Box<Compiled<'a>>, Box<Compiled<'a>>),
    Not(Box<Compiled<'a>>),
}

fn bind<'a>(operand: &Operand, batch: &'a Batch) -> EngineResult<Bound<'a>> {
    match operand {
        Operand::Column(name) => Ok(Bound::Column(batch.column(name)?)),
        Operand::Literal(lit) => Ok(Bound::Scalar(lit.to_scalar())),
    }
}

fn compile<'a>(predicate: &Predicate, batch: &'a Batch) -> EngineResult<Compiled<'a>> {
    Ok(match predicate {
        Predicate::Compare { op, left, right } => {
            let left = bind(left, batch)?;
            let right = bind(right, batch)?;
            let domain = comparison_domain(*op, left.data_type(), right.data_type())?;
            Compiled::Compare {
                op: *op,
                domain,
                left,
                right,
            }
        }
        Predicate::And(a, b) => {
            Compiled::And(Box::new(compile(a, batch)?), Box::new(compile(b, batch)?))
        }
        Predicate::Or(a, b) => {
            Compiled::Or(Box::new(compile(a, batch)?), Box::new(compile(b, batch)?))
        }
        Predicate::Not(inner) => Compiled::Not(Box::new(compile(inner, batch)?)),
    })
}

fn kernel<T>(
    range: Range<usize>,
    op: CompareOp,
    left: impl Fn(usize) -> Option<T>,
    right: impl Fn(usize) -> Option<T>,
    cmp: impl Fn(&T, &T) -> Ordering,
) -> Truth {
    let mut truth = Truth::unknown(range.len());
    for (i, row) in range.enumerate() {
        if let (Some(a), Some(b)) = (left(row), right(row)) {
            truth.known[i] = true;
            truth.value[i] = op.matches(cmp(&a, &b));
        }
    }
    truth
}

/// Dense scan of a null-free, unselected column against a constant
fn scan_slice<T: Copy>(values: &[T], range: Range<usize>, test: impl Fn(T) -> bool) -> Truth {
    Truth {
        value: values[range.clone()].iter().map(|&v| test(v)).collect(),
        known: vec![true; range.len()],
    }
}

impl Compiled<'_> {
    fn eval(&self, range: Range<usize>) -> Truth {
        match self {
            Compiled::Compare {
                op,
                domain,
                left,
                right,
            } => match domain {
                None => Truth::unknown(range.len()),
                Some(domain) => Self::compare(*op, *domain, left, right, range),
            },
            Compiled::And(a, b) => a.eval(range.clone()).and(b.eval(range)),
            Compiled::Or(a, b) => a.eval(range.clone()).or(b.eval(range)),
            Compiled::Not(inner) => inner.eval(range).not(),
        }
    }

    fn compare(
        op: CompareOp,
        domain: Domain,
        left: &Bound<'_>,
        right: &Bound<'_>,
        range: Range<usize>,
    ) -> Truth {
        if let Some(truth) = Self::fast_compare(op, domain, left, right, range.clone()) {
            return truth;
        }
        match domain {
            Domain::Int => kernel(range, op, |r| left.i64_at(r), |r| right.i64_at(r), |a, b| {
                a.cmp(b)
            }),
            Domain::Float => kernel(range, op, |r| left.f64_at(r), |r| right.f64_at(r), |a, b| {
                cmp_f64(*a, *b)
            }),
            Domain::Date => kernel(range, op, |r| left.date_at(r), |r| right.date_at(r), |a, b| {
                a.cmp(b)
            }),
            Domain::Str => kernel(range, op, |r| left.str_at(r), |r| right.str_at(r), |a, b| {
                a.cmp(b)
            }),
            Domain::Bool => kernel(range, op, |r| left.bool_at(r), |r| right.bool_at(r), |a, b| {
                a.cmp(b)
            }),
        }
    }

    /// Column-vs-constant comparison over plain numeric storage
    fn fast_compare(
        op: CompareOp,
        domain: Domain,
        left: &Bound<'_>,
        right: &Bound<'_>,
        range: Range<usize>,
    ) -> Option<Truth> {
        let column = match left {
            Bound::Column(c) if !c.is_view() && !c.has_nulls() => *c,
            _ => return None,
        };
        let constant = right.scalar()?;
        match (domain, column.buffer().data()) {
            (Domain::Int, ColumnData::I32(v)) => {
                let k = constant.as_i64()?;
                Some(scan_slice(v, range, |x| op.matches((x as i64).cmp(&k))))
            }
            (Domain::Int, ColumnData::I64(v)) => {
                let k = constant.as_i64()?;
                Some(scan_slice(v, range, |x| op.matches(x.cmp(&k))))
            }
            (Domain::Int, ColumnData::U32(v)) => {
                let k = constant.as_i64()?;
                Some(scan_slice(v, range, |x| op.matches((x as i64).cmp(&k))))
            }
            (Domain::Float, ColumnData::F64(v)) => {
                let k = constant.as_f64()?;
                Some(scan_slice(v, range, |x| op.matches(cmp_f64(x, k))))
            }
            (Domain::Date, ColumnData::I32(v)) => match constant {
                ScalarValue::Date32(k) => Some(scan_slice(v, range, |x| op.matches(x.cmp(k)))),
                _ => None,
            },
            _ => None,
        }
    }

    /// Row-at-a-time evaluation on scalar values
    fn eval_row(&self, row: usize) -> Option<bool> {
        match self {
            Compiled::Compare {
                op, left, right, ..
            } => left
                .value(row)
                .compare(&right.value(row))
                .map(|ordering| op.matches(ordering)),
            Compiled::And(a, b) => match (a.eval_row(row), b.eval_row(row)) {
                (Some(false), _) | (_, Some(false)) => Some(false),
                (Some(true), Some(true)) => Some(true),
                _ => None,
            },
            Compiled::Or(a, b) => match (a.eval_row(row), b.eval_row(row)) {
                (Some(true), _) | (_, Some(true)) => Some(true),
                (Some(false), Some(false)) => Some(false),
                _ => None,
            },
            Compiled::Not(inner) => inner.eval_row(row).map(|v| !v),
        }
    }
}

/// Evaluates predicates against batches
pub struct Selector;

impl Selector {
    /// Single-threaded selection over the whole batch
    pub fn select(batch: &Batch, predicate: &Predicate) -> EngineResult<SelectionMask> {
        Self::select_with(batch, predicate, Parallelism::serial())
    }

    /// Selection with partial masks computed per morsel and concatenated in
    /// morsel order
    pub fn select_with(
        batch: &Batch,
        predicate: &Predicate,
        parallelism: Parallelism,
    ) -> EngineResult<SelectionMask> {
        let compiled = compile(predicate, batch)?;
        let parts = parallelism.map_morsels(batch.row_count(), |range| compiled.eval(range).value);
        Ok(SelectionMask::from_bools(&parts.concat()))
    }

    /// Checks column names and operand types without evaluating
    pub fn validate(batch: &Batch, predicate: &Predicate) -> EngineResult<()> {
        compile(predicate, batch).map(|_| ())
    }

    /// Scalar evaluation of one row, independent of the vectorized kernels
    pub fn evaluate_row(batch: &Batch, predicate: &Predicate, row: usize) -> EngineResult<bool> {
        let compiled = compile(predicate, batch)?;
        Ok(compiled.eval_row(row).unwrap_or(false))
    }
}
