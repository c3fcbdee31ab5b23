//! Shared column handle with an optional selection index
//!
//! A `Column` is either a whole buffer or a view over one. Views hold a
//! reference-counted handle to the parent buffer plus their own row index
//! array; the buffer is released once the last handle is dropped.

use std::cmp::Ordering;
use std::ops::Range;
use std::sync::Arc;

use super::buffer::{ColumnBuffer, ColumnData};
use super::types::{cmp_f64, DataType, ScalarValue};

/// A logical column: buffer plus optional row selection
#[derive(Debug, Clone)]
pub struct Column {
    buffer: Arc<ColumnBuffer>,
    selection: Option<Arc<[usize]>>,
}

impl Column {
    pub fn new(buffer: ColumnBuffer) -> Self {
        Self {
            buffer: Arc::new(buffer),
            selection: None,
        }
    }

    pub fn from_shared(buffer: Arc<ColumnBuffer>) -> Self {
        Self {
            buffer,
            selection: None,
        }
    }

    pub(crate) fn with_selection(buffer: Arc<ColumnBuffer>, selection: Arc<[usize]>) -> Self {
        Self {
            buffer,
            selection: Some(selection),
        }
    }

    pub fn len(&self) -> usize {
        match &self.selection {
            Some(rows) => rows.len(),
            None => self.buffer.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn data_type(&self) -> DataType {
        self.buffer.data_type()
    }

    pub fn buffer(&self) -> &ColumnBuffer {
        &self.buffer
    }

    pub fn selection(&self) -> Option<&[usize]> {
        self.selection.as_deref()
    }

    /// Returns true if this column is a view over another buffer
    pub fn is_view(&self) -> bool {
        self.selection.is_some()
    }

    /// Returns true if both columns read from the same buffer allocation
    pub fn shares_buffer(&self, other: &Column) -> bool {
        Arc::ptr_eq(&self.buffer, &other.buffer)
    }

    /// Maps a logical row to its position in the buffer
    #[inline]
    pub fn physical(&self, row: usize) -> usize {
        match &self.selection {
            Some(rows) => rows[row],
            None => row,
        }
    }

    #[inline]
    pub fn is_valid(&self, row: usize) -> bool {
        self.buffer.is_valid(self.physical(row))
    }

    pub fn has_nulls(&self) -> bool {
        self.buffer.validity().is_some()
    }

    pub fn value(&self, row: usize) -> ScalarValue {
        self.buffer.value(self.physical(row))
    }

    /// Integer family value widened to i64; `None` when null or not an integer
    #[inline]
    pub fn i64_at(&self, row: usize) -> Option<i64> {
        let p = self.physical(row);
        if !self.buffer.is_valid(p) {
            return None;
        }
        match self.buffer.data() {
            ColumnData::I32(v) if self.data_type() != DataType::Date32 => Some(v[p] as i64),
            ColumnData::I64(v) => Some(v[p]),
            ColumnData::U32(v) => Some(v[p] as i64),
            _ => None,
        }
    }

    /// Numeric value as f64; `None` when null or not numeric
    #[inline]
    pub fn f64_at(&self, row: usize) -> Option<f64> {
        let p = self.physical(row);
        if !self.buffer.is_valid(p) {
            return None;
        }
        match self.buffer.data() {
            ColumnData::F64(v) => Some(v[p]),
            _ => self.i64_at(row).map(|v| v as f64),
        }
    }

    /// date32 value; `None` when null or not a date column
    #[inline]
    pub fn date_at(&self, row: usize) -> Option<i32> {
        let p = self.physical(row);
        match self.buffer.data() {
            ColumnData::I32(v)
                if self.data_type() == DataType::Date32 && self.buffer.is_valid(p) =>
            {
                Some(v[p])
            }
            _ => None,
        }
    }

    #[inline]
    pub fn bool_at(&self, row: usize) -> Option<bool> {
        let p = self.physical(row);
        match self.buffer.data() {
            ColumnData::Bool(v) if self.buffer.is_valid(p) => Some(v[p]),
            _ => None,
        }
    }

    #[inline]
    pub fn str_at(&self, row: usize) -> Option<&str> {
        let p = self.physical(row);
        match self.buffer.data() {
            ColumnData::Utf8 { .. } if self.buffer.is_valid(p) => Some(self.buffer.str_at(p)),
            _ => None,
        }
    }

    /// Compares two non-null rows of this column
    #[inline]
    pub fn cmp_rows(&self, a: usize, b: usize) -> Ordering {
        let (pa, pb) = (self.physical(a), self.physical(b));
        match self.buffer.data() {
            ColumnData::I32(v) => v[pa].cmp(&v[pb]),
            ColumnData::I64(v) => v[pa].cmp(&v[pb]),
            ColumnData::U32(v) => v[pa].cmp(&v[pb]),
            ColumnData::F64(v) => cmp_f64(v[pa], v[pb]),
            ColumnData::Bool(v) => v[pa].cmp(&v[pb]),
            ColumnData::Utf8 { .. } => self.buffer.str_at(pa).cmp(self.buffer.str_at(pb)),
        }
    }

    /// Zero-copy view over the given logical rows
    pub fn take(&self, rows: &[usize]) -> Column {
        let selection: Arc<[usize]> = match &self.selection {
            Some(existing) => rows.iter().map(|&r| existing[r]).collect(),
            None => rows.into(),
        };
        Column::with_selection(Arc::clone(&self.buffer), selection)
    }

    /// Zero-copy view over a contiguous logical range
    pub fn slice(&self, range: Range<usize>) -> Column {
        let selection: Arc<[usize]> = match &self.selection {
            Some(existing) => existing[range].into(),
            None => range.collect(),
        };
        Column::with_selection(Arc::clone(&self.buffer), selection)
    }

    /// Copies the visible rows into a freshly owned buffer
    pub fn compact(&self) -> Column {
        match &self.selection {
            Some(rows) => Column::new(self.buffer.gather(rows)),
            None => self.clone(),
        }
    }

    /// Physical positions of every logical row
    pub(crate) fn physical_rows(&self) -> Vec<usize> {
        match &self.selection {
            Some(rows) => rows.to_vec(),
            None => (0..self.buffer.len()).collect(),
        }
    }
}

impl PartialEq for Column {
    /// Logical equality: same type and the same visible values
    fn eq(&self, other: &Self) -> bool {
        self.data_type() == other.data_type()
            && self.len() == other.len()
            && (0..self.len()).all(|row| match (self.is_valid(row), other.is_valid(row)) {
                (true, true) => {
                    let a = self.value(row);
                    let b = other.value(row);
                    match (&a, &b) {
                        (ScalarValue::Float64(x), ScalarValue::Float64(y)) => {
                            x.to_bits() == y.to_bits()
                        }
                        _ => a == b,
                    }
                }
                (false, false) => true,
                _ => false,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_composes_selection() {
        let column = Column::new(ColumnBuffer::from_i32(vec![10, 20, 30, 40]));
        let view = column.take(&[3, 1]);
        assert!(view.is_view());
        assert!(view.shares_buffer(&column));
        assert_eq!(view.value(0), ScalarValue::Int32(40));

        let nested = view.take(&[1]);
        assert_eq!(nested.len(), 1);
        assert_eq!(nested.value(0), ScalarValue::Int32(20));
        assert_eq!(nested.selection(), Some(&[1usize][..]));
    }

    #[test]
    fn test_slice_and_compact() {
        let column = Column::new(ColumnBuffer::from_strs(["a", "b", "c", "d"]));
        let view = column.slice(1..3);
        assert_eq!(view.value(0), ScalarValue::Utf8("b".into()));

        let owned = view.compact();
        assert!(!owned.is_view());
        assert!(!owned.shares_buffer(&column));
        assert_eq!(owned, view);
    }

    #[test]
    fn test_parent_outlives_views_only_while_referenced() {
        let buffer = Arc::new(ColumnBuffer::from_i64(vec![1, 2, 3]));
        let column = Column::from_shared(Arc::clone(&buffer));
        let view = column.take(&[0]);
        drop(column);
        assert_eq!(Arc::strong_count(&buffer), 2);
        drop(view);
        assert_eq!(Arc::strong_count(&buffer), 1);
    }

    #[test]
    fn test_date_is_not_integer() {
        let column = Column::new(ColumnBuffer::from_date32(vec![5]));
        assert_eq!(column.i64_at(0), None);
    }
}
