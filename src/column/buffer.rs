//! Typed, contiguous column storage
//!
//! A `ColumnBuffer` is immutable once constructed. Fixed-width types keep
//! their values in a single `Vec`; strings keep one contiguous byte buffer
//! plus an offsets array of length N + 1.

use super::bitmap::Bitmap;
use super::types::{DataType, ScalarValue};
use crate::error::{EngineError, EngineResult};

/// Physical storage of a column
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    I32(Vec<i32>),
    I64(Vec<i64>),
    U32(Vec<u32>),
    F64(Vec<f64>),
    Bool(Vec<bool>),
    Utf8 { offsets: Vec<usize>, values: String },
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::I32(v) => v.len(),
            ColumnData::I64(v) => v.len(),
            ColumnData::U32(v) => v.len(),
            ColumnData::F64(v) => v.len(),
            ColumnData::Bool(v) => v.len(),
            ColumnData::Utf8 { offsets, .. } => offsets.len().saturating_sub(1),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn physical_name(&self) -> &'static str {
        match self {
            ColumnData::I32(_) => "i32",
            ColumnData::I64(_) => "i64",
            ColumnData::U32(_) => "u32",
            ColumnData::F64(_) => "f64",
            ColumnData::Bool(_) => "bool",
            ColumnData::Utf8 { .. } => "utf8",
        }
    }

    fn matches(&self, data_type: DataType) -> bool {
        matches!(
            (data_type, self),
            (DataType::Int32 | DataType::Date32, ColumnData::I32(_))
                | (DataType::Int64, ColumnData::I64(_))
                | (DataType::UInt32, ColumnData::U32(_))
                | (DataType::Float64, ColumnData::F64(_))
                | (DataType::Boolean, ColumnData::Bool(_))
                | (DataType::Utf8, ColumnData::Utf8 { .. })
        )
    }
}

/// Immutable typed column with an optional validity bitmap
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnBuffer {
    data_type: DataType,
    data: ColumnData,
    validity: Option<Bitmap>,
}

impl ColumnBuffer {
    /// Creates a buffer, checking the declared type against the supplied data.
    ///
    /// A set validity bit means the row holds a value.
    pub fn try_new(
        data_type: DataType,
        data: ColumnData,
        validity: Option<Bitmap>,
    ) -> EngineResult<Self> {
        if !data.matches(data_type) {
            return Err(EngineError::type_mismatch(format!(
                "declared {} but supplied {} data",
                data_type,
                data.physical_name()
            )));
        }
        if let ColumnData::Utf8 { offsets, values } = &data {
            Self::validate_offsets(offsets, values)?;
        }
        if let Some(bitmap) = &validity {
            if bitmap.len() != data.len() {
                return Err(EngineError::RowCountMismatch {
                    column: "<validity>".to_string(),
                    expected: data.len(),
                    actual: bitmap.len(),
                });
            }
        }
        // An all-valid bitmap carries no information.
        let validity = validity.filter(|b| b.count_set() != b.len());
        Ok(Self {
            data_type,
            data,
            validity,
        })
    }

    fn validate_offsets(offsets: &[usize], values: &str) -> EngineResult<()> {
        if offsets.first() != Some(&0) || offsets.last() != Some(&values.len()) {
            return Err(EngineError::type_mismatch(
                "string offsets must start at 0 and end at the value length",
            ));
        }
        for pair in offsets.windows(2) {
            if pair[0] > pair[1] || !values.is_char_boundary(pair[1]) {
                return Err(EngineError::type_mismatch(
                    "string offsets must be ascending char boundaries",
                ));
            }
        }
        Ok(())
    }

    pub fn from_i32(values: Vec<i32>) -> Self {
        Self::non_null(DataType::Int32, ColumnData::I32(values))
    }

    pub fn from_i64(values: Vec<i64>) -> Self {
        Self::non_null(DataType::Int64, ColumnData::I64(values))
    }

    pub fn from_u32(values: Vec<u32>) -> Self {
        Self::non_null(DataType::UInt32, ColumnData::U32(values))
    }

    /// Date column from days since 1970-01-01
    pub fn from_date32(days: Vec<i32>) -> Self {
        Self::non_null(DataType::Date32, ColumnData::I32(days))
    }

    pub fn from_f64(values: Vec<f64>) -> Self {
        Self::non_null(DataType::Float64, ColumnData::F64(values))
    }

    pub fn from_bool(values: Vec<bool>) -> Self {
        Self::non_null(DataType::Boolean, ColumnData::Bool(values))
    }

    pub fn from_strs<S: AsRef<str>>(values: impl IntoIterator<Item = S>) -> Self {
        let mut builder = StringBuilder::default();
        for value in values {
            builder.push(Some(value.as_ref()));
        }
        builder.finish()
    }

    pub fn from_opt_i32(values: Vec<Option<i32>>) -> Self {
        Self::nullable(DataType::Int32, values, ColumnData::I32)
    }

    pub fn from_opt_i64(values: Vec<Option<i64>>) -> Self {
        Self::nullable(DataType::Int64, values, ColumnData::I64)
    }

    pub fn from_opt_u32(values: Vec<Option<u32>>) -> Self {
        Self::nullable(DataType::UInt32, values, ColumnData::U32)
    }

    pub fn from_opt_date32(days: Vec<Option<i32>>) -> Self {
        Self::nullable(DataType::Date32, days, ColumnData::I32)
    }

    pub fn from_opt_f64(values: Vec<Option<f64>>) -> Self {
        Self::nullable(DataType::Float64, values, ColumnData::F64)
    }

    pub fn from_opt_bool(values: Vec<Option<bool>>) -> Self {
        Self::nullable(DataType::Boolean, values, ColumnData::Bool)
    }

    pub fn from_opt_strs<S: AsRef<str>>(values: impl IntoIterator<Item = Option<S>>) -> Self {
        let mut builder = StringBuilder::default();
        for value in values {
            builder.push(value.as_ref().map(|s| s.as_ref()));
        }
        builder.finish()
    }

    fn non_null(data_type: DataType, data: ColumnData) -> Self {
        Self {
            data_type,
            data,
            validity: None,
        }
    }

    fn nullable<T: Copy + Default>(
        data_type: DataType,
        values: Vec<Option<T>>,
        wrap: fn(Vec<T>) -> ColumnData,
    ) -> Self {
        let validity = Bitmap::from_bools(values.iter().map(Option::is_some));
        let data = values.into_iter().map(Option::unwrap_or_default).collect();
        Self {
            data_type,
            data: wrap(data),
            validity: Some(validity).filter(|b| b.count_set() != b.len()),
        }
    }

    /// Buffer holding `len` copies of `value`; null when `value` is null
    pub fn repeat(value: &ScalarValue, data_type: DataType, len: usize) -> EngineResult<Self> {
        let validity = if value.is_null() {
            Some(Bitmap::new_unset(len))
        } else {
            None
        };
        let data = match (data_type, value) {
            (DataType::Int32, ScalarValue::Int32(v))
            | (DataType::Date32, ScalarValue::Date32(v)) => ColumnData::I32(vec![*v; len]),
            (DataType::Int64, v) if v.as_i64().is_some() => {
                ColumnData::I64(vec![v.as_i64().unwrap_or_default(); len])
            }
            (DataType::UInt32, ScalarValue::UInt32(v)) => ColumnData::U32(vec![*v; len]),
            (DataType::Float64, v) if v.as_f64().is_some() => {
                ColumnData::F64(vec![v.as_f64().unwrap_or_default(); len])
            }
            (DataType::Boolean, ScalarValue::Boolean(v)) => ColumnData::Bool(vec![*v; len]),
            (DataType::Utf8, ScalarValue::Utf8(v)) => {
                let mut builder = StringBuilder::default();
                for _ in 0..len {
                    builder.push(Some(v));
                }
                return Ok(builder.finish());
            }
            (_, ScalarValue::Null) => Self::default_data(data_type, len),
            (data_type, value) => {
                return Err(EngineError::type_mismatch(format!(
                    "cannot repeat {:?} as {}",
                    value, data_type
                )))
            }
        };
        Self::try_new(data_type, data, validity)
    }

    fn default_data(data_type: DataType, len: usize) -> ColumnData {
        match data_type {
            DataType::Int32 | DataType::Date32 => ColumnData::I32(vec![0; len]),
            DataType::Int64 => ColumnData::I64(vec![0; len]),
            DataType::UInt32 => ColumnData::U32(vec![0; len]),
            DataType::Float64 => ColumnData::F64(vec![0.0; len]),
            DataType::Boolean => ColumnData::Bool(vec![false; len]),
            DataType::Utf8 => ColumnData::Utf8 {
                offsets: vec![0; len + 1],
                values: String::new(),
            },
        }
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn data(&self) -> &ColumnData {
        &self.data
    }

    pub fn validity(&self) -> Option<&Bitmap> {
        self.validity.as_ref()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn is_valid(&self, row: usize) -> bool {
        match &self.validity {
            Some(bitmap) => bitmap.get(row),
            None => true,
        }
    }

    pub fn null_count(&self) -> usize {
        match &self.validity {
            Some(bitmap) => bitmap.len() - bitmap.count_set(),
            None => 0,
        }
    }

    /// String value at a physical row; empty for non-string buffers
    #[inline]
    pub fn str_at(&self, row: usize) -> &str {
        match &self.data {
            ColumnData::Utf8 { offsets, values } => &values[offsets[row]..offsets[row + 1]],
            _ => "",
        }
    }

    /// Value at a physical row
    pub fn value(&self, row: usize) -> ScalarValue {
        if !self.is_valid(row) {
            return ScalarValue::Null;
        }
        match (&self.data, self.data_type) {
            (ColumnData::I32(v), DataType::Date32) => ScalarValue::Date32(v[row]),
            (ColumnData::I32(v), _) => ScalarValue::Int32(v[row]),
            (ColumnData::I64(v), _) => ScalarValue::Int64(v[row]),
            (ColumnData::U32(v), _) => ScalarValue::UInt32(v[row]),
            (ColumnData::F64(v), _) => ScalarValue::Float64(v[row]),
            (ColumnData::Bool(v), _) => ScalarValue::Boolean(v[row]),
            (ColumnData::Utf8 { .. }, _) => ScalarValue::Utf8(self.str_at(row).to_string()),
        }
    }

    /// Copies the given physical rows into a new buffer
    pub fn gather(&self, rows: &[usize]) -> ColumnBuffer {
        let data = match &self.data {
            ColumnData::I32(v) => ColumnData::I32(rows.iter().map(|&r| v[r]).collect()),
            ColumnData::I64(v) => ColumnData::I64(rows.iter().map(|&r| v[r]).collect()),
            ColumnData::U32(v) => ColumnData::U32(rows.iter().map(|&r| v[r]).collect()),
            ColumnData::F64(v) => ColumnData::F64(rows.iter().map(|&r| v[r]).collect()),
            ColumnData::Bool(v) => ColumnData::Bool(rows.iter().map(|&r| v[r]).collect()),
            ColumnData::Utf8 { .. } => {
                let mut builder = StringBuilder::default();
                for &r in rows {
                    builder.push(Some(self.str_at(r)));
                }
                builder.finish_data()
            }
        };
        let validity = self
            .validity
            .as_ref()
            .map(|bitmap| Bitmap::from_bools(rows.iter().map(|&r| bitmap.get(r))))
            .filter(|b| b.count_set() != b.len());
        ColumnBuffer {
            data_type: self.data_type,
            data,
            validity,
        }
    }
}

/// Incremental builder for string buffers
#[derive(Debug)]
pub(crate) struct StringBuilder {
    offsets: Vec<usize>,
    values: String,
    validity: Vec<bool>,
}

impl Default for StringBuilder {
    fn default() -> Self {
        Self {
            offsets: vec![0],
            values: String::new(),
            validity: Vec::new(),
        }
    }
}

impl StringBuilder {
    pub(crate) fn push(&mut self, value: Option<&str>) {
        if let Some(s) = value {
            self.values.push_str(s);
        }
        self.offsets.push(self.values.len());
        self.validity.push(value.is_some());
    }

    pub(crate) fn finish_data(self) -> ColumnData {
        ColumnData::Utf8 {
            offsets: self.offsets,
            values: self.values,
        }
    }

    pub(crate) fn finish(self) -> ColumnBuffer {
        let validity = Bitmap::from_bools(self.validity.iter().copied());
        ColumnBuffer {
            data_type: DataType::Utf8,
            data: ColumnData::Utf8 {
                offsets: self.offsets,
                values: self.values,
            },
            validity: Some(validity).filter(|b| b.count_set() != b.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declared_width_must_match() {
        let err = ColumnBuffer::try_new(DataType::Int64, ColumnData::I32(vec![1, 2]), None)
            .unwrap_err();
        assert_eq!(err.code(), "COLEXEC_TYPE_MISMATCH");

        let ok = ColumnBuffer::try_new(DataType::Date32, ColumnData::I32(vec![1, 2]), None);
        assert!(ok.is_ok());
    }

    #[test]
    fn test_validity_length_checked() {
        let err = ColumnBuffer::try_new(
            DataType::Int32,
            ColumnData::I32(vec![1, 2, 3]),
            Some(Bitmap::new_set(2)),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::RowCountMismatch { .. }));
    }

    #[test]
    fn test_string_offsets_validated() {
        let err = ColumnBuffer::try_new(
            DataType::Utf8,
            ColumnData::Utf8 {
                offsets: vec![0, 4],
                values: "abc".to_string(),
            },
            None,
        )
        .unwrap_err();
        assert_eq!(err.code(), "COLEXEC_TYPE_MISMATCH");
    }

    #[test]
    fn test_nullable_constructor() {
        let buffer = ColumnBuffer::from_opt_i64(vec![Some(1), None, Some(3)]);
        assert_eq!(buffer.null_count(), 1);
        assert_eq!(buffer.value(1), ScalarValue::Null);
        assert_eq!(buffer.value(2), ScalarValue::Int64(3));
    }

    #[test]
    fn test_all_valid_bitmap_dropped() {
        let buffer = ColumnBuffer::from_opt_i32(vec![Some(1), Some(2)]);
        assert!(buffer.validity().is_none());
    }

    #[test]
    fn test_strings_and_gather() {
        let buffer = ColumnBuffer::from_opt_strs(vec![Some("alpha"), None, Some("gamma")]);
        assert_eq!(buffer.str_at(0), "alpha");
        let gathered = buffer.gather(&[2, 1]);
        assert_eq!(gathered.value(0), ScalarValue::Utf8("gamma".into()));
        assert_eq!(gathered.value(1), ScalarValue::Null);
    }

    #[test]
    fn test_repeat_literal() {
        let buffer = ColumnBuffer::repeat(&ScalarValue::Int32(100), DataType::Int64, 3).unwrap();
        assert_eq!(buffer.data(), &ColumnData::I64(vec![100, 100, 100]));

        let nulls = ColumnBuffer::repeat(&ScalarValue::Null, DataType::Utf8, 2).unwrap();
        assert_eq!(nulls.null_count(), 2);
    }
}
