//! Logical column types and scalar values

use std::cmp::Ordering;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Supported column types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Int32,
    Int64,
    UInt32,
    /// Days since 1970-01-01
    Date32,
    Float64,
    Utf8,
    Boolean,
}

impl DataType {
    /// Returns the type name used in error messages
    pub fn name(&self) -> &'static str {
        match self {
            DataType::Int32 => "int32",
            DataType::Int64 => "int64",
            DataType::UInt32 => "uint32",
            DataType::Date32 => "date32",
            DataType::Float64 => "float64",
            DataType::Utf8 => "string",
            DataType::Boolean => "bool",
        }
    }

    /// Returns true for int32, int64 and uint32
    pub fn is_integer(&self) -> bool {
        matches!(self, DataType::Int32 | DataType::Int64 | DataType::UInt32)
    }

    /// Returns true for the integer family and float64
    pub fn is_numeric(&self) -> bool {
        self.is_integer() || *self == DataType::Float64
    }

    /// Fixed element width in bytes; `None` for variable-width strings
    pub fn byte_width(&self) -> Option<usize> {
        match self {
            DataType::Int32 | DataType::UInt32 | DataType::Date32 => Some(4),
            DataType::Int64 | DataType::Float64 => Some(8),
            DataType::Boolean => Some(1),
            DataType::Utf8 => None,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Converts a calendar date to the date32 representation
pub fn date_to_days(date: NaiveDate) -> i32 {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or(NaiveDate::MIN);
    (date - epoch).num_days() as i32
}

/// Converts a date32 value back to a calendar date
pub fn days_to_date(days: i32) -> Option<NaiveDate> {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)?;
    epoch.checked_add_signed(chrono::Duration::days(days as i64))
}

/// Total order on f64 that treats -0.0 and 0.0 as equal
///
/// Every NaN, whatever its sign or payload, compares as one value that
/// sorts after `+inf`.
#[inline]
pub fn cmp_f64(a: f64, b: f64) -> Ordering {
    let normalize = |x: f64| {
        if x == 0.0 {
            0.0
        } else if x.is_nan() {
            f64::NAN
        } else {
            x
        }
    };
    normalize(a).total_cmp(&normalize(b))
}

/// A single typed value read out of a column
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    Null,
    Int32(i32),
    Int64(i64),
    UInt32(u32),
    Date32(i32),
    Float64(f64),
    Utf8(String),
    Boolean(bool),
}

impl ScalarValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null)
    }

    /// Type of the value; `None` for null
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            ScalarValue::Null => None,
            ScalarValue::Int32(_) => Some(DataType::Int32),
            ScalarValue::Int64(_) => Some(DataType::Int64),
            ScalarValue::UInt32(_) => Some(DataType::UInt32),
            ScalarValue::Date32(_) => Some(DataType::Date32),
            ScalarValue::Float64(_) => Some(DataType::Float64),
            ScalarValue::Utf8(_) => Some(DataType::Utf8),
            ScalarValue::Boolean(_) => Some(DataType::Boolean),
        }
    }

    /// Integer family value widened to i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ScalarValue::Int32(v) => Some(*v as i64),
            ScalarValue::Int64(v) => Some(*v),
            ScalarValue::UInt32(v) => Some(*v as i64),
            _ => None,
        }
    }

    /// Numeric value as f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScalarValue::Float64(v) => Some(*v),
            other => other.as_i64().map(|v| v as f64),
        }
    }

    /// Ordering between two non-null values of compatible types.
    ///
    /// Returns `None` when either side is null or the types cannot be compared.
    pub fn compare(&self, other: &ScalarValue) -> Option<Ordering> {
        use ScalarValue::*;
        match (self, other) {
            (Null, _) | (_, Null) => None,
            (Date32(a), Date32(b)) => Some(a.cmp(b)),
            (Utf8(a), Utf8(b)) => Some(a.as_str().cmp(b.as_str())),
            (Boolean(a), Boolean(b)) => Some(a.cmp(b)),
            (Float64(_), _) | (_, Float64(_)) => {
                Some(cmp_f64(self.as_f64()?, other.as_f64()?))
            }
            _ => Some(self.as_i64()?.cmp(&other.as_i64()?)),
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Null => write!(f, "null"),
            ScalarValue::Int32(v) => write!(f, "{}", v),
            ScalarValue::Int64(v) => write!(f, "{}", v),
            ScalarValue::UInt32(v) => write!(f, "{}", v),
            ScalarValue::Date32(v) => match days_to_date(*v) {
                Some(date) => write!(f, "{}", date),
                None => write!(f, "date32({})", v),
            },
            ScalarValue::Float64(v) => write!(f, "{}", v),
            ScalarValue::Utf8(v) => write!(f, "{}", v),
            ScalarValue::Boolean(v) => write!(f, "{}", v),
        }
    }
}
