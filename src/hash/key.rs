//! Byte-packed composite keys
//!
//! Every key component starts with a one-byte tag so that values of
//! different types, and null, can never pack to the same bytes:
//!
//! | tag | component        | payload                          |
//! |-----|------------------|----------------------------------|
//! | 0   | null             | none                             |
//! | 1   | int32/int64/u32  | i64 little endian                |
//! | 2   | date32           | i32 little endian                |
//! | 3   | float64          | normalized bits, little endian   |
//! | 4   | bool             | one byte                         |
//! | 5   | string           | u32 length, then the UTF-8 bytes |
//!
//! The integer family shares one encoding so an int32 build key matches an
//! int64 probe key with the same value.

use crate::column::{Batch, Column, DataType};
use crate::error::{EngineError, EngineResult};

const TAG_NULL: u8 = 0;
const TAG_INT: u8 = 1;
const TAG_DATE: u8 = 2;
const TAG_FLOAT: u8 = 3;
const TAG_BOOL: u8 = 4;
const TAG_STR: u8 = 5;

/// How a null key component is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullPolicy {
    /// Nulls pack to a dedicated tag and compare equal to each other (group-by)
    GroupTogether,
    /// A row with any null component produces no key (join)
    NeverMatch,
}

/// Packs the key columns of one batch row by row
#[derive(Debug)]
pub struct KeyPacker<'a> {
    columns: Vec<&'a Column>,
    policy: NullPolicy,
}

impl<'a> KeyPacker<'a> {
    /// Resolves key columns by name
    pub fn new<S: AsRef<str>>(
        batch: &'a Batch,
        names: &[S],
        policy: NullPolicy,
    ) -> EngineResult<Self> {
        let columns = names
            .iter()
            .map(|name| batch.column(name.as_ref()))
            .collect::<EngineResult<Vec<_>>>()?;
        Ok(Self::from_columns(columns, policy))
    }

    pub fn from_columns(columns: Vec<&'a Column>, policy: NullPolicy) -> Self {
        Self { columns, policy }
    }

    pub fn columns(&self) -> &[&'a Column] {
        &self.columns
    }

    /// Number of key components
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Writes the packed key of `row` into `buf`, replacing its contents.
    ///
    /// Returns false when the row has a null component and the policy is
    /// `NeverMatch`; `buf` is unspecified in that case.
    pub fn pack(&self, row: usize, buf: &mut Vec<u8>) -> bool {
        buf.clear();
        for column in &self.columns {
            if !column.is_valid(row) {
                if self.policy == NullPolicy::NeverMatch {
                    return false;
                }
                buf.push(TAG_NULL);
                continue;
            }
            pack_value(column, row, buf);
        }
        true
    }
}

fn pack_value(column: &Column, row: usize, buf: &mut Vec<u8>) {
    match column.data_type() {
        DataType::Int32 | DataType::Int64 | DataType::UInt32 => {
            buf.push(TAG_INT);
            buf.extend_from_slice(&column.i64_at(row).unwrap_or_default().to_le_bytes());
        }
        DataType::Date32 => {
            buf.push(TAG_DATE);
            buf.extend_from_slice(&column.date_at(row).unwrap_or_default().to_le_bytes());
        }
        DataType::Float64 => {
            buf.push(TAG_FLOAT);
            let value = column.f64_at(row).unwrap_or_default();
            buf.extend_from_slice(&normalize_f64_bits(value).to_le_bytes());
        }
        DataType::Boolean => {
            buf.push(TAG_BOOL);
            buf.push(column.bool_at(row).unwrap_or_default() as u8);
        }
        DataType::Utf8 => {
            let s = column.str_at(row).unwrap_or_default();
            buf.push(TAG_STR);
            buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
            buf.extend_from_slice(s.as_bytes());
        }
    }
}

/// Bit pattern with -0.0 folded into 0.0 and every NaN folded into one
fn normalize_f64_bits(value: f64) -> u64 {
    if value == 0.0 {
        0.0f64.to_bits()
    } else if value.is_nan() {
        f64::NAN.to_bits()
    } else {
        value.to_bits()
    }
}

/// Checks that two key columns can be matched against each other.
///
/// The integer family is mutually compatible; every other type only
/// matches itself.
pub fn check_key_compatible(
    left_name: &str,
    left: DataType,
    right_name: &str,
    right: DataType,
) -> EngineResult<()> {
    if left == right || (left.is_integer() && right.is_integer()) {
        return Ok(());
    }
    Err(EngineError::type_mismatch(format!(
        "key {} ({}) cannot match key {} ({})",
        left_name, left, right_name, right
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::ColumnBuffer;

    fn packed(packer: &KeyPacker<'_>, row: usize) -> Option<Vec<u8>> {
        let mut buf = Vec::new();
        packer.pack(row, &mut buf).then_some(buf)
    }

    #[test]
    fn test_integer_widths_share_encoding() {
        let batch = Batch::try_new(vec![
            ("a", ColumnBuffer::from_i32(vec![7])),
            ("b", ColumnBuffer::from_i64(vec![7])),
            ("c", ColumnBuffer::from_u32(vec![7])),
        ])
        .unwrap();
        let keys: Vec<_> = ["a", "b", "c"]
            .iter()
            .map(|name| {
                let packer = KeyPacker::new(&batch, &[*name], NullPolicy::NeverMatch).unwrap();
                packed(&packer, 0)
            })
            .collect();
        assert_eq!(keys[0], keys[1]);
        assert_eq!(keys[1], keys[2]);
    }

    #[test]
    fn test_date_does_not_collide_with_int() {
        let batch = Batch::try_new(vec![
            ("d", ColumnBuffer::from_date32(vec![7])),
            ("i", ColumnBuffer::from_i32(vec![7])),
        ])
        .unwrap();
        let d = KeyPacker::new(&batch, &["d"], NullPolicy::GroupTogether).unwrap();
        let i = KeyPacker::new(&batch, &["i"], NullPolicy::GroupTogether).unwrap();
        assert_ne!(packed(&d, 0), packed(&i, 0));
    }

    #[test]
    fn test_null_policies() {
        let batch = Batch::try_new(vec![
            ("k", ColumnBuffer::from_opt_i64(vec![None, None, Some(0)])),
        ])
        .unwrap();
        let group = KeyPacker::new(&batch, &["k"], NullPolicy::GroupTogether).unwrap();
        assert_eq!(packed(&group, 0), packed(&group, 1));
        assert_ne!(packed(&group, 0), packed(&group, 2));

        let join = KeyPacker::new(&batch, &["k"], NullPolicy::NeverMatch).unwrap();
        assert_eq!(packed(&join, 0), None);
        assert!(packed(&join, 2).is_some());
    }

    #[test]
    fn test_string_length_prefix_keeps_components_apart() {
        let batch = Batch::try_new(vec![
            ("a", ColumnBuffer::from_strs(["ab", "a"])),
            ("b", ColumnBuffer::from_strs(["c", "bc"])),
        ])
        .unwrap();
        let packer = KeyPacker::new(&batch, &["a", "b"], NullPolicy::GroupTogether).unwrap();
        assert_ne!(packed(&packer, 0), packed(&packer, 1));
    }

    #[test]
    fn test_negative_zero_packs_like_zero() {
        let batch = Batch::try_new(vec![("f", ColumnBuffer::from_f64(vec![0.0, -0.0]))]).unwrap();
        let packer = KeyPacker::new(&batch, &["f"], NullPolicy::GroupTogether).unwrap();
        assert_eq!(packed(&packer, 0), packed(&packer, 1));
    }

    #[test]
    fn test_key_compatibility() {
        assert!(check_key_compatible("a", DataType::Int32, "b", DataType::UInt32).is_ok());
        assert!(check_key_compatible("a", DataType::Utf8, "b", DataType::Utf8).is_ok());
        assert!(check_key_compatible("a", DataType::Date32, "b", DataType::Int32).is_err());
    }
}
