//! Batches: ordered sets of equal-length named columns

use std::ops::Range;

use super::buffer::ColumnBuffer;
use super::column::Column;
use super::types::{DataType, ScalarValue};
use crate::error::{EngineError, EngineResult};
use crate::select::SelectionMask;

/// Name and type of one batch column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub data_type: DataType,
}

impl Field {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// In-memory table fragment
///
/// Every column has exactly `row_count` rows. Column names are unique.
#[derive(Debug, Clone)]
pub struct Batch {
    fields: Vec<Field>,
    columns: Vec<Column>,
    row_count: usize,
}

impl Batch {
    /// Builds a batch that owns the supplied buffers
    pub fn try_new<S: Into<String>>(columns: Vec<(S, ColumnBuffer)>) -> EngineResult<Self> {
        Self::from_columns(
            columns
                .into_iter()
                .map(|(name, buffer)| (name.into(), Column::new(buffer)))
                .collect(),
        )
    }

    /// Builds a batch from shared columns or views
    pub fn from_columns(columns: Vec<(String, Column)>) -> EngineResult<Self> {
        let row_count = columns.first().map(|(_, c)| c.len()).unwrap_or(0);
        Self::with_row_count(columns, row_count)
    }

    /// Builds a batch whose row count is fixed up front.
    ///
    /// With no columns the batch still reports `row_count` rows.
    pub fn with_row_count(columns: Vec<(String, Column)>, row_count: usize) -> EngineResult<Self> {
        let mut fields = Vec::with_capacity(columns.len());
        let mut cols = Vec::with_capacity(columns.len());
        for (name, column) in columns {
            if column.len() != row_count {
                return Err(EngineError::RowCountMismatch {
                    column: name,
                    expected: row_count,
                    actual: column.len(),
                });
            }
            if fields.iter().any(|f: &Field| f.name == name) {
                return Err(EngineError::DuplicateColumn(name));
            }
            fields.push(Field::new(name, column.data_type()));
            cols.push(column);
        }
        Ok(Self {
            fields,
            columns: cols,
            row_count,
        })
    }

    /// A batch with no columns and no rows
    pub fn empty() -> Self {
        Self {
            fields: Vec::new(),
            columns: Vec::new(),
            row_count: 0,
        }
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Looks up a column by name
    pub fn column(&self, name: &str) -> EngineResult<&Column> {
        self.index_of(name)
            .map(|i| &self.columns[i])
            .ok_or_else(|| EngineError::unknown_column(name))
    }

    /// Returns the values of one row
    pub fn row(&self, row: usize) -> Vec<ScalarValue> {
        self.columns.iter().map(|c| c.value(row)).collect()
    }

    /// Zero-copy view over the given rows, in the given order
    pub fn take(&self, rows: &[usize]) -> Batch {
        Batch {
            fields: self.fields.clone(),
            columns: self.columns.iter().map(|c| c.take(rows)).collect(),
            row_count: rows.len(),
        }
    }

    /// Zero-copy view over the rows a mask selects
    pub fn filter(&self, mask: &SelectionMask) -> Batch {
        self.take(&mask.to_indices())
    }

    /// Zero-copy view over a contiguous row range, clamped to the batch
    pub fn slice(&self, range: Range<usize>) -> Batch {
        let end = range.end.min(self.row_count);
        let start = range.start.min(end);
        Batch {
            fields: self.fields.clone(),
            columns: self.columns.iter().map(|c| c.slice(start..end)).collect(),
            row_count: end - start,
        }
    }

    /// Keeps the named columns, in the given order
    pub fn project(&self, names: &[&str]) -> EngineResult<Batch> {
        let columns = names
            .iter()
            .map(|name| Ok((name.to_string(), self.column(name)?.clone())))
            .collect::<EngineResult<Vec<_>>>()?;
        Batch::with_row_count(columns, self.row_count)
    }

    /// Copies every view column into owned buffers
    pub fn compact(&self) -> Batch {
        Batch {
            fields: self.fields.clone(),
            columns: self.columns.iter().map(Column::compact).collect(),
            row_count: self.row_count,
        }
    }

    /// Returns true if any column is a view over another batch
    pub fn is_view(&self) -> bool {
        self.columns.iter().any(Column::is_view)
    }

    /// Appends same-schema fragments into one owned batch
    pub fn concat(batches: &[Batch]) -> EngineResult<Batch> {
        let first = match batches.first() {
            Some(b) => b,
            None => return Ok(Batch::empty()),
        };
        for other in &batches[1..] {
            if other.fields != first.fields {
                return Err(EngineError::type_mismatch(format!(
                    "cannot concatenate batches with schemas {:?} and {:?}",
                    first.column_names(),
                    other.column_names()
                )));
            }
        }
        let mut columns = Vec::with_capacity(first.num_columns());
        for (i, field) in first.fields.iter().enumerate() {
            let parts: Vec<&Column> = batches.iter().map(|b| &b.columns[i]).collect();
            columns.push((field.name.clone(), Column::new(concat_columns(&parts)?)));
        }
        let total = batches.iter().map(Batch::row_count).sum();
        Batch::with_row_count(columns, total)
    }
}

fn concat_columns(parts: &[&Column]) -> EngineResult<ColumnBuffer> {
    use super::bitmap::Bitmap;
    use super::buffer::{ColumnData, StringBuilder};

    let data_type = parts[0].data_type();
    let total: usize = parts.iter().map(|c| c.len()).sum();
    let validity = Bitmap::from_bools(
        parts
            .iter()
            .flat_map(|c| (0..c.len()).map(move |row| c.is_valid(row))),
    );

    macro_rules! gather_fixed {
        ($variant:ident) => {{
            let mut out = Vec::with_capacity(total);
            for part in parts {
                if let ColumnData::$variant(values) = part.buffer().data() {
                    out.extend((0..part.len()).map(|row| values[part.physical(row)]));
                }
            }
            ColumnData::$variant(out)
        }};
    }

    let data = match parts[0].buffer().data() {
        ColumnData::I32(_) => gather_fixed!(I32),
        ColumnData::I64(_) => gather_fixed!(I64),
        ColumnData::U32(_) => gather_fixed!(U32),
        ColumnData::F64(_) => gather_fixed!(F64),
        ColumnData::Bool(_) => gather_fixed!(Bool),
        ColumnData::Utf8 { .. } => {
            let mut builder = StringBuilder::default();
            for part in parts {
                for row in 0..part.len() {
                    builder.push(Some(part.buffer().str_at(part.physical(row))));
                }
            }
            builder.finish_data()
        }
    };
    ColumnBuffer::try_new(data_type, data, Some(validity))
}

impl PartialEq for Batch {
    /// Logical equality: same schema, same rows in the same order
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
            && self.row_count == other.row_count
            && self.columns == other.columns
    }
}
