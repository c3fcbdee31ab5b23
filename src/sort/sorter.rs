//! Multi-key sorting
//!
//! Sorting never moves data. It produces a permutation of row indices that
//! callers apply with `Batch::take`.

use std::cmp::Ordering;

use rayon::slice::ParallelSliceMut;
use serde::{Deserialize, Serialize};

use crate::column::{Batch, Column};
use crate::error::EngineResult;
use crate::parallel::Parallelism;

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// One `(column, direction)` sort key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub column: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortKey {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// Output row order as indices into the sorted batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortPermutation(Vec<usize>);

impl SortPermutation {
    pub fn identity(len: usize) -> Self {
        Self((0..len).collect())
    }

    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_identity(&self) -> bool {
        self.0.iter().enumerate().all(|(i, &row)| i == row)
    }

    pub fn into_inner(self) -> Vec<usize> {
        self.0
    }

    /// Zero-copy view of `batch` in permutation order
    pub fn apply(&self, batch: &Batch) -> Batch {
        batch.take(&self.0)
    }
}

/// Produces stable sort permutations
pub struct Sorter;

impl Sorter {
    pub fn sort(batch: &Batch, keys: &[SortKey]) -> EngineResult<SortPermutation> {
        Self::sort_with(batch, keys, Parallelism::serial())
    }

    /// Sorts lexicographically over `keys`.
    ///
    /// Ordering rules:
    /// - Ties keep input order
    /// - Nulls sort after every value, in both directions
    /// - Floats use a total order (NaN after every number)
    pub fn sort_with(
        batch: &Batch,
        keys: &[SortKey],
        parallelism: Parallelism,
    ) -> EngineResult<SortPermutation> {
        let columns = keys
            .iter()
            .map(|key| Ok((batch.column(&key.column)?, key.direction)))
            .collect::<EngineResult<Vec<(&Column, SortDirection)>>>()?;

        let mut rows: Vec<usize> = (0..batch.row_count()).collect();
        let compare = |a: &usize, b: &usize| compare_rows(&columns, *a, *b);
        if parallelism.enabled && rows.len() > parallelism.morsel_size {
            rows.par_sort_by(compare);
        } else {
            rows.sort_by(compare);
        }
        Ok(SortPermutation(rows))
    }

    /// Sorts and applies the permutation
    pub fn sort_batch(
        batch: &Batch,
        keys: &[SortKey],
        parallelism: Parallelism,
    ) -> EngineResult<Batch> {
        Ok(Self::sort_with(batch, keys, parallelism)?.apply(batch))
    }
}

fn compare_rows(columns: &[(&Column, SortDirection)], a: usize, b: usize) -> Ordering {
    for (column, direction) in columns {
        let ordering = match (column.is_valid(a), column.is_valid(b)) {
            (true, true) => {
                let ordering = column.cmp_rows(a, b);
                match direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                }
            }
            (false, false) => Ordering::Equal,
            // Nulls last regardless of direction
            (false, true) => Ordering::Greater,
            (true, false) => Ordering::Less,
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}
