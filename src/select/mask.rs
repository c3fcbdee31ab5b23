//! Row selection masks
//!
//! The representation is a performance policy, not semantics: dense
//! selections (more than a fifth of the rows survive) keep a bitmap, sparse
//! ones keep an ascending index list. Two masks are equal when they select
//! the same rows out of the same row count.

use crate::column::Bitmap;

/// Selectivity above which a bitmap is kept instead of an index list
pub const BITMAP_SELECTIVITY: f64 = 0.2;

/// Surviving rows of a batch after a predicate
#[derive(Debug, Clone)]
pub enum SelectionMask {
    Bitmap(Bitmap),
    Indices { rows: Vec<usize>, len: usize },
}

impl SelectionMask {
    /// Builds a mask from per-row outcomes, choosing the representation
    pub fn from_bools(bits: &[bool]) -> Self {
        let selected = bits.iter().filter(|&&b| b).count();
        if bits.is_empty() || selected as f64 > BITMAP_SELECTIVITY * bits.len() as f64 {
            SelectionMask::Bitmap(Bitmap::from_bools(bits.iter().copied()))
        } else {
            SelectionMask::Indices {
                rows: bits
                    .iter()
                    .enumerate()
                    .filter_map(|(i, &b)| b.then_some(i))
                    .collect(),
                len: bits.len(),
            }
        }
    }

    /// Selects every row
    pub fn all(len: usize) -> Self {
        SelectionMask::Bitmap(Bitmap::new_set(len))
    }

    /// Row count of the batch this mask applies to
    pub fn len(&self) -> usize {
        match self {
            SelectionMask::Bitmap(bitmap) => bitmap.len(),
            SelectionMask::Indices { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of selected rows
    pub fn count(&self) -> usize {
        match self {
            SelectionMask::Bitmap(bitmap) => bitmap.count_set(),
            SelectionMask::Indices { rows, .. } => rows.len(),
        }
    }

    /// Fraction of rows selected
    pub fn selectivity(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        self.count() as f64 / self.len() as f64
    }

    pub fn contains(&self, row: usize) -> bool {
        match self {
            SelectionMask::Bitmap(bitmap) => bitmap.get(row),
            SelectionMask::Indices { rows, .. } => rows.binary_search(&row).is_ok(),
        }
    }

    /// Selected rows in ascending order
    pub fn to_indices(&self) -> Vec<usize> {
        match self {
            SelectionMask::Bitmap(bitmap) => bitmap.iter_set().collect(),
            SelectionMask::Indices { rows, .. } => rows.clone(),
        }
    }
}

impl PartialEq for SelectionMask {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.to_indices() == other.to_indices()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dense_selection_uses_bitmap() {
        let mask = SelectionMask::from_bools(&[true, true, false, true]);
        assert!(matches!(mask, SelectionMask::Bitmap(_)));
        assert_eq!(mask.count(), 3);
        assert_eq!(mask.to_indices(), vec![0, 1, 3]);
    }

    #[test]
    fn test_sparse_selection_uses_indices() {
        let mut bits = vec![false; 100];
        bits[7] = true;
        let mask = SelectionMask::from_bools(&bits);
        assert!(matches!(mask, SelectionMask::Indices { .. }));
        assert!(mask.contains(7));
        assert!(!mask.contains(8));
        assert_eq!(mask.len(), 100);
    }

    #[test]
    fn test_equality_ignores_representation() {
        let bitmap = SelectionMask::Bitmap(Bitmap::from_bools([false, true]));
        let indices = SelectionMask::Indices {
            rows: vec![1],
            len: 2,
        };
        assert_eq!(bitmap, indices);
    }
}
