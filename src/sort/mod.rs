//! Stable multi-key sort

mod sorter;

pub use sorter::{SortDirection, SortKey, SortPermutation, Sorter};
