//! Inner equi-join, by hashing or by sort-merge
//!
//! Null handling differs from grouping: a group-by treats null
//! keys as one group, but a join key with any null component matches
//! nothing, not even another null.
//!
//! The output size is bounded only by the product of matching rows per key.
//! `JoinOptions::cardinality_limit` turns that into a warning or an error.

mod joiner;

pub use joiner::{
    BuildSide, CardinalityPolicy, HashedSide, JoinKey, JoinOptions, JoinStats, JoinStrategy,
    Joiner, RIGHT_SUFFIX,
};
