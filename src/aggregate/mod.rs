//! Grouped aggregation
//!
//! Supported reductions: sum, mean, count, count_distinct.
//!
//! Semantics:
//! - Null group-key components are equal to each other and distinct from
//!   every value, so all-null keys form one group
//! - count and count_distinct see non-null values only
//! - sum and mean of a group with no non-null values are null
//! - Integer sums accumulate in 128 bits and fail only if the final value
//!   does not fit int64
//! - Groups are emitted in order of first occurrence

mod aggregator;
mod reduction;

pub use aggregator::Aggregator;
pub use reduction::{AggregateExpr, Reduction};
