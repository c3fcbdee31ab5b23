//! colexec - An in-memory columnar query engine
//!
//! Batches of typed columns flow through a fixed pipeline of vectorized
//! operators: selection, hash join, projection, grouped aggregation, sort
//! and limit. Work is split into morsels and may run on a rayon pool;
//! results do not depend on whether it does.

pub mod aggregate;
pub mod column;
pub mod error;
pub mod executor;
pub mod hash;
pub mod join;
pub mod observability;
pub mod parallel;
pub mod project;
pub mod select;
pub mod sort;

pub use aggregate::{AggregateExpr, Aggregator, Reduction};
pub use column::{Batch, Column, ColumnBuffer, DataType, ScalarValue};
pub use error::{EngineError, EngineResult};
pub use executor::{execute, CancellationToken, EngineConfig, Pipeline, QueryExecutor};
pub use join::{JoinKey, JoinOptions, JoinStrategy, Joiner};
pub use parallel::Parallelism;
pub use project::{Projection, Projector, ValueExpr};
pub use select::{Literal, Predicate, SelectionMask, Selector};
pub use sort::{SortKey, Sorter};
