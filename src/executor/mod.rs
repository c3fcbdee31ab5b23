//! Pipeline execution
//!
//! The executor runs a pipeline of operators over named input batches and
//! returns the batch written by the last operator.
//!
//! # Stage order
//!
//! filter* → join* → project? → aggregate? → sort? → limit?
//!
//! # Invariants
//!
//! - Input batches are never modified
//! - Serial and parallel execution produce identical batches
//! - Cancellation is observed only between stages
//! - A query either returns a complete batch or exactly one error

mod cancel;
mod config;
mod executor;
mod pipeline;

pub use cancel::CancellationToken;
pub use config::EngineConfig;
pub use executor::{execute, QueryExecutor};
pub use pipeline::{AggregateSpec, Operator, Pipeline};
