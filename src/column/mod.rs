//! Columnar storage
//!
//! `ColumnBuffer` owns typed contiguous data plus an optional validity
//! bitmap. `Column` is a shared handle that may carry a row selection, which
//! is how zero-copy views are expressed. `Batch` groups equal-length named
//! columns into one table fragment.
//!
//! # Invariants
//!
//! - Buffers are immutable once constructed
//! - Every column of a batch has exactly `row_count` rows
//! - Views never copy data; they share the parent buffer through an `Arc`

pub mod arithmetic;
mod batch;
mod bitmap;
mod buffer;
#[allow(clippy::module_inception)]
mod column;
mod source;
mod types;

pub use arithmetic::ArithOp;
pub use batch::{Batch, Field};
pub use bitmap::Bitmap;
pub use buffer::{ColumnBuffer, ColumnData};
pub use column::Column;
pub use source::{BatchSource, MemorySource};
pub use types::{cmp_f64, date_to_days, days_to_date, DataType, ScalarValue};
