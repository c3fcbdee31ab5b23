//! Predicate evaluation
//!
//! Flow:
//! 1. A `Predicate` tree names columns and typed literals
//! 2. `Selector` resolves it against a batch (unknown names and
//!    incomparable operand types fail here, before any row is read)
//! 3. The resolved tree is evaluated per morsel into boolean vectors
//! 4. The vectors are concatenated in morsel order into a `SelectionMask`
//!
//! Invariants:
//! - A comparison with a null operand never selects the row, including
//!   under `NOT`
//! - The mask has exactly one entry per input row
//! - Vectorized and row-at-a-time evaluation agree on every row

mod expr;
mod mask;
mod selector;

pub use expr::{CompareOp, Literal, Operand, Predicate};
pub use mask::{SelectionMask, BITMAP_SELECTIVITY};
pub use selector::Selector;
