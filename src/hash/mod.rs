//! Shared keyed-bucket primitive
//!
//! Both grouped aggregation and hash join key rows by a byte-packed
//! composite of one or more column values. `KeyPacker` produces those bytes
//! (with the caller choosing how nulls behave) and `KeyedTable` maps them to
//! caller-defined state: a group's first row for the aggregator, a chain of
//! build rows for the joiner.

mod key;
mod table;

pub use key::{check_key_compatible, KeyPacker, NullPolicy};
pub use table::KeyedTable;
