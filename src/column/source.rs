//! Columnar batch sources
//!
//! The engine does not decode file formats. A reader hands it batches
//! through this trait, one fragment at a time.

use std::collections::VecDeque;

use super::batch::Batch;
use crate::error::EngineResult;

/// Supplier of batches for one named input
pub trait BatchSource {
    /// Returns the next fragment, or `None` once exhausted
    fn next_batch(&mut self) -> EngineResult<Option<Batch>>;

    /// Drains the source into a single batch
    fn read_all(&mut self) -> EngineResult<Batch> {
        let mut fragments = Vec::new();
        while let Some(batch) = self.next_batch()? {
            fragments.push(batch);
        }
        if fragments.len() == 1 {
            return Ok(fragments.remove(0));
        }
        Batch::concat(&fragments)
    }
}

/// In-memory source over pre-built fragments
#[derive(Debug, Default)]
pub struct MemorySource {
    fragments: VecDeque<Batch>,
}

impl MemorySource {
    pub fn new(fragments: Vec<Batch>) -> Self {
        Self {
            fragments: fragments.into(),
        }
    }
}

impl BatchSource for MemorySource {
    fn next_batch(&mut self) -> EngineResult<Option<Batch>> {
        Ok(self.fragments.pop_front())
    }
}
