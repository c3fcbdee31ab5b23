//! Morsel-driven data parallelism
//!
//! Row ranges are cut into fixed-size morsels. Morsel boundaries depend only
//! on the morsel size, never on how many workers run them, and partial
//! results always come back in morsel order. Operators that merge partial
//! state therefore produce identical output whether the morsels ran on one
//! thread or many.

use std::ops::Range;

use rayon::prelude::*;

/// Default rows per morsel
pub const DEFAULT_MORSEL_SIZE: usize = 64 * 1024;

/// How an operator splits and schedules its row range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Parallelism {
    /// Run morsels on the rayon pool
    pub enabled: bool,
    /// Rows per morsel
    pub morsel_size: usize,
}

impl Default for Parallelism {
    fn default() -> Self {
        Self::serial()
    }
}

impl Parallelism {
    pub fn serial() -> Self {
        Self {
            enabled: false,
            morsel_size: DEFAULT_MORSEL_SIZE,
        }
    }

    pub fn parallel(morsel_size: usize) -> Self {
        Self {
            enabled: true,
            morsel_size: morsel_size.max(1),
        }
    }

    /// Splits `0..len` into consecutive morsels
    pub fn morsels(&self, len: usize) -> Vec<Range<usize>> {
        let size = self.morsel_size.max(1);
        (0..len.div_ceil(size))
            .map(|i| i * size..((i + 1) * size).min(len))
            .collect()
    }

    /// Runs `f` on every morsel, returning results in morsel order
    pub fn map_morsels<T, F>(&self, len: usize, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(Range<usize>) -> T + Sync + Send,
    {
        let morsels = self.morsels(len);
        if self.enabled && morsels.len() > 1 {
            morsels.into_par_iter().map(f).collect()
        } else {
            morsels.into_iter().map(f).collect()
        }
    }
}
