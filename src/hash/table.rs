//! Open-addressing table over packed keys
//!
//! Slots hold indices into an insertion-ordered entry list; key bytes live
//! in one shared arena. Lookups probe linearly from the hashed slot and
//! compare the stored hash before touching key bytes. The table doubles
//! when it would exceed half full.
//!
//! Entry ids are dense (`0..len`) and assigned in first-insertion order, so
//! iteration order is a pure function of the insertion sequence.

use ahash::RandomState;

use crate::error::{EngineError, EngineResult};

const EMPTY: usize = usize::MAX;
const MIN_SLOTS: usize = 16;

/// Fixed seeds keep hashing, and therefore probe sequences, reproducible
/// across runs.
const SEEDS: [u64; 4] = [
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
];

#[derive(Debug, Clone)]
struct Entry<V> {
    hash: u64,
    key_start: usize,
    key_end: usize,
    value: V,
}

/// Hash table from packed key bytes to a value of type `V`
#[derive(Debug, Clone)]
pub struct KeyedTable<V> {
    slots: Vec<usize>,
    entries: Vec<Entry<V>>,
    arena: Vec<u8>,
    state: RandomState,
}

impl<V> Default for KeyedTable<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> KeyedTable<V> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            entries: Vec::new(),
            arena: Vec::new(),
            state: RandomState::with_seeds(SEEDS[0], SEEDS[1], SEEDS[2], SEEDS[3]),
        }
    }

    /// Table sized for `n` distinct keys without growing
    pub fn with_capacity(n: usize) -> EngineResult<Self> {
        let mut table = Self::new();
        table.resize(slots_for(n))?;
        table
            .entries
            .try_reserve(n)
            .map_err(|e| EngineError::AllocationFailure(e.to_string()))?;
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of slots currently allocated
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    fn hash(&self, key: &[u8]) -> u64 {
        self.state.hash_one(key)
    }

    #[inline]
    fn key_of(&self, entry: &Entry<V>) -> &[u8] {
        &self.arena[entry.key_start..entry.key_end]
    }

    fn find_hashed(&self, key: &[u8], hash: u64) -> Result<usize, usize> {
        let mask = self.slots.len() - 1;
        let mut slot = hash as usize & mask;
        loop {
            match self.slots[slot] {
                EMPTY => return Err(slot),
                id => {
                    let entry = &self.entries[id];
                    if entry.hash == hash && self.key_of(entry) == key {
                        return Ok(id);
                    }
                }
            }
            slot = (slot + 1) & mask;
        }
    }

    /// Entry id of `key`, if present
    pub fn find(&self, key: &[u8]) -> Option<usize> {
        if self.slots.is_empty() {
            return None;
        }
        self.find_hashed(key, self.hash(key)).ok()
    }

    pub fn get(&self, key: &[u8]) -> Option<&V> {
        self.find(key).map(|id| &self.entries[id].value)
    }

    /// Looks up `key`, inserting `make()` when absent.
    ///
    /// Returns the entry id and whether it was inserted by this call.
    pub fn entry(&mut self, key: &[u8], make: impl FnOnce() -> V) -> EngineResult<(usize, bool)> {
        let hash = self.hash(key);
        self.entry_hashed(key, hash, make)
    }

    fn entry_hashed(
        &mut self,
        key: &[u8],
        hash: u64,
        make: impl FnOnce() -> V,
    ) -> EngineResult<(usize, bool)> {
        if (self.entries.len() + 1) * 2 > self.slots.len() {
            self.resize(slots_for(self.entries.len() + 1))?;
        }
        match self.find_hashed(key, hash) {
            Ok(id) => Ok((id, false)),
            Err(slot) => {
                let id = self.entries.len();
                self.arena
                    .try_reserve(key.len())
                    .map_err(|e| EngineError::AllocationFailure(e.to_string()))?;
                let key_start = self.arena.len();
                self.arena.extend_from_slice(key);
                self.entries.push(Entry {
                    hash,
                    key_start,
                    key_end: self.arena.len(),
                    value: make(),
                });
                self.slots[slot] = id;
                Ok((id, true))
            }
        }
    }

    pub fn value(&self, id: usize) -> &V {
        &self.entries[id].value
    }

    pub fn value_mut(&mut self, id: usize) -> &mut V {
        &mut self.entries[id].value
    }

    pub fn key(&self, id: usize) -> &[u8] {
        self.key_of(&self.entries[id])
    }

    /// Entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &V)> + '_ {
        self.entries
            .iter()
            .map(move |entry| (self.key_of(entry), &entry.value))
    }

    /// Values in insertion order
    pub fn into_values(self) -> Vec<V> {
        self.entries.into_iter().map(|entry| entry.value).collect()
    }

    /// Folds `other` into this table.
    ///
    /// Keys already present keep this table's value; new keys are appended
    /// with `other`'s value in `other`'s insertion order. Returns, for each
    /// entry id of `other`, the id it has in this table.
    pub fn merge(&mut self, other: KeyedTable<V>) -> EngineResult<Vec<usize>> {
        let KeyedTable {
            entries, arena, ..
        } = other;
        let mut mapping = Vec::with_capacity(entries.len());
        for entry in entries {
            let key = &arena[entry.key_start..entry.key_end];
            let hash = self.hash(key);
            let value = entry.value;
            let (id, _) = self.entry_hashed(key, hash, move || value)?;
            mapping.push(id);
        }
        Ok(mapping)
    }

    fn resize(&mut self, slot_count: usize) -> EngineResult<()> {
        if slot_count <= self.slots.len() {
            return Ok(());
        }
        let mut slots = Vec::new();
        slots
            .try_reserve_exact(slot_count)
            .map_err(|e| EngineError::AllocationFailure(e.to_string()))?;
        slots.resize(slot_count, EMPTY);
        let mask = slot_count - 1;
        for (id, entry) in self.entries.iter().enumerate() {
            let mut slot = entry.hash as usize & mask;
            while slots[slot] != EMPTY {
                slot = (slot + 1) & mask;
            }
            slots[slot] = id;
        }
        self.slots = slots;
        Ok(())
    }
}

/// Power-of-two slot count keeping `n` entries at most half full
fn slots_for(n: usize) -> usize {
    n.saturating_mul(2).next_power_of_two().max(MIN_SLOTS)
}
