//! VM storage management and overlay abstractions.
//!
//! Provides traits and types for the persistent key-value storage a program
//! reads with `SLOAD` and writes with `SSTORE`. The [`State`] trait defines the
//! interface, [`OverlayState`] buffers writes so an invocation commits them
//! atomically or discards them, and [`MemoryState`] / [`SharedState`] are
//! in-process backends.
//!
//! Inside the machine an unset slot and a slot holding zero read the same;
//! `SSTORE key, 0` is recorded as a deletion. Only host code sees the
//! difference, through the `Option` returned by [`State::get`].

use crate::types::word::Word;
use dashmap::DashMap;
use std::collections::BTreeMap;

/// A buffered storage write: `Some(value)` sets the slot, `None` deletes it.
pub type StorageWrite = (Word, Option<Word>);

/// Key-value storage interface for VM execution.
pub trait State {
    /// Retrieves a value by key, returning `None` if the key does not exist.
    fn get(&self, key: Word) -> Option<Word>;
    /// Stores a key-value pair, overwriting any existing value.
    fn set(&mut self, key: Word, value: Word);
    /// Removes a key from storage.
    fn delete(&mut self, key: Word);

    /// Applies buffered writes in order.
    fn apply(&mut self, writes: impl IntoIterator<Item = StorageWrite>)
    where
        Self: Sized,
    {
        for (key, value) in writes {
            match value {
                Some(value) => self.set(key, value),
                None => self.delete(key),
            }
        }
    }
}

/// Write-buffering overlay on top of a base storage.
///
/// Buffers writes in memory while reading through to the base storage for keys
/// not yet written.
pub struct OverlayState<'a> {
    /// Underlying storage for read-through on cache misses.
    base: &'a dyn State,
    /// Pending writes: `Some(value)` for insertions, `None` for deletions.
    pub(crate) writes: BTreeMap<Word, Option<Word>>,
}

impl<'a> OverlayState<'a> {
    /// Creates a new overlay backed by the given base storage.
    pub fn new(base: &'a dyn State) -> Self {
        Self {
            base,
            writes: BTreeMap::new(),
        }
    }

    /// Consumes the overlay and returns the pending writes in key order.
    pub fn into_writes(self) -> Vec<StorageWrite> {
        self.writes.into_iter().collect()
    }
}

impl<'a> State for OverlayState<'a> {
    fn get(&self, key: Word) -> Option<Word> {
        if let Some(v) = self.writes.get(&key) {
            return *v;
        }
        self.base.get(key)
    }

    fn set(&mut self, key: Word, value: Word) {
        self.writes.insert(key, Some(value));
    }

    fn delete(&mut self, key: Word) {
        self.writes.insert(key, None);
    }
}

/// Single-owner in-memory storage.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemoryState {
    data: BTreeMap<Word, Word>,
}

impl MemoryState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data(data: impl IntoIterator<Item = (Word, Word)>) -> Self {
        Self {
            data: data.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Occupied slots in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&Word, &Word)> {
        self.data.iter()
    }
}

impl State for MemoryState {
    fn get(&self, key: Word) -> Option<Word> {
        self.data.get(&key).copied()
    }

    fn set(&mut self, key: Word, value: Word) {
        self.data.insert(key, value);
    }

    fn delete(&mut self, key: Word) {
        self.data.remove(&key);
    }
}

/// Storage shared between concurrent invocations.
///
/// Writes to one key are serialized by the map's shard locks and readers
/// see the latest committed value. Invocations use it through `&SharedState`.
#[derive(Debug, Default)]
pub struct SharedState {
    data: DashMap<Word, Word>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Copies the current contents into a [`MemoryState`].
    pub fn snapshot(&self) -> MemoryState {
        MemoryState::with_data(self.data.iter().map(|e| (*e.key(), *e.value())))
    }
}

impl State for &SharedState {
    fn get(&self, key: Word) -> Option<Word> {
        self.data.get(&key).map(|v| *v)
    }

    fn set(&mut self, key: Word, value: Word) {
        self.data.insert(key, value);
    }

    fn delete(&mut self, key: Word) {
        self.data.remove(&key);
    }
}

impl State for SharedState {
    fn get(&self, key: Word) -> Option<Word> {
        <&SharedState as State>::get(&self, key)
    }

    fn set(&mut self, key: Word, value: Word) {
        let mut handle: &SharedState = self;
        handle.set(key, value)
    }

    fn delete(&mut self, key: Word) {
        let mut handle: &SharedState = self;
        handle.delete(key)
    }
}
