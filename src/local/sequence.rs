//! Local ordered sequence backing a collection subscription.

use crate::types::RecordKey;
use serde::{Deserialize, Serialize};

/// A position-addressable list of local record references.
///
/// Inserts clamp to the current length, so positions reported by a remote
/// that is ahead of the local copy never panic.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderedSequence {
    items: Vec<RecordKey>,
}

impl OrderedSequence {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Build from loaded content, keeping the first occurrence of each key.
    pub fn from_keys(keys: impl IntoIterator<Item = RecordKey>) -> Self {
        let mut sequence = Self::new();
        for key in keys {
            if !sequence.contains(&key) {
                sequence.items.push(key);
            }
        }
        sequence
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&RecordKey> {
        self.items.get(index)
    }

    pub fn position(&self, key: &RecordKey) -> Option<usize> {
        self.items.iter().position(|k| k == key)
    }

    /// Position of the element whose id is `id` (any model).
    pub fn position_of_id(&self, id: &str) -> Option<usize> {
        self.items.iter().position(|k| k.id == id)
    }

    pub fn contains(&self, key: &RecordKey) -> bool {
        self.position(key).is_some()
    }

    /// Insert at `index`, clamped to the length. Returns the index used.
    pub fn insert(&mut self, index: usize, key: RecordKey) -> usize {
        let index = index.min(self.items.len());
        self.items.insert(index, key);
        index
    }

    pub fn remove_at(&mut self, index: usize) -> Option<RecordKey> {
        if index < self.items.len() {
            Some(self.items.remove(index))
        } else {
            None
        }
    }

    /// Remove `key` wherever it sits. Returns the position it had.
    pub fn remove(&mut self, key: &RecordKey) -> Option<usize> {
        let index = self.position(key)?;
        self.items.remove(index);
        Some(index)
    }

    /// Move the element at `from` to `to` (clamped). Returns the index used.
    pub fn move_item(&mut self, from: usize, to: usize) -> Option<usize> {
        let key = self.remove_at(from)?;
        Some(self.insert(to, key))
    }

    pub fn iter(&self) -> impl Iterator<Item = &RecordKey> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[RecordKey] {
        &self.items
    }

    pub fn to_vec(&self) -> Vec<RecordKey> {
        self.items.clone()
    }

    /// Ids in order, mostly useful for assertions and logging.
    pub fn ids(&self) -> Vec<&str> {
        self.items.iter().map(|k| k.id.as_str()).collect()
    }
}
