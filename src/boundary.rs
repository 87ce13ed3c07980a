//! The apply boundary.
//!
//! All local mutation for one remote notification happens inside a single
//! [`ApplyBoundary::apply`] call. The state lock is held for the whole call,
//! so readers either see the state before the notification or after it,
//! never a record upserted but not yet positioned. The changes made inside
//! the call are journaled and broadcast to observers as one event once the
//! lock is released.

use crate::error::SyncError;
use crate::local::{LocalStore, OrderedSequence, Sequences};
use crate::observers::{DropReason, LocalChange, ObserverHandle, ObserverSet, SyncEvent};
use crate::types::{ContextId, EntityIdentity, NormalizedRecord, RecordKey};
use parking_lot::Mutex;
use tracing::error;

/// The local store plus the ordered sequences of every collection subscription.
pub struct SyncState<S> {
    pub store: S,
    pub sequences: Sequences,
}

impl<S> SyncState<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            sequences: Sequences::new(),
        }
    }

    pub fn sequence(&self, identity: &EntityIdentity) -> Option<&OrderedSequence> {
        self.sequences.get(identity)
    }
}

/// Mutable view of the state for the duration of one notification.
pub struct Batch<'a, S> {
    state: &'a mut SyncState<S>,
    changes: Vec<LocalChange>,
}

impl<'a, S: LocalStore> Batch<'a, S> {
    fn new(state: &'a mut SyncState<S>) -> Self {
        Self {
            state,
            changes: Vec::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.state.store
    }

    /// Direct store access for mutations the engine does not journal, such
    /// as relationship resolution by the external loader.
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.state.store
    }

    pub fn upsert(&mut self, record: NormalizedRecord) -> RecordKey {
        let key = record.key.clone();
        self.state.store.upsert(record);
        self.changes.push(LocalChange::Upserted { key: key.clone() });
        key
    }

    pub fn remove_record(&mut self, key: &RecordKey) -> bool {
        let removed = self.state.store.remove(key);
        if removed {
            self.changes.push(LocalChange::Removed { key: key.clone() });
        }
        removed
    }

    pub fn sequence(&self, identity: &EntityIdentity) -> Option<&OrderedSequence> {
        self.state.sequences.get(identity)
    }

    /// Replace the sequence for `identity` with loaded content.
    pub fn seed(&mut self, identity: &EntityIdentity, keys: Vec<RecordKey>) {
        let sequence = OrderedSequence::from_keys(keys);
        self.changes.push(LocalChange::Seeded {
            sequence: identity.clone(),
            len: sequence.len(),
        });
        self.state.sequences.insert(identity.clone(), sequence);
    }

    /// Create an empty sequence for `identity` unless one exists.
    pub fn ensure_sequence(&mut self, identity: &EntityIdentity) {
        self.state.sequences.entry(identity.clone()).or_default();
    }

    /// Edit the sequence for `identity`, creating it empty if needed.
    pub fn edit<'b>(&'b mut self, identity: &'b EntityIdentity) -> SequenceEdit<'b, S> {
        let sequence = self.state.sequences.entry(identity.clone()).or_default();
        SequenceEdit {
            store: &mut self.state.store,
            sequence,
            identity,
            changes: &mut self.changes,
        }
    }

    fn into_changes(self) -> Vec<LocalChange> {
        self.changes
    }
}

/// Journaled edits to one ordered sequence, with store access alongside.
pub struct SequenceEdit<'b, S> {
    store: &'b mut S,
    sequence: &'b mut OrderedSequence,
    identity: &'b EntityIdentity,
    changes: &'b mut Vec<LocalChange>,
}

impl<S: LocalStore> SequenceEdit<'_, S> {
    pub fn upsert(&mut self, record: NormalizedRecord) -> RecordKey {
        let key = record.key.clone();
        self.store.upsert(record);
        self.changes.push(LocalChange::Upserted { key: key.clone() });
        key
    }

    pub fn sequence(&self) -> &OrderedSequence {
        self.sequence
    }

    pub fn get(&self, index: usize) -> Option<&RecordKey> {
        self.sequence.get(index)
    }

    pub fn position(&self, key: &RecordKey) -> Option<usize> {
        self.sequence.position(key)
    }

    pub fn insert(&mut self, index: usize, key: RecordKey) -> usize {
        let index = self.sequence.insert(index, key.clone());
        self.changes.push(LocalChange::Inserted {
            sequence: self.identity.clone(),
            index,
            key,
        });
        index
    }

    pub fn remove_at(&mut self, index: usize) -> Option<RecordKey> {
        let key = self.sequence.remove_at(index)?;
        self.changes.push(LocalChange::Evicted {
            sequence: self.identity.clone(),
            index,
            key: key.clone(),
        });
        Some(key)
    }

    pub fn remove(&mut self, key: &RecordKey) -> Option<usize> {
        let index = self.sequence.remove(key)?;
        self.changes.push(LocalChange::Evicted {
            sequence: self.identity.clone(),
            index,
            key: key.clone(),
        });
        Some(index)
    }

    pub fn move_item(&mut self, from: usize, to: usize) -> Option<usize> {
        let key = self.sequence.get(from)?.clone();
        let to = self.sequence.move_item(from, to)?;
        self.changes.push(LocalChange::Moved {
            sequence: self.identity.clone(),
            from,
            to,
            key,
        });
        Some(to)
    }
}

/// Serializes every local mutation behind one lock.
pub struct ApplyBoundary<S> {
    state: Mutex<SyncState<S>>,
    observers: ObserverSet,
}

impl<S: LocalStore> ApplyBoundary<S> {
    pub fn new(store: S) -> Self {
        Self {
            state: Mutex::new(SyncState::new(store)),
            observers: ObserverSet::new(),
        }
    }

    /// Apply one notification's worth of mutations atomically.
    pub fn apply<R>(&self, f: impl FnOnce(&mut Batch<'_, S>) -> R) -> R {
        let (result, changes) = {
            let mut state = self.state.lock();
            let mut batch = Batch::new(&mut state);
            let result = f(&mut batch);
            (result, batch.into_changes())
        };

        if !changes.is_empty() {
            self.observers.broadcast(SyncEvent::Applied { changes });
        }
        result
    }

    /// Read a consistent view of the state.
    pub fn read<R>(&self, f: impl FnOnce(&SyncState<S>) -> R) -> R {
        f(&self.state.lock())
    }

    /// Surface a failed update to observers.
    pub fn report_failure(&self, context: &ContextId, identity: &EntityIdentity, err: &SyncError) {
        error!(%context, %identity, error = %err, "remote update failed");
        self.observers.broadcast(SyncEvent::UpdateFailed {
            context: context.clone(),
            identity: identity.clone(),
            error: err.to_string(),
        });
    }

    pub fn observe(&self, buffer_size: usize) -> ObserverHandle {
        self.observers.observe(buffer_size)
    }

    pub fn observers(&self) -> &ObserverSet {
        &self.observers
    }

    pub fn close_observers(&self) {
        self.observers.close_all(DropReason::ShutDown);
    }
}
