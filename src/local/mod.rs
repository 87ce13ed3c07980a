//! The local side: the addressable record store and ordered sequences.
//!
//! The record/cache data model belongs to the embedding application. The
//! engine only needs the narrow [`LocalStore`] surface:
//! - upsert and remove of normalized records
//! - the relationships of a record already resolved into memory
//! - a registration point notified the first time a relationship resolves, and
//!   a way to take that registration back
//!
//! [`MemoryStore`] is an in-memory implementation of that surface.

mod memory;
mod sequence;

pub use memory::MemoryStore;
pub use sequence::OrderedSequence;

use crate::remote::SubscriptionTarget;
use crate::types::{EntityIdentity, NormalizedRecord, RecordKey, RelationshipKind};
use std::collections::HashMap;
use std::sync::Arc;

/// Ordered sequences keyed by the identity of the subscription that owns them.
pub type Sequences = HashMap<EntityIdentity, OrderedSequence>;

/// A relationship of a record that has been resolved into memory.
#[derive(Clone, Debug)]
pub struct ResolvedRelationship {
    pub name: String,
    pub kind: RelationshipKind,
    /// How to watch the related record(s). `None` when the relationship
    /// resolved to nothing (an empty to-one, for instance).
    pub target: Option<SubscriptionTarget>,
}

impl ResolvedRelationship {
    pub fn new(
        name: impl Into<String>,
        kind: RelationshipKind,
        target: Option<SubscriptionTarget>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            target,
        }
    }
}

/// Called with the owning record and the relationship the first time that
/// relationship resolves.
///
/// Hooks run while the store is being mutated and must not call back into
/// the engine.
pub type RelationshipHook = Arc<dyn Fn(&RecordKey, &ResolvedRelationship) + Send + Sync>;

/// Handle to one registered [`RelationshipHook`], used to remove it again.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HookId(pub u64);

/// The local store surface the listeners write to.
pub trait LocalStore: Send + 'static {
    /// Insert or replace a record.
    fn upsert(&mut self, record: NormalizedRecord);

    /// Remove a record. Returns false if it was not present.
    fn remove(&mut self, key: &RecordKey) -> bool;

    fn contains(&self, key: &RecordKey) -> bool;

    /// Relationships of `key` that have already been resolved.
    fn resolved_relationships_of(&self, key: &RecordKey) -> Vec<ResolvedRelationship>;

    /// Register `hook` to be told about every later first resolution of a
    /// relationship of `key`.
    fn observe_relationships(&mut self, key: &RecordKey, hook: RelationshipHook) -> HookId;

    /// Remove a hook registered for `key`. Returns false if it was not present.
    fn unobserve_relationships(&mut self, key: &RecordKey, hook: HookId) -> bool;
}
