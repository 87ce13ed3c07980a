//! In-memory local store.

use super::{HookId, LocalStore, RelationshipHook, ResolvedRelationship};
use crate::types::{NormalizedRecord, RecordKey};
use std::collections::HashMap;
use tracing::trace;

/// Records held in a map, with relationship resolution tracked per record.
#[derive(Default)]
pub struct MemoryStore {
    records: HashMap<RecordKey, NormalizedRecord>,
    /// Resolved relationships per owner, in resolution order.
    resolved: HashMap<RecordKey, Vec<ResolvedRelationship>>,
    hooks: HashMap<RecordKey, Vec<(HookId, RelationshipHook)>>,
    next_hook: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &RecordKey) -> Option<&NormalizedRecord> {
        self.records.get(key)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &RecordKey> {
        self.records.keys()
    }

    /// Record that `relationship` of `owner` resolved.
    ///
    /// The first resolution of a given relationship name notifies every hook
    /// registered for `owner` and returns true. Later resolutions replace the
    /// stored target silently.
    pub fn resolve_relationship(
        &mut self,
        owner: &RecordKey,
        relationship: ResolvedRelationship,
    ) -> bool {
        let resolved = self.resolved.entry(owner.clone()).or_default();
        if let Some(existing) = resolved.iter_mut().find(|r| r.name == relationship.name) {
            *existing = relationship;
            return false;
        }

        resolved.push(relationship.clone());
        if let Some(hooks) = self.hooks.get(owner) {
            trace!(
                %owner,
                relationship = %relationship.name,
                hooks = hooks.len(),
                "relationship resolved"
            );
            for (_, hook) in hooks {
                hook(owner, &relationship);
            }
        }
        true
    }

    /// Number of hooks registered for `key`.
    pub fn hook_count(&self, key: &RecordKey) -> usize {
        self.hooks.get(key).map_or(0, Vec::len)
    }
}

impl LocalStore for MemoryStore {
    fn upsert(&mut self, record: NormalizedRecord) {
        self.records.insert(record.key.clone(), record);
    }

    fn remove(&mut self, key: &RecordKey) -> bool {
        self.records.remove(key).is_some()
    }

    fn contains(&self, key: &RecordKey) -> bool {
        self.records.contains_key(key)
    }

    fn resolved_relationships_of(&self, key: &RecordKey) -> Vec<ResolvedRelationship> {
        self.resolved.get(key).cloned().unwrap_or_default()
    }

    fn observe_relationships(&mut self, key: &RecordKey, hook: RelationshipHook) -> HookId {
        self.next_hook += 1;
        let id = HookId(self.next_hook);
        self.hooks.entry(key.clone()).or_default().push((id, hook));
        id
    }

    fn unobserve_relationships(&mut self, key: &RecordKey, hook: HookId) -> bool {
        let Some(hooks) = self.hooks.get_mut(key) else {
            return false;
        };
        let before = hooks.len();
        hooks.retain(|(id, _)| *id != hook);
        let removed = hooks.len() < before;
        if hooks.is_empty() {
            self.hooks.remove(key);
        }
        removed
    }
}
