//! Capabilities consumed from the remote backend.
//!
//! The engine never speaks a wire protocol itself. A backend adapter hands it
//! one of three watch capabilities, tagged once with a [`Capability`] when the
//! target is built, plus a [`Normalizer`] for the payloads it delivers.

use crate::error::{Result, SyncError};
use crate::types::{EntityIdentity, NormalizedRecord, RecordKey};
use std::fmt;
use std::sync::Arc;

/// Detaches one remote watch.
///
/// Remote collaborators do not promise idempotent detach, so this is a
/// one-shot value: running it consumes it.
pub struct Teardown(Box<dyn FnOnce() + Send>);

impl Teardown {
    pub fn new(f: impl FnOnce() + Send + 'static) -> Self {
        Teardown(Box::new(f))
    }

    /// A teardown with nothing to detach.
    pub fn noop() -> Self {
        Teardown(Box::new(|| {}))
    }

    /// Merge several teardowns into one that runs them in order.
    pub fn combine(parts: Vec<Teardown>) -> Self {
        Teardown(Box::new(move || {
            for part in parts {
                part.run();
            }
        }))
    }

    /// Detach the watch.
    pub fn run(self) {
        (self.0)()
    }
}

impl fmt::Debug for Teardown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Teardown(..)")
    }
}

/// A raw remote payload: the remote key plus its value, if it exists.
#[derive(Clone, Debug, PartialEq)]
pub struct RemoteSnapshot {
    pub key: String,
    pub value: Option<serde_json::Value>,
}

impl RemoteSnapshot {
    pub fn existing(key: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            key: key.into(),
            value: Some(value),
        }
    }

    /// The explicit not-found signal.
    pub fn missing(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
        }
    }

    pub fn exists(&self) -> bool {
        self.value.is_some()
    }
}

pub type SnapshotCallback = Box<dyn Fn(RemoteSnapshot) + Send + Sync>;
pub type BatchCallback = Box<dyn Fn(Vec<DocChange>) + Send + Sync>;
pub type ChildCallback = Box<dyn Fn(ChildEvent) + Send + Sync>;

/// A live reference to one remote record.
pub trait RemoteReference: Send + Sync {
    /// Start watching. Every notification carries either the value or the
    /// not-found signal.
    fn subscribe(&self, on_change: SnapshotCallback) -> Teardown;
}

/// One tagged change inside a diff-snapshot batch.
#[derive(Clone, Debug, PartialEq)]
pub enum DocChange {
    Added {
        new_index: usize,
        snapshot: RemoteSnapshot,
    },
    Modified {
        old_index: usize,
        new_index: usize,
        snapshot: RemoteSnapshot,
    },
    Removed {
        old_index: usize,
        snapshot: RemoteSnapshot,
    },
}

impl DocChange {
    pub fn snapshot(&self) -> &RemoteSnapshot {
        match self {
            DocChange::Added { snapshot, .. }
            | DocChange::Modified { snapshot, .. }
            | DocChange::Removed { snapshot, .. } => snapshot,
        }
    }
}

/// A remote collection that reports whole batches with explicit positions.
pub trait DiffSnapshotCollection: Send + Sync {
    fn subscribe(&self, on_batch: BatchCallback) -> Teardown;
}

/// The four event streams of a sibling-linked collection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChildEventKind {
    Added,
    Removed,
    Changed,
    Moved,
}

impl ChildEventKind {
    pub const ALL: [ChildEventKind; 4] = [
        ChildEventKind::Added,
        ChildEventKind::Removed,
        ChildEventKind::Changed,
        ChildEventKind::Moved,
    ];
}

/// One child event. `prior_key` is only meaningful for added and moved
/// events; `None` means the child is now first.
#[derive(Clone, Debug, PartialEq)]
pub struct ChildEvent {
    pub snapshot: RemoteSnapshot,
    pub prior_key: Option<String>,
}

impl ChildEvent {
    pub fn new(snapshot: RemoteSnapshot) -> Self {
        Self {
            snapshot,
            prior_key: None,
        }
    }

    pub fn after(snapshot: RemoteSnapshot, prior_key: Option<impl Into<String>>) -> Self {
        Self {
            snapshot,
            prior_key: prior_key.map(Into::into),
        }
    }
}

/// A remote hierarchical collection with independent child event streams.
pub trait SiblingLinkedCollection: Send + Sync {
    fn on(&self, kind: ChildEventKind, callback: ChildCallback) -> Teardown;
}

/// Converts remote payloads for one model into local records.
pub trait Normalizer: Send + Sync {
    fn normalize(&self, model: &str, snapshot: &RemoteSnapshot) -> Result<NormalizedRecord>;
}

/// Adapts a closure into a [`Normalizer`].
pub struct FnNormalizer<F>(pub F);

impl<F> Normalizer for FnNormalizer<F>
where
    F: Fn(&str, &RemoteSnapshot) -> Result<NormalizedRecord> + Send + Sync,
{
    fn normalize(&self, model: &str, snapshot: &RemoteSnapshot) -> Result<NormalizedRecord> {
        (self.0)(model, snapshot)
    }
}

/// Normalizer for payloads that are plain JSON objects: the object's fields
/// become the record's attributes.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonNormalizer;

impl Normalizer for JsonNormalizer {
    fn normalize(&self, model: &str, snapshot: &RemoteSnapshot) -> Result<NormalizedRecord> {
        let key = RecordKey::new(model, snapshot.key.clone());
        let Some(value) = &snapshot.value else {
            return Err(SyncError::normalization(
                EntityIdentity::record(&key),
                "snapshot has no value",
            ));
        };

        let mut record = NormalizedRecord::new(key);
        record.attributes = serde_json::from_value(value.clone())?;
        Ok(record)
    }
}

/// Declared watch capability of a remote source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Capability {
    Single,
    DiffSnapshot,
    SiblingLinked,
}

/// A remote source tagged with its capability.
#[derive(Clone)]
pub enum RemoteSource {
    Single(Arc<dyn RemoteReference>),
    DiffSnapshot(Arc<dyn DiffSnapshotCollection>),
    SiblingLinked(Arc<dyn SiblingLinkedCollection>),
}

impl RemoteSource {
    pub fn capability(&self) -> Capability {
        match self {
            RemoteSource::Single(_) => Capability::Single,
            RemoteSource::DiffSnapshot(_) => Capability::DiffSnapshot,
            RemoteSource::SiblingLinked(_) => Capability::SiblingLinked,
        }
    }
}

impl fmt::Debug for RemoteSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RemoteSource::{:?}", self.capability())
    }
}

/// Everything needed to open a subscription: what to watch, how to watch
/// it, and how to read its payloads.
#[derive(Clone)]
pub struct SubscriptionTarget {
    pub model: String,
    /// Key of the watched record (single-record targets only).
    pub record_id: Option<String>,
    /// Query label narrowing a collection (collections only).
    pub label: Option<String>,
    pub source: RemoteSource,
    pub normalizer: Arc<dyn Normalizer>,
    /// Content already loaded for a collection, used to seed its sequence.
    pub loaded: Option<Vec<RecordKey>>,
}

impl SubscriptionTarget {
    /// Watch a single record.
    pub fn record(
        model: impl Into<String>,
        id: impl Into<String>,
        reference: Arc<dyn RemoteReference>,
        normalizer: Arc<dyn Normalizer>,
    ) -> Self {
        Self {
            model: model.into(),
            record_id: Some(id.into()),
            label: None,
            source: RemoteSource::Single(reference),
            normalizer,
            loaded: None,
        }
    }

    /// Watch a collection that reports diff snapshots.
    pub fn diff_collection(
        model: impl Into<String>,
        collection: Arc<dyn DiffSnapshotCollection>,
        normalizer: Arc<dyn Normalizer>,
    ) -> Self {
        Self {
            model: model.into(),
            record_id: None,
            label: None,
            source: RemoteSource::DiffSnapshot(collection),
            normalizer,
            loaded: None,
        }
    }

    /// Watch a collection that reports sibling-linked child events.
    pub fn sibling_collection(
        model: impl Into<String>,
        collection: Arc<dyn SiblingLinkedCollection>,
        normalizer: Arc<dyn Normalizer>,
    ) -> Self {
        Self {
            model: model.into(),
            record_id: None,
            label: None,
            source: RemoteSource::SiblingLinked(collection),
            normalizer,
            loaded: None,
        }
    }

    /// Narrow a collection identity with a query label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Seed the local sequence with already-loaded content.
    pub fn with_loaded(mut self, keys: Vec<RecordKey>) -> Self {
        self.loaded = Some(keys);
        self
    }

    pub fn capability(&self) -> Capability {
        self.source.capability()
    }

    /// Key of the watched record, for single-record targets.
    pub fn record_key(&self) -> Option<RecordKey> {
        self.record_id
            .as_ref()
            .map(|id| RecordKey::new(self.model.clone(), id.clone()))
    }

    /// The identity this target registers under when subscribed as a root.
    pub fn identity(&self) -> EntityIdentity {
        match self.record_key() {
            Some(key) if self.capability() == Capability::Single => EntityIdentity::record(&key),
            _ => EntityIdentity::collection(&self.model, self.label.as_deref()),
        }
    }
}

impl fmt::Debug for SubscriptionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionTarget")
            .field("model", &self.model)
            .field("record_id", &self.record_id)
            .field("label", &self.label)
            .field("source", &self.source)
            .finish()
    }
}
