//! In-process fakes of the remote backend shared by the integration tests.

#![allow(dead_code)]

use livewire_sync::{
    BatchCallback, ChildCallback, ChildEvent, ChildEventKind, DiffSnapshotCollection, DocChange,
    JsonNormalizer, Normalizer, RecordKey, RemoteReference, RemoteSnapshot,
    SiblingLinkedCollection, SnapshotCallback, Teardown,
};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .try_init();
}

/// Objects become attributes; anything else fails to normalize.
pub fn json_normalizer() -> Arc<dyn Normalizer> {
    Arc::new(JsonNormalizer)
}

pub fn doc(id: &str) -> RemoteSnapshot {
    RemoteSnapshot::existing(id, json!({ "id": id }))
}

struct Watch<C: ?Sized> {
    callback: Arc<C>,
    active: Arc<Mutex<bool>>,
}

/// Watches attached to one fake remote source.
pub struct Watches<C: ?Sized> {
    watches: Mutex<Vec<Watch<C>>>,
    detached: Arc<AtomicUsize>,
}

impl<C: ?Sized> Default for Watches<C> {
    fn default() -> Self {
        Self {
            watches: Mutex::new(Vec::new()),
            detached: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl<C: ?Sized + Send + Sync + 'static> Watches<C> {
    fn attach(&self, callback: Box<C>) -> Teardown {
        let active = Arc::new(Mutex::new(true));
        self.watches.lock().push(Watch {
            callback: Arc::from(callback),
            active: Arc::clone(&active),
        });
        let detached = Arc::clone(&self.detached);
        Teardown::new(move || {
            let mut active = active.lock();
            assert!(*active, "teardown ran twice");
            *active = false;
            detached.fetch_add(1, Ordering::SeqCst);
        })
    }

    /// Callbacks of watches still attached.
    fn live(&self) -> Vec<Arc<C>> {
        self.watches
            .lock()
            .iter()
            .filter(|w| *w.active.lock())
            .map(|w| Arc::clone(&w.callback))
            .collect()
    }

    /// Callbacks of every watch ever attached, detached ones included.
    fn all(&self) -> Vec<Arc<C>> {
        self.watches
            .lock()
            .iter()
            .map(|w| Arc::clone(&w.callback))
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.watches.lock().iter().filter(|w| *w.active.lock()).count()
    }

    pub fn detached_count(&self) -> usize {
        self.detached.load(Ordering::SeqCst)
    }
}

/// A fake remote record.
#[derive(Default)]
pub struct FakeReference {
    pub watches: Watches<dyn Fn(RemoteSnapshot) + Send + Sync>,
}

impl FakeReference {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn emit(&self, snapshot: RemoteSnapshot) {
        for callback in self.watches.live() {
            callback(snapshot.clone());
        }
    }

    /// Deliver a notification that was already in flight when the watch was
    /// detached.
    pub fn emit_late(&self, snapshot: RemoteSnapshot) {
        for callback in self.watches.all() {
            callback(snapshot.clone());
        }
    }
}

impl RemoteReference for FakeReference {
    fn subscribe(&self, on_change: SnapshotCallback) -> Teardown {
        self.watches.attach(on_change)
    }
}

/// A fake remote collection reporting diff snapshots.
#[derive(Default)]
pub struct FakeDiffCollection {
    pub watches: Watches<dyn Fn(Vec<DocChange>) + Send + Sync>,
}

impl FakeDiffCollection {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn emit(&self, changes: Vec<DocChange>) {
        for callback in self.watches.live() {
            callback(changes.clone());
        }
    }

    /// Deliver a batch that was already in flight when the watch was
    /// detached.
    pub fn emit_late(&self, changes: Vec<DocChange>) {
        for callback in self.watches.all() {
            callback(changes.clone());
        }
    }
}

impl DiffSnapshotCollection for FakeDiffCollection {
    fn subscribe(&self, on_batch: BatchCallback) -> Teardown {
        self.watches.attach(on_batch)
    }
}

/// A fake remote collection reporting sibling-linked child events.
#[derive(Default)]
pub struct FakeSiblingCollection {
    added: Watches<dyn Fn(ChildEvent) + Send + Sync>,
    removed: Watches<dyn Fn(ChildEvent) + Send + Sync>,
    changed: Watches<dyn Fn(ChildEvent) + Send + Sync>,
    moved: Watches<dyn Fn(ChildEvent) + Send + Sync>,
}

impl FakeSiblingCollection {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn stream(&self, kind: ChildEventKind) -> &Watches<dyn Fn(ChildEvent) + Send + Sync> {
        match kind {
            ChildEventKind::Added => &self.added,
            ChildEventKind::Removed => &self.removed,
            ChildEventKind::Changed => &self.changed,
            ChildEventKind::Moved => &self.moved,
        }
    }

    pub fn emit(&self, kind: ChildEventKind, event: ChildEvent) {
        for callback in self.stream(kind).live() {
            callback(event.clone());
        }
    }

    pub fn added(&self, id: &str, prior: Option<&str>) {
        self.emit(ChildEventKind::Added, ChildEvent::after(doc(id), prior));
    }

    pub fn moved(&self, id: &str, prior: Option<&str>) {
        self.emit(ChildEventKind::Moved, ChildEvent::after(doc(id), prior));
    }

    pub fn removed(&self, id: &str) {
        self.emit(ChildEventKind::Removed, ChildEvent::new(doc(id)));
    }

    pub fn active_count(&self) -> usize {
        ChildEventKind::ALL
            .iter()
            .map(|&kind| self.stream(kind).active_count())
            .sum()
    }
}

impl SiblingLinkedCollection for FakeSiblingCollection {
    fn on(&self, kind: ChildEventKind, callback: ChildCallback) -> Teardown {
        self.stream(kind).attach(callback)
    }
}

/// Ids of a sequence snapshot, or empty.
pub fn ids(sequence: Option<Vec<RecordKey>>) -> Vec<String> {
    sequence
        .unwrap_or_default()
        .into_iter()
        .map(|k| k.id)
        .collect()
}
