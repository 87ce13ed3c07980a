//! Observer set for broadcasting applied batches.

use crossbeam_channel::{bounded, Sender};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use super::types::{DropReason, ObserverHandle, ObserverId, SyncEvent};

struct Observer {
    sender: Sender<SyncEvent>,
}

impl Observer {
    /// Try to send an event. Returns false if the buffer is full or the
    /// receiver is gone (observer will be dropped).
    fn try_send(&self, event: SyncEvent) -> bool {
        self.sender.try_send(event).is_ok()
    }
}

/// Fans applied batches out to observers over bounded channels.
pub struct ObserverSet {
    observers: RwLock<HashMap<ObserverId, Observer>>,
    next_id: AtomicU64,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self {
            observers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Start observing with a buffer of `buffer_size` events.
    pub fn observe(&self, buffer_size: usize) -> ObserverHandle {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = bounded(buffer_size.max(1));
        self.observers.write().insert(id, Observer { sender });
        ObserverHandle { id, receiver }
    }

    /// Stop observing.
    pub fn unobserve(&self, id: ObserverId) {
        if let Some(observer) = self.observers.write().remove(&id) {
            let _ = observer.try_send(SyncEvent::Dropped {
                reason: DropReason::Unobserved,
            });
        }
    }

    pub fn observer_count(&self) -> usize {
        self.observers.read().len()
    }

    /// Send `event` to every observer. Drops observers that fail to receive.
    pub fn broadcast(&self, event: SyncEvent) {
        let mut to_remove = Vec::new();

        {
            let observers = self.observers.read();
            for (id, observer) in observers.iter() {
                if !observer.try_send(event.clone()) {
                    to_remove.push(*id);
                }
            }
        }

        if !to_remove.is_empty() {
            let mut observers = self.observers.write();
            for id in to_remove {
                if let Some(observer) = observers.remove(&id) {
                    debug!(observer = id.0, "dropping slow observer");
                    let _ = observer.sender.try_send(SyncEvent::Dropped {
                        reason: DropReason::BufferOverflow,
                    });
                }
            }
        }
    }

    /// Drop every observer with `reason`.
    pub fn close_all(&self, reason: DropReason) {
        for (_, observer) in self.observers.write().drain() {
            let _ = observer.try_send(SyncEvent::Dropped {
                reason: reason.clone(),
            });
        }
    }
}

impl Default for ObserverSet {
    fn default() -> Self {
        Self::new()
    }
}
