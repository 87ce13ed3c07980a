//! Observer event types.

use crate::types::{ContextId, EntityIdentity, RecordKey};
use serde::{Deserialize, Serialize};

/// Events delivered to observers of the local state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    /// Every local mutation made for one remote notification.
    Applied { changes: Vec<LocalChange> },

    /// A remote update could not be applied. The subscription stays attached.
    UpdateFailed {
        context: ContextId,
        identity: EntityIdentity,
        error: String,
    },

    /// The observer was dropped.
    Dropped { reason: DropReason },
}

/// One local mutation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum LocalChange {
    Upserted {
        key: RecordKey,
    },
    Removed {
        key: RecordKey,
    },
    Inserted {
        sequence: EntityIdentity,
        index: usize,
        key: RecordKey,
    },
    Evicted {
        sequence: EntityIdentity,
        index: usize,
        key: RecordKey,
    },
    Moved {
        sequence: EntityIdentity,
        from: usize,
        to: usize,
        key: RecordKey,
    },
    /// A sequence was (re)initialized from loaded content.
    Seeded {
        sequence: EntityIdentity,
        len: usize,
    },
}

/// Why an observer was dropped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Send buffer overflowed (slow consumer).
    BufferOverflow,
    /// Explicitly stopped observing.
    Unobserved,
    /// The engine was shut down.
    ShutDown,
}

/// Unique identifier for an observer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObserverId(pub u64);

/// Receiving end of an observer.
pub struct ObserverHandle {
    pub id: ObserverId,
    pub receiver: crossbeam_channel::Receiver<SyncEvent>,
}

impl ObserverHandle {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<SyncEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<SyncEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<SyncEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Everything currently buffered.
    pub fn drain(&self) -> Vec<SyncEvent> {
        self.receiver.try_iter().collect()
    }
}
