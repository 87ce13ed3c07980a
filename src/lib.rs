//! # Livewire Sync
//!
//! Keeps a locally cached copy of records synchronized with a realtime
//! backend that pushes incremental change notifications.
//!
//! ## Core Concepts
//!
//! - **Contexts**: Owning scopes; every subscription lives and dies with one
//! - **Listeners**: One live watch per (context, identity), selected by the remote's capability
//! - **Sequences**: Local ordered lists reconciled against diff-snapshot or
//!   sibling-linked notifications
//! - **Cascades**: Relationships resolving on a subscribed record open child subscriptions
//!
//! ## Example
//!
//! ```ignore
//! use livewire_sync::{ContextId, MemoryStore, Realtime, SubscriptionTarget};
//!
//! let realtime = Realtime::with_store(MemoryStore::new());
//! let route = ContextId::from("route:posts");
//!
//! // Watch the root collection of posts
//! realtime.subscribe_root(
//!     &route,
//!     SubscriptionTarget::diff_collection("post", posts_collection, post_normalizer),
//! )?;
//!
//! // Leaving the route tears every watch down
//! realtime.unsubscribe(&route, None);
//! ```

pub mod boundary;
pub mod config;
pub mod error;
pub mod listeners;
pub mod local;
pub mod observers;
pub mod realtime;
pub mod registry;
pub mod remote;
pub mod types;

// Re-exports
pub use boundary::{ApplyBoundary, Batch, SequenceEdit, SyncState};
pub use config::RealtimeConfig;
pub use error::{Result, SyncError};
pub use listeners::cascade::CascadeRequest;
pub use listeners::diff::{apply_doc_changes, DiffOutcome};
pub use listeners::entity::{apply_entity_snapshot, EntityOutcome};
pub use listeners::sibling::apply_child_event;
pub use listeners::ListenerScope;
pub use local::{
    HookId, LocalStore, MemoryStore, OrderedSequence, RelationshipHook, ResolvedRelationship,
    Sequences,
};
pub use observers::{DropReason, LocalChange, ObserverHandle, ObserverId, SyncEvent};
pub use realtime::{ContextScope, Realtime};
pub use registry::{ClosedContext, SubscriptionRegistry};
pub use remote::{
    BatchCallback, Capability, ChildCallback, ChildEvent, ChildEventKind, DiffSnapshotCollection,
    DocChange, FnNormalizer, JsonNormalizer, Normalizer, RemoteReference, RemoteSnapshot,
    RemoteSource, SiblingLinkedCollection, SnapshotCallback, SubscriptionTarget, Teardown,
};
pub use types::*;
