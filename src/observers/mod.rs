//! Observers of the local state.
//!
//! Every remote notification is applied inside one batch; observers receive
//! the whole batch as a single [`SyncEvent::Applied`], never a half-applied
//! change. Observers whose bounded buffer fills are dropped.

mod manager;
mod types;

pub use manager::ObserverSet;
pub use types::{DropReason, LocalChange, ObserverHandle, ObserverId, SyncEvent};
