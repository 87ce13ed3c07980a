//! The realtime engine tying the registry, the listeners and the local state
//! together.

use crate::boundary::{ApplyBoundary, Batch, SyncState};
use crate::config::RealtimeConfig;
use crate::error::{Result, SyncError};
use crate::listeners::cascade::{self, CascadeRequest};
use crate::listeners::{self, ListenerScope};
use crate::local::{HookId, LocalStore};
use crate::observers::{ObserverHandle, ObserverId};
use crate::registry::{ClosedContext, SubscriptionRegistry};
use crate::remote::SubscriptionTarget;
use crate::types::{ContextId, EntityIdentity, RecordKey};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::Arc;
use tracing::{debug, info, trace};

/// State shared between the engine and the callbacks of its listeners.
///
/// Listener callbacks hold it weakly, so a remote collaborator that keeps a
/// callback alive never keeps the engine alive.
pub(crate) struct Shared<S> {
    pub(crate) config: RealtimeConfig,
    pub(crate) boundary: ApplyBoundary<S>,
    pub(crate) registry: SubscriptionRegistry,
    cascade_tx: Sender<CascadeRequest>,
    cascade_rx: Receiver<CascadeRequest>,
}

impl<S: LocalStore> Shared<S> {
    fn new(store: S, config: RealtimeConfig) -> Self {
        let (cascade_tx, cascade_rx) = unbounded();
        Self {
            config,
            boundary: ApplyBoundary::new(store),
            registry: SubscriptionRegistry::new(),
            cascade_tx,
            cascade_rx,
        }
    }

    pub(crate) fn cascade_sender(&self) -> Sender<CascadeRequest> {
        self.cascade_tx.clone()
    }
}

impl<S: LocalStore> Shared<S> {
    /// Apply one notification's mutations, then open any cascade
    /// subscriptions they made resolvable.
    pub(crate) fn apply<R>(self: &Arc<Self>, f: impl FnOnce(&mut Batch<'_, S>) -> R) -> R {
        let result = self.boundary.apply(f);
        self.pump_cascades();
        result
    }

    /// Drain queued cascade requests outside the state lock.
    pub(crate) fn pump_cascades(self: &Arc<Self>) {
        while let Ok(request) = self.cascade_rx.try_recv() {
            cascade::open(self, request);
        }
    }

    /// Remove the relationship hooks of closed contexts from the store.
    /// Returns how many subscriptions were torn down.
    fn release(&self, closed: ClosedContext) -> usize {
        if !closed.hooks.is_empty() {
            let hooks: &[(RecordKey, HookId)] = &closed.hooks;
            let released = self.boundary.apply(|batch| {
                let mut released = 0;
                for (key, hook) in hooks {
                    if batch.store_mut().unobserve_relationships(key, *hook) {
                        released += 1;
                    }
                }
                released
            });
            trace!(released, "relationship hooks released");
        }
        closed.subscriptions
    }
}

/// Keeps a local store synchronized with a realtime backend.
///
/// Cloning yields another handle to the same engine.
pub struct Realtime<S> {
    shared: Arc<Shared<S>>,
}

impl<S> Clone for Realtime<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S: LocalStore> Realtime<S> {
    /// Create an engine owning `store`.
    pub fn new(store: S, config: RealtimeConfig) -> Self {
        info!(
            realtime_enabled = config.realtime_enabled,
            observer_buffer_size = config.observer_buffer_size,
            "realtime engine started"
        );
        Self {
            shared: Arc::new(Shared::new(store, config)),
        }
    }

    /// Create an engine with the default configuration.
    pub fn with_store(store: S) -> Self {
        Self::new(store, RealtimeConfig::default())
    }

    pub fn config(&self) -> &RealtimeConfig {
        &self.shared.config
    }

    // --- Subscriptions ---

    /// Subscribe `context` to a root record or collection.
    ///
    /// An existing subscription for the same identity under `context` is
    /// torn down first. Related records are subscribed under the same
    /// context as their relationships resolve.
    pub fn subscribe_root(&self, context: &ContextId, target: SubscriptionTarget) -> Result<()> {
        if !self.shared.config.realtime_enabled {
            debug!(%context, identity = %target.identity(), "realtime disabled, not subscribing");
            return Ok(());
        }

        let generation = self
            .shared
            .registry
            .open(context)
            .ok_or(SyncError::ShutDown)?;
        let scope = ListenerScope::new(context.clone(), generation);

        listeners::subscribe(&self.shared, &scope, target.identity(), &target)?;
        self.shared.pump_cascades();
        Ok(())
    }

    /// Tear down one subscription of `context`, or all of them when
    /// `identity` is `None`. Absent identities are ignored.
    pub fn unsubscribe(&self, context: &ContextId, identity: Option<&EntityIdentity>) {
        if !self.shared.config.realtime_enabled {
            return;
        }

        match identity {
            Some(identity) => {
                self.shared.registry.unregister(context, identity);
            }
            None => {
                let closed = self.shared.registry.unregister_all(context);
                self.shared.release(closed);
            }
        }
    }

    /// Own `context` for as long as the returned scope lives.
    pub fn scope(&self, context: impl Into<ContextId>) -> ContextScope<S> {
        ContextScope {
            realtime: self.clone(),
            context: context.into(),
        }
    }

    pub fn is_subscribed(&self, context: &ContextId, identity: &EntityIdentity) -> bool {
        self.shared.registry.is_registered(context, identity)
    }

    pub fn subscription_count(&self, context: &ContextId) -> usize {
        self.shared.registry.subscription_count(context)
    }

    /// Identities subscribed under `context`, sorted.
    pub fn identities(&self, context: &ContextId) -> Vec<EntityIdentity> {
        self.shared.registry.identities(context)
    }

    // --- Local state ---

    /// Snapshot of the ordered sequence owned by `identity`.
    pub fn sequence(&self, identity: &EntityIdentity) -> Option<Vec<RecordKey>> {
        self.shared
            .boundary
            .read(|state| state.sequence(identity).map(|s| s.to_vec()))
    }

    /// Read a consistent view of the store and sequences.
    pub fn read<R>(&self, f: impl FnOnce(&SyncState<S>) -> R) -> R {
        self.shared.boundary.read(f)
    }

    /// Mutate the store from outside a listener, for example to record a
    /// relationship resolved by the loader. Runs inside the apply boundary,
    /// so relationships resolved here cascade.
    pub fn with_store_mut<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        self.shared.apply(|batch| f(batch.store_mut()))
    }

    // --- Observers ---

    /// Observe applied batches with the configured buffer size.
    pub fn observe(&self) -> ObserverHandle {
        self.shared
            .boundary
            .observe(self.shared.config.observer_buffer_size)
    }

    pub fn observe_with_buffer(&self, buffer_size: usize) -> ObserverHandle {
        self.shared.boundary.observe(buffer_size)
    }

    pub fn unobserve(&self, id: ObserverId) {
        self.shared.boundary.observers().unobserve(id);
    }

    // --- Lifecycle ---

    /// Tear down every subscription and refuse new ones. Returns how many
    /// subscriptions were torn down.
    pub fn shutdown(&self) -> usize {
        let closed = self.shared.registry.clear();
        let count = self.shared.release(closed);
        self.shared.boundary.close_observers();
        while self.shared.cascade_rx.try_recv().is_ok() {}
        info!(count, "realtime engine shut down");
        count
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.registry.is_closed()
    }
}

/// An owning context held for a lifetime.
///
/// Dropping the scope tears down every subscription made under it.
pub struct ContextScope<S: LocalStore> {
    realtime: Realtime<S>,
    context: ContextId,
}

impl<S: LocalStore> ContextScope<S> {
    pub fn context(&self) -> &ContextId {
        &self.context
    }

    pub fn subscribe(&self, target: SubscriptionTarget) -> Result<()> {
        self.realtime.subscribe_root(&self.context, target)
    }

    pub fn unsubscribe(&self, identity: &EntityIdentity) {
        self.realtime.unsubscribe(&self.context, Some(identity));
    }

    pub fn subscription_count(&self) -> usize {
        self.realtime.subscription_count(&self.context)
    }
}

impl<S: LocalStore> Drop for ContextScope<S> {
    fn drop(&mut self) {
        self.realtime.unsubscribe(&self.context, None);
    }
}
