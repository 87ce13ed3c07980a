//! Subscription registry implementation.

use crate::local::HookId;
use crate::remote::Teardown;
use crate::types::{ContextId, EntityIdentity, Generation, RecordKey};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, trace};

/// Live subscriptions of one context generation.
struct ContextEntry {
    generation: Generation,
    teardowns: HashMap<EntityIdentity, Teardown>,
    /// Records whose relationship resolutions this generation already observes.
    observed: HashSet<RecordKey>,
    /// Relationship hooks installed in the local store for this generation.
    hooks: Vec<(RecordKey, HookId)>,
}

impl ContextEntry {
    fn new(generation: Generation) -> Self {
        Self {
            generation,
            teardowns: HashMap::new(),
            observed: HashSet::new(),
            hooks: Vec::new(),
        }
    }

    /// Run every teardown and hand back the hooks to remove from the store.
    fn close(self, closed: &mut ClosedContext) {
        closed.subscriptions += self.teardowns.len();
        for (_, teardown) in self.teardowns {
            teardown.run();
        }
        closed.hooks.extend(self.hooks);
    }
}

/// What tearing down one or more contexts released.
#[derive(Debug, Default)]
pub struct ClosedContext {
    /// Subscriptions whose teardown was run.
    pub subscriptions: usize,
    /// Relationship hooks the caller must remove from the local store.
    pub hooks: Vec<(RecordKey, HookId)>,
}

/// Owns the teardown callbacks of every live subscription, grouped by
/// owning context.
///
/// The registry holds no remote resources itself. Teardowns are always run
/// after the internal lock is released, so a teardown may safely call back
/// into the registry.
pub struct SubscriptionRegistry {
    contexts: Mutex<HashMap<ContextId, ContextEntry>>,
    /// Counter for generating context generations.
    next_generation: AtomicU64,
    closed: AtomicBool,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            contexts: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Open `context` if needed and return its live generation.
    ///
    /// Returns `None` once the registry has been cleared for shutdown.
    pub fn open(&self, context: &ContextId) -> Option<Generation> {
        if self.is_closed() {
            return None;
        }
        let mut contexts = self.contexts.lock();
        let entry = contexts.entry(context.clone()).or_insert_with(|| {
            let generation = Generation(self.next_generation.fetch_add(1, Ordering::SeqCst));
            debug!(%context, ?generation, "context opened");
            ContextEntry::new(generation)
        });
        Some(entry.generation)
    }

    /// The live generation of `context`, if it is open.
    pub fn generation(&self, context: &ContextId) -> Option<Generation> {
        self.contexts.lock().get(context).map(|e| e.generation)
    }

    /// Check whether `generation` is still the live generation of `context`.
    pub fn is_live(&self, context: &ContextId, generation: Generation) -> bool {
        self.generation(context) == Some(generation)
    }

    /// Store `teardown` for `identity`, replacing (and running) any previous one.
    ///
    /// Opens the context if it is not open yet. After shutdown the teardown
    /// is run immediately instead.
    pub fn register(&self, context: &ContextId, identity: EntityIdentity, teardown: Teardown) {
        match self.open(context) {
            Some(generation) => {
                self.register_in(context, generation, identity, teardown);
            }
            None => teardown.run(),
        }
    }

    /// Store `teardown` for `identity` if `generation` is still live.
    ///
    /// The previous teardown for the identity, if any, is run first. When the
    /// generation is gone the new teardown is run instead and false is
    /// returned, so a late registration never outlives its context.
    pub fn register_in(
        &self,
        context: &ContextId,
        generation: Generation,
        identity: EntityIdentity,
        teardown: Teardown,
    ) -> bool {
        let previous = self
            .contexts
            .lock()
            .get_mut(context)
            .filter(|entry| entry.generation == generation)
            .map(|entry| entry.teardowns.remove(&identity));

        let Some(previous) = previous else {
            debug!(
                %context,
                %identity,
                ?generation,
                "generation gone, detaching late subscription"
            );
            teardown.run();
            return false;
        };

        if let Some(previous) = previous {
            trace!(%context, %identity, "replacing subscription");
            previous.run();
        }

        let displaced = {
            let mut contexts = self.contexts.lock();
            match contexts.get_mut(context) {
                Some(entry) if entry.generation == generation => {
                    Ok(entry.teardowns.insert(identity, teardown))
                }
                _ => Err(teardown),
            }
        };

        match displaced {
            Ok(Some(raced)) => {
                raced.run();
                true
            }
            Ok(None) => true,
            Err(teardown) => {
                teardown.run();
                false
            }
        }
    }

    /// Run and remove the teardown for `identity`. No-op if absent.
    pub fn unregister(&self, context: &ContextId, identity: &EntityIdentity) -> bool {
        let removed = self
            .contexts
            .lock()
            .get_mut(context)
            .and_then(|entry| entry.teardowns.remove(identity));

        match removed {
            Some(teardown) => {
                trace!(%context, %identity, "unsubscribed");
                teardown.run();
                true
            }
            None => false,
        }
    }

    /// Run every teardown under `context` and close it.
    pub fn unregister_all(&self, context: &ContextId) -> ClosedContext {
        let removed = self.contexts.lock().remove(context);

        let mut closed = ClosedContext::default();
        if let Some(entry) = removed {
            let generation = entry.generation;
            entry.close(&mut closed);
            debug!(
                %context,
                ?generation,
                count = closed.subscriptions,
                hooks = closed.hooks.len(),
                "context torn down"
            );
        }
        closed
    }

    /// Mark `key` as observed by this generation. Returns false if it already
    /// was, or if the generation is no longer live.
    pub fn mark_observed(
        &self,
        context: &ContextId,
        generation: Generation,
        key: &RecordKey,
    ) -> bool {
        let mut contexts = self.contexts.lock();
        match contexts.get_mut(context) {
            Some(entry) if entry.generation == generation => entry.observed.insert(key.clone()),
            _ => false,
        }
    }

    /// Remember a hook installed for this generation so that closing the
    /// context can remove it. Returns false if the generation is gone, in
    /// which case the caller removes the hook itself.
    pub fn record_hook(
        &self,
        context: &ContextId,
        generation: Generation,
        key: &RecordKey,
        hook: HookId,
    ) -> bool {
        let mut contexts = self.contexts.lock();
        match contexts.get_mut(context) {
            Some(entry) if entry.generation == generation => {
                entry.hooks.push((key.clone(), hook));
                true
            }
            _ => false,
        }
    }

    /// Tear down every context and refuse new ones.
    pub fn clear(&self) -> ClosedContext {
        self.closed.store(true, Ordering::SeqCst);
        let drained: Vec<_> = self.contexts.lock().drain().collect();
        let mut closed = ClosedContext::default();
        for (_, entry) in drained {
            entry.close(&mut closed);
        }
        debug!(count = closed.subscriptions, "registry cleared");
        closed
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn is_registered(&self, context: &ContextId, identity: &EntityIdentity) -> bool {
        self.contexts
            .lock()
            .get(context)
            .is_some_and(|entry| entry.teardowns.contains_key(identity))
    }

    /// Number of live subscriptions under `context`.
    pub fn subscription_count(&self, context: &ContextId) -> usize {
        self.contexts
            .lock()
            .get(context)
            .map_or(0, |entry| entry.teardowns.len())
    }

    /// Number of open contexts.
    pub fn context_count(&self) -> usize {
        self.contexts.lock().len()
    }

    /// Identities registered under `context`, sorted.
    pub fn identities(&self, context: &ContextId) -> Vec<EntityIdentity> {
        let mut identities: Vec<_> = self
            .contexts
            .lock()
            .get(context)
            .map(|entry| entry.teardowns.keys().cloned().collect())
            .unwrap_or_default();
        identities.sort();
        identities
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn counting(counter: &Arc<AtomicUsize>) -> Teardown {
        let counter = Arc::clone(counter);
        Teardown::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn identity(id: &str) -> EntityIdentity {
        EntityIdentity::record(&RecordKey::new("post", id))
    }

    #[test]
    fn test_register_replaces_exactly_once() {
        let registry = SubscriptionRegistry::new();
        let ctx = ContextId::from("route:posts");
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        registry.register(&ctx, identity("1"), counting(&first));
        registry.register(&ctx, identity("1"), counting(&second));

        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 0);
        assert_eq!(registry.subscription_count(&ctx), 1);
    }

    #[test]
    fn test_unregister_absent_is_noop() {
        let registry = SubscriptionRegistry::new();
        let ctx = ContextId::from("route:posts");

        assert!(!registry.unregister(&ctx, &identity("1")));
        assert_eq!(registry.unregister_all(&ctx).subscriptions, 0);

        let calls = Arc::new(AtomicUsize::new(0));
        registry.register(&ctx, identity("1"), counting(&calls));
        assert!(registry.unregister(&ctx, &identity("1")));
        assert!(!registry.unregister(&ctx, &identity("1")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unregister_all_only_touches_context() {
        let registry = SubscriptionRegistry::new();
        let a = ContextId::from("a");
        let b = ContextId::from("b");
        let calls = Arc::new(AtomicUsize::new(0));

        registry.register(&a, identity("1"), counting(&calls));
        registry.register(&a, identity("2"), counting(&calls));
        registry.register(&b, identity("1"), counting(&calls));

        assert_eq!(registry.unregister_all(&a).subscriptions, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(registry.subscription_count(&a), 0);
        assert!(registry.is_registered(&b, &identity("1")));
    }

    #[test]
    fn test_stale_generation_is_rejected() {
        let registry = SubscriptionRegistry::new();
        let ctx = ContextId::from("route:post");
        let old = registry.open(&ctx).unwrap();
        registry.unregister_all(&ctx);
        let new = registry.open(&ctx).unwrap();
        assert_ne!(old, new);

        let calls = Arc::new(AtomicUsize::new(0));
        assert!(!registry.register_in(&ctx, old, identity("1"), counting(&calls)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.subscription_count(&ctx), 0);
        assert!(!registry.mark_observed(&ctx, old, &RecordKey::new("post", "1")));
    }

    #[test]
    fn test_teardown_may_reenter_registry() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let ctx = ContextId::from("ctx");

        let inner = Arc::clone(&registry);
        let inner_ctx = ctx.clone();
        registry.register(
            &ctx,
            identity("1"),
            Teardown::new(move || {
                inner.unregister(&inner_ctx, &identity("2"));
            }),
        );
        registry.register(&ctx, identity("2"), Teardown::noop());

        registry.unregister(&ctx, &identity("1"));
        assert_eq!(registry.subscription_count(&ctx), 0);
    }

    #[test]
    fn test_clear_closes_registry() {
        let registry = SubscriptionRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        registry.register(&ContextId::from("a"), identity("1"), counting(&calls));

        assert_eq!(registry.clear().subscriptions, 1);
        assert!(registry.open(&ContextId::from("a")).is_none());

        registry.register(&ContextId::from("a"), identity("2"), counting(&calls));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(registry.context_count(), 0);
    }

    #[test]
    fn test_mark_observed_once() {
        let registry = SubscriptionRegistry::new();
        let ctx = ContextId::from("ctx");
        let generation = registry.open(&ctx).unwrap();
        let key = RecordKey::new("post", "1");

        assert!(registry.mark_observed(&ctx, generation, &key));
        assert!(!registry.mark_observed(&ctx, generation, &key));
    }

    #[test]
    fn test_hooks_released_with_context() {
        let registry = SubscriptionRegistry::new();
        let ctx = ContextId::from("ctx");
        let key = RecordKey::new("post", "1");

        let old = registry.open(&ctx).unwrap();
        assert!(registry.record_hook(&ctx, old, &key, HookId(1)));

        let closed = registry.unregister_all(&ctx);
        assert_eq!(closed.hooks, vec![(key.clone(), HookId(1))]);
        assert!(registry.unregister_all(&ctx).hooks.is_empty());

        // A hook installed for a generation that already ended is refused
        assert!(!registry.record_hook(&ctx, old, &key, HookId(2)));
    }
}
