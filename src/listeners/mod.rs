//! Listener components.
//!
//! Each listener attaches one remote watch (four for sibling-linked
//! collections) and turns its notifications into local mutations applied
//! through the apply boundary. The listener is picked once per subscription
//! from the target's declared [`Capability`]; notifications are never
//! inspected to guess their shape.

pub mod cascade;
pub mod diff;
pub mod entity;
pub mod sibling;

use crate::boundary::Batch;
use crate::error::Result;
use crate::local::LocalStore;
use crate::realtime::Shared;
use crate::remote::{Capability, SubscriptionTarget, Teardown};
use crate::types::{ContextId, EntityIdentity, Generation};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// The context generation a listener works on behalf of.
///
/// Each attached listener holds its own copy whose `attached` flag is
/// cleared when that listener is torn down, so notifications still in
/// flight after teardown never cascade.
#[derive(Clone, Debug)]
pub struct ListenerScope {
    pub context: ContextId,
    pub generation: Generation,
    attached: Arc<AtomicBool>,
}

impl ListenerScope {
    pub fn new(context: ContextId, generation: Generation) -> Self {
        Self {
            context,
            generation,
            attached: Arc::new(AtomicBool::new(true)),
        }
    }

    /// A fresh scope for one listener of the same context generation.
    pub fn for_listener(&self) -> Self {
        Self::new(self.context.clone(), self.generation)
    }

    /// False once the listener owning this scope was torn down.
    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }

    pub(crate) fn detach(&self) {
        self.attached.store(false, Ordering::Release);
    }
}

/// Tear down any subscription already held for `identity`, attach the
/// listener matching the target's capability and register its teardown.
///
/// Returns false if the scope's generation ended while attaching, in which
/// case the new watch has already been detached again.
pub(crate) fn subscribe<S: LocalStore>(
    shared: &Arc<Shared<S>>,
    scope: &ListenerScope,
    identity: EntityIdentity,
    target: &SubscriptionTarget,
) -> Result<bool> {
    shared.registry.unregister(&scope.context, &identity);

    let scope = scope.for_listener();
    debug!(
        context = %scope.context,
        %identity,
        capability = ?target.capability(),
        "attaching listener"
    );
    let watch = match target.capability() {
        Capability::Single => entity::attach(shared, &scope, &identity, target)?,
        Capability::DiffSnapshot => diff::attach(shared, &scope, &identity, target)?,
        Capability::SiblingLinked => sibling::attach(shared, &scope, &identity, target)?,
    };
    let listener = scope.clone();
    let teardown = Teardown::new(move || {
        listener.detach();
        watch.run();
    });

    Ok(shared
        .registry
        .register_in(&scope.context, scope.generation, identity, teardown))
}

/// Seed the sequence for a collection subscription and observe its members.
pub(crate) fn seed_collection<S: LocalStore>(
    batch: &mut Batch<'_, S>,
    shared: &Shared<S>,
    scope: &ListenerScope,
    identity: &EntityIdentity,
    target: &SubscriptionTarget,
) {
    match &target.loaded {
        Some(keys) => batch.seed(identity, keys.clone()),
        None => batch.ensure_sequence(identity),
    }

    let members = batch
        .sequence(identity)
        .map(|sequence| sequence.to_vec())
        .unwrap_or_default();
    for key in &members {
        cascade::observe(batch, shared, scope, key);
    }
}
