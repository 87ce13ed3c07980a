//! Relationship cascade subscriber.
//!
//! Every record a listener writes is observed for relationship resolution,
//! once per context generation. Relationships already resolved, and every
//! later first resolution reported by the store's hook, become cascade
//! requests. Requests are queued rather than handled inline because hooks
//! fire while the state lock is held; the engine drains the queue after each
//! applied batch.
//!
//! A cascade subscription is keyed by `(containing record, relationship)`,
//! so a cycle in the relationship graph yields one subscription per resolved
//! edge instead of unbounded recursion.
//!
//! Hooks are recorded against the context generation and removed from the
//! store when that generation closes. A listener already torn down observes
//! nothing new, and its queued requests are dropped.

use super::ListenerScope;
use crate::boundary::Batch;
use crate::local::{LocalStore, RelationshipHook, ResolvedRelationship};
use crate::realtime::Shared;
use crate::types::{EntityIdentity, RecordKey};
use std::sync::Arc;
use tracing::{debug, trace};

/// A relationship of an observed record that resolved.
#[derive(Clone, Debug)]
pub struct CascadeRequest {
    pub scope: ListenerScope,
    pub owner: RecordKey,
    pub relationship: ResolvedRelationship,
}

/// Observe `key` for relationship resolution on behalf of `scope`.
///
/// No-op if this generation already observes the record, if the
/// generation is gone or if the listener was torn down.
pub(crate) fn observe<S: LocalStore>(
    batch: &mut Batch<'_, S>,
    shared: &Shared<S>,
    scope: &ListenerScope,
    key: &RecordKey,
) {
    if !scope.is_attached() {
        trace!(context = %scope.context, %key, "listener detached, not observing");
        return;
    }
    if !shared
        .registry
        .mark_observed(&scope.context, scope.generation, key)
    {
        return;
    }

    // The hook outlives this listener, so it cascades for the generation
    let sender = shared.cascade_sender();
    let hook_scope = scope.for_listener();
    let hook: RelationshipHook =
        Arc::new(move |owner: &RecordKey, relationship: &ResolvedRelationship| {
            let _ = sender.send(CascadeRequest {
                scope: hook_scope.clone(),
                owner: owner.clone(),
                relationship: relationship.clone(),
            });
        });
    let hook_id = batch.store_mut().observe_relationships(key, hook);
    if !shared
        .registry
        .record_hook(&scope.context, scope.generation, key, hook_id)
    {
        batch.store_mut().unobserve_relationships(key, hook_id);
        return;
    }

    let resolved = batch.store().resolved_relationships_of(key);
    trace!(
        context = %scope.context,
        %key,
        resolved = resolved.len(),
        "observing relationships"
    );
    let sender = shared.cascade_sender();
    for relationship in resolved {
        let _ = sender.send(CascadeRequest {
            scope: scope.clone(),
            owner: key.clone(),
            relationship,
        });
    }
}

/// Open the child subscription for one cascade request.
///
/// Returns true if a subscription was installed.
pub(crate) fn open<S: LocalStore>(shared: &Arc<Shared<S>>, request: CascadeRequest) -> bool {
    let CascadeRequest {
        scope,
        owner,
        relationship,
    } = request;

    if !scope.is_attached() || !shared.registry.is_live(&scope.context, scope.generation) {
        trace!(
            context = %scope.context,
            %owner,
            relationship = %relationship.name,
            "listener or context gone, dropping cascade"
        );
        return false;
    }

    let Some(target) = relationship.target else {
        trace!(
            context = %scope.context,
            %owner,
            relationship = %relationship.name,
            "relationship has no target"
        );
        return false;
    };

    let identity = EntityIdentity::relationship(&owner, &relationship.name);
    debug!(
        context = %scope.context,
        %identity,
        kind = ?relationship.kind,
        "cascading subscription"
    );

    match super::subscribe(shared, &scope, identity.clone(), &target) {
        Ok(installed) => installed,
        Err(err) => {
            shared.boundary.report_failure(&scope.context, &identity, &err);
            false
        }
    }
}
