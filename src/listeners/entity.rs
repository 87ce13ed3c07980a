//! Single-entity listener.
//!
//! Watches one remote record. An existing value is normalized and upserted;
//! the not-found signal removes the local record. A normalization failure is
//! reported for that update only: the watch stays attached and the next
//! notification tries again.

use super::{cascade, ListenerScope};
use crate::boundary::Batch;
use crate::error::{Result, SyncError};
use crate::local::LocalStore;
use crate::realtime::Shared;
use crate::remote::{
    Capability, Normalizer, RemoteSnapshot, RemoteSource, SubscriptionTarget, Teardown,
};
use crate::types::{EntityIdentity, RecordKey};
use std::sync::Arc;
use tracing::trace;

/// What one entity notification did to the local store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntityOutcome {
    Upserted(RecordKey),
    Removed(RecordKey),
    /// The record was already absent locally.
    Absent(RecordKey),
}

/// Apply one entity notification inside a batch.
pub fn apply_entity_snapshot<S: LocalStore>(
    batch: &mut Batch<'_, S>,
    model: &str,
    normalizer: &dyn Normalizer,
    snapshot: &RemoteSnapshot,
) -> Result<EntityOutcome> {
    if snapshot.exists() {
        let record = normalizer.normalize(model, snapshot)?;
        Ok(EntityOutcome::Upserted(batch.upsert(record)))
    } else {
        let key = RecordKey::new(model, snapshot.key.clone());
        if batch.remove_record(&key) {
            Ok(EntityOutcome::Removed(key))
        } else {
            Ok(EntityOutcome::Absent(key))
        }
    }
}

/// Attach a watch to the target's remote reference.
pub(crate) fn attach<S: LocalStore>(
    shared: &Arc<Shared<S>>,
    scope: &ListenerScope,
    identity: &EntityIdentity,
    target: &SubscriptionTarget,
) -> Result<Teardown> {
    let RemoteSource::Single(reference) = &target.source else {
        return Err(SyncError::CapabilityMismatch {
            expected: Capability::Single,
            got: target.capability(),
        });
    };

    if let Some(key) = target.record_key() {
        shared.apply(|batch| cascade::observe(batch, shared, scope, &key));
    }

    let weak = Arc::downgrade(shared);
    let scope = scope.clone();
    let identity = identity.clone();
    let model = target.model.clone();
    let normalizer = Arc::clone(&target.normalizer);

    Ok(reference.subscribe(Box::new(move |snapshot: RemoteSnapshot| {
        let Some(shared) = weak.upgrade() else {
            return;
        };

        let outcome: Result<EntityOutcome> = shared.apply(|batch| {
            let outcome = apply_entity_snapshot(batch, &model, normalizer.as_ref(), &snapshot)?;
            if let EntityOutcome::Upserted(key) = &outcome {
                cascade::observe(batch, &shared, &scope, key);
            }
            Ok(outcome)
        });

        match outcome {
            Ok(outcome) => trace!(
                context = %scope.context,
                %identity,
                ?outcome,
                "entity notification applied"
            ),
            Err(err) => shared.boundary.report_failure(&scope.context, &identity, &err),
        }
    })))
}
