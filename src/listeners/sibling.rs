//! Sibling-linked collection listener.
//!
//! The remote reports four independent streams. Added and moved events name
//! the preceding sibling instead of an index, so absolute positions are
//! rebuilt incrementally from the local sequence. Nothing orders one stream
//! against another; duplicate adds, adds that are really moves, and removes
//! of records never seen are absorbed by identity checks.

use super::{cascade, ListenerScope};
use crate::boundary::SequenceEdit;
use crate::error::{Result, SyncError};
use crate::local::LocalStore;
use crate::realtime::Shared;
use crate::remote::{
    Capability, ChildEvent, ChildEventKind, Normalizer, RemoteSource, SubscriptionTarget, Teardown,
};
use crate::types::{EntityIdentity, RecordKey};
use std::sync::Arc;
use tracing::{debug, trace};

/// Position just after `prior_key`, or 0 when there is none.
///
/// A prior sibling not present locally also yields 0.
fn insert_position<S: LocalStore>(
    edit: &SequenceEdit<'_, S>,
    model: &str,
    prior_key: Option<&str>,
) -> usize {
    prior_key
        .and_then(|prior| edit.position(&RecordKey::new(model, prior)))
        .map_or(0, |index| index + 1)
}

/// Apply one child event. Returns the key written to the store, if any.
pub fn apply_child_event<S: LocalStore>(
    edit: &mut SequenceEdit<'_, S>,
    model: &str,
    normalizer: &dyn Normalizer,
    kind: ChildEventKind,
    event: ChildEvent,
) -> Result<Option<RecordKey>> {
    match kind {
        ChildEventKind::Added => {
            let record = normalizer.normalize(model, &event.snapshot)?;
            let key = record.key.clone();
            if let Some(index) = edit.remove(&key) {
                trace!(%key, index, "re-adding record already in sequence");
            }

            let index = insert_position(edit, model, event.prior_key.as_deref());
            edit.upsert(record);
            if edit.get(index) != Some(&key) {
                edit.insert(index, key.clone());
            }
            Ok(Some(key))
        }

        ChildEventKind::Removed => {
            let key = RecordKey::new(model, event.snapshot.key);
            if edit.remove(&key).is_none() {
                trace!(%key, "remove for record not in sequence");
            }
            Ok(None)
        }

        ChildEventKind::Changed => {
            let record = normalizer.normalize(model, &event.snapshot)?;
            Ok(Some(edit.upsert(record)))
        }

        ChildEventKind::Moved => {
            let record = normalizer.normalize(model, &event.snapshot)?;
            let key = record.key.clone();
            if edit.remove(&key).is_none() {
                debug!(%key, "move for record not in sequence, placing it");
            }

            let index = insert_position(edit, model, event.prior_key.as_deref());
            edit.upsert(record);
            edit.insert(index, key.clone());
            Ok(Some(key))
        }
    }
}

/// Attach the four child watches of the target's sibling-linked collection.
pub(crate) fn attach<S: LocalStore>(
    shared: &Arc<Shared<S>>,
    scope: &ListenerScope,
    identity: &EntityIdentity,
    target: &SubscriptionTarget,
) -> Result<Teardown> {
    let RemoteSource::SiblingLinked(collection) = &target.source else {
        return Err(SyncError::CapabilityMismatch {
            expected: Capability::SiblingLinked,
            got: target.capability(),
        });
    };

    shared.apply(|batch| super::seed_collection(batch, shared, scope, identity, target));

    let teardowns = ChildEventKind::ALL
        .iter()
        .map(|&kind| {
            let weak = Arc::downgrade(shared);
            let scope = scope.clone();
            let identity = identity.clone();
            let model = target.model.clone();
            let normalizer = Arc::clone(&target.normalizer);

            collection.on(
                kind,
                Box::new(move |event: ChildEvent| {
                    let Some(shared) = weak.upgrade() else {
                        return;
                    };

                    let result = shared.apply(|batch| {
                        let result = apply_child_event(
                            &mut batch.edit(&identity),
                            &model,
                            normalizer.as_ref(),
                            kind,
                            event,
                        );
                        if let Ok(Some(key)) = &result {
                            cascade::observe(batch, &shared, &scope, key);
                        }
                        result
                    });

                    if let Err(err) = result {
                        shared.boundary.report_failure(&scope.context, &identity, &err);
                    }
                }),
            )
        })
        .collect();

    Ok(Teardown::combine(teardowns))
}
