//! Diff-snapshot collection listener.
//!
//! Each notification is a batch of tagged changes with explicit positions.
//! Changes are applied in delivery order, and every positional change first
//! checks that the element at the claimed position is the record it names.
//! A mismatch means the change was already applied (a batch redelivered
//! after reconnect) or is stale, and the positional part is skipped. Replaying
//! a batch therefore leaves the sequence unchanged.

use super::{cascade, ListenerScope};
use crate::boundary::SequenceEdit;
use crate::error::{Result, SyncError};
use crate::local::LocalStore;
use crate::realtime::Shared;
use crate::remote::{
    Capability, DocChange, Normalizer, RemoteSource, SubscriptionTarget, Teardown,
};
use crate::types::{EntityIdentity, RecordKey};
use std::sync::Arc;
use tracing::trace;

/// What one batch did.
#[derive(Debug, Default)]
pub struct DiffOutcome {
    /// Records written to the store, in order.
    pub upserted: Vec<RecordKey>,
    /// Positional changes skipped as stale or already applied.
    pub skipped: usize,
    /// Changes dropped because their payload failed to normalize.
    pub failures: Vec<SyncError>,
}

/// Apply one batch of changes to a sequence.
pub fn apply_doc_changes<S: LocalStore>(
    edit: &mut SequenceEdit<'_, S>,
    model: &str,
    normalizer: &dyn Normalizer,
    changes: Vec<DocChange>,
) -> DiffOutcome {
    let mut outcome = DiffOutcome::default();

    for change in changes {
        match change {
            DocChange::Added {
                new_index,
                snapshot,
            } => {
                let record = match normalizer.normalize(model, &snapshot) {
                    Ok(record) => record,
                    Err(err) => {
                        outcome.failures.push(err);
                        continue;
                    }
                };
                let key = edit.upsert(record);
                outcome.upserted.push(key.clone());

                if edit.get(new_index) == Some(&key) {
                    trace!(%key, index = new_index, "add already applied");
                    outcome.skipped += 1;
                } else if let Some(existing) = edit.position(&key) {
                    trace!(%key, index = new_index, existing, "add for record held elsewhere");
                    outcome.skipped += 1;
                } else {
                    edit.insert(new_index, key);
                }
            }

            DocChange::Modified {
                old_index,
                new_index,
                snapshot,
            } => {
                let record = match normalizer.normalize(model, &snapshot) {
                    Ok(record) => record,
                    Err(err) => {
                        outcome.failures.push(err);
                        continue;
                    }
                };
                let key = record.key.clone();

                if edit.get(old_index) == Some(&key) {
                    if new_index != old_index {
                        edit.move_item(old_index, new_index);
                    }
                } else {
                    trace!(%key, index = old_index, "stale modify position");
                    outcome.skipped += 1;
                }

                edit.upsert(record);
                outcome.upserted.push(key);
            }

            DocChange::Removed {
                old_index,
                snapshot,
            } => {
                let key = RecordKey::new(model, snapshot.key);
                if edit.get(old_index) == Some(&key) {
                    edit.remove_at(old_index);
                } else {
                    trace!(%key, index = old_index, "stale remove position");
                    outcome.skipped += 1;
                }
            }
        }
    }

    outcome
}

/// Attach a watch to the target's diff-snapshot collection.
pub(crate) fn attach<S: LocalStore>(
    shared: &Arc<Shared<S>>,
    scope: &ListenerScope,
    identity: &EntityIdentity,
    target: &SubscriptionTarget,
) -> Result<Teardown> {
    let RemoteSource::DiffSnapshot(collection) = &target.source else {
        return Err(SyncError::CapabilityMismatch {
            expected: Capability::DiffSnapshot,
            got: target.capability(),
        });
    };

    shared.apply(|batch| super::seed_collection(batch, shared, scope, identity, target));

    let weak = Arc::downgrade(shared);
    let scope = scope.clone();
    let identity = identity.clone();
    let model = target.model.clone();
    let normalizer = Arc::clone(&target.normalizer);

    Ok(collection.subscribe(Box::new(move |changes: Vec<DocChange>| {
        let Some(shared) = weak.upgrade() else {
            return;
        };

        let outcome = shared.apply(|batch| {
            let outcome = apply_doc_changes(
                &mut batch.edit(&identity),
                &model,
                normalizer.as_ref(),
                changes,
            );
            for key in &outcome.upserted {
                cascade::observe(batch, &shared, &scope, key);
            }
            outcome
        });

        trace!(
            context = %scope.context,
            %identity,
            upserted = outcome.upserted.len(),
            skipped = outcome.skipped,
            "diff batch applied"
        );
        for err in &outcome.failures {
            shared.boundary.report_failure(&scope.context, &identity, err);
        }
    })))
}
