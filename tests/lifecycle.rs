//! Subscription lifecycle tests: replacement, context teardown, shutdown.

mod common;

use common::*;
use livewire_sync::{
    ContextId, DropReason, EntityIdentity, LocalStore, MemoryStore, Realtime, RealtimeConfig, RecordKey,
    RelationshipKind, RemoteSnapshot, ResolvedRelationship, SubscriptionTarget, SyncError,
    SyncEvent,
};
use serde_json::json;

fn post_target(reference: &std::sync::Arc<FakeReference>) -> SubscriptionTarget {
    SubscriptionTarget::record("post", "1", reference.clone(), json_normalizer())
}

#[test]
fn test_resubscribe_tears_down_exactly_one() {
    let realtime = Realtime::with_store(MemoryStore::new());
    let ctx = ContextId::from("route:post");
    let reference = FakeReference::new();

    realtime.subscribe_root(&ctx, post_target(&reference)).unwrap();
    realtime.subscribe_root(&ctx, post_target(&reference)).unwrap();
    realtime.subscribe_root(&ctx, post_target(&reference)).unwrap();

    assert_eq!(realtime.subscription_count(&ctx), 1);
    assert_eq!(reference.watches.active_count(), 1);
    assert_eq!(reference.watches.detached_count(), 2);
}

#[test]
fn test_context_teardown_detaches_everything() {
    let realtime = Realtime::with_store(MemoryStore::new());
    let ctx = ContextId::from("route:dashboard");
    let reference = FakeReference::new();
    let diff = FakeDiffCollection::new();
    let sibling = FakeSiblingCollection::new();

    realtime.subscribe_root(&ctx, post_target(&reference)).unwrap();
    realtime
        .subscribe_root(
            &ctx,
            SubscriptionTarget::diff_collection("todo", diff.clone(), json_normalizer()),
        )
        .unwrap();
    realtime
        .subscribe_root(
            &ctx,
            SubscriptionTarget::sibling_collection("item", sibling.clone(), json_normalizer()),
        )
        .unwrap();
    assert_eq!(realtime.subscription_count(&ctx), 3);
    assert_eq!(
        realtime.identities(&ctx),
        vec![
            EntityIdentity::collection("item", None),
            EntityIdentity::record(&RecordKey::new("post", "1")),
            EntityIdentity::collection("todo", None),
        ]
    );

    realtime.unsubscribe(&ctx, None);

    assert_eq!(realtime.subscription_count(&ctx), 0);
    assert_eq!(reference.watches.active_count(), 0);
    assert_eq!(diff.watches.active_count(), 0);
    assert_eq!(sibling.active_count(), 0);

    // Tearing down an empty context is a no-op
    realtime.unsubscribe(&ctx, None);
}

#[test]
fn test_unsubscribe_single_identity() {
    let realtime = Realtime::with_store(MemoryStore::new());
    let ctx = ContextId::from("route:post");
    let reference = FakeReference::new();
    let diff = FakeDiffCollection::new();

    realtime.subscribe_root(&ctx, post_target(&reference)).unwrap();
    realtime
        .subscribe_root(
            &ctx,
            SubscriptionTarget::diff_collection("todo", diff.clone(), json_normalizer()),
        )
        .unwrap();

    realtime.unsubscribe(&ctx, Some(&EntityIdentity::record(&RecordKey::new("post", "1"))));
    assert_eq!(reference.watches.active_count(), 0);
    assert_eq!(diff.watches.active_count(), 1);

    // Absent identities are ignored
    realtime.unsubscribe(&ctx, Some(&EntityIdentity::collection("ghost", None)));
    realtime.unsubscribe(&ContextId::from("route:never"), None);
    assert_eq!(realtime.subscription_count(&ctx), 1);
}

#[test]
fn test_contexts_are_independent() {
    let realtime = Realtime::with_store(MemoryStore::new());
    let list = ContextId::from("route:list");
    let detail = ContextId::from("route:detail");
    let reference = FakeReference::new();

    realtime.subscribe_root(&list, post_target(&reference)).unwrap();
    realtime.subscribe_root(&detail, post_target(&reference)).unwrap();
    assert_eq!(reference.watches.active_count(), 2);

    realtime.unsubscribe(&list, None);
    assert_eq!(reference.watches.active_count(), 1);
    assert_eq!(realtime.subscription_count(&detail), 1);

    reference.emit(RemoteSnapshot::existing("1", json!({"title": "still live"})));
    assert!(realtime.read(|s| s.store.contains(&RecordKey::new("post", "1"))));
}

#[test]
fn test_no_cascade_after_context_teardown() {
    let realtime = Realtime::with_store(MemoryStore::new());
    let ctx = ContextId::from("route:post");
    let reference = FakeReference::new();
    let author = FakeReference::new();
    let post = RecordKey::new("post", "1");

    realtime.subscribe_root(&ctx, post_target(&reference)).unwrap();
    reference.emit(RemoteSnapshot::existing("1", json!({"title": "hi"})));
    realtime.unsubscribe(&ctx, None);

    // A notification already in flight lands after teardown
    reference.emit_late(RemoteSnapshot::existing("1", json!({"title": "late"})));

    // The hook registered while the context was live is gone with it
    assert_eq!(realtime.read(|s| s.store.hook_count(&post)), 0);
    realtime.with_store_mut(|store| {
        store.resolve_relationship(
            &post,
            ResolvedRelationship::new(
                "author",
                RelationshipKind::ToOne,
                Some(SubscriptionTarget::record("user", "u1", author.clone(), json_normalizer())),
            ),
        )
    });

    assert_eq!(realtime.subscription_count(&ctx), 0);
    assert_eq!(author.watches.active_count(), 0);
    assert_eq!(author.watches.detached_count(), 0);
}

#[test]
fn test_hooks_do_not_accumulate_across_context_generations() {
    let realtime = Realtime::with_store(MemoryStore::new());
    let ctx = ContextId::from("route:post");
    let reference = FakeReference::new();
    let post = RecordKey::new("post", "1");

    for round in 0..50 {
        realtime.subscribe_root(&ctx, post_target(&reference)).unwrap();
        reference.emit(RemoteSnapshot::existing("1", json!({ "round": round })));
        assert_eq!(realtime.read(|s| s.store.hook_count(&post)), 1);

        realtime.unsubscribe(&ctx, None);
        assert_eq!(realtime.read(|s| s.store.hook_count(&post)), 0);
    }

    assert_eq!(realtime.subscription_count(&ctx), 0);
    assert_eq!(reference.watches.detached_count(), 50);
}

#[test]
fn test_context_reopened_after_teardown() {
    let realtime = Realtime::with_store(MemoryStore::new());
    let ctx = ContextId::from("route:post");
    let reference = FakeReference::new();

    realtime.subscribe_root(&ctx, post_target(&reference)).unwrap();
    realtime.unsubscribe(&ctx, None);
    realtime.subscribe_root(&ctx, post_target(&reference)).unwrap();

    assert_eq!(realtime.subscription_count(&ctx), 1);
    assert_eq!(reference.watches.active_count(), 1);
    assert_eq!(reference.watches.detached_count(), 1);
}

#[test]
fn test_scope_drop_tears_down_context() {
    let realtime = Realtime::with_store(MemoryStore::new());
    let reference = FakeReference::new();
    let diff = FakeDiffCollection::new();

    {
        let scope = realtime.scope("route:post");
        scope.subscribe(post_target(&reference)).unwrap();
        scope
            .subscribe(SubscriptionTarget::diff_collection("todo", diff.clone(), json_normalizer()))
            .unwrap();
        assert_eq!(scope.subscription_count(), 2);

        scope.unsubscribe(&EntityIdentity::collection("todo", None));
        assert_eq!(scope.subscription_count(), 1);
    }

    assert_eq!(reference.watches.active_count(), 0);
    assert_eq!(diff.watches.active_count(), 0);
}

#[test]
fn test_server_render_attaches_nothing() {
    let realtime = Realtime::new(MemoryStore::new(), RealtimeConfig::server_render());
    let ctx = ContextId::from("route:post");
    let reference = FakeReference::new();

    realtime.subscribe_root(&ctx, post_target(&reference)).unwrap();
    realtime.unsubscribe(&ctx, None);

    assert!(!realtime.config().realtime_enabled);
    assert_eq!(realtime.subscription_count(&ctx), 0);
    assert_eq!(reference.watches.active_count(), 0);
}

#[test]
fn test_shutdown() {
    let realtime = Realtime::with_store(MemoryStore::new());
    let reference = FakeReference::new();
    let diff = FakeDiffCollection::new();
    let observer = realtime.observe();

    realtime
        .subscribe_root(&ContextId::from("route:a"), post_target(&reference))
        .unwrap();
    realtime
        .subscribe_root(
            &ContextId::from("route:b"),
            SubscriptionTarget::diff_collection("todo", diff.clone(), json_normalizer()),
        )
        .unwrap();

    reference.emit(RemoteSnapshot::existing("1", json!({"title": "hi"})));
    observer.drain();
    assert_eq!(realtime.shutdown(), 2);
    assert!(realtime.is_shut_down());
    assert_eq!(realtime.read(|s| s.store.hook_count(&RecordKey::new("post", "1"))), 0);
    assert_eq!(reference.watches.active_count(), 0);
    assert_eq!(diff.watches.active_count(), 0);
    assert_eq!(
        observer.drain(),
        vec![SyncEvent::Dropped {
            reason: DropReason::ShutDown,
        }]
    );

    let result = realtime.subscribe_root(&ContextId::from("route:a"), post_target(&reference));
    assert!(matches!(result, Err(SyncError::ShutDown)));
    assert_eq!(reference.watches.active_count(), 0);
}

#[test]
fn test_notifications_after_engine_dropped_are_ignored() {
    let reference = FakeReference::new();
    {
        let realtime = Realtime::with_store(MemoryStore::new());
        realtime
            .subscribe_root(&ContextId::from("route:post"), post_target(&reference))
            .unwrap();
    }

    reference.emit(RemoteSnapshot::existing("1", json!({"title": "orphan"})));
    assert_eq!(reference.watches.active_count(), 1);
}
