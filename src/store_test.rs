#![allow(clippy::float_cmp)]

use serde_json::json;

use super::*;
use crate::doc::{BoardObject, MembershipUpdate, ObjectKind, PartialBoardObject, parse_object};
use crate::geom::Geometry;
use crate::input::SessionId;
use crate::sync::{BatchId, ObjectUpdate, WriteKind};

// =============================================================
// Helpers
// =============================================================

fn rect(x: f64) -> BoardObject {
    BoardObject::shape(ObjectKind::Rect, Geometry::new(x, 0.0, 50.0, 50.0))
}

fn batch(updates: Vec<ObjectUpdate>) -> WriteBatch {
    WriteBatch { id: BatchId(1), kind: WriteKind::ObjectMove, session: SessionId(1), forced: true, updates }
}

async fn seeded(objects: &[&BoardObject]) -> InMemoryStore {
    let store = InMemoryStore::new();
    for obj in objects {
        if let Err(e) = store.create_object(obj.to_wire()).await {
            panic!("seed failed: {e}");
        }
    }
    store.drain_changes().await;
    store
}

// =============================================================
// Errors
// =============================================================

#[test]
fn only_unavailable_is_retryable() {
    assert!(StoreError::Unavailable("timeout".into()).retryable());
    assert!(!StoreError::Rejected("denied".into()).retryable());
    assert!(!StoreError::NotFound(uuid::Uuid::nil()).retryable());
    assert_eq!(StoreError::Rejected("x".into()).error_code(), "E_STORE_REJECTED");
}

// =============================================================
// Clocks
// =============================================================

#[test]
fn manual_clock_moves_only_when_told() {
    let clock = ManualClock::new(100);
    assert_eq!(clock.now_ms(), 100);
    clock.advance(25);
    assert_eq!(clock.now_ms(), 125);
    clock.set(7);
    assert_eq!(clock.now_ms(), 7);
}

#[test]
fn monotonic_clock_never_goes_backwards() {
    let clock = MonotonicClock::new();
    let a = clock.now_ms();
    let b = clock.now_ms();
    assert!(b >= a);
}

// =============================================================
// commit
// =============================================================

#[tokio::test]
async fn empty_batch_commits_without_touching_the_store() {
    let store = InMemoryStore::new();
    assert!(commit(&store, &batch(Vec::new())).await.is_ok());
    assert!(store.commit_log().await.is_empty());
}

#[tokio::test]
async fn single_update_uses_plain_update() {
    let a = rect(0.0);
    let store = seeded(&[&a]).await;
    let result = commit(&store, &batch(vec![ObjectUpdate::new(a.id, PartialBoardObject::position(40.0, 5.0))])).await;
    assert!(result.is_ok());

    let log = store.commit_log().await;
    assert_eq!(log.last(), Some(&CommitRecord { object_ids: vec![a.id], batched: false }));
    let Some(record) = store.object(&a.id).await else { panic!("object missing") };
    assert_eq!(record.get("x"), Some(&json!(40.0)));
    assert_eq!(record.get("y"), Some(&json!(5.0)));
}

#[tokio::test]
async fn multi_object_batch_is_atomic() {
    let (a, b) = (rect(0.0), rect(100.0));
    let store = seeded(&[&a, &b]).await;
    let ghost = uuid::Uuid::new_v4();
    let updates = vec![
        ObjectUpdate::new(a.id, PartialBoardObject::position(10.0, 10.0)),
        ObjectUpdate::new(ghost, PartialBoardObject::position(10.0, 10.0)),
    ];
    let result = commit(&store, &batch(updates)).await;
    assert!(matches!(result, Err(StoreError::NotFound(id)) if id == ghost));

    // Nothing from the rejected batch landed.
    let Some(record) = store.object(&a.id).await else { panic!("object missing") };
    assert_eq!(record.get("x"), Some(&json!(0.0)));
    assert!(store.drain_changes().await.is_empty());

    let updates = vec![
        ObjectUpdate::new(a.id, PartialBoardObject::position(10.0, 10.0)),
        ObjectUpdate::new(b.id, PartialBoardObject::position(110.0, 10.0)),
    ];
    assert!(commit(&store, &batch(updates)).await.is_ok());
    let log = store.commit_log().await;
    assert!(log.last().is_some_and(|r| r.batched && r.object_ids == vec![a.id, b.id]));
    assert_eq!(store.drain_changes().await.len(), 2);
}

#[tokio::test]
async fn injected_failures_are_retryable_and_run_out() {
    let a = rect(0.0);
    let store = seeded(&[&a]).await;
    store.fail_next(1).await;
    let b = batch(vec![ObjectUpdate::new(a.id, PartialBoardObject::position(1.0, 1.0))]);
    let Err(err) = commit(&store, &b).await else { panic!("expected a failure") };
    assert!(err.retryable());
    assert!(commit(&store, &b).await.is_ok());
}

// =============================================================
// Field semantics
// =============================================================

#[tokio::test]
async fn null_fields_are_removed_from_the_record() {
    let container = uuid::Uuid::new_v4();
    let mut child = rect(0.0);
    child.membership = Some(crate::doc::Membership::new(container, 1, 0.5, 0.5));
    let store = seeded(&[&child]).await;

    let clear = PartialBoardObject { membership: Some(MembershipUpdate::Clear), ..Default::default() };
    assert!(store.update_object(child.id, clear.to_wire_fields()).await.is_ok());
    let Some(record) = store.object(&child.id).await else { panic!("object missing") };
    assert!(!record.contains_key("containerId"));
    assert!(!record.contains_key("containerRelX"));
}

#[tokio::test]
async fn remote_changes_parse_back_into_objects() {
    let a = rect(0.0);
    let store = InMemoryStore::new();
    assert!(store.create_object(a.to_wire()).await.is_ok());
    assert!(store.update_object(a.id, PartialBoardObject::position(5.0, 6.0).to_wire_fields()).await.is_ok());
    assert!(store.delete_object(a.id).await.is_ok());

    let changes = store.drain_changes().await;
    assert_eq!(changes.len(), 3);
    let RemoteChange::Added(added) = &changes[0] else { panic!("expected an add") };
    assert_eq!(parse_object(added).map(|o| o.id), Ok(a.id));
    let RemoteChange::Modified(modified) = &changes[1] else { panic!("expected a modify") };
    let Ok(moved) = parse_object(modified) else { panic!("modified record did not parse") };
    assert_eq!((moved.geometry.x, moved.geometry.y), (5.0, 6.0));
    assert_eq!(changes[2], RemoteChange::Removed(a.id));
    assert!(store.snapshot().await.is_empty());
}

#[tokio::test]
async fn create_requires_an_id() {
    let store = InMemoryStore::new();
    let mut wire = rect(0.0).to_wire();
    wire.id = None;
    assert!(matches!(store.create_object(wire).await, Err(StoreError::Rejected(_))));
}

#[tokio::test]
async fn deleting_a_missing_object_succeeds_quietly() {
    let store = InMemoryStore::new();
    assert!(store.delete_object(uuid::Uuid::new_v4()).await.is_ok());
    assert!(store.drain_changes().await.is_empty());
}
