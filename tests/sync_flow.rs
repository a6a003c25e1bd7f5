//! End-to-end flows: engine actions carried out against the in-memory store,
//! with the store's change stream fed back into the engine.
#![allow(clippy::float_cmp)]

use std::collections::VecDeque;
use std::sync::Arc;

use serde_json::json;

use boardsync::config::{EngineConfig, SyncConfig};
use boardsync::doc::{BoardObject, ConnectorEnd, ConnectorStyle, ObjectId, ObjectKind, PartialBoardObject};
use boardsync::engine::{Action, EngineCore};
use boardsync::geom::{Geometry, Point};
use boardsync::input::{Button, Key, Modifiers};
use boardsync::store::{self, BoardStore, InMemoryStore, ManualClock};
use boardsync::sync::WriteKind;

// =============================================================
// Harness
// =============================================================

struct Harness {
    engine: EngineCore,
    store: InMemoryStore,
    clock: Arc<ManualClock>,
    /// Every action the engine emitted, in order.
    seen: Vec<Action>,
}

impl Harness {
    async fn with_objects(objects: &[&BoardObject]) -> Self {
        let clock = Arc::new(ManualClock::new(1_000));
        let engine = EngineCore::new(EngineConfig::default(), SyncConfig::default(), clock.clone());
        let store = InMemoryStore::new();
        for object in objects {
            if let Err(e) = store.create_object(object.to_wire()).await {
                panic!("seed failed: {e}");
            }
        }
        store.drain_changes().await;
        let mut harness = Self { engine, store, clock, seen: Vec::new() };
        let snapshot = harness.store.snapshot().await;
        let actions = harness.engine.load_snapshot(&snapshot);
        harness.pump(actions).await;
        harness
    }

    async fn pump(&mut self, actions: Vec<Action>) {
        let mut queue: VecDeque<Action> = actions.into();
        while let Some(action) = queue.pop_front() {
            match &action {
                Action::Persist(batch) => {
                    let result = store::commit(&self.store, batch).await;
                    queue.extend(self.engine.on_write_settled(batch.id, result));
                }
                Action::ObjectCreated(object) => {
                    if let Err(e) = self.store.create_object(object.to_wire()).await {
                        panic!("create failed: {e}");
                    }
                }
                Action::ObjectDeleted { id } => {
                    if let Err(e) = self.store.delete_object(*id).await {
                        panic!("delete failed: {e}");
                    }
                }
                _ => {}
            }
            self.seen.push(action);
        }
        let changes = self.store.drain_changes().await;
        if !changes.is_empty() {
            let echoed = self.engine.apply_remote(changes);
            self.seen.extend(echoed);
        }
    }

    async fn down(&mut self, p: Point) {
        let actions = self.engine.on_pointer_down(p, Button::Primary, Modifiers::default());
        self.pump(actions).await;
    }

    async fn move_to(&mut self, p: Point) {
        self.clock.advance(16);
        let actions = self.engine.on_pointer_move(p, Modifiers::default());
        self.pump(actions).await;
    }

    async fn up(&mut self, p: Point) {
        let actions = self.engine.on_pointer_up(p, Button::Primary, Modifiers::default());
        self.pump(actions).await;
    }

    async fn drag(&mut self, from: Point, to: Point, steps: u32) {
        self.down(from).await;
        for i in 1..=steps {
            let t = f64::from(i) / f64::from(steps);
            self.move_to(Point::new(from.x + (to.x - from.x) * t, from.y + (to.y - from.y) * t)).await;
        }
        self.up(to).await;
    }

    async fn stored(&self, id: &ObjectId, field: &str) -> Option<serde_json::Value> {
        self.store.object(id).await.and_then(|record| record.get(field).cloned())
    }

    fn notices(&self) -> usize {
        self.seen.iter().filter(|a| matches!(a, Action::Notice(_))).count()
    }
}

fn pt(x: f64, y: f64) -> Point {
    Point::new(x, y)
}

fn rect(x: f64, y: f64, z: i64) -> BoardObject {
    let mut obj = BoardObject::shape(ObjectKind::Rect, Geometry::new(x, y, 100.0, 100.0));
    obj.z_index = z;
    obj
}

// =============================================================
// Flows
// =============================================================

#[tokio::test]
async fn drag_lands_in_store_and_drafts_clear() {
    let a = rect(0.0, 0.0, 0);
    let mut h = Harness::with_objects(&[&a]).await;

    h.drag(pt(50.0, 50.0), pt(250.0, 130.0), 20).await;

    assert_eq!(h.stored(&a.id, "x").await, Some(json!(200.0)));
    assert_eq!(h.stored(&a.id, "y").await, Some(json!(80.0)));
    assert_eq!(h.engine.draft_count(), 0);
    assert_eq!(h.engine.in_flight(), 0);
    let Some(g) = h.engine.effective_geometry(&a.id) else { panic!("object missing") };
    assert_eq!((g.x, g.y), (200.0, 80.0));

    // Throttled: far fewer writes than pointer samples.
    let m = h.engine.metrics().channel(WriteKind::ObjectMove);
    assert_eq!(m.attempted, 21);
    assert!(m.committed < 21);
    assert_eq!(m.failed, 0);
}

#[tokio::test]
async fn container_and_children_always_commit_together() {
    let board = BoardObject::container(Geometry::new(0.0, 0.0, 300.0, 300.0), 1, 1, 8.0);
    let mut h = Harness::with_objects(&[&board]).await;
    let actions = h.engine.create_shape(ObjectKind::Sticky, Geometry::new(100.0, 100.0, 60.0, 60.0));
    let Some(child) = actions.iter().find_map(|a| match a {
        Action::ObjectCreated(o) => Some(o.id),
        _ => None,
    }) else {
        panic!("expected a created object");
    };
    h.pump(actions).await;

    let seeded = h.store.commit_log().await.len();
    h.drag(pt(280.0, 280.0), pt(480.0, 330.0), 12).await;

    let log = h.store.commit_log().await;
    let container_writes: Vec<_> = log[seeded..].iter().filter(|r| r.object_ids.contains(&board.id)).collect();
    assert!(!container_writes.is_empty());
    for record in container_writes {
        assert!(record.batched);
        assert!(record.object_ids.contains(&child));
    }
    assert_eq!(h.stored(&board.id, "x").await, Some(json!(200.0)));
    assert_eq!(h.stored(&child, "containerId").await, Some(json!(board.id.to_string())));
    assert_eq!(h.engine.draft_count(), 0);
}

#[tokio::test]
async fn failed_write_is_recovered_by_the_final_flush() {
    let a = rect(0.0, 0.0, 0);
    let mut h = Harness::with_objects(&[&a]).await;
    h.store.fail_next(1).await;

    h.drag(pt(50.0, 50.0), pt(150.0, 50.0), 5).await;

    assert_eq!(h.notices(), 1);
    let m = h.engine.metrics().channel(WriteKind::ObjectMove);
    assert_eq!(m.failed, 1);
    assert!(m.committed >= 1);
    assert_eq!(h.stored(&a.id, "x").await, Some(json!(100.0)));
    assert_eq!(h.engine.draft_count(), 0);
}

#[tokio::test]
async fn deleting_a_shape_frees_the_connector_in_the_store() {
    let (a, b) = (rect(0.0, 0.0, 0), rect(300.0, 0.0, 1));
    let mut h = Harness::with_objects(&[&a, &b]).await;
    let actions = h.engine.connect(a.id, b.id, ConnectorStyle::Arrow);
    let Some(connector) = actions.iter().find_map(|x| match x {
        Action::ObjectCreated(o) => Some(o.id),
        _ => None,
    }) else {
        panic!("expected a connector");
    };
    h.pump(actions).await;

    h.down(pt(50.0, 50.0)).await;
    h.up(pt(50.0, 50.0)).await;
    let actions = h.engine.on_key_down(&Key("Delete".into()), Modifiers::default());
    h.pump(actions).await;

    assert!(h.store.object(&a.id).await.is_none());
    assert_eq!(h.stored(&connector, "fromObjectId").await, None);
    assert_eq!(h.stored(&connector, "fromX").await, Some(json!(100.0)));
    assert_eq!(h.stored(&connector, "fromY").await, Some(json!(50.0)));
    assert!(h.stored(&connector, "toObjectId").await.is_some());
    let ends = h.engine.doc().get(&connector).and_then(|o| o.connector);
    assert_eq!(ends.map(|e| e.from), Some(ConnectorEnd::Free(pt(100.0, 50.0))));
    assert!(h.engine.connector_points(&connector).is_some());
}

#[tokio::test]
async fn another_clients_edit_arrives_through_the_change_stream() {
    let a = rect(0.0, 0.0, 0);
    let mut h = Harness::with_objects(&[&a]).await;
    let edit = PartialBoardObject::position(40.0, 40.0);
    if let Err(e) = h.store.update_object(a.id, edit.to_wire_fields()).await {
        panic!("remote edit failed: {e}");
    }
    h.pump(Vec::new()).await;
    let Some(g) = h.engine.effective_geometry(&a.id) else { panic!("object missing") };
    assert_eq!((g.x, g.y), (40.0, 40.0));
}
