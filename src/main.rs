//! Replay a scripted editing session against the in-memory store.
//!
//! The script seeds a board, drags a sticky note into a grid container along
//! a jittery pointer path, moves the container with its children, reshapes
//! its grid and deletes a connected shape. One write is made to fail on
//! purpose. Every action the engine emits is carried out the way a browser
//! host would, and the store's change stream is fed back after each step.
//! Write metrics per channel are logged at the end.

use std::collections::VecDeque;
use std::sync::Arc;

use boardsync::config::{EngineConfig, SyncConfig};
use boardsync::doc::{BoardObject, ConnectorStyle, ObjectId, ObjectKind};
use boardsync::engine::{Action, EngineCore};
use boardsync::geom::{Geometry, Point};
use boardsync::input::{Button, Key, Modifiers};
use boardsync::store::{self, BoardStore, InMemoryStore, ManualClock, StoreError};
use boardsync::sync::WriteKind;
use rand::Rng;
use tracing::{debug, info, warn};

/// Pointer samples per scripted drag.
const DRAG_STEPS: u32 = 48;
/// Simulated time between pointer samples (roughly one frame).
const FRAME_MS: u64 = 16;
const JITTER_PX: f64 = 0.6;

struct Replay {
    engine: EngineCore,
    store: InMemoryStore,
    clock: Arc<ManualClock>,
}

impl Replay {
    /// Carry out `actions` in order, then feed back what the store reports.
    async fn run(&mut self, actions: Vec<Action>) -> Result<(), StoreError> {
        let mut queue: VecDeque<Action> = actions.into();
        while let Some(action) = queue.pop_front() {
            match action {
                Action::Persist(batch) => {
                    let result = store::commit(&self.store, &batch).await;
                    if let Err(e) = &result {
                        debug!(batch = %batch.id, error = %e, "commit failed");
                    }
                    queue.extend(self.engine.on_write_settled(batch.id, result));
                }
                Action::ObjectCreated(object) => self.store.create_object(object.to_wire()).await?,
                Action::ObjectDeleted { id } => self.store.delete_object(id).await?,
                Action::Notice(message) => warn!(%message, "notice"),
                Action::SelectionChanged(ids) => debug!(selected = ids.len(), "selection changed"),
                Action::RenderNeeded | Action::CursorPresence(_) | Action::SetCursor(_) => {}
            }
        }
        let changes = self.store.drain_changes().await;
        if !changes.is_empty() {
            for action in self.engine.apply_remote(changes) {
                if let Action::Notice(message) = action {
                    warn!(%message, "notice");
                }
            }
        }
        Ok(())
    }

    async fn drag(&mut self, from: Point, to: Point) -> Result<(), StoreError> {
        let actions = self.engine.on_pointer_down(from, Button::Primary, Modifiers::default());
        self.run(actions).await?;
        for p in jittered_path(from, to, DRAG_STEPS) {
            self.clock.advance(FRAME_MS);
            let actions = self.engine.on_pointer_move(p, Modifiers::default());
            self.run(actions).await?;
        }
        self.clock.advance(FRAME_MS);
        let actions = self.engine.on_pointer_up(to, Button::Primary, Modifiers::default());
        self.run(actions).await
    }

    async fn click(&mut self, at: Point) -> Result<(), StoreError> {
        let mut actions = self.engine.on_pointer_down(at, Button::Primary, Modifiers::default());
        actions.extend(self.engine.on_pointer_up(at, Button::Primary, Modifiers::default()));
        self.run(actions).await
    }
}

/// Straight-line pointer samples from `from` to `to` with hand jitter.
/// The last sample lands exactly on `to`.
fn jittered_path(from: Point, to: Point, steps: u32) -> Vec<Point> {
    let mut rng = rand::rng();
    (1..=steps)
        .map(|i| {
            let t = f64::from(i) / f64::from(steps);
            let p = from.add(to.sub(from).scale(t));
            if i == steps {
                return p;
            }
            p.offset(rng.random_range(-JITTER_PX..JITTER_PX), rng.random_range(-JITTER_PX..JITTER_PX))
        })
        .collect()
}

fn created_id(actions: &[Action]) -> Option<ObjectId> {
    actions.iter().find_map(|a| match a {
        Action::ObjectCreated(object) => Some(object.id),
        _ => None,
    })
}

async fn replay() -> Result<(), StoreError> {
    let clock = Arc::new(ManualClock::new(0));
    let engine = EngineCore::new(EngineConfig::from_env(), SyncConfig::from_env(), clock.clone());
    let mut replay = Replay { engine, store: InMemoryStore::new(), clock };

    let board = BoardObject::container(Geometry::new(0.0, 0.0, 400.0, 300.0), 1, 2, 8.0);
    let mut sticky = BoardObject::shape(ObjectKind::Sticky, Geometry::new(600.0, 100.0, 120.0, 120.0));
    sticky.z_index = 1;
    let mut rect = BoardObject::shape(ObjectKind::Rect, Geometry::new(600.0, 320.0, 100.0, 80.0));
    rect.z_index = 2;
    for object in [&board, &sticky, &rect] {
        replay.store.create_object(object.to_wire()).await?;
    }
    replay.store.drain_changes().await;
    let snapshot = replay.store.snapshot().await;
    let actions = replay.engine.load_snapshot(&snapshot);
    replay.run(actions).await?;
    info!(objects = replay.engine.doc().len(), "board seeded");

    let actions = replay.engine.connect(sticky.id, rect.id, ConnectorStyle::Arrow);
    let connector = created_id(&actions);
    replay.run(actions).await?;

    // Sticky into the right-hand section.
    replay.drag(Point::new(660.0, 160.0), Point::new(300.0, 150.0)).await?;
    info!(
        container = ?replay.engine.effective_membership(&sticky.id).map(|m| m.container_id),
        "sticky dropped"
    );

    // One write fails mid-drag; the final flush still lands.
    replay.store.fail_next(1).await;
    replay.drag(Point::new(10.0, 10.0), Point::new(160.0, 60.0)).await?;

    let actions = replay.engine.set_container_grid(board.id, 2, 2);
    replay.run(actions).await?;

    replay.click(Point::new(650.0, 360.0)).await?;
    let actions = replay.engine.on_key_down(&Key("Delete".into()), Modifiers::default());
    replay.run(actions).await?;

    if let Some(id) = connector {
        info!(
            length = replay.engine.connector_length(&id).unwrap_or_default(),
            "connector after delete"
        );
    }

    let metrics = replay.engine.metrics();
    for kind in WriteKind::ALL {
        let m = metrics.channel(kind);
        info!(
            channel = kind.as_str(),
            attempted = m.attempted,
            skipped = m.skipped,
            committed = m.committed,
            failed = m.failed,
            "write metrics"
        );
    }
    let total = metrics.total();
    info!(
        attempted = total.attempted,
        committed = total.committed,
        in_flight = replay.engine.in_flight(),
        drafts = replay.engine.draft_count(),
        stored = replay.store.snapshot().await.len(),
        "replay finished"
    );
    Ok(())
}

#[tokio::main]
async fn main() {
    let dotenv = dotenvy::dotenv();
    tracing_subscriber::fmt::init();
    if let Err(e) = dotenv {
        debug!(error = %e, "no .env file loaded");
    }

    if let Err(e) = replay().await {
        warn!(error = %e, "replay aborted");
        std::process::exit(1);
    }
}
