//! Canvas session handle: input handling, drafts, and write decisions.
//!
//! DESIGN
//! ======
//! `EngineCore` owns everything one open canvas needs: the canonical
//! document, the camera, the selection, the draft overlay, the single
//! interaction-session slot, the sync layer and the obstacle index. Every
//! entry point takes `&mut self`, runs to completion, and returns the
//! `Action`s the host must carry out. The engine itself never awaits or
//! spawns.
//!
//! A gesture never touches canonical objects. Pointer moves write drafts
//! tagged with the session id, then hand the session's drafts to the sync
//! layer as one throttled decision. Pointer-up resolves memberships and
//! force-flushes the final state. Drafts are released once the session is
//! over and none of its batches are still in flight.
//!
//! TRADE-OFFS
//! ==========
//! A confirmed write is echoed into the canonical document immediately, so
//! releasing drafts never shows a stale frame while the store's own change
//! notification is still on its way. The remote stream later overwrites the
//! echo with whatever the store actually holds.
//!
//! ERROR HANDLING
//! ==============
//! A failed batch keeps its drafts on screen, logs a warning and surfaces a
//! `Notice`. Malformed remote records are logged and skipped. No handler
//! returns an error.

#[cfg(test)]
#[path = "engine_test.rs"]
mod engine_test;

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::camera::Camera;
use crate::config::{EngineConfig, SyncConfig};
use crate::connector::{self, PathCommand};
use crate::consts::{CONNECTOR_MARQUEE_PADDING, HANDLE_RADIUS_PX, MIN_OBJECT_SIZE, OBSTACLE_SIGNATURE_STEP, ROTATION_SNAP_DEG};
use crate::container::{self, ContainerSection, GridSpec};
use crate::doc::{
    BoardObject, ConnectorEnd, ConnectorEnds, ConnectorStyle, DocStore, EndSide, Membership, MembershipUpdate, ObjectId,
    ObjectKind, PartialBoardObject, parse_object, parse_snapshot,
};
use crate::error::ErrorCode;
use crate::geom::{Bounds, Geometry, Point, distance, rad_to_deg, rotate_point, round_to_step};
use crate::hit::{self, Corner, HitPart, LineEnd};
use crate::input::{Button, DragMember, InteractionSession, Key, MarqueeMode, Modifiers, Original, SessionId, WheelDelta};
use crate::overlay::{DraftOverlay, Scene};
use crate::spatial::{Obstacle, ObstacleIndex};
use crate::store::{Clock, MonotonicClock, RemoteChange, StoreError};
use crate::sync::{BatchId, ObjectUpdate, SyncLayer, WriteBatch, WriteKind, WriteMetrics};

/// Actions returned from handlers for the host to process, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    RenderNeeded,
    /// Persist with [`crate::store::commit`], then report through
    /// [`EngineCore::on_write_settled`].
    Persist(WriteBatch),
    ObjectCreated(BoardObject),
    ObjectDeleted { id: ObjectId },
    SelectionChanged(Vec<ObjectId>),
    /// A presence heartbeat is due at this world position.
    CursorPresence(Point),
    SetCursor(String),
    /// Non-fatal message for the user.
    Notice(String),
}

/// Core engine state for one open canvas.
pub struct EngineCore {
    doc: DocStore,
    camera: Camera,
    selection: BTreeSet<ObjectId>,
    overlay: DraftOverlay,
    session: InteractionSession,
    /// Whether the active session has emitted at least one batch.
    session_wrote: bool,
    next_session: u64,
    sync: SyncLayer,
    index: ObstacleIndex,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
}

impl Default for EngineCore {
    fn default() -> Self {
        Self::new(EngineConfig::default(), SyncConfig::default(), Arc::new(MonotonicClock::new()))
    }
}

impl EngineCore {
    #[must_use]
    pub fn new(config: EngineConfig, sync_config: SyncConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            doc: DocStore::new(),
            camera: Camera::default(),
            selection: BTreeSet::new(),
            overlay: DraftOverlay::new(),
            session: InteractionSession::Idle,
            session_wrote: false,
            next_session: 0,
            sync: SyncLayer::new(sync_config),
            index: ObstacleIndex::new(config.obstacle_cell_size),
            config,
            clock,
        }
    }

    // =========================================================================
    // DATA INPUTS
    // =========================================================================

    /// Replace canonical state with a full snapshot.
    ///
    /// Malformed entries are skipped. Drafts not owned by the active session
    /// are dropped, as is every last-written record.
    pub fn load_snapshot(&mut self, values: &[Value]) -> Vec<Action> {
        let (objects, errors) = parse_snapshot(values);
        for e in &errors {
            warn!(code = e.error_code(), error = %e, "skipping malformed snapshot entry");
        }
        info!(objects = objects.len(), rejected = errors.len(), "snapshot loaded");
        self.doc.load_snapshot(objects);
        self.overlay.retain_owner(self.session.id());
        self.sync.forget_all();
        let mut actions = self.prune_missing();
        actions.push(Action::RenderNeeded);
        actions
    }

    /// Apply an ordered batch of incremental remote changes.
    pub fn apply_remote(&mut self, changes: Vec<RemoteChange>) -> Vec<Action> {
        let active = self.session.id();
        for change in changes {
            match change {
                RemoteChange::Added(value) | RemoteChange::Modified(value) => match parse_object(&value) {
                    Ok(object) => {
                        let id = object.id;
                        self.doc.insert(object);
                        self.overlay.remove_unless_owned(&id, active);
                        self.sync.forget(&id);
                    }
                    Err(e) => warn!(code = e.error_code(), error = %e, "skipping malformed remote object"),
                },
                RemoteChange::Removed(id) => {
                    self.doc.remove(&id);
                    self.overlay.remove(&id);
                    self.sync.forget(&id);
                }
            }
        }
        let mut actions = self.prune_missing();
        actions.push(Action::RenderNeeded);
        actions
    }

    /// Report the outcome of a batch the host persisted.
    pub fn on_write_settled(&mut self, batch_id: BatchId, result: Result<(), StoreError>) -> Vec<Action> {
        let Some(batch) = self.sync.settle(batch_id, result.is_ok()) else {
            debug!(batch = %batch_id, "settlement for unknown batch ignored");
            return Vec::new();
        };
        match result {
            Ok(()) => {
                for update in &batch.updates {
                    self.doc.apply_partial(&update.id, &update.fields);
                }
                if self.session.id() != Some(batch.session) {
                    self.release_drafts(batch.session);
                }
                vec![Action::RenderNeeded]
            }
            Err(e) => {
                warn!(
                    batch = %batch_id,
                    kind = batch.kind.as_str(),
                    session = %batch.session,
                    code = e.error_code(),
                    retryable = e.retryable(),
                    error = %e,
                    "write batch failed"
                );
                vec![Action::Notice(format!("Changes could not be saved: {e}"))]
            }
        }
    }

    // =========================================================================
    // COMMANDS
    // =========================================================================

    /// Replace the selection with the existing objects among `ids`.
    pub fn select<I>(&mut self, ids: I) -> Vec<Action>
    where
        I: IntoIterator<Item = ObjectId>,
    {
        let next = ids.into_iter().filter(|id| self.doc.contains(id)).collect();
        self.set_selection(next)
    }

    /// Create a shape on top of the stack. Shapes created inside a container join it.
    pub fn create_shape(&mut self, kind: ObjectKind, geometry: Geometry) -> Vec<Action> {
        if kind.is_connector() {
            return vec![Action::Notice("Connectors are created by connecting two shapes".into())];
        }
        let geometry = Geometry {
            width: geometry.width.max(MIN_OBJECT_SIZE),
            height: geometry.height.max(MIN_OBJECT_SIZE),
            ..geometry
        }
        .with_rotation(geometry.rotation_deg);
        let mut object = BoardObject::shape(kind, geometry);
        object.z_index = self.doc.max_z_index() + 1;
        if kind.can_join_container() {
            if let Some((placed, membership)) = self.drop_placement(object.id, &geometry, &BTreeSet::new()) {
                object.geometry = placed;
                object.membership = Some(membership);
            }
        }
        info!(id = %object.id, kind = ?kind, "object created");
        self.doc.insert(object.clone());
        vec![Action::ObjectCreated(object), Action::RenderNeeded]
    }

    /// Connect two shapes with the default anchor pair.
    pub fn connect(&mut self, from: ObjectId, to: ObjectId, style: ConnectorStyle) -> Vec<Action> {
        let scene = self.scene();
        let attachable = |id: &ObjectId| scene.object(id).is_some_and(|o| o.kind.is_attachable());
        let pair = match (scene.geometry(&from), scene.geometry(&to)) {
            (Some(a), Some(b)) if from != to && attachable(&from) && attachable(&to) => {
                connector::default_anchor_pair(&a, &b)
            }
            _ => return vec![Action::Notice("Connectors join two different shapes".into())],
        };
        let mut object = BoardObject::connector(
            style,
            ConnectorEnd::Attached { object_id: from, anchor: pair.0 },
            ConnectorEnd::Attached { object_id: to, anchor: pair.1 },
        );
        object.z_index = self.doc.max_z_index() + 1;
        info!(id = %object.id, from = %from, to = %to, "connector created");
        self.doc.insert(object.clone());
        vec![Action::ObjectCreated(object), Action::RenderNeeded]
    }

    /// Change a container's grid dimensions, re-projecting every child onto
    /// the section at its old index.
    pub fn set_container_grid(&mut self, id: ObjectId, rows: u32, cols: u32) -> Vec<Action> {
        let grid = self.doc.get(&id).filter(|o| o.kind.is_container()).and_then(|o| o.grid.clone());
        let (Some(mut grid), Some(geometry)) = (grid, self.scene().geometry(&id)) else {
            return vec![Action::Notice("Only grid containers have sections".into())];
        };
        grid.rows = rows.max(1);
        grid.cols = cols.max(1);
        container::resize_section_fields(&mut grid);

        let sections = container::section_bounds(&geometry, GridSpec::from_fields(&grid, self.config.container_padding));
        let placed: Vec<(ObjectId, Geometry, Membership)> = {
            let scene = self.scene();
            scene
                .children_of(&id)
                .into_iter()
                .filter_map(|child| {
                    let current = scene.geometry(&child.id)?;
                    let membership = scene.membership(&child.id)?;
                    let (g, m) = container::reproject_child(&current, &membership, &sections)?;
                    Some((child.id, g, m))
                })
                .collect()
        };

        let owner = self.next_session_id();
        let mut updates = vec![ObjectUpdate::new(id, PartialBoardObject { grid: Some(grid.clone()), ..Default::default() })];
        for (child, g, m) in &placed {
            self.overlay.set_geometry(*child, owner, *g);
            self.overlay.set_membership(*child, owner, Some(*m));
            updates.push(ObjectUpdate::new(
                *child,
                PartialBoardObject { membership: Some(MembershipUpdate::Set(*m)), ..PartialBoardObject::position(g.x, g.y) },
            ));
        }
        let mut actions = Vec::new();
        if let Some(batch) = self.submit(WriteKind::ContainerMove, updates, true, owner) {
            actions.push(Action::Persist(batch));
        }
        // Grid fields have no draft slot; apply them locally right away.
        self.doc.apply_partial(&id, &PartialBoardObject { grid: Some(grid), ..Default::default() });
        self.release_drafts(owner);
        info!(container = %id, rows, cols, children = placed.len(), "container grid changed");
        actions.push(Action::RenderNeeded);
        actions
    }

    /// Delete the selection. Connectors attached to deleted shapes keep a free
    /// end at the last resolved position; children of deleted containers lose
    /// their membership. Both side effects are persisted before the deletes.
    pub fn delete_selection(&mut self) -> Vec<Action> {
        let doomed: BTreeSet<ObjectId> = self.selection.iter().copied().filter(|id| self.doc.contains(id)).collect();
        if doomed.is_empty() {
            return Vec::new();
        }

        let (freed, released) = {
            let scene = self.scene();
            let freed: Vec<(ObjectId, ConnectorEnds)> = self
                .doc
                .sorted_objects()
                .into_iter()
                .filter(|o| o.kind.is_connector() && !doomed.contains(&o.id))
                .filter_map(|o| {
                    let ends = scene.connector_ends(&o.id)?;
                    let free = |end: ConnectorEnd| match end.attached_to() {
                        Some(target) if doomed.contains(&target) => {
                            connector::resolve_end(&end, |t| scene.geometry(t)).map(|r| ConnectorEnd::Free(r.point))
                        }
                        _ => Some(end),
                    };
                    let next = ConnectorEnds { from: free(ends.from)?, to: free(ends.to)? };
                    (next != ends).then_some((o.id, next))
                })
                .collect();
            let released: Vec<ObjectId> = self
                .doc
                .sorted_objects()
                .into_iter()
                .filter(|o| {
                    !doomed.contains(&o.id) && scene.membership(&o.id).is_some_and(|m| doomed.contains(&m.container_id))
                })
                .map(|o| o.id)
                .collect();
            (freed, released)
        };

        let owner = self.next_session_id();
        let mut actions = Vec::new();
        for (id, ends) in &freed {
            self.overlay.set_connector(*id, owner, *ends);
        }
        for id in &released {
            self.overlay.set_membership(*id, owner, None);
        }
        let connector_updates: Vec<ObjectUpdate> = freed
            .iter()
            .map(|(id, ends)| {
                ObjectUpdate::new(*id, PartialBoardObject { from: Some(ends.from), to: Some(ends.to), ..Default::default() })
            })
            .collect();
        let member_updates: Vec<ObjectUpdate> = released
            .iter()
            .map(|id| {
                ObjectUpdate::new(*id, PartialBoardObject { membership: Some(MembershipUpdate::Clear), ..Default::default() })
            })
            .collect();
        for (kind, updates) in [(WriteKind::ConnectorEndpoint, connector_updates), (WriteKind::ObjectMove, member_updates)] {
            if updates.is_empty() {
                continue;
            }
            if let Some(batch) = self.submit(kind, updates, true, owner) {
                actions.push(Action::Persist(batch));
            }
        }
        self.release_drafts(owner);

        for id in &doomed {
            self.doc.remove(id);
            self.overlay.remove(id);
            self.sync.forget(id);
            actions.push(Action::ObjectDeleted { id: *id });
        }
        actions.extend(self.set_selection(BTreeSet::new()));
        info!(
            objects = doomed.len(),
            connectors_freed = freed.len(),
            children_released = released.len(),
            "selection deleted"
        );
        actions.push(Action::RenderNeeded);
        actions
    }

    // =========================================================================
    // INPUT EVENTS
    // =========================================================================

    pub fn on_pointer_down(&mut self, screen: Point, button: Button, modifiers: Modifiers) -> Vec<Action> {
        if !self.session.is_idle() {
            debug!(session = self.session.name(), "pointer down during active session ignored");
            return Vec::new();
        }
        self.session_wrote = false;
        match button {
            Button::Middle => return self.start_pan(screen),
            Button::Secondary => return Vec::new(),
            Button::Primary => {}
        }

        let world = self.camera.screen_to_world(screen);
        let Some(hit) = self.hit_at(world) else {
            return if modifiers.shift {
                self.start_marquee(world, MarqueeMode::Add)
            } else if modifiers.command() {
                self.start_marquee(world, MarqueeMode::Remove)
            } else {
                self.start_pan(screen)
            };
        };
        match hit.part {
            HitPart::Body if modifiers.shift => self.toggle_selected(hit.object_id),
            HitPart::Body => self.start_drag(hit.object_id, screen, world),
            HitPart::ConnectorBody if modifiers.shift => self.toggle_selected(hit.object_id),
            HitPart::ConnectorBody => self.set_selection(BTreeSet::from([hit.object_id])),
            HitPart::RotateHandle => self.start_rotate(hit.object_id, world),
            HitPart::ResizeHandle(corner) => self.start_resize(hit.object_id, corner),
            HitPart::LineEndpoint(end) => self.start_line_endpoint(hit.object_id, end),
            HitPart::ConnectorEndpoint(side) => self.start_endpoint_drag(hit.object_id, side),
        }
    }

    pub fn on_pointer_move(&mut self, screen: Point, modifiers: Modifiers) -> Vec<Action> {
        let world = self.camera.screen_to_world(screen);
        let mut actions = Vec::new();
        if self.sync.cursor_due_at(self.clock.now_ms()) {
            actions.push(Action::CursorPresence(world));
        }

        let mut session = std::mem::take(&mut self.session);
        if self.advance(&mut session, screen, world, modifiers, &mut actions) {
            if let (Some(id), Some(kind)) = (session.id(), write_kind(&session)) {
                let updates = self.draft_updates(id);
                if let Some(batch) = self.submit(kind, updates, false, id) {
                    self.session_wrote = true;
                    actions.push(Action::Persist(batch));
                }
            }
            actions.push(Action::RenderNeeded);
        }
        self.session = session;
        actions
    }

    pub fn on_pointer_up(&mut self, screen: Point, button: Button, modifiers: Modifiers) -> Vec<Action> {
        let world = self.camera.screen_to_world(screen);
        let mut actions = Vec::new();
        let mut session = std::mem::take(&mut self.session);
        let Some(id) = session.id() else {
            return actions;
        };
        self.advance(&mut session, screen, world, modifiers, &mut actions);

        match &session {
            InteractionSession::Idle => {}
            InteractionSession::Panning { travel_px, .. } => {
                // A click on empty canvas clears the selection.
                if button == Button::Primary && *travel_px <= self.config.drag_slop_px {
                    actions.extend(self.set_selection(BTreeSet::new()));
                }
            }
            InteractionSession::MarqueeSelecting { .. } => {}
            InteractionSession::ObjectDragging { confirmed: false, grabbed, .. } => {
                if self.selection.len() > 1 && self.selection.contains(grabbed) {
                    actions.extend(self.set_selection(BTreeSet::from([*grabbed])));
                }
            }
            InteractionSession::ObjectDragging { members, .. } => {
                let carriers: BTreeSet<ObjectId> = members.iter().filter(|m| m.is_container).map(|m| m.id).collect();
                for member in members {
                    if member.is_container {
                        self.reassign_children(id, member.id);
                    } else {
                        self.resolve_drop(id, member.id, &carriers);
                    }
                }
                self.flush(&session, &mut actions);
            }
            InteractionSession::CornerResizing { object_id, .. }
            | InteractionSession::Rotating { object_id, .. }
            | InteractionSession::LineEndpointResizing { object_id, .. } => {
                match self.doc.get(object_id).map(|o| o.kind) {
                    Some(kind) if kind.is_container() => self.reassign_children(id, *object_id),
                    // The new geometry decides the section and relative position.
                    Some(kind) if kind.can_join_container() => self.resolve_drop(id, *object_id, &BTreeSet::new()),
                    _ => {}
                }
                self.flush(&session, &mut actions);
            }
            InteractionSession::ConnectorEndpointDragging { .. } => self.flush(&session, &mut actions),
        }

        debug!(session = %id, kind = session.name(), wrote = self.session_wrote, "session ended");
        self.end_session(id);
        actions.push(Action::SetCursor("default".into()));
        actions.push(Action::RenderNeeded);
        actions
    }

    /// Pointer capture lost: the session ends and its drafts are discarded.
    pub fn on_pointer_cancel(&mut self) -> Vec<Action> {
        self.cancel_session()
    }

    pub fn on_wheel(&mut self, screen: Point, delta: WheelDelta, modifiers: Modifiers) -> Vec<Action> {
        if self.camera.apply_wheel(screen, delta.dx, delta.dy, modifiers.command()) {
            vec![Action::RenderNeeded]
        } else {
            Vec::new()
        }
    }

    pub fn on_key_down(&mut self, key: &Key, _modifiers: Modifiers) -> Vec<Action> {
        if key.is_escape() {
            if self.session.is_idle() {
                return self.set_selection(BTreeSet::new());
            }
            return self.cancel_session();
        }
        if key.is_delete() && self.session.is_idle() {
            return self.delete_selection();
        }
        Vec::new()
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    #[must_use]
    pub fn doc(&self) -> &DocStore {
        &self.doc
    }

    /// Borrowed `overlay > canonical` view.
    #[must_use]
    pub fn scene(&self) -> Scene<'_> {
        Scene::new(&self.doc, &self.overlay)
    }

    #[must_use]
    pub fn camera(&self) -> Camera {
        self.camera
    }

    /// Selected ids, ascending.
    #[must_use]
    pub fn selection(&self) -> Vec<ObjectId> {
        self.selection.iter().copied().collect()
    }

    #[must_use]
    pub fn session(&self) -> &InteractionSession {
        &self.session
    }

    #[must_use]
    pub fn marquee_rect(&self) -> Option<Bounds> {
        self.session.marquee_rect()
    }

    #[must_use]
    pub fn draft_geometry(&self, id: &ObjectId) -> Option<Geometry> {
        self.overlay.geometry(id).map(|d| d.value)
    }

    #[must_use]
    pub fn draft_connector(&self, id: &ObjectId) -> Option<ConnectorEnds> {
        self.overlay.connector(id).map(|d| d.value)
    }

    #[must_use]
    pub fn effective_geometry(&self, id: &ObjectId) -> Option<Geometry> {
        self.scene().geometry(id)
    }

    #[must_use]
    pub fn effective_membership(&self, id: &ObjectId) -> Option<Membership> {
        self.scene().membership(id)
    }

    /// Sections of a container at its effective geometry.
    #[must_use]
    pub fn container_sections(&self, id: &ObjectId) -> Vec<ContainerSection> {
        self.scene().geometry(id).map_or_else(Vec::new, |g| self.sections_for(id, &g))
    }

    /// Number of drafts across all sessions.
    #[must_use]
    pub fn draft_count(&self) -> usize {
        self.overlay.len()
    }

    #[must_use]
    pub fn metrics(&self) -> WriteMetrics {
        self.sync.metrics()
    }

    pub fn reset_metrics(&mut self) {
        self.sync.reset_metrics();
    }

    /// Batches handed to the host and not yet settled.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.sync.in_flight_len()
    }

    #[must_use]
    pub fn connector_points(&self, id: &ObjectId) -> Option<Vec<Point>> {
        self.scene().connector_points(id, self.config.route)
    }

    /// Drawable connector path with rounded corners.
    #[must_use]
    pub fn connector_path(&self, id: &ObjectId) -> Option<Vec<PathCommand>> {
        let points = self.connector_points(id)?;
        Some(connector::rounded_path(&points, self.config.corner_radius))
    }

    /// Label position: halfway along the route.
    #[must_use]
    pub fn connector_midpoint(&self, id: &ObjectId) -> Option<Point> {
        connector::path_midpoint(&self.connector_points(id)?)
    }

    #[must_use]
    pub fn connector_length(&self, id: &ObjectId) -> Option<f64> {
        self.connector_points(id).map(|points| connector::path_length(&points))
    }

    // =========================================================================
    // SESSION START
    // =========================================================================

    fn next_session_id(&mut self) -> SessionId {
        self.next_session += 1;
        SessionId(self.next_session)
    }

    fn start_pan(&mut self, screen: Point) -> Vec<Action> {
        let id = self.next_session_id();
        self.session = InteractionSession::Panning { id, last_screen: screen, travel_px: 0.0 };
        vec![Action::SetCursor("grabbing".into())]
    }

    fn start_marquee(&mut self, world: Point, mode: MarqueeMode) -> Vec<Action> {
        let id = self.next_session_id();
        let base = self.selection();
        self.session = InteractionSession::MarqueeSelecting { id, mode, start_world: world, current_world: world, base };
        vec![Action::RenderNeeded]
    }

    fn start_drag(&mut self, grabbed: ObjectId, screen: Point, world: Point) -> Vec<Action> {
        let mut actions = Vec::new();
        if !(self.selection.len() > 1 && self.selection.contains(&grabbed)) {
            actions.extend(self.set_selection(BTreeSet::from([grabbed])));
        }

        let (members, originals) = {
            let scene = self.scene();
            let selected: Vec<ObjectId> = self
                .selection
                .iter()
                .copied()
                .filter(|id| scene.object(id).is_some_and(|o| !o.kind.is_connector()))
                .collect();
            // Children of a dragged container ride along with it.
            let members: Vec<DragMember> = selected
                .iter()
                .filter(|id| scene.membership(id).is_none_or(|m| !selected.contains(&m.container_id)))
                .filter_map(|id| {
                    let object = scene.object(id)?;
                    Some(DragMember {
                        id: *id,
                        origin: scene.geometry(id)?,
                        membership: scene.membership(id),
                        is_container: object.kind.is_container(),
                    })
                })
                .collect();
            let mut touched: Vec<ObjectId> = members.iter().map(|m| m.id).collect();
            for member in members.iter().filter(|m| m.is_container) {
                for child in scene.children_of(&member.id) {
                    if !touched.contains(&child.id) {
                        touched.push(child.id);
                    }
                }
            }
            let originals: Vec<Original> = touched.iter().filter_map(|id| original(&scene, id)).collect();
            (members, originals)
        };
        if members.is_empty() {
            return actions;
        }

        let id = self.next_session_id();
        debug!(session = %id, objects = members.len(), "drag started");
        self.session = InteractionSession::ObjectDragging {
            id,
            grabbed,
            grab_world: world,
            last_screen: screen,
            travel_px: 0.0,
            confirmed: false,
            members,
            originals,
        };
        actions.push(Action::SetCursor("move".into()));
        actions
    }

    fn start_rotate(&mut self, object_id: ObjectId, world: Point) -> Vec<Action> {
        let scene = self.scene();
        let (Some(origin), Some(before)) = (scene.geometry(&object_id), original(&scene, &object_id)) else {
            return Vec::new();
        };
        let center = origin.center();
        let id = self.next_session_id();
        self.session = InteractionSession::Rotating {
            id,
            object_id,
            center,
            grab_angle_deg: pointer_angle(center, world),
            origin,
            originals: vec![before],
        };
        vec![Action::SetCursor("grabbing".into())]
    }

    fn start_resize(&mut self, object_id: ObjectId, corner: Corner) -> Vec<Action> {
        let (origin, originals) = {
            let scene = self.scene();
            let Some(origin) = scene.geometry(&object_id) else {
                return Vec::new();
            };
            let mut touched = vec![object_id];
            touched.extend(scene.children_of(&object_id).iter().map(|c| c.id));
            let originals: Vec<Original> = touched.iter().filter_map(|id| original(&scene, id)).collect();
            (origin, originals)
        };
        let id = self.next_session_id();
        self.session = InteractionSession::CornerResizing { id, object_id, corner, origin, originals };
        vec![Action::SetCursor(corner.cursor().into())]
    }

    fn start_line_endpoint(&mut self, object_id: ObjectId, end: LineEnd) -> Vec<Action> {
        let scene = self.scene();
        let (Some(origin), Some(before)) = (scene.geometry(&object_id), original(&scene, &object_id)) else {
            return Vec::new();
        };
        let id = self.next_session_id();
        self.session = InteractionSession::LineEndpointResizing { id, object_id, end, origin, originals: vec![before] };
        vec![Action::SetCursor("crosshair".into())]
    }

    fn start_endpoint_drag(&mut self, connector_id: ObjectId, side: EndSide) -> Vec<Action> {
        let scene = self.scene();
        let (Some(origin), Some(before)) = (scene.connector_ends(&connector_id), original(&scene, &connector_id)) else {
            return Vec::new();
        };
        let id = self.next_session_id();
        self.session =
            InteractionSession::ConnectorEndpointDragging { id, connector_id, side, origin, originals: vec![before] };
        vec![Action::SetCursor("crosshair".into())]
    }

    // =========================================================================
    // SESSION UPDATE / END
    // =========================================================================

    /// Move the session to the pointer. Returns `true` when drafts changed.
    fn advance(
        &mut self,
        session: &mut InteractionSession,
        screen: Point,
        world: Point,
        modifiers: Modifiers,
        actions: &mut Vec<Action>,
    ) -> bool {
        match session {
            InteractionSession::Idle => false,
            InteractionSession::Panning { last_screen, travel_px, .. } => {
                let delta = screen.sub(*last_screen);
                *travel_px += delta.length();
                *last_screen = screen;
                if delta.x != 0.0 || delta.y != 0.0 {
                    self.camera.pan_by(delta.x, delta.y);
                    actions.push(Action::RenderNeeded);
                }
                false
            }
            InteractionSession::MarqueeSelecting { mode, start_world, current_world, base, .. } => {
                *current_world = world;
                let hits = self.objects_in_rect(&Bounds::from_corners(*start_world, world));
                let mut next: BTreeSet<ObjectId> = base.iter().copied().collect();
                match mode {
                    MarqueeMode::Add => next.extend(hits),
                    MarqueeMode::Remove => {
                        for id in &hits {
                            next.remove(id);
                        }
                    }
                }
                actions.extend(self.set_selection(next));
                actions.push(Action::RenderNeeded);
                false
            }
            InteractionSession::ObjectDragging {
                id, grab_world, last_screen, travel_px, confirmed, members, ..
            } => {
                *travel_px += distance(screen, *last_screen);
                *last_screen = screen;
                if !*confirmed {
                    if *travel_px <= self.config.drag_slop_px {
                        return false;
                    }
                    *confirmed = true;
                    debug!(session = %id, objects = members.len(), "drag confirmed");
                }
                let delta = world.sub(*grab_world);
                for member in members.iter() {
                    let geometry = member.origin.translated(delta.x, delta.y);
                    self.overlay.set_geometry(member.id, *id, geometry);
                    if member.is_container {
                        self.carry_children(*id, member.id, &geometry);
                    }
                }
                true
            }
            InteractionSession::Rotating { id, object_id, center, grab_angle_deg, origin, .. } => {
                let mut rotation = origin.rotation_deg + pointer_angle(*center, world) - *grab_angle_deg;
                if modifiers.shift {
                    rotation = round_to_step(rotation, ROTATION_SNAP_DEG);
                }
                self.overlay.set_geometry(*object_id, *id, origin.with_rotation(rotation));
                true
            }
            InteractionSession::CornerResizing { id, object_id, corner, origin, .. } => {
                let kind = self.doc.get(object_id).map(|o| o.kind);
                let snap = (self.config.snap_to_grid && kind.is_some_and(ObjectKind::is_snap_eligible))
                    .then_some(self.config.grid_step);
                let geometry = resize_from_corner(origin, *corner, world, snap);
                self.overlay.set_geometry(*object_id, *id, geometry);
                if kind.is_some_and(ObjectKind::is_container) {
                    self.carry_children(*id, *object_id, &geometry);
                }
                true
            }
            InteractionSession::LineEndpointResizing { id, object_id, end, origin, .. } => {
                self.overlay.set_geometry(*object_id, *id, drag_line_end(origin, *end, world));
                true
            }
            InteractionSession::ConnectorEndpointDragging { id, connector_id, side, origin, .. } => {
                let end = self.snap_end(*connector_id, world);
                let mut ends = *origin;
                ends.set(*side, end);
                self.overlay.set_connector(*connector_id, *id, ends);
                true
            }
        }
    }

    /// Force-write the session's drafts.
    fn flush(&mut self, session: &InteractionSession, actions: &mut Vec<Action>) {
        let (Some(id), Some(kind)) = (session.id(), write_kind(session)) else {
            return;
        };
        let updates = self.draft_updates(id);
        if let Some(batch) = self.submit(kind, updates, true, id) {
            self.session_wrote = true;
            actions.push(Action::Persist(batch));
        }
    }

    /// Discard the active session. If it already wrote, the originals are
    /// force-written back so the store does not keep a half-finished gesture.
    fn cancel_session(&mut self) -> Vec<Action> {
        let session = std::mem::take(&mut self.session);
        let Some(id) = session.id() else {
            return Vec::new();
        };
        let mut actions = Vec::new();
        if let InteractionSession::MarqueeSelecting { base, .. } = &session {
            actions.extend(self.set_selection(base.iter().copied().collect()));
        }
        let revert = self.session_wrote && !session.originals().is_empty();
        if revert {
            for before in session.originals() {
                match before.connector {
                    Some(ends) => self.overlay.set_connector(before.id, id, ends),
                    None => self.overlay.set_geometry(before.id, id, before.geometry),
                }
                if self.overlay.membership(&before.id).is_some_and(|d| d.owner == id) {
                    self.overlay.set_membership(before.id, id, before.membership);
                }
            }
            self.flush(&session, &mut actions);
        } else {
            self.overlay.clear_owner(id);
        }
        info!(session = %id, kind = session.name(), reverted = revert, "session cancelled");
        self.end_session(id);
        actions.push(Action::SetCursor("default".into()));
        actions.push(Action::RenderNeeded);
        actions
    }

    fn end_session(&mut self, id: SessionId) {
        self.session = InteractionSession::Idle;
        self.session_wrote = false;
        self.release_drafts(id);
    }

    /// Drop an inactive session's drafts once none of its batches are in flight.
    fn release_drafts(&mut self, owner: SessionId) {
        if self.sync.in_flight_for(owner) > 0 {
            return;
        }
        let cleared = self.overlay.clear_owner(owner);
        if cleared > 0 {
            debug!(session = %owner, drafts = cleared, "drafts released");
        }
    }

    /// Drop selection entries and abort the session when remote changes
    /// removed the objects they refer to.
    fn prune_missing(&mut self) -> Vec<Action> {
        let kept = self.selection.iter().copied().filter(|id| self.doc.contains(id)).collect();
        let mut actions = self.set_selection(kept);
        if self.session.originals().iter().any(|o| !self.doc.contains(&o.id)) {
            let session = std::mem::take(&mut self.session);
            if let Some(id) = session.id() {
                self.overlay.clear_owner(id);
                warn!(session = %id, kind = session.name(), "session aborted: object removed remotely");
            }
            self.session_wrote = false;
            actions.push(Action::SetCursor("default".into()));
            actions.push(Action::Notice("An object you were editing was removed".into()));
        }
        actions
    }

    fn set_selection(&mut self, next: BTreeSet<ObjectId>) -> Vec<Action> {
        if next == self.selection {
            return Vec::new();
        }
        self.selection = next;
        vec![Action::SelectionChanged(self.selection()), Action::RenderNeeded]
    }

    fn toggle_selected(&mut self, id: ObjectId) -> Vec<Action> {
        let mut next = self.selection.clone();
        if !next.remove(&id) {
            next.insert(id);
        }
        self.set_selection(next)
    }

    // =========================================================================
    // WRITES
    // =========================================================================

    fn submit(
        &mut self,
        kind: WriteKind,
        updates: Vec<ObjectUpdate>,
        force: bool,
        session: SessionId,
    ) -> Option<WriteBatch> {
        let now = self.clock.now_ms();
        self.sync.submit_at(kind, updates, &self.doc, now, force, session)
    }

    /// Every draft `owner` holds, as full-field updates.
    fn draft_updates(&self, owner: SessionId) -> Vec<ObjectUpdate> {
        self.overlay
            .owned_ids(owner)
            .into_iter()
            .map(|id| {
                let mut fields = PartialBoardObject::default();
                if let Some(d) = self.overlay.geometry(&id).filter(|d| d.owner == owner) {
                    fields = PartialBoardObject::geometry(&d.value);
                }
                if let Some(d) = self.overlay.membership(&id).filter(|d| d.owner == owner) {
                    fields.membership = Some(d.value.map_or(MembershipUpdate::Clear, MembershipUpdate::Set));
                }
                if let Some(d) = self.overlay.connector(&id).filter(|d| d.owner == owner) {
                    fields.from = Some(d.value.from);
                    fields.to = Some(d.value.to);
                }
                ObjectUpdate::new(id, fields)
            })
            .collect()
    }

    // =========================================================================
    // CONTAINERS
    // =========================================================================

    fn sections_for(&self, container_id: &ObjectId, geometry: &Geometry) -> Vec<ContainerSection> {
        self.doc.get(container_id).and_then(|o| o.grid.as_ref()).map_or_else(Vec::new, |grid| {
            container::section_bounds(geometry, GridSpec::from_fields(grid, self.config.container_padding))
        })
    }

    /// Move a container's children with it, keeping their sections.
    fn carry_children(&mut self, owner: SessionId, container_id: ObjectId, container_geometry: &Geometry) {
        let sections = self.sections_for(&container_id, container_geometry);
        let placed: Vec<(ObjectId, Geometry, Membership, Membership)> = {
            let scene = self.scene();
            scene
                .children_of(&container_id)
                .into_iter()
                .filter_map(|child| {
                    let current = scene.geometry(&child.id)?;
                    let before = scene.membership(&child.id)?;
                    let (g, m) = container::reproject_child(&current, &before, &sections)?;
                    Some((child.id, g, before, m))
                })
                .collect()
        };
        for (id, geometry, before, after) in placed {
            self.overlay.set_geometry(id, owner, geometry);
            if before != after {
                self.overlay.set_membership(id, owner, Some(after));
            }
        }
    }

    /// Resolve every child of a container into a section from its current geometry.
    fn reassign_children(&mut self, owner: SessionId, container_id: ObjectId) {
        let Some(geometry) = self.scene().geometry(&container_id) else {
            return;
        };
        let sections = self.sections_for(&container_id, &geometry);
        let placed: Vec<(ObjectId, Geometry, Membership)> = {
            let scene = self.scene();
            scene
                .children_of(&container_id)
                .into_iter()
                .filter_map(|child| {
                    let current = scene.geometry(&child.id)?;
                    let (g, m) = container::resolve_membership(container_id, &current, &sections)?;
                    Some((child.id, g, m))
                })
                .collect()
        };
        for (id, geometry, membership) in placed {
            self.overlay.set_geometry(id, owner, geometry);
            self.overlay.set_membership(id, owner, Some(membership));
        }
    }

    /// Where `geometry` lands in the topmost container holding its center.
    fn drop_placement(
        &self,
        id: ObjectId,
        geometry: &Geometry,
        exclude: &BTreeSet<ObjectId>,
    ) -> Option<(Geometry, Membership)> {
        let scene = self.scene();
        let center = geometry.center();
        let (target, target_geometry) = scene
            .objects_top_down()
            .into_iter()
            .filter(|o| o.kind.is_container() && o.id != id && !exclude.contains(&o.id))
            .find_map(|o| scene.geometry(&o.id).filter(|g| g.contains(center)).map(|g| (o.id, g)))?;
        let sections = self.sections_for(&target, &target_geometry);
        container::resolve_membership(target, geometry, &sections)
    }

    /// Drop resolution for one dragged object.
    fn resolve_drop(&mut self, owner: SessionId, id: ObjectId, exclude: &BTreeSet<ObjectId>) {
        let Some(geometry) = self.scene().geometry(&id) else {
            return;
        };
        match self.drop_placement(id, &geometry, exclude) {
            Some((placed, membership)) => {
                self.overlay.set_geometry(id, owner, placed);
                self.overlay.set_membership(id, owner, Some(membership));
            }
            None if self.scene().membership(&id).is_some() => self.overlay.set_membership(id, owner, None),
            None => {}
        }
    }

    // =========================================================================
    // SPATIAL QUERIES
    // =========================================================================

    fn sync_index(&mut self) {
        let obstacles: Vec<Obstacle> = {
            let scene = Scene::new(&self.doc, &self.overlay);
            self.doc
                .sorted_objects()
                .into_iter()
                .filter_map(|o| Some(Obstacle { id: o.id, bounds: object_bounds(&scene, o, self.config.route)? }))
                .collect()
        };
        if self.index.sync(&obstacles) {
            debug!(obstacles = obstacles.len(), rebuilds = self.index.rebuild_count(), "obstacle index rebuilt");
        }
    }

    fn hit_at(&mut self, world: Point) -> Option<hit::Hit> {
        self.sync_index();
        let tolerance = self.camera.screen_dist_to_world(HANDLE_RADIUS_PX);
        let candidates =
            self.index.query_ids(&Bounds::from_corners(world, world), tolerance + OBSTACLE_SIGNATURE_STEP);
        let selection = self.selection();
        hit::hit_test(world, &self.scene(), &self.camera, &selection, &candidates, self.config.route)
    }

    /// Ids whose visual bounds intersect `rect`.
    fn objects_in_rect(&mut self, rect: &Bounds) -> Vec<ObjectId> {
        self.sync_index();
        let candidates = self.index.query_ids(rect, OBSTACLE_SIGNATURE_STEP);
        let scene = self.scene();
        candidates
            .into_iter()
            .filter(|id| {
                scene
                    .object(id)
                    .and_then(|o| object_bounds(&scene, o, self.config.route))
                    .is_some_and(|b| b.intersects(rect))
            })
            .collect()
    }

    /// Snap a dragged connector end to the nearest anchor in range.
    fn snap_end(&mut self, connector_id: ObjectId, world: Point) -> ConnectorEnd {
        self.sync_index();
        let radius = self.camera.screen_dist_to_world(self.config.snap_radius_px);
        let nearby: HashSet<ObjectId> = self
            .index
            .query_ids(&Bounds::from_corners(world, world), radius + OBSTACLE_SIGNATURE_STEP)
            .into_iter()
            .collect();
        let scene = self.scene();
        let candidates: Vec<(ObjectId, ObjectKind, Geometry)> = scene
            .objects_top_down()
            .into_iter()
            .filter(|o| nearby.contains(&o.id))
            .filter_map(|o| Some((o.id, o.kind, scene.geometry(&o.id)?)))
            .collect();
        connector::snap_endpoint(
            world,
            connector_id,
            candidates.iter().map(|(id, kind, g)| (*id, *kind, g)),
            self.config.snap_radius_px,
            self.camera.zoom,
        )
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn original(scene: &Scene<'_>, id: &ObjectId) -> Option<Original> {
    Some(Original {
        id: *id,
        geometry: scene.geometry(id)?,
        membership: scene.membership(id),
        connector: scene.connector_ends(id),
    })
}

fn write_kind(session: &InteractionSession) -> Option<WriteKind> {
    match session {
        InteractionSession::Idle | InteractionSession::Panning { .. } | InteractionSession::MarqueeSelecting { .. } => {
            None
        }
        InteractionSession::ObjectDragging { members, .. } => Some(if members.iter().any(|m| m.is_container) {
            WriteKind::ContainerMove
        } else {
            WriteKind::ObjectMove
        }),
        InteractionSession::Rotating { .. } => Some(WriteKind::Rotate),
        InteractionSession::CornerResizing { .. } | InteractionSession::LineEndpointResizing { .. } => {
            Some(WriteKind::Resize)
        }
        InteractionSession::ConnectorEndpointDragging { .. } => Some(WriteKind::ConnectorEndpoint),
    }
}

/// Visual bounds used for hit candidates and marquee tests.
fn object_bounds(scene: &Scene<'_>, object: &BoardObject, route: connector::RouteStyle) -> Option<Bounds> {
    if object.kind.is_connector() {
        let points = scene.connector_points(&object.id, route)?;
        return connector::path_bounds(&points, CONNECTOR_MARQUEE_PADDING);
    }
    scene.geometry(&object.id).map(|g| g.visual_bounds())
}

/// Pointer angle around `center`, in degrees.
fn pointer_angle(center: Point, pointer: Point) -> f64 {
    rad_to_deg((pointer.y - center.y).atan2(pointer.x - center.x))
}

/// Resize from `corner` with the opposite corner fixed in world space.
///
/// Works in the box's rotated local frame; sizes are clamped to
/// [`MIN_OBJECT_SIZE`] and optionally snapped to `snap_step`.
fn resize_from_corner(origin: &Geometry, corner: Corner, pointer: Point, snap_step: Option<f64>) -> Geometry {
    let zero = Point::new(0.0, 0.0);
    let (sx, sy) = corner.signs();
    let fixed = origin.to_world(Point::new(-sx * origin.width * 0.5, -sy * origin.height * 0.5));
    let local = rotate_point(pointer.sub(fixed), zero, -origin.rotation_deg);

    let mut width = (local.x * sx).max(MIN_OBJECT_SIZE);
    let mut height = (local.y * sy).max(MIN_OBJECT_SIZE);
    if let Some(step) = snap_step {
        width = round_to_step(width, step).max(MIN_OBJECT_SIZE);
        height = round_to_step(height, step).max(MIN_OBJECT_SIZE);
    }

    let half = rotate_point(Point::new(sx * width * 0.5, sy * height * 0.5), zero, origin.rotation_deg);
    let center = fixed.add(half);
    Geometry {
        x: center.x - width * 0.5,
        y: center.y - height * 0.5,
        width,
        height,
        rotation_deg: origin.rotation_deg,
    }
}

/// Move one end of a line, keeping the other end fixed.
fn drag_line_end(origin: &Geometry, end: LineEnd, pointer: Point) -> Geometry {
    let fixed = origin.line_endpoints()[end.opposite().index()];
    let line = Geometry::line_between(fixed, pointer, origin.height, MIN_OBJECT_SIZE);
    match end {
        LineEnd::End => line,
        // Built from the fixed end, so flip it to keep start and end in place.
        LineEnd::Start => line.with_rotation(line.rotation_deg + 180.0),
    }
}
