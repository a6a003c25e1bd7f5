//! Document model: board objects, their wire format, and the canonical store.
//!
//! This module defines what is on the canvas (`BoardObject`, `ObjectKind`),
//! the flat camelCase record exchanged with the shared store (`WireObject`),
//! a sparse-update type for outgoing writes (`PartialBoardObject`), and the
//! runtime store that owns the canonical object list (`DocStore`).
//!
//! Snapshot entries arrive as JSON. Each entry is decoded and validated on its
//! own; a malformed entry produces a [`SnapshotError`] and is skipped while the
//! rest of the snapshot still applies.

#[cfg(test)]
#[path = "doc_test.rs"]
mod doc_test;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use uuid::Uuid;

use crate::error::ErrorCode;
use crate::geom::{Geometry, Point, clamp, normalize_degrees};

/// Unique identifier for a board object.
pub type ObjectId = Uuid;

// =============================================================================
// KINDS
// =============================================================================

/// The kind of a board object. Serialized as the persisted `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ObjectKind {
    Sticky,
    Rect,
    Circle,
    Triangle,
    Star,
    /// Straight segment along the box's horizontal center line.
    Line,
    /// Grid container hosting child objects in rows × cols sections.
    GridContainer,
    ConnectorUndirected,
    ConnectorArrow,
    ConnectorBidirectional,
}

/// Arrowhead style of a connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorStyle {
    Undirected,
    Arrow,
    Bidirectional,
}

impl ObjectKind {
    #[must_use]
    pub fn is_connector(self) -> bool {
        self.connector_style().is_some()
    }

    #[must_use]
    pub fn is_container(self) -> bool {
        self == Self::GridContainer
    }

    #[must_use]
    pub fn is_line(self) -> bool {
        self == Self::Line
    }

    /// Whether the object can be a connector attachment target.
    #[must_use]
    pub fn is_attachable(self) -> bool {
        !self.is_connector()
    }

    /// Whether the object may live inside a grid container.
    #[must_use]
    pub fn can_join_container(self) -> bool {
        !self.is_connector() && !self.is_container()
    }

    /// Whether corner resizes of this kind snap to the grid step.
    #[must_use]
    pub fn is_snap_eligible(self) -> bool {
        matches!(self, Self::Sticky | Self::Rect | Self::Circle | Self::Triangle | Self::Star | Self::GridContainer)
    }

    #[must_use]
    pub fn connector_style(self) -> Option<ConnectorStyle> {
        match self {
            Self::ConnectorUndirected => Some(ConnectorStyle::Undirected),
            Self::ConnectorArrow => Some(ConnectorStyle::Arrow),
            Self::ConnectorBidirectional => Some(ConnectorStyle::Bidirectional),
            _ => None,
        }
    }

    #[must_use]
    pub fn for_connector(style: ConnectorStyle) -> Self {
        match style {
            ConnectorStyle::Undirected => Self::ConnectorUndirected,
            ConnectorStyle::Arrow => Self::ConnectorArrow,
            ConnectorStyle::Bidirectional => Self::ConnectorBidirectional,
        }
    }
}

// =============================================================================
// FIELD GROUPS
// =============================================================================

/// One of the four attachment points on a shape's edge midpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Anchor {
    Top,
    Right,
    Bottom,
    Left,
}

impl Anchor {
    pub const ALL: [Anchor; 4] = [Anchor::Top, Anchor::Right, Anchor::Bottom, Anchor::Left];
}

/// A connector endpoint: attached to an object's anchor, or free on the canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConnectorEnd {
    Attached { object_id: ObjectId, anchor: Anchor },
    Free(Point),
}

impl ConnectorEnd {
    #[must_use]
    pub fn attached_to(&self) -> Option<ObjectId> {
        match self {
            Self::Attached { object_id, .. } => Some(*object_id),
            Self::Free(_) => None,
        }
    }
}

/// Which end of a connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndSide {
    From,
    To,
}

impl EndSide {
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::From => Self::To,
            Self::To => Self::From,
        }
    }
}

/// Both endpoints of a connector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConnectorEnds {
    pub from: ConnectorEnd,
    pub to: ConnectorEnd,
}

impl ConnectorEnds {
    #[must_use]
    pub fn get(&self, side: EndSide) -> ConnectorEnd {
        match side {
            EndSide::From => self.from,
            EndSide::To => self.to,
        }
    }

    pub fn set(&mut self, side: EndSide, end: ConnectorEnd) {
        match side {
            EndSide::From => self.from = end,
            EndSide::To => self.to = end,
        }
    }
}

/// Container-only fields.
#[derive(Debug, Clone, PartialEq)]
pub struct GridFields {
    pub rows: u32,
    pub cols: u32,
    pub gap: f64,
    pub cell_colors: Vec<String>,
    pub title: String,
    pub section_titles: Vec<String>,
    pub section_notes: Vec<String>,
}

impl GridFields {
    #[must_use]
    pub fn new(rows: u32, cols: u32, gap: f64) -> Self {
        Self {
            rows: rows.max(1),
            cols: cols.max(1),
            gap: gap.max(0.0),
            cell_colors: Vec::new(),
            title: String::new(),
            section_titles: Vec::new(),
            section_notes: Vec::new(),
        }
    }

    /// Number of sections (`rows * cols`).
    #[must_use]
    pub fn section_count(&self) -> usize {
        self.rows.max(1) as usize * self.cols.max(1) as usize
    }
}

/// Where a child object sits inside a container.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Membership {
    pub container_id: ObjectId,
    pub section_index: usize,
    /// Child center relative to the section, in `[0, 1]`.
    pub rel_x: f64,
    pub rel_y: f64,
}

impl Membership {
    #[must_use]
    pub fn new(container_id: ObjectId, section_index: usize, rel_x: f64, rel_y: f64) -> Self {
        Self { container_id, section_index, rel_x: clamp(rel_x, 0.0, 1.0), rel_y: clamp(rel_y, 0.0, 1.0) }
    }
}

// =============================================================================
// BOARD OBJECT
// =============================================================================

/// A validated board object as held in the canonical store.
#[derive(Debug, Clone, PartialEq)]
pub struct BoardObject {
    pub id: ObjectId,
    pub kind: ObjectKind,
    pub geometry: Geometry,
    pub color: String,
    pub text: String,
    /// Stacking order; lower values are drawn beneath higher values.
    pub z_index: i64,
    /// Present only on grid containers.
    pub grid: Option<GridFields>,
    /// Present only on objects placed inside a container.
    pub membership: Option<Membership>,
    /// Present only on connectors.
    pub connector: Option<ConnectorEnds>,
}

impl BoardObject {
    /// A plain shape with default color and no text.
    #[must_use]
    pub fn shape(kind: ObjectKind, geometry: Geometry) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            geometry,
            color: default_color(kind).to_owned(),
            text: String::new(),
            z_index: 0,
            grid: kind.is_container().then(|| GridFields::new(1, 1, crate::consts::DEFAULT_GRID_GAP)),
            membership: None,
            connector: None,
        }
    }

    /// A grid container with the given dimensions.
    #[must_use]
    pub fn container(geometry: Geometry, rows: u32, cols: u32, gap: f64) -> Self {
        let mut obj = Self::shape(ObjectKind::GridContainer, geometry);
        obj.grid = Some(GridFields::new(rows, cols, gap));
        obj
    }

    /// A connector between two endpoints. Its stored box is nominal; the drawn
    /// path is always derived from the endpoints.
    #[must_use]
    pub fn connector(style: ConnectorStyle, from: ConnectorEnd, to: ConnectorEnd) -> Self {
        let mut obj = Self::shape(ObjectKind::for_connector(style), Geometry::new(0.0, 0.0, 1.0, 1.0));
        obj.connector = Some(ConnectorEnds { from, to });
        obj
    }

    /// Convert to the flat persisted record.
    #[must_use]
    pub fn to_wire(&self) -> WireObject {
        let mut wire = WireObject {
            id: Some(self.id),
            kind: Some(self.kind),
            x: Some(self.geometry.x),
            y: Some(self.geometry.y),
            width: Some(self.geometry.width),
            height: Some(self.geometry.height),
            rotation_deg: Some(self.geometry.rotation_deg),
            color: Some(self.color.clone()),
            text: Some(self.text.clone()),
            z_index: Some(self.z_index),
            ..WireObject::default()
        };
        if let Some(grid) = &self.grid {
            wire.grid_rows = Some(grid.rows);
            wire.grid_cols = Some(grid.cols);
            wire.grid_gap = Some(grid.gap);
            wire.grid_cell_colors = Some(grid.cell_colors.clone());
            wire.container_title = Some(grid.title.clone());
            wire.grid_section_titles = Some(grid.section_titles.clone());
            wire.grid_section_notes = Some(grid.section_notes.clone());
        }
        if let Some(m) = &self.membership {
            wire.container_id = Some(m.container_id);
            wire.container_section_index = Some(m.section_index);
            wire.container_rel_x = Some(m.rel_x);
            wire.container_rel_y = Some(m.rel_y);
        }
        if let Some(ends) = &self.connector {
            match ends.from {
                ConnectorEnd::Attached { object_id, anchor } => {
                    wire.from_object_id = Some(object_id);
                    wire.from_anchor = Some(anchor);
                }
                ConnectorEnd::Free(p) => {
                    wire.from_x = Some(p.x);
                    wire.from_y = Some(p.y);
                }
            }
            match ends.to {
                ConnectorEnd::Attached { object_id, anchor } => {
                    wire.to_object_id = Some(object_id);
                    wire.to_anchor = Some(anchor);
                }
                ConnectorEnd::Free(p) => {
                    wire.to_x = Some(p.x);
                    wire.to_y = Some(p.y);
                }
            }
        }
        wire
    }
}

fn default_color(kind: ObjectKind) -> &'static str {
    match kind {
        ObjectKind::Sticky => "#FDE68A",
        ObjectKind::GridContainer => "#F4F1EA",
        ObjectKind::Line
        | ObjectKind::ConnectorUndirected
        | ObjectKind::ConnectorArrow
        | ObjectKind::ConnectorBidirectional => "#1F1A17",
        ObjectKind::Rect | ObjectKind::Circle | ObjectKind::Triangle | ObjectKind::Star => "#D94B4B",
    }
}

// =============================================================================
// WIRE FORMAT
// =============================================================================

/// Flat persisted record, exactly as stored in the shared document store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireObject {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ObjectKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation_deg: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z_index: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid_rows: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid_cols: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid_gap: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid_cell_colors: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid_section_titles: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid_section_notes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_id: Option<ObjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_section_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_rel_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_rel_y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_object_id: Option<ObjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_anchor: Option<Anchor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_object_id: Option<ObjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_anchor: Option<Anchor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_y: Option<f64>,
}

/// Why a snapshot entry was rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SnapshotError {
    #[error("snapshot entry could not be decoded: {0}")]
    Decode(String),
    #[error("snapshot entry is missing required field `{0}`")]
    MissingField(&'static str),
    #[error("object {id}: invalid geometry ({reason})")]
    InvalidGeometry { id: ObjectId, reason: &'static str },
    #[error("connector {id}: {side:?} endpoint has neither an attachment nor coordinates")]
    MissingEndpoint { id: ObjectId, side: EndSide },
}

impl ErrorCode for SnapshotError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Decode(_) => "E_SNAPSHOT_DECODE",
            Self::MissingField(_) => "E_SNAPSHOT_MISSING_FIELD",
            Self::InvalidGeometry { .. } => "E_SNAPSHOT_GEOMETRY",
            Self::MissingEndpoint { .. } => "E_SNAPSHOT_ENDPOINT",
        }
    }
}

impl TryFrom<WireObject> for BoardObject {
    type Error = SnapshotError;

    fn try_from(wire: WireObject) -> Result<Self, Self::Error> {
        let id = wire.id.ok_or(SnapshotError::MissingField("id"))?;
        let kind = wire.kind.ok_or(SnapshotError::MissingField("type"))?;
        let x = wire.x.ok_or(SnapshotError::MissingField("x"))?;
        let y = wire.y.ok_or(SnapshotError::MissingField("y"))?;
        if !x.is_finite() || !y.is_finite() {
            return Err(SnapshotError::InvalidGeometry { id, reason: "non-finite position" });
        }

        // Connector boxes are nominal, so a missing or degenerate size is tolerated.
        let (width, height) = if kind.is_connector() {
            (positive_or(wire.width, 1.0), positive_or(wire.height, 1.0))
        } else {
            let width = wire.width.ok_or(SnapshotError::MissingField("width"))?;
            let height = wire.height.ok_or(SnapshotError::MissingField("height"))?;
            if !(width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0) {
                return Err(SnapshotError::InvalidGeometry { id, reason: "width and height must be positive" });
            }
            (width, height)
        };

        let geometry = Geometry::new(x, y, width, height).with_rotation(wire.rotation_deg.unwrap_or(0.0));

        let grid = kind.is_container().then(|| GridFields {
            rows: wire.grid_rows.unwrap_or(1).max(1),
            cols: wire.grid_cols.unwrap_or(1).max(1),
            gap: wire
                .grid_gap
                .filter(|g| g.is_finite())
                .unwrap_or(crate::consts::DEFAULT_GRID_GAP)
                .max(0.0),
            cell_colors: wire.grid_cell_colors.unwrap_or_default(),
            title: wire.container_title.unwrap_or_default(),
            section_titles: wire.grid_section_titles.unwrap_or_default(),
            section_notes: wire.grid_section_notes.unwrap_or_default(),
        });

        let membership = match (kind.can_join_container(), wire.container_id) {
            (true, Some(container_id)) => Some(Membership::new(
                container_id,
                wire.container_section_index.unwrap_or(0),
                finite_or(wire.container_rel_x, 0.5),
                finite_or(wire.container_rel_y, 0.5),
            )),
            _ => None,
        };

        let connector = if kind.is_connector() {
            let from = wire_end(wire.from_object_id, wire.from_anchor, wire.from_x, wire.from_y)
                .ok_or(SnapshotError::MissingEndpoint { id, side: EndSide::From })?;
            let to = wire_end(wire.to_object_id, wire.to_anchor, wire.to_x, wire.to_y)
                .ok_or(SnapshotError::MissingEndpoint { id, side: EndSide::To })?;
            Some(ConnectorEnds { from, to })
        } else {
            None
        };

        Ok(BoardObject {
            id,
            kind,
            geometry,
            color: wire.color.unwrap_or_else(|| default_color(kind).to_owned()),
            text: wire.text.unwrap_or_default(),
            z_index: wire.z_index.unwrap_or(0),
            grid,
            membership,
            connector,
        })
    }
}

fn positive_or(value: Option<f64>, fallback: f64) -> f64 {
    value.filter(|v| v.is_finite() && *v > 0.0).unwrap_or(fallback)
}

fn finite_or(value: Option<f64>, fallback: f64) -> f64 {
    value.filter(|v| v.is_finite()).unwrap_or(fallback)
}

fn wire_end(object_id: Option<ObjectId>, anchor: Option<Anchor>, x: Option<f64>, y: Option<f64>) -> Option<ConnectorEnd> {
    if let Some(object_id) = object_id {
        return Some(ConnectorEnd::Attached { object_id, anchor: anchor.unwrap_or(Anchor::Right) });
    }
    match (x, y) {
        (Some(x), Some(y)) if x.is_finite() && y.is_finite() => Some(ConnectorEnd::Free(Point::new(x, y))),
        _ => None,
    }
}

/// Decode and validate a single snapshot entry.
///
/// # Errors
///
/// Returns a [`SnapshotError`] when the entry cannot be decoded or fails validation.
pub fn parse_object(value: &Value) -> Result<BoardObject, SnapshotError> {
    let wire = WireObject::deserialize(value).map_err(|e| SnapshotError::Decode(e.to_string()))?;
    BoardObject::try_from(wire)
}

/// Decode a full snapshot, splitting it into valid objects and per-entry errors.
#[must_use]
pub fn parse_snapshot(values: &[Value]) -> (Vec<BoardObject>, Vec<SnapshotError>) {
    let mut objects = Vec::with_capacity(values.len());
    let mut errors = Vec::new();
    for value in values {
        match parse_object(value) {
            Ok(obj) => objects.push(obj),
            Err(e) => errors.push(e),
        }
    }
    (objects, errors)
}

// =============================================================================
// PARTIAL UPDATES
// =============================================================================

/// Membership change carried by a partial update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MembershipUpdate {
    Set(Membership),
    Clear,
}

/// Sparse update for a board object. Only present fields are applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialBoardObject {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub rotation_deg: Option<f64>,
    pub z_index: Option<i64>,
    pub color: Option<String>,
    pub text: Option<String>,
    pub grid: Option<GridFields>,
    pub membership: Option<MembershipUpdate>,
    pub from: Option<ConnectorEnd>,
    pub to: Option<ConnectorEnd>,
}

impl PartialBoardObject {
    /// Position-only update.
    #[must_use]
    pub fn position(x: f64, y: f64) -> Self {
        Self { x: Some(x), y: Some(y), ..Self::default() }
    }

    /// Full geometry update (position, size, rotation).
    #[must_use]
    pub fn geometry(g: &Geometry) -> Self {
        Self {
            x: Some(g.x),
            y: Some(g.y),
            width: Some(g.width),
            height: Some(g.height),
            rotation_deg: Some(g.rotation_deg),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Whether the update carries anything besides plain numeric geometry.
    #[must_use]
    pub fn has_structural_fields(&self) -> bool {
        self.membership.is_some()
            || self.from.is_some()
            || self.to.is_some()
            || self.grid.is_some()
            || self.color.is_some()
            || self.text.is_some()
            || self.z_index.is_some()
    }

    /// Overlay `other` on top of `self`; fields present in `other` win.
    pub fn merge(&mut self, other: &PartialBoardObject) {
        merge_field(&mut self.x, other.x);
        merge_field(&mut self.y, other.y);
        merge_field(&mut self.width, other.width);
        merge_field(&mut self.height, other.height);
        merge_field(&mut self.rotation_deg, other.rotation_deg);
        merge_field(&mut self.z_index, other.z_index);
        merge_field(&mut self.membership, other.membership);
        merge_field(&mut self.from, other.from);
        merge_field(&mut self.to, other.to);
        if other.color.is_some() {
            self.color.clone_from(&other.color);
        }
        if other.text.is_some() {
            self.text.clone_from(&other.text);
        }
        if other.grid.is_some() {
            self.grid.clone_from(&other.grid);
        }
    }

    /// Flat persisted field map. Cleared membership and swapped endpoint
    /// representations are written as explicit nulls so the store drops them.
    #[must_use]
    pub fn to_wire_fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        put(&mut fields, "x", self.x);
        put(&mut fields, "y", self.y);
        put(&mut fields, "width", self.width);
        put(&mut fields, "height", self.height);
        put(&mut fields, "rotationDeg", self.rotation_deg);
        put(&mut fields, "zIndex", self.z_index);
        put(&mut fields, "color", self.color.clone());
        put(&mut fields, "text", self.text.clone());
        if let Some(grid) = &self.grid {
            fields.insert("gridRows".into(), json!(grid.rows));
            fields.insert("gridCols".into(), json!(grid.cols));
            fields.insert("gridGap".into(), json!(grid.gap));
            fields.insert("gridCellColors".into(), json!(grid.cell_colors));
            fields.insert("containerTitle".into(), json!(grid.title));
            fields.insert("gridSectionTitles".into(), json!(grid.section_titles));
            fields.insert("gridSectionNotes".into(), json!(grid.section_notes));
        }
        match self.membership {
            Some(MembershipUpdate::Set(m)) => {
                fields.insert("containerId".into(), json!(m.container_id));
                fields.insert("containerSectionIndex".into(), json!(m.section_index));
                fields.insert("containerRelX".into(), json!(m.rel_x));
                fields.insert("containerRelY".into(), json!(m.rel_y));
            }
            Some(MembershipUpdate::Clear) => {
                for key in ["containerId", "containerSectionIndex", "containerRelX", "containerRelY"] {
                    fields.insert(key.into(), Value::Null);
                }
            }
            None => {}
        }
        if let Some(end) = self.from {
            put_end(&mut fields, "from", end);
        }
        if let Some(end) = self.to {
            put_end(&mut fields, "to", end);
        }
        fields
    }
}

fn merge_field<T: Copy>(slot: &mut Option<T>, incoming: Option<T>) {
    if incoming.is_some() {
        *slot = incoming;
    }
}

fn put<T: Serialize>(fields: &mut Map<String, Value>, key: &str, value: Option<T>) {
    if let Some(v) = value {
        fields.insert(key.to_owned(), json!(v));
    }
}

fn put_end(fields: &mut Map<String, Value>, prefix: &str, end: ConnectorEnd) {
    let (object_id, anchor, x, y) = match end {
        ConnectorEnd::Attached { object_id, anchor } => (json!(object_id), json!(anchor), Value::Null, Value::Null),
        ConnectorEnd::Free(p) => (Value::Null, Value::Null, json!(p.x), json!(p.y)),
    };
    fields.insert(format!("{prefix}ObjectId"), object_id);
    fields.insert(format!("{prefix}Anchor"), anchor);
    fields.insert(format!("{prefix}X"), x);
    fields.insert(format!("{prefix}Y"), y);
}

// =============================================================================
// STORE
// =============================================================================

/// In-memory canonical store of board objects.
pub struct DocStore {
    objects: HashMap<ObjectId, BoardObject>,
}

impl DocStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self { objects: HashMap::new() }
    }

    /// Insert or replace an object.
    pub fn insert(&mut self, obj: BoardObject) {
        self.objects.insert(obj.id, obj);
    }

    /// Remove an object by id, returning it if it was present.
    pub fn remove(&mut self, id: &ObjectId) -> Option<BoardObject> {
        self.objects.remove(id)
    }

    #[must_use]
    pub fn get(&self, id: &ObjectId) -> Option<&BoardObject> {
        self.objects.get(id)
    }

    #[must_use]
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.objects.contains_key(id)
    }

    /// Apply a partial update to an existing object. Returns false if the object doesn't exist.
    pub fn apply_partial(&mut self, id: &ObjectId, partial: &PartialBoardObject) -> bool {
        let Some(obj) = self.objects.get_mut(id) else {
            return false;
        };
        if let Some(x) = partial.x {
            obj.geometry.x = x;
        }
        if let Some(y) = partial.y {
            obj.geometry.y = y;
        }
        if let Some(w) = partial.width.filter(|w| *w > 0.0) {
            obj.geometry.width = w;
        }
        if let Some(h) = partial.height.filter(|h| *h > 0.0) {
            obj.geometry.height = h;
        }
        if let Some(r) = partial.rotation_deg {
            obj.geometry.rotation_deg = normalize_degrees(r);
        }
        if let Some(z) = partial.z_index {
            obj.z_index = z;
        }
        if let Some(color) = &partial.color {
            obj.color.clone_from(color);
        }
        if let Some(text) = &partial.text {
            obj.text.clone_from(text);
        }
        if let Some(grid) = &partial.grid {
            if obj.kind.is_container() {
                obj.grid = Some(grid.clone());
            }
        }
        match partial.membership {
            Some(MembershipUpdate::Set(m)) if obj.kind.can_join_container() => obj.membership = Some(m),
            Some(MembershipUpdate::Clear) => obj.membership = None,
            _ => {}
        }
        if let Some(ends) = obj.connector.as_mut() {
            if let Some(from) = partial.from {
                ends.from = from;
            }
            if let Some(to) = partial.to {
                ends.to = to;
            }
        }
        true
    }

    /// Replace all objects with a full snapshot.
    pub fn load_snapshot(&mut self, objects: Vec<BoardObject>) {
        self.objects.clear();
        for obj in objects {
            self.objects.insert(obj.id, obj);
        }
    }

    /// Return all objects sorted by `(z_index, id)` for draw-order.
    #[must_use]
    pub fn sorted_objects(&self) -> Vec<&BoardObject> {
        let mut objs: Vec<&BoardObject> = self.objects.values().collect();
        objs.sort_by(|a, b| a.z_index.cmp(&b.z_index).then_with(|| a.id.cmp(&b.id)));
        objs
    }

    /// Objects whose membership points at `container_id`, in draw order.
    #[must_use]
    pub fn children_of(&self, container_id: &ObjectId) -> Vec<&BoardObject> {
        self.sorted_objects()
            .into_iter()
            .filter(|o| o.membership.is_some_and(|m| m.container_id == *container_id))
            .collect()
    }

    /// Connectors with at least one end attached to `object_id`.
    #[must_use]
    pub fn connectors_attached_to(&self, object_id: &ObjectId) -> Vec<&BoardObject> {
        self.sorted_objects()
            .into_iter()
            .filter(|o| {
                o.connector.is_some_and(|ends| {
                    ends.from.attached_to() == Some(*object_id) || ends.to.attached_to() == Some(*object_id)
                })
            })
            .collect()
    }

    /// Highest z-index currently in use, or `-1` for an empty board.
    #[must_use]
    pub fn max_z_index(&self) -> i64 {
        self.objects.values().map(|o| o.z_index).max().unwrap_or(-1)
    }

    /// Number of objects currently in the store.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Returns `true` if the store contains no objects.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl Default for DocStore {
    fn default() -> Self {
        Self::new()
    }
}
