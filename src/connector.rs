//! Connector routing: anchor resolution, straight/elbow routes, rounded
//! paths, and endpoint snapping.
//!
//! DESIGN
//! ======
//! A connector stores only its two ends. Every drawable quantity (anchor
//! points, the route polyline, the rounded path, length and midpoint) is
//! derived on each query from the effective geometry of the shapes it is
//! attached to, so a dragged shape pulls its connectors along without any
//! connector write.
//!
//! Geometry lookups go through a caller-supplied closure. The engine passes
//! one that reads the draft overlay before the canonical store; tests pass a
//! plain map.
//!
//! TRADE-OFFS
//! ==========
//! Elbow routes are orthogonal three-to-five point polylines chosen from the
//! end directions alone. They do not avoid obstacles; the spatial index only
//! narrows hit-test and marquee candidates.

#[cfg(test)]
#[path = "connector_test.rs"]
mod connector_test;

use std::str::FromStr;

use crate::consts::{COLINEAR_EPSILON, CONNECTOR_ELBOW_STUB, MIN_ZOOM};
use crate::doc::{Anchor, ConnectorEnd, ConnectorEnds, ObjectId, ObjectKind};
use crate::geom::{Bounds, Geometry, Point, distance, distance_to_segment, rotate_point};

/// How a connector's polyline is laid out between its ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RouteStyle {
    /// Two points, end to end.
    Straight,
    /// Orthogonal polyline leaving attached ends along their anchor normals.
    #[default]
    Elbow,
}

impl FromStr for RouteStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "straight" => Ok(Self::Straight),
            "elbow" => Ok(Self::Elbow),
            other => Err(format!("unknown connector route `{other}`")),
        }
    }
}

/// One drawing command of a rounded connector path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathCommand {
    MoveTo(Point),
    LineTo(Point),
    /// Quadratic curve through control point `ctrl` ending at `to`.
    QuadTo { ctrl: Point, to: Point },
}

/// A connector end resolved to world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedEnd {
    pub point: Point,
    /// Outward unit normal of the anchor, present only for attached ends.
    pub normal: Option<Point>,
}

// =============================================================================
// ANCHORS
// =============================================================================

fn anchor_local(anchor: Anchor) -> Point {
    match anchor {
        Anchor::Top => Point::new(0.0, -1.0),
        Anchor::Right => Point::new(1.0, 0.0),
        Anchor::Bottom => Point::new(0.0, 1.0),
        Anchor::Left => Point::new(-1.0, 0.0),
    }
}

/// World position of an anchor: the matching edge midpoint, rotated with the shape.
#[must_use]
pub fn anchor_point(geometry: &Geometry, anchor: Anchor) -> Point {
    let dir = anchor_local(anchor);
    geometry.to_world(Point::new(dir.x * geometry.width * 0.5, dir.y * geometry.height * 0.5))
}

/// Outward unit normal of an anchor in world space.
#[must_use]
pub fn anchor_normal(geometry: &Geometry, anchor: Anchor) -> Point {
    rotate_point(anchor_local(anchor), Point::default(), geometry.rotation_deg)
}

/// Anchor pair for a new connector between two shapes: along the dominant
/// axis between their centers, each anchor facing the other shape.
#[must_use]
pub fn default_anchor_pair(from: &Geometry, to: &Geometry) -> (Anchor, Anchor) {
    let a = from.center();
    let b = to.center();
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    if dx.abs() >= dy.abs() {
        if dx >= 0.0 { (Anchor::Right, Anchor::Left) } else { (Anchor::Left, Anchor::Right) }
    } else if dy >= 0.0 {
        (Anchor::Bottom, Anchor::Top)
    } else {
        (Anchor::Top, Anchor::Bottom)
    }
}

/// Resolve one end. `None` when it is attached to an object the lookup cannot find.
pub fn resolve_end<F>(end: &ConnectorEnd, lookup: F) -> Option<ResolvedEnd>
where
    F: Fn(&ObjectId) -> Option<Geometry>,
{
    match end {
        ConnectorEnd::Free(p) => Some(ResolvedEnd { point: *p, normal: None }),
        ConnectorEnd::Attached { object_id, anchor } => {
            let geometry = lookup(object_id)?;
            Some(ResolvedEnd { point: anchor_point(&geometry, *anchor), normal: Some(anchor_normal(&geometry, *anchor)) })
        }
    }
}

/// Route polyline for both ends, or `None` if either end dangles.
pub fn connector_points<F>(ends: &ConnectorEnds, route: RouteStyle, lookup: F) -> Option<Vec<Point>>
where
    F: Fn(&ObjectId) -> Option<Geometry>,
{
    let from = resolve_end(&ends.from, &lookup)?;
    let to = resolve_end(&ends.to, &lookup)?;
    Some(route_points(from, to, route))
}

// =============================================================================
// ROUTING
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Horizontal,
    Vertical,
}

fn dominant_axis(v: Point) -> Axis {
    if v.x.abs() >= v.y.abs() { Axis::Horizontal } else { Axis::Vertical }
}

/// Lay out the route between two resolved ends.
#[must_use]
pub fn route_points(from: ResolvedEnd, to: ResolvedEnd, route: RouteStyle) -> Vec<Point> {
    match route {
        RouteStyle::Straight => vec![from.point, to.point],
        RouteStyle::Elbow => elbow_points(from, to),
    }
}

fn elbow_points(from: ResolvedEnd, to: ResolvedEnd) -> Vec<Point> {
    let start = stub_end(from);
    let end = stub_end(to);
    let start_axis = from.normal.map_or_else(|| dominant_axis(to.point.sub(from.point)), dominant_axis);
    let end_axis = to.normal.map_or_else(|| dominant_axis(from.point.sub(to.point)), dominant_axis);

    let mut points = vec![from.point, start];
    match (start_axis, end_axis) {
        (Axis::Horizontal, Axis::Horizontal) => {
            let mid_x = (start.x + end.x) * 0.5;
            points.push(Point::new(mid_x, start.y));
            points.push(Point::new(mid_x, end.y));
        }
        (Axis::Vertical, Axis::Vertical) => {
            let mid_y = (start.y + end.y) * 0.5;
            points.push(Point::new(start.x, mid_y));
            points.push(Point::new(end.x, mid_y));
        }
        (Axis::Horizontal, Axis::Vertical) => points.push(Point::new(end.x, start.y)),
        (Axis::Vertical, Axis::Horizontal) => points.push(Point::new(start.x, end.y)),
    }
    points.push(end);
    points.push(to.point);

    let deduped = dedup_points(&points);
    if deduped.len() < 2 { vec![from.point, to.point] } else { deduped }
}

fn stub_end(end: ResolvedEnd) -> Point {
    match end.normal {
        Some(n) => end.point.add(n.scale(CONNECTOR_ELBOW_STUB)),
        None => end.point,
    }
}

fn dedup_points(points: &[Point]) -> Vec<Point> {
    let mut out: Vec<Point> = Vec::with_capacity(points.len());
    for p in points {
        if out.last().is_none_or(|last| distance(*last, *p) > 1e-9) {
            out.push(*p);
        }
    }
    out
}

// =============================================================================
// PATHS
// =============================================================================

/// Turn a polyline into drawing commands with rounded corners.
///
/// Colinear interior vertices are passed through as straight segments. Every
/// other vertex is cut back on both sides by `min(radius, half the shorter
/// adjacent segment)` and joined with a quadratic whose control point is the
/// vertex itself.
#[must_use]
pub fn rounded_path(points: &[Point], radius: f64) -> Vec<PathCommand> {
    let Some((first, rest)) = points.split_first() else {
        return Vec::new();
    };
    let mut commands = vec![PathCommand::MoveTo(*first)];
    let Some((last, _)) = rest.split_last() else {
        return commands;
    };
    let radius = if radius.is_finite() { radius.max(0.0) } else { 0.0 };

    for window in points.windows(3) {
        let (prev, vertex, next) = (window[0], window[1], window[2]);
        let incoming = vertex.sub(prev);
        let outgoing = next.sub(vertex);
        let len_in = incoming.length();
        let len_out = outgoing.length();
        if len_in == 0.0 || len_out == 0.0 {
            commands.push(PathCommand::LineTo(vertex));
            continue;
        }
        let dir_in = incoming.scale(1.0 / len_in);
        let dir_out = outgoing.scale(1.0 / len_out);
        let cross = dir_in.x * dir_out.y - dir_in.y * dir_out.x;
        let r = radius.min(len_in * 0.5).min(len_out * 0.5);
        if cross.abs() <= COLINEAR_EPSILON || r <= 0.0 {
            commands.push(PathCommand::LineTo(vertex));
            continue;
        }
        commands.push(PathCommand::LineTo(vertex.sub(dir_in.scale(r))));
        commands.push(PathCommand::QuadTo { ctrl: vertex, to: vertex.add(dir_out.scale(r)) });
    }
    commands.push(PathCommand::LineTo(*last));
    commands
}

/// Total length of a polyline.
#[must_use]
pub fn path_length(points: &[Point]) -> f64 {
    points.windows(2).map(|w| distance(w[0], w[1])).sum()
}

/// Point at half the polyline's length. `None` for an empty polyline.
#[must_use]
pub fn path_midpoint(points: &[Point]) -> Option<Point> {
    let first = *points.first()?;
    let half = path_length(points) * 0.5;
    let mut walked = 0.0;
    for w in points.windows(2) {
        let seg = distance(w[0], w[1]);
        if seg > 0.0 && walked + seg >= half {
            let t = (half - walked) / seg;
            return Some(w[0].add(w[1].sub(w[0]).scale(t)));
        }
        walked += seg;
    }
    Some(first)
}

/// Shortest distance from `p` to any segment of the polyline.
#[must_use]
pub fn distance_to_path(p: Point, points: &[Point]) -> f64 {
    match points {
        [] => f64::INFINITY,
        [only] => distance(p, *only),
        _ => points.windows(2).map(|w| distance_to_segment(p, w[0], w[1])).fold(f64::INFINITY, f64::min),
    }
}

/// Axis-aligned bounds of the polyline, padded for marquee selection.
#[must_use]
pub fn path_bounds(points: &[Point], padding: f64) -> Option<Bounds> {
    Bounds::from_points(points).map(|b| b.expand(padding))
}

// =============================================================================
// SNAPPING
// =============================================================================

/// An anchor within snapping range of the pointer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnapTarget {
    pub object_id: ObjectId,
    pub anchor: Anchor,
    pub point: Point,
    pub distance: f64,
}

/// Anchors within `radius_px / zoom` of `pointer`, nearest first.
///
/// Connectors and the connector being edited (`self_id`) are never targets.
/// Ties keep candidate order, so callers iterate objects top-most first.
pub fn snap_targets<'a, I>(pointer: Point, self_id: ObjectId, candidates: I, radius_px: f64, zoom: f64) -> Vec<SnapTarget>
where
    I: IntoIterator<Item = (ObjectId, ObjectKind, &'a Geometry)>,
{
    let radius = radius_px.max(0.0) / zoom.max(MIN_ZOOM);
    let mut targets: Vec<SnapTarget> = candidates
        .into_iter()
        .filter(|(id, kind, _)| *id != self_id && kind.is_attachable())
        .flat_map(|(object_id, _, geometry)| {
            Anchor::ALL.into_iter().map(move |anchor| {
                let point = anchor_point(geometry, anchor);
                SnapTarget { object_id, anchor, point, distance: distance(pointer, point) }
            })
        })
        .filter(|t| t.distance <= radius)
        .collect();
    targets.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    targets
}

/// The end a dragged endpoint lands on: the nearest anchor in range, else a
/// free end at the pointer.
pub fn snap_endpoint<'a, I>(pointer: Point, self_id: ObjectId, candidates: I, radius_px: f64, zoom: f64) -> ConnectorEnd
where
    I: IntoIterator<Item = (ObjectId, ObjectKind, &'a Geometry)>,
{
    snap_targets(pointer, self_id, candidates, radius_px, zoom)
        .first()
        .map_or(ConnectorEnd::Free(pointer), |t| ConnectorEnd::Attached { object_id: t.object_id, anchor: t.anchor })
}
