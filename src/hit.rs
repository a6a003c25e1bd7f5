//! Hit-testing: which object part lies under a world-space point.
//!
//! Handles of the single selected object are checked first (connector
//! endpoints, line endpoints, the rotate handle, then corners), then bodies
//! from the top of the stack down. Handle radii are screen-space constants
//! converted through the camera so they keep their on-screen size at any zoom.

#[cfg(test)]
#[path = "hit_test.rs"]
mod hit_test;

use std::collections::HashSet;

use crate::camera::Camera;
use crate::connector::{RouteStyle, distance_to_path};
use crate::consts::{HANDLE_RADIUS_PX, ROTATE_HANDLE_OFFSET_PX};
use crate::doc::{EndSide, ObjectId};
use crate::geom::{Geometry, Point, distance, distance_to_segment};
use crate::overlay::Scene;

/// Which part of an object was hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitPart {
    Body,
    ResizeHandle(Corner),
    RotateHandle,
    LineEndpoint(LineEnd),
    ConnectorEndpoint(EndSide),
    ConnectorBody,
}

/// A corner resize handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Corner {
    Nw,
    Ne,
    Se,
    Sw,
}

impl Corner {
    /// Same order as [`Geometry::corners`].
    pub const ALL: [Corner; 4] = [Corner::Nw, Corner::Ne, Corner::Se, Corner::Sw];

    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::Nw => Self::Se,
            Self::Ne => Self::Sw,
            Self::Se => Self::Nw,
            Self::Sw => Self::Ne,
        }
    }

    /// Index into [`Geometry::corners`].
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Self::Nw => 0,
            Self::Ne => 1,
            Self::Se => 2,
            Self::Sw => 3,
        }
    }

    /// Local-frame direction of this corner from the box center, per axis.
    #[must_use]
    pub fn signs(self) -> (f64, f64) {
        match self {
            Self::Nw => (-1.0, -1.0),
            Self::Ne => (1.0, -1.0),
            Self::Se => (1.0, 1.0),
            Self::Sw => (-1.0, 1.0),
        }
    }

    /// CSS cursor for an unrotated handle.
    #[must_use]
    pub fn cursor(self) -> &'static str {
        match self {
            Self::Nw | Self::Se => "nwse-resize",
            Self::Ne | Self::Sw => "nesw-resize",
        }
    }
}

/// Which end of a line object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEnd {
    Start,
    End,
}

impl LineEnd {
    /// Index into [`Geometry::line_endpoints`].
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Self::Start => 0,
            Self::End => 1,
        }
    }

    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::Start => Self::End,
            Self::End => Self::Start,
        }
    }
}

/// Result of a hit test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hit {
    pub object_id: ObjectId,
    pub part: HitPart,
}

/// World position of the rotate handle: above the top edge, rotated with the box.
#[must_use]
pub fn rotate_handle_position(geometry: &Geometry, camera: &Camera) -> Point {
    let offset = camera.screen_dist_to_world(ROTATE_HANDLE_OFFSET_PX);
    geometry.to_world(Point::new(0.0, -geometry.height * 0.5 - offset))
}

/// Test which object part is under `world`.
///
/// `candidates` restricts body tests (typically from the obstacle index);
/// the selected object's handles are always tested.
#[must_use]
pub fn hit_test(
    world: Point,
    scene: &Scene<'_>,
    camera: &Camera,
    selection: &[ObjectId],
    candidates: &[ObjectId],
    route: RouteStyle,
) -> Option<Hit> {
    let tolerance = camera.screen_dist_to_world(HANDLE_RADIUS_PX);

    if let [selected] = selection {
        if let Some(hit) = hit_handles(world, scene, camera, *selected, tolerance, route) {
            return Some(hit);
        }
    }

    let candidates: HashSet<&ObjectId> = candidates.iter().collect();
    for obj in scene.objects_top_down() {
        if !candidates.contains(&obj.id) {
            continue;
        }
        if obj.kind.is_connector() {
            let Some(points) = scene.connector_points(&obj.id, route) else {
                continue;
            };
            if distance_to_path(world, &points) <= tolerance {
                return Some(Hit { object_id: obj.id, part: HitPart::ConnectorBody });
            }
            continue;
        }
        let Some(geometry) = scene.geometry(&obj.id) else {
            continue;
        };
        let inside = if obj.kind.is_line() {
            let [a, b] = geometry.line_endpoints();
            distance_to_segment(world, a, b) <= tolerance.max(geometry.height * 0.5)
        } else {
            geometry.contains(world)
        };
        if inside {
            return Some(Hit { object_id: obj.id, part: HitPart::Body });
        }
    }
    None
}

fn hit_handles(
    world: Point,
    scene: &Scene<'_>,
    camera: &Camera,
    id: ObjectId,
    tolerance: f64,
    route: RouteStyle,
) -> Option<Hit> {
    let obj = scene.object(&id)?;
    let within = |p: Point| distance(world, p) <= tolerance;

    if obj.kind.is_connector() {
        let points = scene.connector_points(&id, route)?;
        if points.first().is_some_and(|p| within(*p)) {
            return Some(Hit { object_id: id, part: HitPart::ConnectorEndpoint(EndSide::From) });
        }
        if points.last().is_some_and(|p| within(*p)) {
            return Some(Hit { object_id: id, part: HitPart::ConnectorEndpoint(EndSide::To) });
        }
        return None;
    }

    let geometry = scene.geometry(&id)?;
    if obj.kind.is_line() {
        let endpoints = geometry.line_endpoints();
        for end in [LineEnd::Start, LineEnd::End] {
            if within(endpoints[end.index()]) {
                return Some(Hit { object_id: id, part: HitPart::LineEndpoint(end) });
            }
        }
        return None;
    }

    if within(rotate_handle_position(&geometry, camera)) {
        return Some(Hit { object_id: id, part: HitPart::RotateHandle });
    }
    let corners = geometry.corners();
    Corner::ALL
        .into_iter()
        .find(|c| within(corners[c.index()]))
        .map(|c| Hit { object_id: id, part: HitPart::ResizeHandle(c) })
}
