//! Grid container membership: section layout, point-to-section assignment,
//! and relative-coordinate conversion for the objects a container hosts.
//!
//! Sections are derived on demand from the container's geometry and grid
//! fields; nothing here is persisted. Every function resolves degenerate
//! input (tiny containers, oversized children, out-of-range indices) to a
//! defined fallback instead of failing.

#[cfg(test)]
#[path = "container_test.rs"]
mod container_test;

use crate::doc::{GridFields, Membership, ObjectId};
use crate::geom::{Bounds, Geometry, Point, clamp, distance};

/// A derived section rectangle inside a container.
pub type ContainerSection = Bounds;

/// Layout parameters for a container's grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSpec {
    pub rows: u32,
    pub cols: u32,
    pub gap: f64,
    pub padding: f64,
}

impl GridSpec {
    #[must_use]
    pub fn new(rows: u32, cols: u32, gap: f64, padding: f64) -> Self {
        Self { rows, cols, gap, padding }
    }

    #[must_use]
    pub fn from_fields(grid: &GridFields, padding: f64) -> Self {
        Self { rows: grid.rows, cols: grid.cols, gap: grid.gap, padding }
    }
}

/// Compute the `rows * cols` equal-size sections of a container, row-major.
///
/// The inner area never collapses below one world unit per axis, so even a
/// zero-size container yields usable (tiny) sections.
#[must_use]
pub fn section_bounds(geometry: &Geometry, grid: GridSpec) -> Vec<ContainerSection> {
    let rows = grid.rows.max(1);
    let cols = grid.cols.max(1);
    let gap = if grid.gap.is_finite() { grid.gap.max(0.0) } else { 0.0 };
    let padding = if grid.padding.is_finite() { grid.padding.max(0.0) } else { 0.0 };

    let inner_width = (geometry.width - 2.0 * padding - gap * f64::from(cols - 1)).max(1.0);
    let inner_height = (geometry.height - 2.0 * padding - gap * f64::from(rows - 1)).max(1.0);
    let cell_width = inner_width / f64::from(cols);
    let cell_height = inner_height / f64::from(rows);

    let mut sections = Vec::with_capacity(rows as usize * cols as usize);
    for row in 0..rows {
        for col in 0..cols {
            let left = geometry.x + padding + f64::from(col) * (cell_width + gap);
            let top = geometry.y + padding + f64::from(row) * (cell_height + gap);
            sections.push(Bounds { left, top, right: left + cell_width, bottom: top + cell_height });
        }
    }
    sections
}

/// Index of the section containing `point`, else of the section whose center
/// is nearest. `None` only when `sections` is empty.
#[must_use]
pub fn section_for_point(point: Point, sections: &[ContainerSection]) -> Option<usize> {
    if let Some(index) = sections.iter().position(|s| s.contains(point)) {
        return Some(index);
    }
    let mut best: Option<(usize, f64)> = None;
    for (index, section) in sections.iter().enumerate() {
        let d = distance(point, section.center());
        // Strict comparison keeps the lowest index on ties.
        if best.is_none_or(|(_, best_d)| d < best_d) {
            best = Some((index, d));
        }
    }
    best.map(|(index, _)| index)
}

/// Position of `center` relative to the section, clamped to `[0, 1]` per axis.
#[must_use]
pub fn to_relative(center: Point, section: &ContainerSection) -> (f64, f64) {
    (relative_axis(center.x, section.left, section.width()), relative_axis(center.y, section.top, section.height()))
}

fn relative_axis(value: f64, start: f64, size: f64) -> f64 {
    if size <= 0.0 {
        return 0.5;
    }
    clamp((value - start) / size, 0.0, 1.0)
}

/// Inverse of [`to_relative`]: the world point at `(rel_x, rel_y)` inside the section.
#[must_use]
pub fn from_relative(rel_x: f64, rel_y: f64, section: &ContainerSection) -> Point {
    Point {
        x: section.left + clamp(rel_x, 0.0, 1.0) * section.width(),
        y: section.top + clamp(rel_y, 0.0, 1.0) * section.height(),
    }
}

/// Clamp a preferred top-left so a `width x height` footprint stays inside the
/// section. On an axis where the object is larger than the section, the object
/// is centered on the section instead.
#[must_use]
pub fn clamp_top_left(section: &ContainerSection, width: f64, height: f64, preferred: Point) -> Point {
    Point {
        x: clamp_axis(preferred.x, section.left, section.width(), width),
        y: clamp_axis(preferred.y, section.top, section.height(), height),
    }
}

fn clamp_axis(preferred: f64, start: f64, section_size: f64, object_size: f64) -> f64 {
    if object_size > section_size {
        return start + (section_size - object_size) * 0.5;
    }
    clamp(preferred, start, start + section_size - object_size)
}

/// Place a child whose relative position is known into `section`, keeping its size.
#[must_use]
pub fn place_in_section(child: &Geometry, rel_x: f64, rel_y: f64, section: &ContainerSection) -> Geometry {
    let center = from_relative(rel_x, rel_y, section);
    let preferred = Point::new(center.x - child.width * 0.5, center.y - child.height * 0.5);
    let top_left = clamp_top_left(section, child.width, child.height, preferred);
    Geometry { x: top_left.x, y: top_left.y, ..*child }
}

/// Re-project a child onto a container's (possibly new) sections at the same
/// section index, clamped into range, preserving its relative coordinates.
///
/// Used both for grid dimension changes and for carrying children while the
/// container itself is dragged or resized. Returns `None` if there are no sections.
#[must_use]
pub fn reproject_child(
    child: &Geometry,
    membership: &Membership,
    sections: &[ContainerSection],
) -> Option<(Geometry, Membership)> {
    let last = sections.len().checked_sub(1)?;
    let index = membership.section_index.min(last);
    let section = &sections[index];
    let placed = place_in_section(child, membership.rel_x, membership.rel_y, section);
    Some((placed, Membership { section_index: index, ..*membership }))
}

/// Resolve which section of `container` a child belongs to from its current
/// geometry, and clamp it inside that section.
///
/// Returns `None` if there are no sections.
#[must_use]
pub fn resolve_membership(
    container_id: ObjectId,
    child: &Geometry,
    sections: &[ContainerSection],
) -> Option<(Geometry, Membership)> {
    let index = section_for_point(child.center(), sections)?;
    let section = &sections[index];
    let top_left = clamp_top_left(section, child.width, child.height, child.top_left());
    let placed = Geometry { x: top_left.x, y: top_left.y, ..*child };
    let (rel_x, rel_y) = to_relative(placed.center(), section);
    Some((placed, Membership::new(container_id, index, rel_x, rel_y)))
}

/// Resize per-section metadata to `count` entries, keeping existing values.
pub fn resize_section_fields(grid: &mut GridFields) {
    let count = grid.section_count();
    grid.section_titles.resize(count, String::new());
    grid.section_notes.resize(count, String::new());
    if !grid.cell_colors.is_empty() {
        grid.cell_colors.resize(count, String::new());
    }
}
