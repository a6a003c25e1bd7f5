//! Geometry primitives shared by every other module.
//!
//! Everything here is plain value math: points, axis-aligned bounds, and the
//! rotated box (`Geometry`) that every board object carries. Nothing in this
//! module can fail; degenerate inputs resolve to a defined fallback instead.

#[cfg(test)]
#[path = "geom_test.rs"]
mod geom_test;

use serde::{Deserialize, Serialize};

/// A point in either screen or world space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    #[must_use]
    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Self { x: self.x + dx, y: self.y + dy }
    }

    #[must_use]
    pub fn sub(self, other: Point) -> Point {
        Point { x: self.x - other.x, y: self.y - other.y }
    }

    #[must_use]
    pub fn add(self, other: Point) -> Point {
        Point { x: self.x + other.x, y: self.y + other.y }
    }

    #[must_use]
    pub fn scale(self, k: f64) -> Point {
        Point { x: self.x * k, y: self.y * k }
    }

    /// Euclidean length when the point is read as a vector.
    #[must_use]
    pub fn length(self) -> f64 {
        self.x.hypot(self.y)
    }
}

/// Clamp `value` into `[min, max]`.
///
/// Unlike [`f64::clamp`] this never panics: an inverted range resolves to its
/// midpoint, which is what callers centering an oversized footprint want.
#[must_use]
pub fn clamp(value: f64, min: f64, max: f64) -> f64 {
    if min > max {
        return (min + max) * 0.5;
    }
    value.max(min).min(max)
}

/// Euclidean distance between two points.
#[must_use]
pub fn distance(a: Point, b: Point) -> f64 {
    (b.x - a.x).hypot(b.y - a.y)
}

#[must_use]
pub fn deg_to_rad(deg: f64) -> f64 {
    deg.to_radians()
}

#[must_use]
pub fn rad_to_deg(rad: f64) -> f64 {
    rad.to_degrees()
}

/// Normalize an angle in degrees into `[0, 360)`.
#[must_use]
pub fn normalize_degrees(deg: f64) -> f64 {
    if !deg.is_finite() {
        return 0.0;
    }
    let wrapped = deg.rem_euclid(360.0);
    // rem_euclid can return exactly 360.0 for tiny negative inputs.
    if wrapped >= 360.0 { 0.0 } else { wrapped }
}

/// Round `value` to the nearest multiple of `step`. A non-positive step is a no-op.
#[must_use]
pub fn round_to_step(value: f64, step: f64) -> f64 {
    if step <= 0.0 || !step.is_finite() {
        return value;
    }
    (value / step).round() * step
}

/// Rotate `p` around `pivot` by `deg` degrees (clockwise in screen space, y down).
#[must_use]
pub fn rotate_point(p: Point, pivot: Point, deg: f64) -> Point {
    if deg == 0.0 {
        return p;
    }
    let (sin, cos) = deg_to_rad(deg).sin_cos();
    let dx = p.x - pivot.x;
    let dy = p.y - pivot.y;
    Point { x: pivot.x + dx * cos - dy * sin, y: pivot.y + dx * sin + dy * cos }
}

/// Axis-aligned bounds with `left <= right` and `top <= bottom`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Bounds {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl Bounds {
    /// Build bounds from any two opposite corners, in any order.
    #[must_use]
    pub fn from_corners(a: Point, b: Point) -> Self {
        Self { left: a.x.min(b.x), top: a.y.min(b.y), right: a.x.max(b.x), bottom: a.y.max(b.y) }
    }

    /// Smallest bounds containing every point. `None` for an empty slice.
    #[must_use]
    pub fn from_points(points: &[Point]) -> Option<Self> {
        let first = points.first()?;
        let mut b = Self { left: first.x, top: first.y, right: first.x, bottom: first.y };
        for p in &points[1..] {
            b.left = b.left.min(p.x);
            b.top = b.top.min(p.y);
            b.right = b.right.max(p.x);
            b.bottom = b.bottom.max(p.y);
        }
        Some(b)
    }

    #[must_use]
    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    #[must_use]
    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }

    #[must_use]
    pub fn center(&self) -> Point {
        Point { x: (self.left + self.right) * 0.5, y: (self.top + self.bottom) * 0.5 }
    }

    #[must_use]
    pub fn top_left(&self) -> Point {
        Point { x: self.left, y: self.top }
    }

    /// Inclusive containment test.
    #[must_use]
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.left && p.x <= self.right && p.y >= self.top && p.y <= self.bottom
    }

    /// Inclusive overlap test; touching edges count as intersecting.
    #[must_use]
    pub fn intersects(&self, other: &Bounds) -> bool {
        self.left <= other.right && other.left <= self.right && self.top <= other.bottom && other.top <= self.bottom
    }

    /// Grow (or shrink, for negative `pad`) on every side.
    #[must_use]
    pub fn expand(&self, pad: f64) -> Bounds {
        Bounds { left: self.left - pad, top: self.top - pad, right: self.right + pad, bottom: self.bottom + pad }
    }

    #[must_use]
    pub fn union(&self, other: &Bounds) -> Bounds {
        Bounds {
            left: self.left.min(other.left),
            top: self.top.min(other.top),
            right: self.right.max(other.right),
            bottom: self.bottom.max(other.bottom),
        }
    }
}

/// Position, size and rotation of a board object.
///
/// `x` / `y` is the top-left of the unrotated box; rotation pivots on the box center.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Geometry {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub rotation_deg: f64,
}

impl Geometry {
    #[must_use]
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height, rotation_deg: 0.0 }
    }

    #[must_use]
    pub fn with_rotation(mut self, rotation_deg: f64) -> Self {
        self.rotation_deg = normalize_degrees(rotation_deg);
        self
    }

    #[must_use]
    pub fn center(&self) -> Point {
        Point { x: self.x + self.width * 0.5, y: self.y + self.height * 0.5 }
    }

    #[must_use]
    pub fn top_left(&self) -> Point {
        Point { x: self.x, y: self.y }
    }

    /// Unrotated bounding box.
    #[must_use]
    pub fn bounds(&self) -> Bounds {
        Bounds { left: self.x, top: self.y, right: self.x + self.width, bottom: self.y + self.height }
    }

    /// The same box moved by `(dx, dy)`.
    #[must_use]
    pub fn translated(&self, dx: f64, dy: f64) -> Geometry {
        Geometry { x: self.x + dx, y: self.y + dy, ..*self }
    }

    /// Re-center the box on `center` keeping its size and rotation.
    #[must_use]
    pub fn centered_on(&self, center: Point) -> Geometry {
        Geometry { x: center.x - self.width * 0.5, y: center.y - self.height * 0.5, ..*self }
    }

    /// World-space corners in order top-left, top-right, bottom-right, bottom-left.
    #[must_use]
    pub fn corners(&self) -> [Point; 4] {
        let c = self.center();
        let b = self.bounds();
        [
            rotate_point(Point::new(b.left, b.top), c, self.rotation_deg),
            rotate_point(Point::new(b.right, b.top), c, self.rotation_deg),
            rotate_point(Point::new(b.right, b.bottom), c, self.rotation_deg),
            rotate_point(Point::new(b.left, b.bottom), c, self.rotation_deg),
        ]
    }

    /// Axis-aligned bounds of the rotated box.
    #[must_use]
    pub fn visual_bounds(&self) -> Bounds {
        if self.rotation_deg == 0.0 {
            return self.bounds();
        }
        let corners = self.corners();
        Bounds::from_points(&corners).unwrap_or_else(|| self.bounds())
    }

    /// Map a world point into the box's unrotated local frame, relative to its center.
    #[must_use]
    pub fn to_local(&self, world: Point) -> Point {
        let c = self.center();
        rotate_point(world, c, -self.rotation_deg).sub(c)
    }

    /// Inverse of [`Geometry::to_local`].
    #[must_use]
    pub fn to_world(&self, local: Point) -> Point {
        let c = self.center();
        rotate_point(local.add(c), c, self.rotation_deg)
    }

    /// Whether `world` lies inside the rotated box.
    #[must_use]
    pub fn contains(&self, world: Point) -> bool {
        let local = self.to_local(world);
        local.x.abs() <= self.width * 0.5 && local.y.abs() <= self.height * 0.5
    }

    /// Start and end of a line object: the rotated left-middle and right-middle points.
    #[must_use]
    pub fn line_endpoints(&self) -> [Point; 2] {
        [self.to_world(Point::new(-self.width * 0.5, 0.0)), self.to_world(Point::new(self.width * 0.5, 0.0))]
    }

    /// Line box running from `start` to `end`, `thickness` tall.
    ///
    /// Segments shorter than `min_length` are extended from `start` along
    /// their direction (or along +x when degenerate), so `start` always stays put.
    #[must_use]
    pub fn line_between(start: Point, end: Point, thickness: f64, min_length: f64) -> Geometry {
        let delta = end.sub(start);
        let length = delta.length();
        let end = if length >= min_length {
            end
        } else if length > 0.0 {
            start.add(delta.scale(min_length / length))
        } else {
            start.offset(min_length, 0.0)
        };
        let length = distance(start, end);
        let center = Point::new((start.x + end.x) * 0.5, (start.y + end.y) * 0.5);
        let rotation = normalize_degrees(rad_to_deg((end.y - start.y).atan2(end.x - start.x)));
        Geometry {
            x: center.x - length * 0.5,
            y: center.y - thickness * 0.5,
            width: length,
            height: thickness,
            rotation_deg: rotation,
        }
    }
}

/// Distance from `p` to the segment `a`-`b`.
#[must_use]
pub fn distance_to_segment(p: Point, a: Point, b: Point) -> f64 {
    let ab = b.sub(a);
    let len_sq = ab.x * ab.x + ab.y * ab.y;
    if len_sq == 0.0 {
        return distance(p, a);
    }
    let t = clamp(((p.x - a.x) * ab.x + (p.y - a.y) * ab.y) / len_sq, 0.0, 1.0);
    distance(p, a.add(ab.scale(t)))
}
