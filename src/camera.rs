#[cfg(test)]
#[path = "camera_test.rs"]
mod camera_test;

use crate::consts::{
    MAX_ZOOM, MIN_ZOOM, WHEEL_ZOOM_ACCEL_DIVISOR, WHEEL_ZOOM_DELTA_CAP, WHEEL_ZOOM_INTENSITY, WHEEL_ZOOM_MAX_ACCEL,
};
use crate::geom::{Point, clamp};

/// Camera state for pan/zoom on the infinite canvas.
///
/// `pan_x` / `pan_y` are in CSS pixels.
/// `zoom` is a scale factor (1.0 = no zoom), always within [`MIN_ZOOM`, `MAX_ZOOM`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub pan_x: f64,
    pub pan_y: f64,
    pub zoom: f64,
}

impl Default for Camera {
    fn default() -> Self {
        Self { pan_x: 0.0, pan_y: 0.0, zoom: 1.0 }
    }
}

impl Camera {
    /// Convert a screen-space point (CSS pixels) to world coordinates.
    #[must_use]
    pub fn screen_to_world(&self, screen: Point) -> Point {
        Point { x: (screen.x - self.pan_x) / self.zoom, y: (screen.y - self.pan_y) / self.zoom }
    }

    /// Convert a world-space point to screen coordinates (CSS pixels).
    #[must_use]
    pub fn world_to_screen(&self, world: Point) -> Point {
        Point { x: world.x * self.zoom + self.pan_x, y: world.y * self.zoom + self.pan_y }
    }

    /// Convert a screen-space distance (pixels) to world-space distance.
    #[must_use]
    pub fn screen_dist_to_world(&self, screen_dist: f64) -> f64 {
        screen_dist / self.zoom
    }

    /// Shift the view by a screen-space delta.
    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        self.pan_x += dx;
        self.pan_y += dy;
    }

    /// Zoom to `target_zoom` (clamped) keeping the world point under `screen` fixed.
    ///
    /// Returns `true` if the zoom actually changed.
    pub fn zoom_at(&mut self, screen: Point, target_zoom: f64) -> bool {
        let next = clamp_zoom(target_zoom);
        if next == self.zoom {
            return false;
        }
        let anchor = self.screen_to_world(screen);
        self.zoom = next;
        self.pan_x = screen.x - anchor.x * next;
        self.pan_y = screen.y - anchor.y * next;
        true
    }

    /// Apply a wheel event. With the zoom modifier held the vertical delta
    /// zooms around `screen`; otherwise both deltas pan the view.
    ///
    /// Returns `true` if the camera changed.
    pub fn apply_wheel(&mut self, screen: Point, dx: f64, dy: f64, zoom_modifier: bool) -> bool {
        if zoom_modifier {
            if dy == 0.0 {
                return false;
            }
            let factor = wheel_zoom_factor(dy);
            return self.zoom_at(screen, self.zoom * factor);
        }
        if dx == 0.0 && dy == 0.0 {
            return false;
        }
        self.pan_by(-dx, -dy);
        true
    }
}

fn clamp_zoom(zoom: f64) -> f64 {
    if !zoom.is_finite() {
        return MIN_ZOOM;
    }
    clamp(zoom, MIN_ZOOM, MAX_ZOOM)
}

/// Non-linear acceleration for wheel deltas: small notches stay gentle,
/// large trackpad flings zoom faster, up to a cap.
#[must_use]
pub fn accelerated_wheel_delta(dy: f64) -> f64 {
    let magnitude = dy.abs();
    let accel = 1.0 + (magnitude / WHEEL_ZOOM_ACCEL_DIVISOR).min(WHEEL_ZOOM_MAX_ACCEL);
    dy.signum() * (magnitude * accel).min(WHEEL_ZOOM_DELTA_CAP)
}

/// Zoom multiplier for a wheel delta. Scrolling down (positive `dy`) zooms out.
#[must_use]
pub fn wheel_zoom_factor(dy: f64) -> f64 {
    (-accelerated_wheel_delta(dy) * WHEEL_ZOOM_INTENSITY).exp()
}
