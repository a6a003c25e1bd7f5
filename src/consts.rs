//! Shared numeric constants for the engine.
//!
//! Values that are tuning knobs rather than contracts live in
//! [`crate::config`] instead, where they can be overridden from the environment.

// ── Viewport ────────────────────────────────────────────────────

/// Smallest allowed zoom factor.
pub const MIN_ZOOM: f64 = 0.1;

/// Largest allowed zoom factor.
pub const MAX_ZOOM: f64 = 10.0;

/// Upper bound on the accelerated wheel delta fed into the zoom curve.
pub const WHEEL_ZOOM_DELTA_CAP: f64 = 240.0;

/// Maximum extra acceleration multiplier applied to large wheel deltas.
pub const WHEEL_ZOOM_MAX_ACCEL: f64 = 2.0;

/// Wheel delta (pixels) at which acceleration reaches one extra multiple.
pub const WHEEL_ZOOM_ACCEL_DIVISOR: f64 = 40.0;

/// Exponent scale converting an effective wheel delta into a zoom factor.
pub const WHEEL_ZOOM_INTENSITY: f64 = 0.0015;

// ── Hit-testing ─────────────────────────────────────────────────

/// Screen-space hit slop in pixels for handles and thin edges.
pub const HANDLE_RADIUS_PX: f64 = 8.0;

/// Distance from the bounding box edge to the rotate handle, in screen pixels.
pub const ROTATE_HANDLE_OFFSET_PX: f64 = 24.0;

// ── Geometry ────────────────────────────────────────────────────

/// Smallest width or height an interactive resize may produce, in world units.
pub const MIN_OBJECT_SIZE: f64 = 8.0;

/// Rotation snap increment when shift is held, in degrees.
pub const ROTATION_SNAP_DEG: f64 = 15.0;

/// Inner padding between a container's border and its sections, in world units.
pub const CONTAINER_PADDING: f64 = 16.0;

/// Gap between container sections when the object does not carry one.
pub const DEFAULT_GRID_GAP: f64 = 8.0;

// ── Connectors ──────────────────────────────────────────────────

/// Corner radius for rounded elbow connectors, in world units.
pub const CONNECTOR_CORNER_RADIUS: f64 = 12.0;

/// Length of the straight stub an elbow route leaves an attached anchor with, in world units.
pub const CONNECTOR_ELBOW_STUB: f64 = 20.0;

/// World-space padding around a connector's endpoints for marquee tests.
pub const CONNECTOR_MARQUEE_PADDING: f64 = 6.0;

/// Colinearity tolerance for path rounding (cross product of unit directions).
pub const COLINEAR_EPSILON: f64 = 1e-9;

// ── Spatial index ───────────────────────────────────────────────

/// Quantization step for obstacle-index rebuild signatures, in world units.
pub const OBSTACLE_SIGNATURE_STEP: f64 = 8.0;

/// Default obstacle bucket size, in world units.
pub const DEFAULT_OBSTACLE_CELL_SIZE: f64 = 128.0;

/// Most cells one obstacle or query may touch before it falls back to a scan.
pub const MAX_CELLS_PER_OBSTACLE: i128 = 1024;
