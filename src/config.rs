//! Tuning knobs, loaded from environment variables with compiled-in defaults.
//!
//! Every field has a default that matches interactive use in a browser.
//! `from_env()` overrides individual fields; unparsable values fall back to
//! the default silently so a typo in `.env` never takes the canvas down.

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;

use crate::connector::RouteStyle;
use crate::consts::{CONNECTOR_CORNER_RADIUS, CONTAINER_PADDING, DEFAULT_GRID_GAP, DEFAULT_OBSTACLE_CELL_SIZE};
use crate::sync::WriteKind;

const DEFAULT_OBJECT_MOVE_MS: u64 = 50;
const DEFAULT_CONTAINER_MOVE_MS: u64 = 120;
const DEFAULT_RESIZE_MS: u64 = 60;
const DEFAULT_ROTATE_MS: u64 = 60;
const DEFAULT_CONNECTOR_ENDPOINT_MS: u64 = 50;
const DEFAULT_CURSOR_MS: u64 = 40;
const DEFAULT_WRITE_EPSILON: f64 = 0.25;
const DEFAULT_QUANTIZE_STEP: f64 = 0.1;

const DEFAULT_DRAG_SLOP_PX: f64 = 4.0;
const DEFAULT_SNAP_RADIUS_PX: f64 = 16.0;

/// Write-throttling configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncConfig {
    /// Minimum interval between object-move writes, in milliseconds.
    pub object_move_ms: u64,
    pub container_move_ms: u64,
    pub resize_ms: u64,
    pub rotate_ms: u64,
    pub connector_endpoint_ms: u64,
    /// Minimum interval between cursor presence heartbeats.
    pub cursor_ms: u64,
    /// Candidates within this distance of the last written value are no-ops.
    pub epsilon: f64,
    /// Step that x / y / width / height are rounded to before writing.
    pub quantize_step: f64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            object_move_ms: DEFAULT_OBJECT_MOVE_MS,
            container_move_ms: DEFAULT_CONTAINER_MOVE_MS,
            resize_ms: DEFAULT_RESIZE_MS,
            rotate_ms: DEFAULT_ROTATE_MS,
            connector_endpoint_ms: DEFAULT_CONNECTOR_ENDPOINT_MS,
            cursor_ms: DEFAULT_CURSOR_MS,
            epsilon: DEFAULT_WRITE_EPSILON,
            quantize_step: DEFAULT_QUANTIZE_STEP,
        }
    }
}

impl SyncConfig {
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            object_move_ms: env_parse("BOARDSYNC_OBJECT_MOVE_MS", DEFAULT_OBJECT_MOVE_MS),
            container_move_ms: env_parse("BOARDSYNC_CONTAINER_MOVE_MS", DEFAULT_CONTAINER_MOVE_MS),
            resize_ms: env_parse("BOARDSYNC_RESIZE_MS", DEFAULT_RESIZE_MS),
            rotate_ms: env_parse("BOARDSYNC_ROTATE_MS", DEFAULT_ROTATE_MS),
            connector_endpoint_ms: env_parse("BOARDSYNC_CONNECTOR_ENDPOINT_MS", DEFAULT_CONNECTOR_ENDPOINT_MS),
            cursor_ms: env_parse("BOARDSYNC_CURSOR_MS", DEFAULT_CURSOR_MS),
            epsilon: env_parse("BOARDSYNC_WRITE_EPSILON", DEFAULT_WRITE_EPSILON),
            quantize_step: env_parse("BOARDSYNC_QUANTIZE_STEP", DEFAULT_QUANTIZE_STEP),
        }
    }

    /// Throttle interval for a channel, in milliseconds.
    #[must_use]
    pub fn interval_ms(&self, kind: WriteKind) -> u64 {
        match kind {
            WriteKind::ObjectMove => self.object_move_ms,
            WriteKind::ContainerMove => self.container_move_ms,
            WriteKind::Resize => self.resize_ms,
            WriteKind::Rotate => self.rotate_ms,
            WriteKind::ConnectorEndpoint => self.connector_endpoint_ms,
            WriteKind::Cursor => self.cursor_ms,
        }
    }
}

/// Interaction tuning for the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    /// Screen distance a press must travel before it becomes a drag.
    pub drag_slop_px: f64,
    /// Screen radius within which a dragged connector end snaps to an anchor.
    pub snap_radius_px: f64,
    /// Whether corner resizes of snap-eligible kinds round to `grid_step`.
    pub snap_to_grid: bool,
    pub grid_step: f64,
    /// Inner padding of grid containers.
    pub container_padding: f64,
    pub route: RouteStyle,
    pub corner_radius: f64,
    pub obstacle_cell_size: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            drag_slop_px: DEFAULT_DRAG_SLOP_PX,
            snap_radius_px: DEFAULT_SNAP_RADIUS_PX,
            snap_to_grid: true,
            grid_step: DEFAULT_GRID_GAP,
            container_padding: CONTAINER_PADDING,
            route: RouteStyle::Elbow,
            corner_radius: CONNECTOR_CORNER_RADIUS,
            obstacle_cell_size: DEFAULT_OBSTACLE_CELL_SIZE,
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            drag_slop_px: env_parse("BOARDSYNC_DRAG_SLOP_PX", defaults.drag_slop_px),
            snap_radius_px: env_parse("BOARDSYNC_SNAP_RADIUS_PX", defaults.snap_radius_px),
            snap_to_grid: env_parse("BOARDSYNC_SNAP_TO_GRID", defaults.snap_to_grid),
            grid_step: env_parse("BOARDSYNC_GRID_STEP", defaults.grid_step),
            container_padding: env_parse("BOARDSYNC_CONTAINER_PADDING", defaults.container_padding),
            route: env_parse("BOARDSYNC_CONNECTOR_ROUTE", defaults.route),
            corner_radius: env_parse("BOARDSYNC_CORNER_RADIUS", defaults.corner_radius),
            obstacle_cell_size: env_parse("BOARDSYNC_OBSTACLE_CELL_SIZE", defaults.obstacle_cell_size),
        }
    }
}

/// Parse `key` from the environment, falling back to `default` when unset or invalid.
pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}
