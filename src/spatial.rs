//! Uniform-grid spatial index over obstacle bounds.
//!
//! DESIGN
//! ======
//! Each obstacle is registered in every cell its bounds touch. A query unions
//! the buckets of every cell the (optionally padded) query rectangle touches
//! and returns the obstacle indices deduplicated in ascending order.
//!
//! An obstacle covering more than [`MAX_CELLS_PER_OBSTACLE`] cells is kept on
//! an oversized list instead and tested by cell-range overlap on every query.
//! A query that large scans the obstacle list instead of walking cells.
//!
//! Rebuilding is gated on a signature: every obstacle's id plus its bounds
//! quantized to an 8-unit grid, sorted and joined. Callers can hand the full
//! obstacle list to [`ObstacleIndex::sync`] every frame; the buckets are only
//! rebuilt when something moved far enough to matter.

#[cfg(test)]
#[path = "spatial_test.rs"]
mod spatial_test;

use std::collections::{BTreeSet, HashMap};

use crate::consts::{DEFAULT_OBSTACLE_CELL_SIZE, MAX_CELLS_PER_OBSTACLE, OBSTACLE_SIGNATURE_STEP};
use crate::doc::ObjectId;
use crate::geom::Bounds;

/// One indexed obstacle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Obstacle {
    pub id: ObjectId,
    pub bounds: Bounds,
}

type CellKey = (i64, i64);

/// Bucketed obstacle lookup.
#[derive(Debug, Clone)]
pub struct ObstacleIndex {
    cell_size: f64,
    obstacles: Vec<Obstacle>,
    buckets: HashMap<CellKey, Vec<usize>>,
    /// Obstacles too large to bucket, in ascending order.
    oversized: Vec<usize>,
    signature: Option<String>,
    rebuilds: u64,
}

impl ObstacleIndex {
    /// Create an empty index. A non-positive or non-finite cell size falls back to the default.
    #[must_use]
    pub fn new(cell_size: f64) -> Self {
        let cell_size =
            if cell_size.is_finite() && cell_size > 0.0 { cell_size } else { DEFAULT_OBSTACLE_CELL_SIZE };
        Self { cell_size, obstacles: Vec::new(), buckets: HashMap::new(), oversized: Vec::new(), signature: None, rebuilds: 0 }
    }

    #[must_use]
    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// The obstacle list from the last rebuild, addressed by query indices.
    #[must_use]
    pub fn obstacles(&self) -> &[Obstacle] {
        &self.obstacles
    }

    /// Number of bucket rebuilds since creation.
    #[must_use]
    pub fn rebuild_count(&self) -> u64 {
        self.rebuilds
    }

    /// Rebuild the buckets if the obstacle signature changed. Returns `true` on rebuild.
    pub fn sync(&mut self, obstacles: &[Obstacle]) -> bool {
        let signature = obstacle_signature(obstacles);
        if self.signature.as_deref() == Some(signature.as_str()) {
            return false;
        }
        self.rebuild(obstacles);
        self.signature = Some(signature);
        true
    }

    fn rebuild(&mut self, obstacles: &[Obstacle]) {
        self.obstacles = obstacles.to_vec();
        self.buckets.clear();
        self.oversized.clear();
        for (index, obstacle) in self.obstacles.iter().enumerate() {
            let (min, max) = cell_range(&obstacle.bounds, self.cell_size);
            if cell_count(min, max) > MAX_CELLS_PER_OBSTACLE {
                self.oversized.push(index);
                continue;
            }
            for cx in min.0..=max.0 {
                for cy in min.1..=max.1 {
                    self.buckets.entry((cx, cy)).or_default().push(index);
                }
            }
        }
        self.rebuilds += 1;
    }

    /// Indices of obstacles sharing a cell with `bounds` expanded by `padding`.
    #[must_use]
    pub fn query(&self, bounds: &Bounds, padding: f64) -> Vec<usize> {
        let padded = bounds.expand(padding.max(0.0));
        let (min, max) = cell_range(&padded, self.cell_size);
        if cell_count(min, max) > MAX_CELLS_PER_OBSTACLE {
            return (0..self.obstacles.len())
                .filter(|&i| self.overlaps_cells(i, min, max))
                .collect();
        }
        let mut found: BTreeSet<usize> =
            self.oversized.iter().copied().filter(|&i| self.overlaps_cells(i, min, max)).collect();
        for cx in min.0..=max.0 {
            for cy in min.1..=max.1 {
                if let Some(bucket) = self.buckets.get(&(cx, cy)) {
                    found.extend(bucket.iter().copied());
                }
            }
        }
        found.into_iter().collect()
    }

    fn overlaps_cells(&self, index: usize, min: CellKey, max: CellKey) -> bool {
        let (lo, hi) = cell_range(&self.obstacles[index].bounds, self.cell_size);
        lo.0 <= max.0 && min.0 <= hi.0 && lo.1 <= max.1 && min.1 <= hi.1
    }

    /// Ids of obstacles sharing a cell with `bounds` expanded by `padding`.
    #[must_use]
    pub fn query_ids(&self, bounds: &Bounds, padding: f64) -> Vec<ObjectId> {
        self.query(bounds, padding).into_iter().map(|i| self.obstacles[i].id).collect()
    }
}

impl Default for ObstacleIndex {
    fn default() -> Self {
        Self::new(DEFAULT_OBSTACLE_CELL_SIZE)
    }
}

#[allow(clippy::cast_possible_truncation)]
fn cell_of(value: f64, cell_size: f64) -> i64 {
    (value / cell_size).floor() as i64
}

fn cell_range(bounds: &Bounds, cell_size: f64) -> (CellKey, CellKey) {
    (
        (cell_of(bounds.left, cell_size), cell_of(bounds.top, cell_size)),
        (cell_of(bounds.right, cell_size), cell_of(bounds.bottom, cell_size)),
    )
}

/// Cells in the inclusive range, zero if the range is inverted.
fn cell_count(min: CellKey, max: CellKey) -> i128 {
    let w = (i128::from(max.0) - i128::from(min.0) + 1).max(0);
    let h = (i128::from(max.1) - i128::from(min.1) + 1).max(0);
    w * h
}

/// Order-independent signature of obstacle ids and coarsely quantized bounds.
#[must_use]
pub fn obstacle_signature(obstacles: &[Obstacle]) -> String {
    let mut parts: Vec<String> = obstacles
        .iter()
        .map(|o| {
            format!(
                "{}:{}:{}:{}:{}",
                o.id,
                quantize(o.bounds.left),
                quantize(o.bounds.top),
                quantize(o.bounds.right),
                quantize(o.bounds.bottom)
            )
        })
        .collect();
    parts.sort_unstable();
    parts.join("|")
}

#[allow(clippy::cast_possible_truncation)]
fn quantize(value: f64) -> i64 {
    (value / OBSTACLE_SIGNATURE_STEP).round() as i64
}
