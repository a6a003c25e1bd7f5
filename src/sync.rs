//! Write-throttling synchronization layer.
//!
//! DESIGN
//! ======
//! Every local mutation that should reach the shared store goes through
//! [`SyncLayer::submit_at`], one call per decision. A decision either becomes
//! one atomic [`WriteBatch`] or is dropped:
//!
//! 1. Throttle: each channel (`WriteKind`) remembers when it last sent. A
//!    non-forced write inside the channel interval is dropped. The first write
//!    on a channel always passes, and the forced flush at gesture end bypasses
//!    the throttle entirely.
//! 2. Quantize: x / y / width / height are rounded to the configured step.
//!    Drafts keep the raw values; only the outgoing batch is quantized.
//! 3. Skip: each candidate is compared against the last value this layer
//!    actually wrote for that object (falling back to canonical). Candidates
//!    within epsilon that carry no membership or endpoint change are dropped;
//!    if nothing is left, the decision is a no-op.
//!
//! ERROR HANDLING
//! ==============
//! Batches stay registered until the host settles them. A failed batch
//! forgets the last-written values of every object it touched, so the next
//! decision for those objects compares against canonical state and retries
//! naturally. There is no automatic retry.

#[cfg(test)]
#[path = "sync_test.rs"]
mod sync_test;

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::config::SyncConfig;
use crate::doc::{BoardObject, ConnectorEnd, DocStore, MembershipUpdate, ObjectId, PartialBoardObject};
use crate::geom::{distance, round_to_step};
use crate::input::SessionId;

/// Write channel with its own throttle interval and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteKind {
    ObjectMove,
    ContainerMove,
    Resize,
    Rotate,
    ConnectorEndpoint,
    Cursor,
}

impl WriteKind {
    pub const ALL: [WriteKind; 6] = [
        WriteKind::ObjectMove,
        WriteKind::ContainerMove,
        WriteKind::Resize,
        WriteKind::Rotate,
        WriteKind::ConnectorEndpoint,
        WriteKind::Cursor,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ObjectMove => "object_move",
            Self::ContainerMove => "container_move",
            Self::Resize => "resize",
            Self::Rotate => "rotate",
            Self::ConnectorEndpoint => "connector_endpoint",
            Self::Cursor => "cursor",
        }
    }
}

/// Identity of one submitted batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BatchId(pub u64);

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}", self.0)
    }
}

/// Sparse update for one object inside a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectUpdate {
    pub id: ObjectId,
    pub fields: PartialBoardObject,
}

impl ObjectUpdate {
    #[must_use]
    pub fn new(id: ObjectId, fields: PartialBoardObject) -> Self {
        Self { id, fields }
    }
}

/// One atomic multi-object write.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteBatch {
    pub id: BatchId,
    pub kind: WriteKind,
    /// Session whose drafts this batch persists.
    pub session: SessionId,
    /// Whether the batch bypassed the throttle (gesture end, commands).
    pub forced: bool,
    pub updates: Vec<ObjectUpdate>,
}

impl WriteBatch {
    #[must_use]
    pub fn object_ids(&self) -> Vec<ObjectId> {
        self.updates.iter().map(|u| u.id).collect()
    }
}

// =============================================================================
// METRICS
// =============================================================================

/// Counters for one channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChannelMetrics {
    /// Every decision, sent or not.
    pub attempted: u64,
    /// Decisions dropped by the throttle or because every candidate was a no-op.
    pub skipped: u64,
    /// Batches the store confirmed.
    pub committed: u64,
    /// Batches the store rejected.
    pub failed: u64,
}

impl ChannelMetrics {
    fn add(&mut self, other: ChannelMetrics) {
        self.attempted += other.attempted;
        self.skipped += other.skipped;
        self.committed += other.committed;
        self.failed += other.failed;
    }
}

/// Snapshot of all channel counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WriteMetrics {
    channels: BTreeMap<WriteKind, ChannelMetrics>,
}

impl WriteMetrics {
    #[must_use]
    pub fn channel(&self, kind: WriteKind) -> ChannelMetrics {
        self.channels.get(&kind).copied().unwrap_or_default()
    }

    /// Sum across channels.
    #[must_use]
    pub fn total(&self) -> ChannelMetrics {
        let mut sum = ChannelMetrics::default();
        for m in self.channels.values() {
            sum.add(*m);
        }
        sum
    }

    fn entry(&mut self, kind: WriteKind) -> &mut ChannelMetrics {
        self.channels.entry(kind).or_default()
    }
}

// =============================================================================
// SYNC LAYER
// =============================================================================

/// Last values written for one object, per field.
#[derive(Debug, Clone, Copy, Default)]
struct Written {
    x: Option<f64>,
    y: Option<f64>,
    width: Option<f64>,
    height: Option<f64>,
    rotation_deg: Option<f64>,
    membership: Option<MembershipUpdate>,
    from: Option<ConnectorEnd>,
    to: Option<ConnectorEnd>,
}

impl Written {
    fn record(&mut self, fields: &PartialBoardObject) {
        fn keep(slot: &mut Option<f64>, v: Option<f64>) {
            if v.is_some() {
                *slot = v;
            }
        }
        keep(&mut self.x, fields.x);
        keep(&mut self.y, fields.y);
        keep(&mut self.width, fields.width);
        keep(&mut self.height, fields.height);
        keep(&mut self.rotation_deg, fields.rotation_deg);
        if fields.membership.is_some() {
            self.membership = fields.membership;
        }
        if fields.from.is_some() {
            self.from = fields.from;
        }
        if fields.to.is_some() {
            self.to = fields.to;
        }
    }
}

/// Throttle, quantize and skip decisions for outgoing writes.
#[derive(Debug)]
pub struct SyncLayer {
    config: SyncConfig,
    last_sent: HashMap<WriteKind, u64>,
    written: HashMap<ObjectId, Written>,
    in_flight: BTreeMap<BatchId, WriteBatch>,
    metrics: WriteMetrics,
    next_batch: u64,
}

impl SyncLayer {
    #[must_use]
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config,
            last_sent: HashMap::new(),
            written: HashMap::new(),
            in_flight: BTreeMap::new(),
            metrics: WriteMetrics::default(),
            next_batch: 1,
        }
    }

    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Decide whether `candidates` become a batch at `now_ms`.
    ///
    /// Returns the batch to persist, or `None` if the decision was throttled
    /// or every candidate was a no-op.
    pub fn submit_at(
        &mut self,
        kind: WriteKind,
        candidates: Vec<ObjectUpdate>,
        doc: &DocStore,
        now_ms: u64,
        force: bool,
        session: SessionId,
    ) -> Option<WriteBatch> {
        self.metrics.entry(kind).attempted += 1;

        if !force && self.is_throttled(kind, now_ms) {
            self.metrics.entry(kind).skipped += 1;
            return None;
        }

        let step = self.config.quantize_step;
        let updates: Vec<ObjectUpdate> = candidates
            .into_iter()
            .filter_map(|mut update| {
                let Some(canonical) = doc.get(&update.id) else {
                    debug!(id = %update.id, kind = kind.as_str(), "dropping write for unknown object");
                    return None;
                };
                quantize(&mut update.fields, step);
                let changed = self.has_changes(&update, canonical);
                changed.then_some(update)
            })
            .collect();

        if updates.is_empty() {
            self.metrics.entry(kind).skipped += 1;
            return None;
        }

        self.last_sent.insert(kind, now_ms);
        for update in &updates {
            self.written.entry(update.id).or_default().record(&update.fields);
        }
        let id = BatchId(self.next_batch);
        self.next_batch += 1;
        let batch = WriteBatch { id, kind, session, forced: force, updates };
        debug!(
            batch = %id,
            kind = kind.as_str(),
            session = %session,
            forced = force,
            objects = batch.updates.len(),
            "write batch submitted"
        );
        self.in_flight.insert(id, batch.clone());
        Some(batch)
    }

    /// Throttle-only decision for a cursor heartbeat. Returns `true` when one is due.
    pub fn cursor_due_at(&mut self, now_ms: u64) -> bool {
        self.metrics.entry(WriteKind::Cursor).attempted += 1;
        if self.is_throttled(WriteKind::Cursor, now_ms) {
            self.metrics.entry(WriteKind::Cursor).skipped += 1;
            return false;
        }
        self.last_sent.insert(WriteKind::Cursor, now_ms);
        // Heartbeats are fire-and-forget; handing one to the host counts as committed.
        self.metrics.entry(WriteKind::Cursor).committed += 1;
        true
    }

    fn is_throttled(&self, kind: WriteKind, now_ms: u64) -> bool {
        self.last_sent.get(&kind).is_some_and(|last| now_ms.saturating_sub(*last) <= self.config.interval_ms(kind))
    }

    fn has_changes(&self, update: &ObjectUpdate, canonical: &BoardObject) -> bool {
        let fields = &update.fields;
        if fields.grid.is_some() || fields.color.is_some() || fields.text.is_some() || fields.z_index.is_some() {
            return true;
        }
        let written = self.written.get(&update.id).copied().unwrap_or_default();
        let g = canonical.geometry;
        let eps = self.config.epsilon;

        let moved = |value: Option<f64>, last: Option<f64>, fallback: f64| {
            value.is_some_and(|v| (v - last.unwrap_or(fallback)).abs() > eps)
        };
        if moved(fields.x, written.x, g.x)
            || moved(fields.y, written.y, g.y)
            || moved(fields.width, written.width, g.width)
            || moved(fields.height, written.height, g.height)
        {
            return true;
        }
        if let Some(r) = fields.rotation_deg {
            if angle_delta(r, written.rotation_deg.unwrap_or(g.rotation_deg)) > eps {
                return true;
            }
        }

        if let Some(m) = fields.membership {
            let base = written.membership.unwrap_or(match canonical.membership {
                Some(current) => MembershipUpdate::Set(current),
                None => MembershipUpdate::Clear,
            });
            if !same_membership(m, base) {
                return true;
            }
        }

        let ends = canonical.connector;
        if let Some(end) = fields.from {
            let base = written.from.or(ends.map(|e| e.from));
            if base.is_none_or(|b| !same_end(end, b, eps)) {
                return true;
            }
        }
        if let Some(end) = fields.to {
            let base = written.to.or(ends.map(|e| e.to));
            if base.is_none_or(|b| !same_end(end, b, eps)) {
                return true;
            }
        }
        false
    }

    /// Mark a batch settled. Returns it if it was in flight.
    pub fn settle(&mut self, id: BatchId, ok: bool) -> Option<WriteBatch> {
        let batch = self.in_flight.remove(&id)?;
        let channel = self.metrics.entry(batch.kind);
        if ok {
            channel.committed += 1;
        } else {
            channel.failed += 1;
            for update in &batch.updates {
                self.written.remove(&update.id);
            }
        }
        Some(batch)
    }

    /// Batches of `session` still awaiting settlement.
    #[must_use]
    pub fn in_flight_for(&self, session: SessionId) -> usize {
        self.in_flight.values().filter(|b| b.session == session).count()
    }

    #[must_use]
    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    /// Forget last-written values for an object, e.g. after a remote change.
    pub fn forget(&mut self, id: &ObjectId) {
        self.written.remove(id);
    }

    pub fn forget_all(&mut self) {
        self.written.clear();
    }

    /// Snapshot of the counters.
    #[must_use]
    pub fn metrics(&self) -> WriteMetrics {
        self.metrics.clone()
    }

    pub fn reset_metrics(&mut self) {
        self.metrics = WriteMetrics::default();
    }
}

impl Default for SyncLayer {
    fn default() -> Self {
        Self::new(SyncConfig::default())
    }
}

fn quantize(fields: &mut PartialBoardObject, step: f64) {
    let round = |v: Option<f64>| v.map(|v| round_to_step(v, step));
    fields.x = round(fields.x);
    fields.y = round(fields.y);
    // A size never rounds down to zero.
    let size = |v: Option<f64>| {
        v.map(|v| {
            let q = round_to_step(v, step);
            if q > 0.0 { q } else { v }
        })
    };
    fields.width = size(fields.width);
    fields.height = size(fields.height);
}

fn angle_delta(a: f64, b: f64) -> f64 {
    let d = (a - b).rem_euclid(360.0);
    d.min(360.0 - d)
}

fn same_membership(a: MembershipUpdate, b: MembershipUpdate) -> bool {
    match (a, b) {
        (MembershipUpdate::Clear, MembershipUpdate::Clear) => true,
        (MembershipUpdate::Set(x), MembershipUpdate::Set(y)) => {
            x.container_id == y.container_id
                && x.section_index == y.section_index
                && (x.rel_x - y.rel_x).abs() <= 1e-6
                && (x.rel_y - y.rel_y).abs() <= 1e-6
        }
        _ => false,
    }
}

fn same_end(a: ConnectorEnd, b: ConnectorEnd, eps: f64) -> bool {
    match (a, b) {
        (ConnectorEnd::Free(p), ConnectorEnd::Free(q)) => distance(p, q) <= eps,
        (a, b) => a == b,
    }
}
