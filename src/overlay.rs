//! Draft overlay: ephemeral local overrides layered over the canonical store.
//!
//! DESIGN
//! ======
//! While a gesture is in progress, the engine never mutates canonical
//! objects. It writes drafts here instead, keyed by object id and tagged with
//! the session that produced them. Reads go through [`Scene`], which resolves
//! `overlay > canonical` per field group (geometry, membership, connector ends).
//!
//! Ownership is what makes clean-up safe under latency: a write completion
//! clears only drafts its own session still owns, and a remote snapshot drops
//! only drafts the active session does not own.

#[cfg(test)]
#[path = "overlay_test.rs"]
mod overlay_test;

use std::collections::{BTreeSet, HashMap};

use crate::connector::{self, RouteStyle};
use crate::doc::{BoardObject, ConnectorEnds, DocStore, Membership, ObjectId};
use crate::geom::{Geometry, Point};
use crate::input::SessionId;

/// A draft value and the session that owns it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Draft<T> {
    pub owner: SessionId,
    pub value: T,
}

/// Per-object drafts, grouped by field.
#[derive(Debug, Clone, Default)]
pub struct DraftOverlay {
    geometry: HashMap<ObjectId, Draft<Geometry>>,
    /// A pending membership clear is stored as `value: None`.
    membership: HashMap<ObjectId, Draft<Option<Membership>>>,
    connectors: HashMap<ObjectId, Draft<ConnectorEnds>>,
}

impl DraftOverlay {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_geometry(&mut self, id: ObjectId, owner: SessionId, geometry: Geometry) {
        self.geometry.insert(id, Draft { owner, value: geometry });
    }

    pub fn set_membership(&mut self, id: ObjectId, owner: SessionId, membership: Option<Membership>) {
        self.membership.insert(id, Draft { owner, value: membership });
    }

    pub fn set_connector(&mut self, id: ObjectId, owner: SessionId, ends: ConnectorEnds) {
        self.connectors.insert(id, Draft { owner, value: ends });
    }

    #[must_use]
    pub fn geometry(&self, id: &ObjectId) -> Option<&Draft<Geometry>> {
        self.geometry.get(id)
    }

    #[must_use]
    pub fn membership(&self, id: &ObjectId) -> Option<&Draft<Option<Membership>>> {
        self.membership.get(id)
    }

    #[must_use]
    pub fn connector(&self, id: &ObjectId) -> Option<&Draft<ConnectorEnds>> {
        self.connectors.get(id)
    }

    /// Drop every draft for `id`, whoever owns it.
    pub fn remove(&mut self, id: &ObjectId) {
        self.geometry.remove(id);
        self.membership.remove(id);
        self.connectors.remove(id);
    }

    /// Drop every draft owned by `owner`. Returns how many were removed.
    pub fn clear_owner(&mut self, owner: SessionId) -> usize {
        let before = self.len();
        self.geometry.retain(|_, d| d.owner != owner);
        self.membership.retain(|_, d| d.owner != owner);
        self.connectors.retain(|_, d| d.owner != owner);
        before - self.len()
    }

    /// Drop drafts for `id` unless `keep` owns them.
    pub fn remove_unless_owned(&mut self, id: &ObjectId, keep: Option<SessionId>) {
        let stale = |owner: SessionId| Some(owner) != keep;
        if self.geometry.get(id).is_some_and(|d| stale(d.owner)) {
            self.geometry.remove(id);
        }
        if self.membership.get(id).is_some_and(|d| stale(d.owner)) {
            self.membership.remove(id);
        }
        if self.connectors.get(id).is_some_and(|d| stale(d.owner)) {
            self.connectors.remove(id);
        }
    }

    /// Keep only drafts owned by `keep`; `None` drops everything.
    pub fn retain_owner(&mut self, keep: Option<SessionId>) {
        self.geometry.retain(|_, d| Some(d.owner) == keep);
        self.membership.retain(|_, d| Some(d.owner) == keep);
        self.connectors.retain(|_, d| Some(d.owner) == keep);
    }

    /// Ids with at least one draft owned by `owner`, ascending.
    #[must_use]
    pub fn owned_ids(&self, owner: SessionId) -> Vec<ObjectId> {
        let mut ids = BTreeSet::new();
        ids.extend(self.geometry.iter().filter(|(_, d)| d.owner == owner).map(|(id, _)| *id));
        ids.extend(self.membership.iter().filter(|(_, d)| d.owner == owner).map(|(id, _)| *id));
        ids.extend(self.connectors.iter().filter(|(_, d)| d.owner == owner).map(|(id, _)| *id));
        ids.into_iter().collect()
    }

    /// Total number of drafts across all field groups.
    #[must_use]
    pub fn len(&self) -> usize {
        self.geometry.len() + self.membership.len() + self.connectors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// SCENE
// =============================================================================

/// Borrowed read view resolving `overlay > canonical`.
#[derive(Clone, Copy)]
pub struct Scene<'a> {
    pub doc: &'a DocStore,
    pub overlay: &'a DraftOverlay,
}

impl<'a> Scene<'a> {
    #[must_use]
    pub fn new(doc: &'a DocStore, overlay: &'a DraftOverlay) -> Self {
        Self { doc, overlay }
    }

    #[must_use]
    pub fn object(&self, id: &ObjectId) -> Option<&'a BoardObject> {
        self.doc.get(id)
    }

    /// Effective geometry, or `None` if the object does not exist canonically.
    #[must_use]
    pub fn geometry(&self, id: &ObjectId) -> Option<Geometry> {
        let canonical = self.doc.get(id)?;
        Some(self.overlay.geometry(id).map_or(canonical.geometry, |d| d.value))
    }

    #[must_use]
    pub fn membership(&self, id: &ObjectId) -> Option<Membership> {
        let canonical = self.doc.get(id)?;
        self.overlay.membership(id).map_or(canonical.membership, |d| d.value)
    }

    #[must_use]
    pub fn connector_ends(&self, id: &ObjectId) -> Option<ConnectorEnds> {
        let canonical = self.doc.get(id)?;
        self.overlay.connector(id).map_or(canonical.connector, |d| Some(d.value))
    }

    /// Route polyline of a connector; `None` for non-connectors and dangling ends.
    #[must_use]
    pub fn connector_points(&self, id: &ObjectId, route: RouteStyle) -> Option<Vec<Point>> {
        let ends = self.connector_ends(id)?;
        connector::connector_points(&ends, route, |target| {
            // Connectors are never attachment targets.
            self.object(target).filter(|o| o.kind.is_attachable())?;
            self.geometry(target)
        })
    }

    /// Effective children of a container, in draw order.
    #[must_use]
    pub fn children_of(&self, container_id: &ObjectId) -> Vec<&'a BoardObject> {
        self.doc
            .sorted_objects()
            .into_iter()
            .filter(|o| self.membership(&o.id).is_some_and(|m| m.container_id == *container_id))
            .collect()
    }

    /// All objects top-most first.
    #[must_use]
    pub fn objects_top_down(&self) -> Vec<&'a BoardObject> {
        let mut objects = self.doc.sorted_objects();
        objects.reverse();
        objects
    }
}
