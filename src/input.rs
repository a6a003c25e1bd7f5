//! Input model: modifier keys, buttons, keys, and the interaction session.
//!
//! `Modifiers`, `Button`, `Key` and `WheelDelta` describe one raw event.
//! `InteractionSession` is the single gesture being tracked between
//! pointer-down and pointer-up. Every active variant carries its `SessionId`
//! plus the starting state it needs to compute absolute (not incremental)
//! updates, so a dropped move event never accumulates error.

#[cfg(test)]
#[path = "input_test.rs"]
mod input_test;

use std::fmt;

use crate::doc::{ConnectorEnds, EndSide, Membership, ObjectId};
use crate::geom::{Bounds, Geometry, Point};
use crate::hit::{Corner, LineEnd};

/// Keyboard/mouse modifier keys held during an event.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
    /// Meta / Command key.
    pub meta: bool,
}

impl Modifiers {
    /// Ctrl on most platforms, Command on macOS.
    #[must_use]
    pub fn command(self) -> bool {
        self.ctrl || self.meta
    }
}

/// Mouse button identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    Primary,
    Middle,
    Secondary,
}

/// A keyboard key, named as the browser reports it (e.g. `"Delete"`, `"Escape"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key(pub String);

impl Key {
    #[must_use]
    pub fn is_escape(&self) -> bool {
        self.0 == "Escape"
    }

    #[must_use]
    pub fn is_delete(&self) -> bool {
        self.0 == "Delete" || self.0 == "Backspace"
    }
}

/// Wheel / trackpad scroll delta in screen pixels.
#[derive(Debug, Clone, Copy)]
pub struct WheelDelta {
    pub dx: f64,
    /// Positive = down.
    pub dy: f64,
}

/// Monotonically increasing identity of one interaction session.
///
/// Drafts and write batches are tagged with it so that late completions can
/// be matched to the gesture that produced them by identity alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// What a marquee does to the selection it started from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarqueeMode {
    Add,
    Remove,
}

/// One object moved by an object drag, with its geometry at grab time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragMember {
    pub id: ObjectId,
    pub origin: Geometry,
    pub membership: Option<Membership>,
    pub is_container: bool,
}

/// Pre-gesture state of one object touched by a session, used to revert on cancel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Original {
    pub id: ObjectId,
    pub geometry: Geometry,
    pub membership: Option<Membership>,
    pub connector: Option<ConnectorEnds>,
}

/// The active gesture. Exactly one variant is live at a time.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum InteractionSession {
    #[default]
    Idle,
    Panning {
        id: SessionId,
        last_screen: Point,
        /// Cumulative screen distance travelled, for click detection.
        travel_px: f64,
    },
    MarqueeSelecting {
        id: SessionId,
        mode: MarqueeMode,
        start_world: Point,
        current_world: Point,
        /// Selection when the marquee started.
        base: Vec<ObjectId>,
    },
    ObjectDragging {
        id: SessionId,
        /// Object under the pointer at grab time.
        grabbed: ObjectId,
        grab_world: Point,
        last_screen: Point,
        travel_px: f64,
        /// Set once travel exceeds the drag slop.
        confirmed: bool,
        members: Vec<DragMember>,
        originals: Vec<Original>,
    },
    Rotating {
        id: SessionId,
        object_id: ObjectId,
        center: Point,
        /// Pointer angle around `center` at grab time, in degrees.
        grab_angle_deg: f64,
        origin: Geometry,
        originals: Vec<Original>,
    },
    CornerResizing {
        id: SessionId,
        object_id: ObjectId,
        corner: Corner,
        origin: Geometry,
        originals: Vec<Original>,
    },
    LineEndpointResizing {
        id: SessionId,
        object_id: ObjectId,
        end: LineEnd,
        origin: Geometry,
        originals: Vec<Original>,
    },
    ConnectorEndpointDragging {
        id: SessionId,
        connector_id: ObjectId,
        side: EndSide,
        origin: ConnectorEnds,
        originals: Vec<Original>,
    },
}

impl InteractionSession {
    /// Identity of the active session, `None` when idle.
    #[must_use]
    pub fn id(&self) -> Option<SessionId> {
        match self {
            Self::Idle => None,
            Self::Panning { id, .. }
            | Self::MarqueeSelecting { id, .. }
            | Self::ObjectDragging { id, .. }
            | Self::Rotating { id, .. }
            | Self::CornerResizing { id, .. }
            | Self::LineEndpointResizing { id, .. }
            | Self::ConnectorEndpointDragging { id, .. } => Some(*id),
        }
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Objects whose pre-gesture state the session recorded.
    #[must_use]
    pub fn originals(&self) -> &[Original] {
        match self {
            Self::Idle | Self::Panning { .. } | Self::MarqueeSelecting { .. } => &[],
            Self::ObjectDragging { originals, .. }
            | Self::Rotating { originals, .. }
            | Self::CornerResizing { originals, .. }
            | Self::LineEndpointResizing { originals, .. }
            | Self::ConnectorEndpointDragging { originals, .. } => originals,
        }
    }

    /// World-space marquee rectangle while marquee-selecting.
    #[must_use]
    pub fn marquee_rect(&self) -> Option<Bounds> {
        match self {
            Self::MarqueeSelecting { start_world, current_world, .. } => {
                Some(Bounds::from_corners(*start_world, *current_world))
            }
            _ => None,
        }
    }

    /// Short name for logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Panning { .. } => "panning",
            Self::MarqueeSelecting { .. } => "marquee",
            Self::ObjectDragging { .. } => "drag",
            Self::Rotating { .. } => "rotate",
            Self::CornerResizing { .. } => "resize",
            Self::LineEndpointResizing { .. } => "line-endpoint",
            Self::ConnectorEndpointDragging { .. } => "connector-endpoint",
        }
    }
}
