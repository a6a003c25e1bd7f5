//! Interaction and synchronization engine for a collaborative whiteboard.
//!
//! The engine turns raw pointer, wheel and key input into gestures over a
//! shared board document. Gestures edit local drafts only; the sync layer
//! decides when a draft is worth writing and batches the writes so that a
//! container and its children land atomically. The host persists the
//! resulting [`engine::Action`]s through a [`store::BoardStore`] and feeds
//! the store's change stream back in.
//!
//! ## Module layout
//!
//! | Module | Role |
//! |--------|------|
//! | [`engine`] | Canvas session handle and the [`engine::Action`]s it emits |
//! | [`doc`] | Board object model, wire format, canonical document store |
//! | [`overlay`] | Session-owned drafts and the `draft > canonical` scene view |
//! | [`sync`] | Throttled, de-duplicated, quantized write batching and metrics |
//! | [`store`] | Board store trait, in-memory store, clocks |
//! | [`input`] | Input event types and the gesture state machine |
//! | [`hit`] | Hit-testing bodies and selection handles |
//! | [`camera`] | Pan/zoom camera and coordinate conversions |
//! | [`container`] | Grid container sections and child membership |
//! | [`connector`] | Anchors, routing, path geometry, endpoint snapping |
//! | [`spatial`] | Uniform-grid obstacle index for hit and snap candidates |
//! | [`geom`] | Points, bounds, rotated boxes |
//! | [`config`] | Engine and sync configuration from the environment |
//! | [`error`] | Stable error codes |
//! | [`consts`] | Shared numeric constants (zoom limits, minimum sizes, etc.) |

pub mod camera;
pub mod config;
pub mod connector;
pub mod consts;
pub mod container;
pub mod doc;
pub mod engine;
pub mod error;
pub mod geom;
pub mod hit;
pub mod input;
pub mod overlay;
pub mod spatial;
pub mod store;
pub mod sync;
