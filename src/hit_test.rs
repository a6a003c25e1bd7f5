use crate::doc::{Anchor, BoardObject, ConnectorEnd, ConnectorStyle, DocStore, ObjectKind};
use crate::overlay::DraftOverlay;

use super::*;

// =============================================================
// Helpers
// =============================================================

fn doc_with(objects: Vec<BoardObject>) -> DocStore {
    let mut doc = DocStore::new();
    for o in objects {
        doc.insert(o);
    }
    doc
}

fn all_ids(doc: &DocStore) -> Vec<ObjectId> {
    doc.sorted_objects().iter().map(|o| o.id).collect()
}

fn rect(x: f64, y: f64, w: f64, h: f64, z: i64) -> BoardObject {
    let mut o = BoardObject::shape(ObjectKind::Rect, Geometry::new(x, y, w, h));
    o.z_index = z;
    o
}

// =============================================================
// Corner / LineEnd
// =============================================================

#[test]
fn corner_opposites_pair_up() {
    for c in Corner::ALL {
        assert_eq!(c.opposite().opposite(), c);
        assert_ne!(c.opposite(), c);
        let (sx, sy) = c.signs();
        let (ox, oy) = c.opposite().signs();
        assert_eq!((sx, sy), (-ox, -oy));
    }
}

#[test]
fn corner_index_matches_geometry_corners() {
    let g = Geometry::new(0.0, 0.0, 10.0, 20.0);
    let corners = g.corners();
    assert_eq!(corners[Corner::Nw.index()], Point::new(0.0, 0.0));
    assert_eq!(corners[Corner::Se.index()], Point::new(10.0, 20.0));
    assert_eq!(Corner::Ne.cursor(), "nesw-resize");
}

#[test]
fn line_end_opposite() {
    assert_eq!(LineEnd::Start.opposite(), LineEnd::End);
    assert_eq!(LineEnd::End.index(), 1);
}

// =============================================================
// hit_test
// =============================================================

#[test]
fn empty_canvas_hits_nothing() {
    let doc = DocStore::new();
    let overlay = DraftOverlay::new();
    let scene = Scene::new(&doc, &overlay);
    assert!(hit_test(Point::new(1.0, 1.0), &scene, &Camera::default(), &[], &[], RouteStyle::Straight).is_none());
}

#[test]
fn topmost_body_wins() {
    let low = rect(0.0, 0.0, 100.0, 100.0, 1);
    let high = rect(50.0, 50.0, 100.0, 100.0, 2);
    let high_id = high.id;
    let doc = doc_with(vec![low, high]);
    let overlay = DraftOverlay::new();
    let scene = Scene::new(&doc, &overlay);
    let hit = hit_test(Point::new(75.0, 75.0), &scene, &Camera::default(), &[], &all_ids(&doc), RouteStyle::Straight);
    assert_eq!(hit, Some(Hit { object_id: high_id, part: HitPart::Body }));
}

#[test]
fn bodies_outside_candidates_are_skipped() {
    let r = rect(0.0, 0.0, 100.0, 100.0, 1);
    let doc = doc_with(vec![r]);
    let overlay = DraftOverlay::new();
    let scene = Scene::new(&doc, &overlay);
    assert!(hit_test(Point::new(50.0, 50.0), &scene, &Camera::default(), &[], &[], RouteStyle::Straight).is_none());
}

#[test]
fn rotated_body_uses_rotated_box() {
    let mut r = rect(0.0, 40.0, 100.0, 20.0, 0);
    r.geometry = r.geometry.with_rotation(90.0);
    let doc = doc_with(vec![r]);
    let overlay = DraftOverlay::new();
    let scene = Scene::new(&doc, &overlay);
    let ids = all_ids(&doc);
    // Center (50, 50); after a quarter turn the box spans y in [0, 100] at x in [40, 60].
    assert!(hit_test(Point::new(50.0, 5.0), &scene, &Camera::default(), &[], &ids, RouteStyle::Straight).is_some());
    assert!(hit_test(Point::new(5.0, 50.0), &scene, &Camera::default(), &[], &ids, RouteStyle::Straight).is_none());
}

#[test]
fn selected_corner_handle_beats_body() {
    let r = rect(0.0, 0.0, 100.0, 100.0, 0);
    let id = r.id;
    let doc = doc_with(vec![r]);
    let overlay = DraftOverlay::new();
    let scene = Scene::new(&doc, &overlay);
    let hit = hit_test(Point::new(98.0, 99.0), &scene, &Camera::default(), &[id], &all_ids(&doc), RouteStyle::Straight);
    assert_eq!(hit, Some(Hit { object_id: id, part: HitPart::ResizeHandle(Corner::Se) }));
}

#[test]
fn handles_ignored_with_multi_selection() {
    let a = rect(0.0, 0.0, 100.0, 100.0, 0);
    let b = rect(300.0, 0.0, 100.0, 100.0, 0);
    let (aid, bid) = (a.id, b.id);
    let doc = doc_with(vec![a, b]);
    let overlay = DraftOverlay::new();
    let scene = Scene::new(&doc, &overlay);
    let hit = hit_test(Point::new(98.0, 98.0), &scene, &Camera::default(), &[aid, bid], &all_ids(&doc), RouteStyle::Straight);
    assert_eq!(hit.map(|h| h.part), Some(HitPart::Body));
}

#[test]
fn rotate_handle_scales_with_zoom() {
    let r = rect(0.0, 0.0, 100.0, 100.0, 0);
    let id = r.id;
    let doc = doc_with(vec![r]);
    let overlay = DraftOverlay::new();
    let scene = Scene::new(&doc, &overlay);
    let camera = Camera { pan_x: 0.0, pan_y: 0.0, zoom: 2.0 };
    // 24px above the top edge at zoom 2 is 12 world units.
    let handle = rotate_handle_position(&scene.geometry(&id).unwrap_or_default(), &camera);
    assert_eq!(handle, Point::new(50.0, -12.0));
    let hit = hit_test(handle, &scene, &camera, &[id], &[], RouteStyle::Straight);
    assert_eq!(hit.map(|h| h.part), Some(HitPart::RotateHandle));
}

#[test]
fn line_endpoints_and_body() {
    let line = BoardObject::shape(ObjectKind::Line, Geometry::new(0.0, 48.0, 100.0, 4.0));
    let id = line.id;
    let doc = doc_with(vec![line]);
    let overlay = DraftOverlay::new();
    let scene = Scene::new(&doc, &overlay);
    let cam = Camera::default();
    let ids = all_ids(&doc);
    assert_eq!(
        hit_test(Point::new(1.0, 50.0), &scene, &cam, &[id], &ids, RouteStyle::Straight).map(|h| h.part),
        Some(HitPart::LineEndpoint(LineEnd::Start))
    );
    assert_eq!(
        hit_test(Point::new(50.0, 53.0), &scene, &cam, &[], &ids, RouteStyle::Straight).map(|h| h.part),
        Some(HitPart::Body)
    );
    assert!(hit_test(Point::new(50.0, 70.0), &scene, &cam, &[], &ids, RouteStyle::Straight).is_none());
}

#[test]
fn connector_endpoints_and_body() {
    let a = rect(0.0, 0.0, 100.0, 100.0, 0);
    let conn = BoardObject::connector(
        ConnectorStyle::Arrow,
        ConnectorEnd::Attached { object_id: a.id, anchor: Anchor::Right },
        ConnectorEnd::Free(Point::new(300.0, 50.0)),
    );
    let cid = conn.id;
    let doc = doc_with(vec![a, conn]);
    let overlay = DraftOverlay::new();
    let scene = Scene::new(&doc, &overlay);
    let cam = Camera::default();
    let ids = all_ids(&doc);
    assert_eq!(
        hit_test(Point::new(299.0, 51.0), &scene, &cam, &[cid], &ids, RouteStyle::Straight).map(|h| h.part),
        Some(HitPart::ConnectorEndpoint(EndSide::To))
    );
    assert_eq!(
        hit_test(Point::new(200.0, 53.0), &scene, &cam, &[], &ids, RouteStyle::Straight),
        Some(Hit { object_id: cid, part: HitPart::ConnectorBody })
    );
}
