#![allow(clippy::float_cmp)]

use super::*;

const EPSILON: f64 = 1e-9;

fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() < EPSILON
}

// --- scalar helpers ---

#[test]
fn clamp_inside_range_is_identity() {
    assert_eq!(clamp(5.0, 0.0, 10.0), 5.0);
}

#[test]
fn clamp_pins_to_edges() {
    assert_eq!(clamp(-3.0, 0.0, 10.0), 0.0);
    assert_eq!(clamp(13.0, 0.0, 10.0), 10.0);
}

#[test]
fn clamp_inverted_range_returns_midpoint() {
    assert_eq!(clamp(100.0, 10.0, 0.0), 5.0);
}

#[test]
fn distance_three_four_five() {
    assert!(approx_eq(distance(Point::new(0.0, 0.0), Point::new(3.0, 4.0)), 5.0));
}

#[test]
fn normalize_degrees_wraps_negative_and_large() {
    assert!(approx_eq(normalize_degrees(-90.0), 270.0));
    assert!(approx_eq(normalize_degrees(720.0 + 15.0), 15.0));
    assert_eq!(normalize_degrees(360.0), 0.0);
}

#[test]
fn normalize_degrees_non_finite_is_zero() {
    assert_eq!(normalize_degrees(f64::NAN), 0.0);
    assert_eq!(normalize_degrees(f64::INFINITY), 0.0);
}

#[test]
fn round_to_step_snaps() {
    assert!(approx_eq(round_to_step(17.0, 10.0), 20.0));
    assert!(approx_eq(round_to_step(14.9, 10.0), 10.0));
    assert!(approx_eq(round_to_step(0.26, 0.5), 0.5));
}

#[test]
fn round_to_step_non_positive_step_is_identity() {
    assert_eq!(round_to_step(17.3, 0.0), 17.3);
    assert_eq!(round_to_step(17.3, -1.0), 17.3);
}

#[test]
fn angle_conversion_round_trips_quarter_turn() {
    assert!(approx_eq(rad_to_deg(deg_to_rad(90.0)), 90.0));
}

#[test]
fn rotate_point_quarter_turn_clockwise() {
    let p = rotate_point(Point::new(10.0, 0.0), Point::new(0.0, 0.0), 90.0);
    assert!(approx_eq(p.x, 0.0));
    assert!(approx_eq(p.y, 10.0));
}

// --- Bounds ---

#[test]
fn bounds_from_corners_normalizes_order() {
    let b = Bounds::from_corners(Point::new(10.0, 20.0), Point::new(-5.0, 2.0));
    assert_eq!(b, Bounds { left: -5.0, top: 2.0, right: 10.0, bottom: 20.0 });
}

#[test]
fn bounds_from_points_empty_is_none() {
    assert!(Bounds::from_points(&[]).is_none());
}

#[test]
fn bounds_intersects_touching_edges() {
    let a = Bounds { left: 0.0, top: 0.0, right: 10.0, bottom: 10.0 };
    let b = Bounds { left: 10.0, top: 0.0, right: 20.0, bottom: 10.0 };
    let c = Bounds { left: 10.1, top: 0.0, right: 20.0, bottom: 10.0 };
    assert!(a.intersects(&b));
    assert!(!a.intersects(&c));
}

#[test]
fn bounds_expand_and_center() {
    let b = Bounds { left: 0.0, top: 0.0, right: 10.0, bottom: 20.0 }.expand(5.0);
    assert_eq!(b.width(), 20.0);
    assert_eq!(b.height(), 30.0);
    assert_eq!(b.center(), Point::new(5.0, 10.0));
}

// --- Geometry ---

#[test]
fn geometry_visual_bounds_unrotated_matches_box() {
    let g = Geometry::new(10.0, 20.0, 100.0, 50.0);
    assert_eq!(g.visual_bounds(), g.bounds());
}

#[test]
fn geometry_visual_bounds_quarter_turn_swaps_extent() {
    let g = Geometry::new(0.0, 0.0, 100.0, 50.0).with_rotation(90.0);
    let b = g.visual_bounds();
    assert!(approx_eq(b.width(), 50.0));
    assert!(approx_eq(b.height(), 100.0));
    assert!(approx_eq(b.center().x, 50.0));
    assert!(approx_eq(b.center().y, 25.0));
}

#[test]
fn geometry_contains_respects_rotation() {
    let g = Geometry::new(0.0, 0.0, 100.0, 10.0).with_rotation(90.0);
    // After a quarter turn the long axis is vertical through x = 50.
    assert!(g.contains(Point::new(50.0, -40.0)));
    assert!(!g.contains(Point::new(5.0, 5.0)));
}

#[test]
fn geometry_local_world_round_trip() {
    let g = Geometry::new(3.0, 7.0, 40.0, 20.0).with_rotation(33.0);
    let world = Point::new(12.0, -4.0);
    let back = g.to_world(g.to_local(world));
    assert!(approx_eq(back.x, world.x));
    assert!(approx_eq(back.y, world.y));
}

#[test]
fn distance_to_segment_projects_and_clamps() {
    let a = Point::new(0.0, 0.0);
    let b = Point::new(10.0, 0.0);
    assert!(approx_eq(distance_to_segment(Point::new(5.0, 3.0), a, b), 3.0));
    assert!(approx_eq(distance_to_segment(Point::new(-4.0, 3.0), a, b), 5.0));
    assert!(approx_eq(distance_to_segment(Point::new(1.0, 1.0), a, a), 2.0_f64.sqrt()));
}

// --- lines ---

#[test]
fn line_between_round_trips_endpoints() {
    let start = Point::new(10.0, 10.0);
    let end = Point::new(10.0, 110.0);
    let g = Geometry::line_between(start, end, 4.0, 1.0);
    assert!(approx_eq(g.width, 100.0));
    assert!(approx_eq(g.rotation_deg, 90.0));
    let [a, b] = g.line_endpoints();
    assert!(approx_eq(a.x, start.x) && approx_eq(a.y, start.y));
    assert!(approx_eq(b.x, end.x) && approx_eq(b.y, end.y));
}

#[test]
fn line_between_enforces_min_length_from_start() {
    let start = Point::new(0.0, 0.0);
    let g = Geometry::line_between(start, Point::new(0.0, -2.0), 4.0, 8.0);
    assert!(approx_eq(g.width, 8.0));
    let [a, b] = g.line_endpoints();
    assert!(approx_eq(a.x, 0.0) && approx_eq(a.y, 0.0));
    assert!(approx_eq(b.x, 0.0) && approx_eq(b.y, -8.0));

    let degenerate = Geometry::line_between(start, start, 4.0, 8.0);
    assert!(approx_eq(degenerate.width, 8.0));
    assert_eq!(degenerate.rotation_deg, 0.0);
}
