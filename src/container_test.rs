#![allow(clippy::float_cmp)]

use rand::Rng;
use uuid::Uuid;

use super::*;

const EPSILON: f64 = 1e-6;

fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() < EPSILON
}

fn container() -> Geometry {
    Geometry::new(100.0, 50.0, 420.0, 320.0)
}

fn inside(outer: &Bounds, inner: &Bounds, tol: f64) -> bool {
    inner.left >= outer.left - tol
        && inner.top >= outer.top - tol
        && inner.right <= outer.right + tol
        && inner.bottom <= outer.bottom + tol
}

// =============================================================
// section_bounds
// =============================================================

#[test]
fn section_bounds_single_cell_is_padded_interior() {
    let sections = section_bounds(&container(), GridSpec::new(1, 1, 8.0, 16.0));
    assert_eq!(sections.len(), 1);
    let s = sections[0];
    assert!(approx_eq(s.left, 116.0));
    assert!(approx_eq(s.top, 66.0));
    assert!(approx_eq(s.right, 504.0));
    assert!(approx_eq(s.bottom, 354.0));
}

#[test]
fn section_bounds_are_equal_and_tile_without_overlap() {
    let mut rng = rand::rng();
    for _ in 0..200 {
        let rows = rng.random_range(1..=6);
        let cols = rng.random_range(1..=6);
        let gap = rng.random_range(0.0..20.0);
        let geom = Geometry::new(
            rng.random_range(-500.0..500.0),
            rng.random_range(-500.0..500.0),
            rng.random_range(200.0..900.0),
            rng.random_range(200.0..900.0),
        );
        let padding = 16.0;
        let sections = section_bounds(&geom, GridSpec::new(rows, cols, gap, padding));
        assert_eq!(sections.len(), (rows * cols) as usize);

        let w0 = sections[0].width();
        let h0 = sections[0].height();
        let interior = geom.bounds().expand(-padding);
        for (i, s) in sections.iter().enumerate() {
            assert!((s.width() - w0).abs() < EPSILON, "width mismatch at {i}");
            assert!((s.height() - h0).abs() < EPSILON, "height mismatch at {i}");
            assert!(inside(&interior, s, EPSILON), "section {i} escapes interior");
        }
        for i in 0..sections.len() {
            for j in (i + 1)..sections.len() {
                let a = sections[i];
                let b = sections[j];
                let overlap_w = a.right.min(b.right) - a.left.max(b.left);
                let overlap_h = a.bottom.min(b.bottom) - a.top.max(b.top);
                assert!(overlap_w <= EPSILON || overlap_h <= EPSILON, "sections {i} and {j} overlap");
            }
        }
        // Last section reaches the far interior corner.
        let last = sections[sections.len() - 1];
        assert!(approx_eq(last.right, interior.right));
        assert!(approx_eq(last.bottom, interior.bottom));
    }
}

#[test]
fn section_bounds_row_major_order() {
    let sections = section_bounds(&container(), GridSpec::new(2, 3, 8.0, 16.0));
    // Index 1 is row 0, col 1; index 3 is row 1, col 0.
    assert!(approx_eq(sections[1].top, sections[0].top));
    assert!(sections[1].left > sections[0].left);
    assert!(approx_eq(sections[3].left, sections[0].left));
    assert!(sections[3].top > sections[0].top);
}

#[test]
fn section_bounds_degenerate_container_uses_minimum_inner_size() {
    let sections = section_bounds(&Geometry::new(0.0, 0.0, 0.0, 0.0), GridSpec::new(2, 2, 8.0, 16.0));
    assert_eq!(sections.len(), 4);
    assert!(approx_eq(sections[0].width(), 0.5));
    assert!(approx_eq(sections[0].height(), 0.5));
}

#[test]
fn section_bounds_zero_rows_treated_as_one() {
    let sections = section_bounds(&container(), GridSpec::new(0, 0, 8.0, 16.0));
    assert_eq!(sections.len(), 1);
}

// =============================================================
// section_for_point
// =============================================================

#[test]
fn section_for_point_inside_returns_that_section() {
    let sections = section_bounds(&container(), GridSpec::new(2, 2, 8.0, 16.0));
    let p = sections[3].center();
    assert_eq!(section_for_point(p, &sections), Some(3));
}

#[test]
fn section_for_point_in_gap_returns_nearest() {
    let sections = section_bounds(&container(), GridSpec::new(1, 2, 40.0, 16.0));
    // A point in the gap, slightly closer to the right section.
    let gap_left = sections[0].right;
    let gap_right = sections[1].left;
    let p = Point::new(gap_left + (gap_right - gap_left) * 0.75, sections[0].center().y);
    assert_eq!(section_for_point(p, &sections), Some(1));
}

#[test]
fn section_for_point_outside_container_still_assigns() {
    let sections = section_bounds(&container(), GridSpec::new(2, 2, 8.0, 16.0));
    assert_eq!(section_for_point(Point::new(-10_000.0, -10_000.0), &sections), Some(0));
    assert_eq!(section_for_point(Point::new(10_000.0, 10_000.0), &sections), Some(3));
}

#[test]
fn section_for_point_empty_is_none() {
    assert_eq!(section_for_point(Point::new(0.0, 0.0), &[]), None);
}

#[test]
fn section_for_point_is_deterministic_across_dimension_changes() {
    let p = Point::new(400.0, 300.0);
    let geom = container();
    let mut first = Vec::new();
    for (rows, cols) in [(1, 1), (2, 2), (3, 2), (2, 5), (4, 4)] {
        let sections = section_bounds(&geom, GridSpec::new(rows, cols, 8.0, 16.0));
        first.push(section_for_point(p, &sections));
    }
    let mut second = Vec::new();
    for (rows, cols) in [(1, 1), (2, 2), (3, 2), (2, 5), (4, 4)] {
        let sections = section_bounds(&geom, GridSpec::new(rows, cols, 8.0, 16.0));
        second.push(section_for_point(p, &sections));
    }
    assert_eq!(first, second);
    assert_ne!(first[0], first[4]);
}

// =============================================================
// relative coordinates / clamping
// =============================================================

#[test]
fn to_relative_maps_corners_and_center() {
    let s = Bounds { left: 0.0, top: 0.0, right: 200.0, bottom: 100.0 };
    assert_eq!(to_relative(Point::new(0.0, 0.0), &s), (0.0, 0.0));
    assert_eq!(to_relative(Point::new(100.0, 50.0), &s), (0.5, 0.5));
    assert_eq!(to_relative(Point::new(200.0, 100.0), &s), (1.0, 1.0));
}

#[test]
fn to_relative_always_in_unit_range() {
    let mut rng = rand::rng();
    let s = Bounds { left: 10.0, top: 20.0, right: 60.0, bottom: 45.0 };
    for _ in 0..500 {
        let p = Point::new(rng.random_range(-1000.0..1000.0), rng.random_range(-1000.0..1000.0));
        let (rx, ry) = to_relative(p, &s);
        assert!((0.0..=1.0).contains(&rx));
        assert!((0.0..=1.0).contains(&ry));
    }
}

#[test]
fn from_relative_inverts_to_relative_inside() {
    let s = Bounds { left: 10.0, top: 20.0, right: 60.0, bottom: 45.0 };
    let p = Point::new(22.0, 31.0);
    let (rx, ry) = to_relative(p, &s);
    let back = from_relative(rx, ry, &s);
    assert!(approx_eq(back.x, p.x));
    assert!(approx_eq(back.y, p.y));
}

#[test]
fn clamp_top_left_keeps_fitting_object_inside() {
    let s = Bounds { left: 0.0, top: 0.0, right: 100.0, bottom: 100.0 };
    let tl = clamp_top_left(&s, 30.0, 20.0, Point::new(90.0, -15.0));
    assert_eq!(tl, Point::new(70.0, 0.0));
    let untouched = clamp_top_left(&s, 30.0, 20.0, Point::new(10.0, 10.0));
    assert_eq!(untouched, Point::new(10.0, 10.0));
}

#[test]
fn clamp_top_left_centers_oversized_axis_only() {
    let s = Bounds { left: 0.0, top: 0.0, right: 100.0, bottom: 100.0 };
    let tl = clamp_top_left(&s, 140.0, 20.0, Point::new(50.0, 95.0));
    assert!(approx_eq(tl.x, -20.0));
    assert!(approx_eq(tl.y, 80.0));
}

// =============================================================
// dimension-change stability
// =============================================================

fn child_in_section(sections: &[ContainerSection], index: usize, container_id: Uuid) -> (Geometry, Membership) {
    let s = sections[index];
    let child = Geometry::new(0.0, 0.0, 60.0, 40.0).centered_on(s.center());
    let (rx, ry) = to_relative(child.center(), &s);
    (child, Membership::new(container_id, index, rx, ry))
}

#[test]
fn reproject_across_column_changes_keeps_child_inside_container() {
    let geom = container();
    let container_id = Uuid::new_v4();
    let two_by_two = section_bounds(&geom, GridSpec::new(2, 2, 8.0, 16.0));
    let (child, membership) = child_in_section(&two_by_two, 3, container_id);

    let two_by_three = section_bounds(&geom, GridSpec::new(2, 3, 8.0, 16.0));
    let (child, membership) = reproject_child(&child, &membership, &two_by_three).unwrap();
    assert_eq!(membership.section_index, 3);
    assert!(inside(&geom.bounds(), &child.bounds(), 0.5));

    let (child, membership) = reproject_child(&child, &membership, &two_by_two).unwrap();
    assert_eq!(membership.section_index, 3);
    assert!(inside(&geom.bounds(), &child.bounds(), 0.5));
    assert!(inside(&two_by_two[3], &child.bounds(), 0.5));
    assert!(approx_eq(membership.rel_x, 0.5));
}

#[test]
fn reproject_to_single_cell_moves_child_to_section_zero() {
    let geom = container();
    let container_id = Uuid::new_v4();
    let two_by_two = section_bounds(&geom, GridSpec::new(2, 2, 8.0, 16.0));
    let (child, membership) = child_in_section(&two_by_two, 3, container_id);

    let one_by_one = section_bounds(&geom, GridSpec::new(1, 1, 8.0, 16.0));
    let (moved, membership) = reproject_child(&child, &membership, &one_by_one).unwrap();
    assert_eq!(membership.section_index, 0);
    assert!(inside(&geom.bounds(), &moved.bounds(), 0.5));
    assert!(inside(&one_by_one[0], &moved.bounds(), 0.5));
}

#[test]
fn reproject_preserves_relative_position_in_new_section() {
    let geom = container();
    let id = Uuid::new_v4();
    let old = section_bounds(&geom, GridSpec::new(2, 2, 8.0, 16.0));
    let membership = Membership::new(id, 1, 0.25, 0.75);
    let child = Geometry::new(0.0, 0.0, 10.0, 10.0);
    let new = section_bounds(&geom, GridSpec::new(3, 3, 8.0, 16.0));
    let (placed, m) = reproject_child(&child, &membership, &new).unwrap();
    let expected = from_relative(0.25, 0.75, &new[1]);
    assert!(approx_eq(placed.center().x, expected.x));
    assert!(approx_eq(placed.center().y, expected.y));
    assert_eq!((m.rel_x, m.rel_y), (0.25, 0.75));
    assert!(!old.is_empty());
}

#[test]
fn reproject_with_no_sections_is_none() {
    let m = Membership::new(Uuid::new_v4(), 0, 0.5, 0.5);
    assert!(reproject_child(&Geometry::new(0.0, 0.0, 10.0, 10.0), &m, &[]).is_none());
}

#[test]
fn container_translation_carries_children_by_same_delta() {
    let geom = container();
    let id = Uuid::new_v4();
    let grid = GridSpec::new(2, 2, 8.0, 16.0);
    let sections = section_bounds(&geom, grid);
    let (child, membership) = child_in_section(&sections, 2, id);
    let moved = section_bounds(&geom.translated(35.0, -12.0), grid);
    let (carried, m) = reproject_child(&child, &membership, &moved).unwrap();
    assert!(approx_eq(carried.x - child.x, 35.0));
    assert!(approx_eq(carried.y - child.y, -12.0));
    assert_eq!(m.section_index, 2);
}

// =============================================================
// resolve_membership / metadata
// =============================================================

#[test]
fn resolve_membership_clamps_child_into_resolved_section() {
    let geom = container();
    let id = Uuid::new_v4();
    let sections = section_bounds(&geom, GridSpec::new(1, 2, 8.0, 16.0));
    // Center sits in section 1 but the footprint hangs over the right edge.
    let child = Geometry::new(sections[1].right - 20.0, sections[1].top + 10.0, 60.0, 40.0);
    let (placed, m) = resolve_membership(id, &child, &sections).unwrap();
    assert_eq!(m.section_index, 1);
    assert_eq!(m.container_id, id);
    assert!(inside(&sections[1], &placed.bounds(), EPSILON));
    assert!((0.0..=1.0).contains(&m.rel_x));
}

#[test]
fn resize_section_fields_preserves_existing_entries() {
    let mut grid = GridFields::new(1, 2, 8.0);
    grid.section_titles = vec!["a".into(), "b".into()];
    grid.cell_colors = vec!["#fff".into()];
    grid.rows = 2;
    resize_section_fields(&mut grid);
    assert_eq!(grid.section_titles, vec!["a", "b", "", ""]);
    assert_eq!(grid.section_notes.len(), 4);
    assert_eq!(grid.cell_colors.len(), 4);

    grid.rows = 1;
    grid.cols = 1;
    resize_section_fields(&mut grid);
    assert_eq!(grid.section_titles, vec!["a"]);
}
