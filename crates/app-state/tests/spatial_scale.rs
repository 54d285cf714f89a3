//! Spatial index correctness and speed on a large curve.

mod common;

use std::time::{Duration, Instant};

use ct_app_state::{CurveStore, ScreenRect};

use common::{grid_points, init_tracing};

const SIDE: usize = 100;
const SPACING: f64 = 10.0;

#[test]
fn nearest_point_on_ten_thousand_point_grid() {
    init_tracing();
    let store = CurveStore::new();
    store
        .set_curve_data("grid", &grid_points(SIDE, SPACING), None)
        .unwrap();

    let start = Instant::now();
    for q in 0..100usize {
        let (row, col) = ((q * 37) % SIDE, (q * 53) % SIDE);
        let (x, y) = (col as f64 * SPACING + 1.5, row as f64 * SPACING - 2.0);
        let found = store.find_point_at(Some("grid"), x, y, 4.0).unwrap();
        assert_eq!(found, Some(row * SIDE + col), "query {q} at ({x}, {y})");
    }
    let elapsed = start.elapsed();
    assert!(elapsed < Duration::from_secs(1), "100 queries took {elapsed:?}");

    let stats = store.spatial_stats().unwrap();
    assert_eq!(stats.point_count, SIDE * SIDE);
    assert_eq!(stats.rebuilds, 1);
}

#[test]
fn query_between_points_misses() {
    init_tracing();
    let store = CurveStore::new();
    store
        .set_curve_data("grid", &grid_points(SIDE, SPACING), None)
        .unwrap();
    assert_eq!(store.find_point_at(Some("grid"), 505.0, 505.0, 3.0).unwrap(), None);
}

#[test]
fn rect_selection_on_large_grid() {
    init_tracing();
    let store = CurveStore::new();
    store
        .set_curve_data("grid", &grid_points(SIDE, SPACING), None)
        .unwrap();

    let rect = ScreenRect::from_corners(95.0, 95.0, 125.0, 125.0);
    let selected = store.select_points_in_rect(Some("grid"), rect).unwrap();

    let expected: Vec<usize> = (10..=12)
        .flat_map(|row| (10..=12).map(move |col| row * SIDE + col))
        .collect();
    assert_eq!(selected.into_iter().collect::<Vec<_>>(), expected);
    assert_eq!(store.summary().unwrap().total_selected, 9);
}

#[test]
fn unbounded_tolerance_falls_back_to_full_scan() {
    init_tracing();
    let store = CurveStore::new();
    store.set_curve_data("g", &grid_points(20, SPACING), None).unwrap();

    assert_eq!(store.find_point_at(Some("g"), 0.0, 0.0, f64::INFINITY).unwrap(), Some(0));
    assert_eq!(store.find_point_at(Some("g"), 0.0, 0.0, 1e300).unwrap(), Some(0));
    assert_eq!(store.find_point_at(Some("g"), 1e300, 1e300, 5.0).unwrap(), None);
}

#[test]
fn huge_rect_selects_whole_curve() {
    init_tracing();
    let store = CurveStore::new();
    store.set_curve_data("g", &grid_points(20, SPACING), None).unwrap();

    let rect = ScreenRect::from_corners(-1e300, -1e300, 1e300, 1e300);
    assert_eq!(store.points_in_rect(Some("g"), rect).unwrap().len(), 400);
}
