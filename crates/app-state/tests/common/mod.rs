//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use ct_app_state::{CurveStore, EventKind};
use ct_common::Point;
use parking_lot::Mutex;

/// Route `tracing` output to the test harness. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Record the kind of every event the store emits.
pub fn record_kinds(store: &CurveStore) -> Arc<Mutex<Vec<EventKind>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    store.subscribe_all(move |e| sink.lock().push(e.kind()));
    seen
}

/// `side * side` points on a square grid, frames 1.., row-major.
pub fn grid_points(side: usize, spacing: f64) -> Vec<Point> {
    (0..side * side)
        .map(|i| {
            let (row, col) = (i / side, i % side);
            Point::new(i as i32 + 1, col as f64 * spacing, row as f64 * spacing)
        })
        .collect()
}
