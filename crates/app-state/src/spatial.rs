//! Grid-bucketed spatial index over screen-space point positions.
//!
//! Points are hashed into square cells of `cell_size` pixels, keyed by
//! `(floor(x / cell_size), floor(y / cell_size))`. Nearest-point queries only
//! inspect the cell under the cursor and its neighbours, so lookups stay near
//! O(1) regardless of curve length.
//!
//! The index never updates incrementally. It remembers which curve, data
//! revision and view it was built for; any mismatch (or an explicit
//! [`SpatialIndex::invalidate`]) makes the next query rebuild it from scratch.

use std::collections::{BTreeSet, HashMap};

use ct_common::{Point, SpatialConfig, ViewState};

type CellKey = (i64, i64);

/// Axis-aligned rectangle in screen coordinates.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ScreenRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl ScreenRect {
    /// Rectangle from two corners, in any order.
    pub fn from_corners(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self {
            x: x0.min(x1),
            y: y0.min(y1),
            width: (x1 - x0).abs(),
            height: (y1 - y0).abs(),
        }
    }

    /// Same rectangle with non-negative width and height.
    pub fn normalized(self) -> Self {
        Self::from_corners(self.x, self.y, self.x + self.width, self.y + self.height)
    }

    /// Inclusive containment test. Assumes a normalized rectangle.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x && x <= self.x + self.width && y >= self.y && y <= self.y + self.height
    }
}

/// What the current grid was built from.
#[derive(Clone, Debug, PartialEq)]
struct IndexKey {
    curve: String,
    revision: u64,
    view: ViewState,
}

/// Diagnostics for the spatial index.
#[derive(Clone, Debug, PartialEq)]
pub struct SpatialStats {
    pub point_count: usize,
    pub cell_count: usize,
    pub cell_size: f64,
    pub rebuilds: u64,
}

/// Bucketed grid for nearest-point and rectangle queries.
#[derive(Debug)]
pub struct SpatialIndex {
    config: SpatialConfig,
    cell_size: f64,
    cells: HashMap<CellKey, Vec<usize>>,
    /// Screen position of every indexed point, by point index.
    positions: Vec<Option<(f64, f64)>>,
    key: Option<IndexKey>,
    rebuilds: u64,
}

impl SpatialIndex {
    pub fn new(config: SpatialConfig) -> Self {
        let cell_size = config.cell_size.unwrap_or(config.min_cell_size);
        Self {
            config,
            cell_size,
            cells: HashMap::new(),
            positions: Vec::new(),
            key: None,
            rebuilds: 0,
        }
    }

    /// Mark the grid stale; the next query through the store rebuilds it.
    pub fn invalidate(&mut self) {
        if self.key.take().is_some() {
            tracing::trace!("Spatial index invalidated");
        }
    }

    pub fn is_valid_for(&self, curve: &str, revision: u64, view: &ViewState) -> bool {
        self.key
            .as_ref()
            .is_some_and(|k| k.curve == curve && k.revision == revision && k.view == *view)
    }

    /// Rebuild the grid from scratch for `points` as seen through `view`.
    pub fn rebuild(&mut self, curve: &str, revision: u64, points: &[Point], view: &ViewState) {
        self.positions = points
            .iter()
            .map(|p| {
                let (sx, sy) = view.data_to_screen(p.x, p.y);
                (sx.is_finite() && sy.is_finite()).then_some((sx, sy))
            })
            .collect();

        self.cell_size = self.choose_cell_size();
        self.cells.clear();
        for (index, position) in self.positions.iter().enumerate() {
            if let Some((sx, sy)) = *position {
                self.cells
                    .entry(cell_of(sx, sy, self.cell_size))
                    .or_default()
                    .push(index);
            }
        }

        self.key = Some(IndexKey {
            curve: curve.to_string(),
            revision,
            view: *view,
        });
        self.rebuilds += 1;
        tracing::debug!(
            curve,
            points = points.len(),
            cells = self.cells.len(),
            cell_size = self.cell_size,
            "Spatial index rebuilt"
        );
    }

    fn choose_cell_size(&self) -> f64 {
        if let Some(fixed) = self.config.cell_size {
            return fixed;
        }
        let mut count = 0usize;
        let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
        let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for (x, y) in self.positions.iter().flatten() {
            count += 1;
            min_x = min_x.min(*x);
            min_y = min_y.min(*y);
            max_x = max_x.max(*x);
            max_y = max_y.max(*y);
        }
        if count == 0 {
            return self.config.min_cell_size;
        }
        let area = (max_x - min_x).max(1.0) * (max_y - min_y).max(1.0);
        let size = (area * self.config.target_occupancy / count as f64).sqrt();
        size.clamp(self.config.min_cell_size, self.config.max_cell_size)
    }

    /// Index of the point closest to `(screen_x, screen_y)` within
    /// `tolerance` pixels. Equal distances resolve to the lowest index.
    pub fn find_point_at(&self, screen_x: f64, screen_y: f64, tolerance: f64) -> Option<usize> {
        if !(screen_x.is_finite() && screen_y.is_finite()) || !(tolerance >= 0.0) {
            return None;
        }

        let tolerance_sq = tolerance * tolerance;
        let mut best: Option<(f64, usize)> = None;
        let mut consider = |index: usize| {
            let Some((px, py)) = self.positions[index] else {
                return;
            };
            let d_sq = (px - screen_x).powi(2) + (py - screen_y).powi(2);
            if d_sq > tolerance_sq {
                return;
            }
            let better = match best {
                None => true,
                Some((best_d, best_i)) => d_sq < best_d || (d_sq == best_d && index < best_i),
            };
            if better {
                best = Some((d_sq, index));
            }
        };

        // Window size is decided in f64 so huge tolerances never reach
        // integer cell arithmetic.
        let ring = (tolerance / self.cell_size).ceil().max(1.0);
        let window = (2.0 * ring + 1.0).powi(2);
        if window >= self.cells.len() as f64 {
            self.cells.values().flatten().for_each(|&i| consider(i));
        } else {
            let ring = ring as i64;
            let (cx, cy) = cell_of(screen_x, screen_y, self.cell_size);
            for gx in cx.saturating_sub(ring)..=cx.saturating_add(ring) {
                for gy in cy.saturating_sub(ring)..=cy.saturating_add(ring) {
                    if let Some(bucket) = self.cells.get(&(gx, gy)) {
                        bucket.iter().for_each(|&i| consider(i));
                    }
                }
            }
        }

        best.map(|(_, index)| index)
    }

    /// Indices of all points whose screen position lies inside `rect`.
    pub fn points_in_rect(&self, rect: ScreenRect) -> BTreeSet<usize> {
        let rect = rect.normalized();
        let mut found = BTreeSet::new();
        let finite = [rect.x, rect.y, rect.width, rect.height]
            .iter()
            .all(|v| v.is_finite());
        if !finite {
            return found;
        }

        let mut take = |index: usize| {
            if let Some((px, py)) = self.positions[index] {
                if rect.contains(px, py) {
                    found.insert(index);
                }
            }
        };

        let (x0, y0) = cell_of(rect.x, rect.y, self.cell_size);
        let (x1, y1) = cell_of(rect.x + rect.width, rect.y + rect.height, self.cell_size);
        let span = (x1 as f64 - x0 as f64 + 1.0) * (y1 as f64 - y0 as f64 + 1.0);
        if span >= self.cells.len() as f64 {
            self.cells.values().flatten().for_each(|&i| take(i));
        } else {
            for gx in x0..=x1 {
                for gy in y0..=y1 {
                    if let Some(bucket) = self.cells.get(&(gx, gy)) {
                        bucket.iter().for_each(|&i| take(i));
                    }
                }
            }
        }
        found
    }

    pub fn stats(&self) -> SpatialStats {
        SpatialStats {
            point_count: self.positions.iter().flatten().count(),
            cell_count: self.cells.len(),
            cell_size: self.cell_size,
            rebuilds: self.rebuilds,
        }
    }
}

fn cell_of(x: f64, y: f64, cell_size: f64) -> CellKey {
    ((x / cell_size).floor() as i64, (y / cell_size).floor() as i64)
}
