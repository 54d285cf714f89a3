//! Per-curve point selection.
//!
//! Selections are sets of point *indices*, so every structural edit of a
//! curve must be mirrored here to keep them pointing at the same points.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Selected point indices keyed by curve name. Empty sets are never stored.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionState {
    per_curve: BTreeMap<String, BTreeSet<usize>>,
}

impl SelectionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the selection for `curve` (empty if none).
    pub fn get(&self, curve: &str) -> BTreeSet<usize> {
        self.per_curve.get(curve).cloned().unwrap_or_default()
    }

    pub fn contains(&self, curve: &str, index: usize) -> bool {
        self.per_curve
            .get(curve)
            .is_some_and(|set| set.contains(&index))
    }

    /// Replace the selection of `curve`. Returns false if nothing changed.
    pub fn set(&mut self, curve: &str, indices: BTreeSet<usize>) -> bool {
        if self.per_curve.get(curve).map_or(indices.is_empty(), |cur| *cur == indices) {
            return false;
        }
        if indices.is_empty() {
            self.per_curve.remove(curve);
        } else {
            self.per_curve.insert(curve.to_string(), indices);
        }
        true
    }

    pub fn insert(&mut self, curve: &str, index: usize) -> bool {
        self.per_curve
            .entry(curve.to_string())
            .or_default()
            .insert(index)
    }

    pub fn remove(&mut self, curve: &str, index: usize) -> bool {
        let Some(set) = self.per_curve.get_mut(curve) else {
            return false;
        };
        let removed = set.remove(&index);
        if set.is_empty() {
            self.per_curve.remove(curve);
        }
        removed
    }

    /// Clear one curve. Returns false if it had no selection.
    pub fn clear_curve(&mut self, curve: &str) -> bool {
        self.per_curve.remove(curve).is_some()
    }

    /// Clear every curve. Returns false if nothing was selected.
    pub fn clear_all(&mut self) -> bool {
        let had_any = !self.per_curve.is_empty();
        self.per_curve.clear();
        had_any
    }

    /// A point was removed at `removed`: drop it and shift later indices down.
    pub fn on_point_removed(&mut self, curve: &str, removed: usize) {
        let Some(set) = self.per_curve.get_mut(curve) else {
            return;
        };
        *set = set
            .iter()
            .filter(|&&i| i != removed)
            .map(|&i| if i > removed { i - 1 } else { i })
            .collect();
        if set.is_empty() {
            self.per_curve.remove(curve);
        }
    }

    /// A point was inserted at `inserted`: shift indices at or after it up.
    pub fn on_point_inserted(&mut self, curve: &str, inserted: usize) {
        if let Some(set) = self.per_curve.get_mut(curve) {
            *set = set
                .iter()
                .map(|&i| if i >= inserted { i + 1 } else { i })
                .collect();
        }
    }

    /// Drop indices that are no longer valid for a curve of `len` points.
    /// Returns true if anything was pruned.
    pub fn prune(&mut self, curve: &str, len: usize) -> bool {
        let Some(set) = self.per_curve.get_mut(curve) else {
            return false;
        };
        let before = set.len();
        set.retain(|&i| i < len);
        let pruned = set.len() != before;
        if set.is_empty() {
            self.per_curve.remove(curve);
        }
        pruned
    }

    pub fn total_selected(&self) -> usize {
        self.per_curve.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.per_curve.is_empty()
    }

    /// Copy of every non-empty selection.
    pub fn all(&self) -> BTreeMap<String, BTreeSet<usize>> {
        self.per_curve.clone()
    }
}

/// Inclusive index range for a curve of `len` points, with reversed bounds
/// swapped and both ends clamped to `[0, len - 1]`. Empty for empty curves.
pub fn clamped_range(start: usize, end: usize, len: usize) -> BTreeSet<usize> {
    if len == 0 {
        return BTreeSet::new();
    }
    let (lo, hi) = if start <= end { (start, end) } else { (end, start) };
    let last = len - 1;
    (lo.min(last)..=hi.min(last)).collect()
}
