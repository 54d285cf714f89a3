//! Serializable whole-store snapshot and the diagnostics summary.
//!
//! `StateSnapshot` is what a persistence layer saves and hands back: curve
//! data, metadata, selection, view, frame and image files. It carries no file
//! format of its own; callers serialize it with whatever serde backend they
//! use.

use std::collections::{BTreeMap, BTreeSet};

use ct_common::{CurveMetadata, ValidationError, ViewState};
use serde::{Deserialize, Serialize};

use crate::events::CurveMap;
use crate::store::{validate_frame_order, validate_image_files};

/// A complete, restorable copy of the store's state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub curves: CurveMap,
    #[serde(default)]
    pub metadata: BTreeMap<String, CurveMetadata>,
    #[serde(default)]
    pub selections: BTreeMap<String, BTreeSet<usize>>,
    #[serde(default)]
    pub active_curve: Option<String>,
    #[serde(default = "default_frame")]
    pub current_frame: i32,
    #[serde(default)]
    pub view: ViewState,
    #[serde(default)]
    pub image_files: Vec<String>,
}

fn default_frame() -> i32 {
    1
}

impl Default for StateSnapshot {
    fn default() -> Self {
        Self {
            curves: CurveMap::new(),
            metadata: BTreeMap::new(),
            selections: BTreeMap::new(),
            active_curve: None,
            current_frame: default_frame(),
            view: ViewState::default(),
            image_files: Vec::new(),
        }
    }
}

impl StateSnapshot {
    /// Checks that must pass before a snapshot may touch the store.
    ///
    /// Selection indices beyond a curve's length are not an error here; the
    /// store prunes them on restore.
    pub fn validate(&self, max_image_files: usize) -> Result<(), ValidationError> {
        validate_image_files(&self.image_files, max_image_files)?;
        for (name, points) in &self.curves {
            validate_frame_order(name, points)?;
        }
        if !(self.view.zoom().is_finite() && self.view.zoom() > 0.0) {
            return Err(ValidationError::InvalidZoom(self.view.zoom()));
        }
        Ok(())
    }

    pub fn total_points(&self) -> usize {
        self.curves.values().map(Vec::len).sum()
    }

    /// Rough in-memory size in bytes, for diagnostics.
    pub fn estimated_size(&self) -> usize {
        let mut size = std::mem::size_of::<Self>();
        for (name, points) in &self.curves {
            size += name.len() + std::mem::size_of_val(points.as_slice());
        }
        for (name, indices) in &self.selections {
            size += name.len() + indices.len() * std::mem::size_of::<usize>();
        }
        size += self
            .metadata
            .keys()
            .map(|name| name.len() + std::mem::size_of::<CurveMetadata>())
            .sum::<usize>();
        size += self.image_files.iter().map(String::len).sum::<usize>();
        size
    }
}

/// Diagnostics view of the store, cheap to compute.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateSummary {
    pub curve_count: usize,
    pub total_points: usize,
    pub total_selected: usize,
    pub active_curve: Option<String>,
    pub current_frame: i32,
    pub zoom: f64,
    pub batch_mode: bool,
}
